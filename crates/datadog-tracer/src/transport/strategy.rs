// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{TracerSettings, TracesTransportType};
use crate::transport::{headers, ApiRequestFactory, HttpClientRequestFactory};
use crate::transport::{HttpStreamRequestFactory, TcpStreamFactory};

/// Picks the channel to the agent from the configured transport kind.
/// Platform-specific kinds fall back to plain HTTP when this build cannot
/// provide them.
#[must_use]
pub fn agent_factory(settings: &TracerSettings) -> Arc<dyn ApiRequestFactory> {
    let strategy = settings.traces_transport;
    match strategy {
        TracesTransportType::CustomTcpProvider => {
            let host = settings.agent_uri.host_str().unwrap_or("localhost");
            let port = settings.agent_uri.port_or_known_default().unwrap_or(8126);
            info!("Using custom TCP transport to {host}:{port}");
            Arc::new(HttpStreamRequestFactory::new(
                TcpStreamFactory::new(host, port),
                headers::agent_default_headers(),
                settings.request_timeout,
            ))
        }
        TracesTransportType::WindowsNamedPipe => named_pipe_factory(settings),
        TracesTransportType::UnixDomainSocket => unix_socket_factory(settings),
        TracesTransportType::Default => default_factory(settings),
    }
}

/// Channel for agentless submission straight to the intake.
#[must_use]
pub fn direct_intake_factory(settings: &TracerSettings, api_key: &str) -> Arc<dyn ApiRequestFactory> {
    let mut default_headers = headers::agent_default_headers();
    headers::insert(&mut default_headers, headers::API_KEY_HEADER, api_key);
    Arc::new(HttpClientRequestFactory::new(
        default_headers,
        settings.request_timeout,
        settings.proxy_https.as_deref(),
    ))
}

fn default_factory(settings: &TracerSettings) -> Arc<dyn ApiRequestFactory> {
    Arc::new(HttpClientRequestFactory::new(
        headers::agent_default_headers(),
        settings.request_timeout,
        settings.proxy_https.as_deref(),
    ))
}

#[cfg(windows)]
fn named_pipe_factory(settings: &TracerSettings) -> Arc<dyn ApiRequestFactory> {
    use crate::transport::named_pipe::NamedPipeClientStreamFactory;

    let Some(pipe_name) = settings.traces_pipe_name.as_deref() else {
        warn!("Named pipe transport selected without a pipe name, using default transport");
        return default_factory(settings);
    };
    info!("Using named pipe transport {pipe_name}");
    Arc::new(HttpStreamRequestFactory::new(
        NamedPipeClientStreamFactory::new(pipe_name, settings.traces_pipe_timeout),
        headers::agent_default_headers(),
        settings.request_timeout,
    ))
}

#[cfg(not(windows))]
fn named_pipe_factory(settings: &TracerSettings) -> Arc<dyn ApiRequestFactory> {
    warn!("Named pipes are not supported on this platform, using default transport");
    default_factory(settings)
}

#[cfg(unix)]
fn unix_socket_factory(settings: &TracerSettings) -> Arc<dyn ApiRequestFactory> {
    use crate::transport::uds::UnixDomainSocketStreamFactory;

    let Some(path) = settings.traces_unix_domain_socket_path.as_deref() else {
        warn!("Unix domain socket transport selected without a socket path, using default transport");
        return default_factory(settings);
    };
    info!("Using unix domain socket transport {}", path.display());
    Arc::new(HttpStreamRequestFactory::new(
        UnixDomainSocketStreamFactory::new(path),
        headers::agent_default_headers(),
        settings.request_timeout,
    ))
}

#[cfg(not(unix))]
fn unix_socket_factory(settings: &TracerSettings) -> Arc<dyn ApiRequestFactory> {
    warn!("Unix domain sockets are not supported on this platform, using default transport");
    default_factory(settings)
}
