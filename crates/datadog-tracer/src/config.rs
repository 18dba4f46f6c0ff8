// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::errors::ConfigError;

const DEFAULT_AGENT_HOST: &str = "localhost";
const DEFAULT_AGENT_PORT: u16 = 8126;
const DEFAULT_SITE: &str = "datadoghq.com";
const DEFAULT_PIPE_TIMEOUT_MS: u64 = 500;
const DEFAULT_STATS_FLUSH_INTERVAL_SECS: u64 = 10;
const DEFAULT_TRACE_FLUSH_INTERVAL_MS: u64 = 1000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const UNIX_SCHEME_PREFIX: &str = "unix://";

/// Physical channel used to reach the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracesTransportType {
    #[default]
    Default,
    CustomTcpProvider,
    WindowsNamedPipe,
    UnixDomainSocket,
}

impl FromStr for TracesTransportType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" | "http" => Ok(Self::Default),
            "custom_tcp" | "tcp" => Ok(Self::CustomTcpProvider),
            "named_pipe" | "pipe" => Ok(Self::WindowsNamedPipe),
            "unix_socket" | "uds" => Ok(Self::UnixDomainSocket),
            _ => Err(ConfigError::InvalidValue {
                name: "DD_TRACE_TRANSPORT",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracerSettings {
    /// Base URL of the agent; request paths are joined onto it.
    pub agent_uri: Url,
    pub traces_transport: TracesTransportType,
    pub traces_pipe_name: Option<String>,
    pub traces_pipe_timeout: Duration,
    pub traces_unix_domain_socket_path: Option<PathBuf>,
    pub environment: Option<String>,
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    pub hostname: String,
    pub stats_computation_enabled: bool,
    pub partial_flush_enabled: bool,
    pub stats_flush_interval: Duration,
    pub trace_flush_interval: Duration,
    pub request_timeout: Duration,
    pub agentless: bool,
    pub api_key: Option<String>,
    pub site: String,
    pub proxy_https: Option<String>,
    pub log_level: String,
}

impl Default for TracerSettings {
    fn default() -> Self {
        Self {
            agent_uri: default_agent_uri(DEFAULT_AGENT_HOST, DEFAULT_AGENT_PORT),
            traces_transport: TracesTransportType::Default,
            traces_pipe_name: None,
            traces_pipe_timeout: Duration::from_millis(DEFAULT_PIPE_TIMEOUT_MS),
            traces_unix_domain_socket_path: None,
            environment: None,
            service_name: None,
            service_version: None,
            hostname: detect_hostname(),
            stats_computation_enabled: false,
            partial_flush_enabled: false,
            stats_flush_interval: Duration::from_secs(DEFAULT_STATS_FLUSH_INTERVAL_SECS),
            trace_flush_interval: Duration::from_millis(DEFAULT_TRACE_FLUSH_INTERVAL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            agentless: false,
            api_key: None,
            site: DEFAULT_SITE.to_string(),
            proxy_https: None,
            log_level: "info".to_string(),
        }
    }
}

impl TracerSettings {
    pub fn from_env() -> Result<TracerSettings, ConfigError> {
        let mut settings = TracerSettings::default();

        let host = non_empty_var("DD_AGENT_HOST").unwrap_or_else(|| DEFAULT_AGENT_HOST.to_string());
        let port = parse_var::<u16>("DD_TRACE_AGENT_PORT")?.unwrap_or(DEFAULT_AGENT_PORT);
        settings.agent_uri = default_agent_uri(&host, port);

        if let Some(url) = non_empty_var("DD_TRACE_AGENT_URL") {
            if let Some(path) = url.strip_prefix(UNIX_SCHEME_PREFIX) {
                settings.traces_unix_domain_socket_path = Some(PathBuf::from(path));
            } else {
                settings.agent_uri = Url::parse(&url).map_err(|e| ConfigError::InvalidAgentUrl {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        if settings.traces_unix_domain_socket_path.is_none() {
            settings.traces_unix_domain_socket_path =
                non_empty_var("DD_APM_RECEIVER_SOCKET").map(PathBuf::from);
        }

        settings.traces_pipe_name = non_empty_var("DD_TRACE_PIPE_NAME");
        if let Some(ms) = parse_var::<u64>("DD_TRACE_PIPE_TIMEOUT_MS")? {
            settings.traces_pipe_timeout = Duration::from_millis(ms);
        }

        settings.traces_transport = match non_empty_var("DD_TRACE_TRANSPORT") {
            Some(kind) => kind.parse()?,
            None if settings.traces_pipe_name.is_some() => TracesTransportType::WindowsNamedPipe,
            None if settings.traces_unix_domain_socket_path.is_some() => {
                TracesTransportType::UnixDomainSocket
            }
            None => TracesTransportType::Default,
        };

        settings.environment = non_empty_var("DD_ENV");
        settings.service_name = non_empty_var("DD_SERVICE");
        settings.service_version = non_empty_var("DD_VERSION");
        if let Some(hostname) = non_empty_var("DD_HOSTNAME") {
            settings.hostname = hostname;
        }

        settings.stats_computation_enabled =
            parse_bool_var("DD_TRACE_STATS_COMPUTATION_ENABLED")?.unwrap_or(false);
        settings.partial_flush_enabled =
            parse_bool_var("DD_TRACE_PARTIAL_FLUSH_ENABLED")?.unwrap_or(false);
        if let Some(secs) = parse_var::<u64>("DD_TRACE_STATS_FLUSH_INTERVAL_SECS")? {
            settings.stats_flush_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = parse_var::<u64>("DD_TRACE_FLUSH_INTERVAL_MS")? {
            settings.trace_flush_interval = Duration::from_millis(ms.max(1));
        }

        settings.api_key = non_empty_var("DD_API_KEY");
        if let Some(site) = non_empty_var("DD_SITE") {
            settings.site = site;
        }
        settings.agentless = parse_bool_var("DD_TRACE_AGENTLESS")?.unwrap_or(false);
        settings.proxy_https = non_empty_var("DD_PROXY_HTTPS").or_else(|| non_empty_var("HTTPS_PROXY"));
        if let Some(level) = non_empty_var("DD_LOG_LEVEL") {
            settings.log_level = level.to_lowercase();
        }

        Ok(settings)
    }

    /// Intake URL used when traces bypass the agent.
    pub fn direct_intake_uri(&self) -> Result<Url, ConfigError> {
        let url = format!("https://trace.agent.{}", self.site);
        Url::parse(&url).map_err(|e| ConfigError::InvalidAgentUrl {
            url,
            reason: e.to_string(),
        })
    }
}

fn default_agent_uri(host: &str, port: u16) -> Url {
    Url::parse(&format!("http://{host}:{port}"))
        .or_else(|_| Url::parse(&format!("http://{DEFAULT_AGENT_HOST}:{port}")))
        .unwrap_or_else(|_| fallback_agent_uri())
}

#[allow(clippy::expect_used)]
fn fallback_agent_uri() -> Url {
    Url::parse("http://localhost:8126").expect("static agent url is valid")
}

fn detect_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty_var(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(None),
    }
}

fn parse_bool_var(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match non_empty_var(name) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue { name, value }),
        },
        None => Ok(None),
    }
}
