// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid agent url {url}: {reason}")]
    InvalidAgentUrl { url: String, reason: String },
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats flush was cancelled")]
    Cancelled,
    #[error("failed to serialize stats payload: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("http protocol error: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to serialize payload: {0}")]
    Serialization(String),
    #[error("agentless submission requires an api key")]
    MissingApiKey,
}

impl TransportError {
    /// True when the failure came from the socket layer (refused, reset,
    /// unreachable) rather than from the HTTP exchange itself.
    #[must_use]
    pub fn is_socket_error(&self) -> bool {
        match self {
            TransportError::Io(_) | TransportError::Timeout(_) => true,
            TransportError::Client(e) => e.is_connect() || e.is_timeout() || has_io_source(e),
            TransportError::Hyper(e) => e.is_closed() || e.is_incomplete_message() || has_io_source(e),
            _ => false,
        }
    }
}

fn has_io_source(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = error.source();
    while let Some(err) = source {
        if err.is::<std::io::Error>() {
            return true;
        }
        source = err.source();
    }
    false
}
