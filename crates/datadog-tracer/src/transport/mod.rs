// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Channels to the agent.
//!
//! An [`ApiRequestFactory`] is chosen once at startup by
//! [`strategy::agent_factory`] and then hands out one [`ApiRequest`] per
//! attempt. The request/response objects hide whether bytes travel over the
//! reqwest client or over a raw stream (TCP, Unix socket, named pipe) driven
//! by hyper.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;

use crate::errors::TransportError;

pub mod headers;
pub mod http_client;
#[cfg(windows)]
pub mod named_pipe;
pub mod strategy;
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use http_client::HttpClientRequestFactory;
pub use stream::{HttpStreamRequestFactory, StreamFactory, TcpStreamFactory};

pub const MSGPACK_CONTENT_TYPE: &str = "application/msgpack";

pub trait ApiRequestFactory: Send + Sync {
    /// Human readable description of where `endpoint` is reached, for logs.
    fn info(&self, endpoint: &Url) -> String;

    fn create(&self, endpoint: &Url) -> Result<Box<dyn ApiRequest>, TransportError>;
}

#[async_trait]
pub trait ApiRequest: Send {
    fn add_header(&mut self, name: &str, value: &str);

    async fn post(
        self: Box<Self>,
        body: Bytes,
        content_type: &str,
    ) -> Result<Box<dyn ApiResponse>, TransportError>;
}

#[async_trait]
pub trait ApiResponse: Send {
    fn status_code(&self) -> u16;

    /// Declared body length, `None` when the agent did not send one.
    fn content_length(&self) -> Option<u64>;

    fn header(&self, name: &str) -> Option<String>;

    async fn read_as_string(self: Box<Self>) -> Result<String, TransportError>;
}

pub(crate) fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
