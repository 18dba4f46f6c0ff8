// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP/1.1 over a caller-provided byte stream.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use reqwest::header::HeaderMap;
use reqwest::Url;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::errors::TransportError;
use crate::transport::{headers, ApiRequest, ApiRequestFactory, ApiResponse};

/// Opens a fresh connection to the agent for each request.
#[async_trait]
pub trait StreamFactory: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn connect(&self) -> io::Result<Self::Stream>;

    fn info(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct TcpStreamFactory {
    host: String,
    port: u16,
}

impl TcpStreamFactory {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

#[async_trait]
impl StreamFactory for TcpStreamFactory {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn info(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

pub struct HttpStreamRequestFactory<F: StreamFactory> {
    streams: Arc<F>,
    default_headers: HeaderMap,
    timeout: Duration,
}

impl<F: StreamFactory> HttpStreamRequestFactory<F> {
    #[must_use]
    pub fn new(streams: F, default_headers: HeaderMap, timeout: Duration) -> Self {
        Self {
            streams: Arc::new(streams),
            default_headers,
            timeout,
        }
    }
}

impl<F: StreamFactory> ApiRequestFactory for HttpStreamRequestFactory<F> {
    fn info(&self, endpoint: &Url) -> String {
        format!("{} via {}", endpoint.path(), self.streams.info())
    }

    fn create(&self, endpoint: &Url) -> Result<Box<dyn ApiRequest>, TransportError> {
        if endpoint.cannot_be_a_base() {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Box::new(HttpStreamRequest {
            streams: Arc::clone(&self.streams),
            endpoint: endpoint.clone(),
            headers: self.default_headers.clone(),
            timeout: self.timeout,
        }))
    }
}

struct HttpStreamRequest<F: StreamFactory> {
    streams: Arc<F>,
    endpoint: Url,
    headers: HeaderMap,
    timeout: Duration,
}

impl<F: StreamFactory> HttpStreamRequest<F> {
    async fn send(
        self,
        body: Bytes,
        content_type: &str,
    ) -> Result<Response<Incoming>, TransportError> {
        let stream = self.streams.connect().await?;
        let (mut sender, connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Agent connection closed with error: {e}");
            }
        });

        let path = match self.endpoint.query() {
            Some(query) => format!("{}?{query}", self.endpoint.path()),
            None => self.endpoint.path().to_string(),
        };
        let host = self.endpoint.host_str().unwrap_or("localhost").to_string();

        let mut builder = Request::post(path)
            .header(HOST, host)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, body.len());
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let request = builder.body(Full::new(body))?;

        Ok(sender.send_request(request).await?)
    }
}

#[async_trait]
impl<F: StreamFactory> ApiRequest for HttpStreamRequest<F> {
    fn add_header(&mut self, name: &str, value: &str) {
        headers::insert(&mut self.headers, name, value);
    }

    async fn post(
        self: Box<Self>,
        body: Bytes,
        content_type: &str,
    ) -> Result<Box<dyn ApiResponse>, TransportError> {
        let timeout = self.timeout;
        let response = tokio::time::timeout(timeout, (*self).send(body, content_type))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        Ok(Box::new(HttpStreamResponse { response }))
    }
}

struct HttpStreamResponse {
    response: Response<Incoming>,
}

#[async_trait]
impl ApiResponse for HttpStreamResponse {
    fn status_code(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn content_length(&self) -> Option<u64> {
        self.response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    fn header(&self, name: &str) -> Option<String> {
        self.response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    async fn read_as_string(self: Box<Self>) -> Result<String, TransportError> {
        let body = self.response.into_body().collect().await?.to_bytes();
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
