// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Url;
use tracing::error;

use crate::errors::TransportError;
use crate::transport::{headers, ApiRequest, ApiRequestFactory, ApiResponse};

/// Requests over the shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpClientRequestFactory {
    client: reqwest::Client,
    default_headers: HeaderMap,
    timeout: Duration,
    proxy: Option<String>,
}

impl HttpClientRequestFactory {
    #[must_use]
    pub fn new(default_headers: HeaderMap, timeout: Duration, proxy_https: Option<&str>) -> Self {
        let client = get_client(default_headers.clone(), timeout, proxy_https);
        Self {
            client,
            default_headers,
            timeout,
            proxy: proxy_https.map(str::to_string),
        }
    }

    /// Rebuilds the client to go through `proxy_https`, or directly when `None`.
    /// Requests already created keep the client they were created with.
    pub fn set_proxy(&mut self, proxy_https: Option<&str>) {
        self.client = get_client(self.default_headers.clone(), self.timeout, proxy_https);
        self.proxy = proxy_https.map(str::to_string);
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }
}

/// Builds the client, falling back to a direct connection when the proxy
/// setting is unusable.
fn get_client(headers: HeaderMap, timeout: Duration, proxy: Option<&str>) -> reqwest::Client {
    match build_client(headers.clone(), timeout, proxy) {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to parse proxy configuration: {e}, falling back to direct connection");
            match build_client(headers, timeout, None) {
                Ok(client) => client,
                Err(inner) => {
                    error!("Failed to build HTTP client without proxy: {inner}, using reqwest defaults");
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    headers: HeaderMap,
    timeout: Duration,
    proxy: Option<&str>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    builder.build()
}

impl ApiRequestFactory for HttpClientRequestFactory {
    fn info(&self, endpoint: &Url) -> String {
        endpoint.to_string()
    }

    fn create(&self, endpoint: &Url) -> Result<Box<dyn ApiRequest>, TransportError> {
        if endpoint.cannot_be_a_base() || endpoint.host_str().is_none() {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Box::new(HttpClientRequest {
            client: self.client.clone(),
            endpoint: endpoint.clone(),
            headers: HeaderMap::new(),
        }))
    }
}

struct HttpClientRequest {
    client: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
}

#[async_trait]
impl ApiRequest for HttpClientRequest {
    fn add_header(&mut self, name: &str, value: &str) {
        headers::insert(&mut self.headers, name, value);
    }

    async fn post(
        self: Box<Self>,
        body: Bytes,
        content_type: &str,
    ) -> Result<Box<dyn ApiResponse>, TransportError> {
        let this = *self;
        let response = this
            .client
            .post(this.endpoint)
            .headers(this.headers)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        Ok(Box::new(HttpClientResponse { response }))
    }
}

struct HttpClientResponse {
    response: reqwest::Response,
}

#[async_trait]
impl ApiResponse for HttpClientResponse {
    fn status_code(&self) -> u16 {
        self.response.status().as_u16()
    }

    fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    async fn read_as_string(self: Box<Self>) -> Result<String, TransportError> {
        Ok(self.response.text().await?)
    }
}
