// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agent endpoints for traces and stats.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::errors::TransportError;
use crate::retry::{send_with_retry, RetryPolicy};
use crate::stats::buffer::StatsBuffer;
use crate::transport::headers::{
    AGENT_VERSION_HEADER, COMPUTED_STATS_HEADER, CONTAINER_ID_HEADER, TRACE_COUNT_HEADER,
};
use crate::transport::{is_success, ApiRequest, ApiRequestFactory, MSGPACK_CONTENT_TYPE};

pub const TRACES_PATH: &str = "v0.4/traces";
pub const STATS_PATH: &str = "v0.6/stats";

/// First agent release that accepts partially flushed traces.
const PARTIAL_FLUSH_MIN_AGENT_VERSION: (u32, u32, u32) = (7, 26, 0);

pub type SampleRatesCallback = Arc<dyn Fn(HashMap<String, f64>) + Send + Sync>;

#[async_trait]
pub trait Api: Send + Sync {
    /// Sends one stats window covering `bucket_duration` nanoseconds.
    async fn send_stats(&self, stats: &StatsBuffer, bucket_duration: i64) -> bool;

    /// Sends msgpack-encoded traces.
    async fn send_traces(&self, traces: Bytes, number_of_traces: usize) -> bool;
}

/// Request outcome counters.
#[derive(Debug, Default)]
pub struct ApiMetrics {
    requests: AtomicU64,
    errors: AtomicU64,
    responses: Mutex<HashMap<u16, u64>>,
}

impl ApiMetrics {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Only exchanges that failed below HTTP count as errors; a response with
    /// a bad status is tracked by [`ApiMetrics::record_response`].
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, status: u16) {
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        *responses.entry(status).or_insert(0) += 1;
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn responses(&self, status: u16) -> u64 {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&status)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Deserialize)]
struct AgentResponse {
    rate_by_service: HashMap<String, f64>,
}

pub struct AgentApi {
    factory: Arc<dyn ApiRequestFactory>,
    traces_endpoint: Url,
    stats_endpoint: Url,
    container_id: Option<String>,
    retry_policy: RetryPolicy,
    metrics: Arc<ApiMetrics>,
    update_sample_rates: Option<SampleRatesCallback>,
    partial_flush_enabled: bool,
    stats_computation_enabled: bool,
    agent_version: Mutex<Option<String>>,
    cached_response: Mutex<Option<String>>,
}

impl AgentApi {
    pub fn new(
        base_url: &Url,
        factory: Arc<dyn ApiRequestFactory>,
        partial_flush_enabled: bool,
        stats_computation_enabled: bool,
    ) -> Result<Self, TransportError> {
        let join = |path: &str| {
            base_url
                .join(path)
                .map_err(|e| TransportError::InvalidEndpoint(format!("{base_url}{path}: {e}")))
        };
        Ok(Self {
            factory,
            traces_endpoint: join(TRACES_PATH)?,
            stats_endpoint: join(STATS_PATH)?,
            container_id: crate::container::container_id().map(str::to_string),
            retry_policy: RetryPolicy::default(),
            metrics: Arc::new(ApiMetrics::default()),
            update_sample_rates: None,
            partial_flush_enabled,
            stats_computation_enabled,
            agent_version: Mutex::new(None),
            cached_response: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    #[must_use]
    pub fn with_container_id(mut self, container_id: Option<String>) -> Self {
        self.container_id = container_id;
        self
    }

    #[must_use]
    pub fn with_sample_rates_callback(mut self, callback: SampleRatesCallback) -> Self {
        self.update_sample_rates = Some(callback);
        self
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<ApiMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn traces_endpoint(&self) -> &Url {
        &self.traces_endpoint
    }

    pub fn stats_endpoint(&self) -> &Url {
        &self.stats_endpoint
    }

    /// Records the first agent version seen and warns when partial flush is
    /// enabled against an agent too old to support it. Later versions are
    /// ignored. Returns whether a warning was emitted.
    pub fn log_partial_flush_warning_if_required(&self, agent_version: &str) -> bool {
        {
            let mut known = self
                .agent_version
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if known.is_some() {
                return false;
            }
            *known = Some(agent_version.to_string());
        }

        if !self.partial_flush_enabled {
            return false;
        }

        let supported =
            parse_version(agent_version).is_some_and(|v| v >= PARTIAL_FLUSH_MIN_AGENT_VERSION);
        if supported {
            return false;
        }

        let detected = if agent_version.is_empty() {
            "{detection failed}"
        } else {
            agent_version
        };
        warn!(
            "DATADOG TRACER DIAGNOSTICS - Partial flush should only be enabled with agent 7.26.0+ (detected version: {detected})"
        );
        true
    }

    async fn send_stats_attempt(
        &self,
        mut request: Box<dyn ApiRequest>,
        is_final_try: bool,
        payload: Bytes,
    ) -> Result<bool, TransportError> {
        if let Some(container_id) = &self.container_id {
            request.add_header(CONTAINER_ID_HEADER, container_id);
        }

        let response = request.post(payload, MSGPACK_CONTENT_TYPE).await?;
        let status = response.status_code();
        if is_success(status) {
            debug!("Successfully sent stats to {}", self.stats_endpoint);
            return Ok(true);
        }

        if is_final_try {
            let body = response.read_as_string().await.unwrap_or_default();
            error!("Failed to submit stats with status code {status} and message: {body}");
        }
        Ok(false)
    }

    async fn send_traces_attempt(
        &self,
        mut request: Box<dyn ApiRequest>,
        is_final_try: bool,
        traces: Bytes,
        number_of_traces: usize,
    ) -> Result<bool, TransportError> {
        request.add_header(TRACE_COUNT_HEADER, &number_of_traces.to_string());
        if let Some(container_id) = &self.container_id {
            request.add_header(CONTAINER_ID_HEADER, container_id);
        }
        if self.stats_computation_enabled {
            request.add_header(COMPUTED_STATS_HEADER, "true");
        }

        self.metrics.record_request();
        let response = match request.post(traces, MSGPACK_CONTENT_TYPE).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_error();
                return Err(e);
            }
        };

        let status = response.status_code();
        self.metrics.record_response(status);

        if !is_success(status) {
            if is_final_try {
                let body = response.read_as_string().await.unwrap_or_default();
                error!("Failed to submit traces with status code {status} and message: {body}");
            }
            return Ok(false);
        }

        let agent_version = response.header(AGENT_VERSION_HEADER).unwrap_or_default();
        self.log_partial_flush_warning_if_required(&agent_version);

        if self.update_sample_rates.is_some() && response.content_length() != Some(0) {
            match response.read_as_string().await {
                Ok(content) => self.update_sample_rates_from(&content),
                Err(e) => error!(
                    "Traces sent successfully to the Agent, but an error occurred reading the response: {e}"
                ),
            }
        }

        debug!("Successfully sent {number_of_traces} traces to the Agent");
        Ok(true)
    }

    fn update_sample_rates_from(&self, content: &str) {
        let Some(callback) = &self.update_sample_rates else {
            return;
        };
        if content.trim().is_empty() {
            return;
        }

        let mut cached = self
            .cached_response
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if cached.as_deref() == Some(content) {
            return;
        }

        match serde_json::from_str::<AgentResponse>(content) {
            Ok(response) => {
                callback(response.rate_by_service);
                *cached = Some(content.to_string());
            }
            Err(e) => error!(
                "Traces sent successfully to the Agent, but an error occurred deserializing the response: {e}"
            ),
        }
    }
}

#[async_trait]
impl Api for AgentApi {
    async fn send_stats(&self, stats: &StatsBuffer, bucket_duration: i64) -> bool {
        let payload = match stats.serialize(bucket_duration) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                error!("Unable to serialize stats payload: {e}");
                return false;
            }
        };

        send_with_retry(
            self.factory.as_ref(),
            &self.stats_endpoint,
            self.retry_policy,
            move |request, is_final_try| self.send_stats_attempt(request, is_final_try, payload.clone()),
        )
        .await
    }

    async fn send_traces(&self, traces: Bytes, number_of_traces: usize) -> bool {
        send_with_retry(
            self.factory.as_ref(),
            &self.traces_endpoint,
            self.retry_policy,
            move |request, is_final_try| {
                self.send_traces_attempt(request, is_final_try, traces.clone(), number_of_traces)
            },
        )
        .await
    }
}

/// Parses `major.minor[.patch[.build]]`, ignoring any pre-release or build
/// suffix.
fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let core = version
        .trim()
        .split(|c| c == '-' || c == '+')
        .next()
        .unwrap_or_default();
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::tests::CountingFactory;
    use crate::stats::buffer::ClientStatsPayload;
    use crate::transport::headers::agent_default_headers;
    use crate::transport::HttpClientRequestFactory;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn fast_retries() -> RetryPolicy {
        RetryPolicy {
            retry_limit: 5,
            initial_backoff: Duration::from_millis(1),
        }
    }

    fn api_for(server: &mockito::Server, partial_flush: bool, stats: bool) -> AgentApi {
        let base = Url::parse(&server.url()).unwrap();
        let factory = Arc::new(HttpClientRequestFactory::new(
            agent_default_headers(),
            Duration::from_secs(5),
            None,
        ));
        AgentApi::new(&base, factory, partial_flush, stats)
            .unwrap()
            .with_retry_policy(fast_retries())
            .with_container_id(None)
    }

    fn stats_buffer() -> StatsBuffer {
        let buffer = StatsBuffer::new(Arc::new(ClientStatsPayload::default()));
        buffer.record(&crate::span::Span::new(1, 1, "web", "http.request"));
        buffer
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("7.26.0"), Some((7, 26, 0)));
        assert_eq!(parse_version("7.50.1-rc.2"), Some((7, 50, 1)));
        assert_eq!(parse_version("6.9"), Some((6, 9, 0)));
        assert_eq!(parse_version(""), None);
        assert_eq!(parse_version("latest"), None);
    }

    #[test]
    fn test_endpoints_join_base_path() {
        let factory: Arc<dyn ApiRequestFactory> = Arc::new(CountingFactory::default());
        let api = AgentApi::new(
            &Url::parse("http://agent:8126/").unwrap(),
            factory,
            false,
            false,
        )
        .unwrap();
        assert_eq!(api.traces_endpoint().as_str(), "http://agent:8126/v0.4/traces");
        assert_eq!(api.stats_endpoint().as_str(), "http://agent:8126/v0.6/stats");
    }

    #[test]
    #[traced_test]
    fn test_partial_flush_warning() {
        let factory: Arc<dyn ApiRequestFactory> = Arc::new(CountingFactory::default());
        let base = Url::parse("http://localhost:8126").unwrap();
        let api = AgentApi::new(&base, Arc::clone(&factory), true, false).unwrap();

        assert!(api.log_partial_flush_warning_if_required("7.25.0"));
        // only the first reported version is checked
        assert!(!api.log_partial_flush_warning_if_required("7.25.0"));
        assert!(!api.log_partial_flush_warning_if_required("7.26.0"));
        assert!(!api.log_partial_flush_warning_if_required("7.24.0"));
        assert!(logs_contain("detected version: 7.25.0"));
        assert!(!logs_contain("detected version: 7.24.0"));

        let undetected = AgentApi::new(&base, Arc::clone(&factory), true, false).unwrap();
        assert!(undetected.log_partial_flush_warning_if_required(""));
        assert!(logs_contain("detected version: {detection failed}"));

        let current = AgentApi::new(&base, Arc::clone(&factory), true, false).unwrap();
        assert!(!current.log_partial_flush_warning_if_required("7.30.1"));
        assert!(!current.log_partial_flush_warning_if_required("7.25.0"));

        let disabled = AgentApi::new(&base, factory, false, false).unwrap();
        assert!(!disabled.log_partial_flush_warning_if_required("6.0.0"));
    }

    #[tokio::test]
    async fn test_send_traces_headers_and_sample_rates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v0.4/traces")
            .match_header("x-datadog-trace-count", "2")
            .match_header("datadog-client-computed-stats", "true")
            .match_header("content-type", "application/msgpack")
            .with_status(200)
            .with_header("Datadog-Agent-Version", "7.50.0")
            .with_body(r#"{"rate_by_service":{"service:web,env:prod":0.5}}"#)
            .expect(2)
            .create_async()
            .await;

        let rates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rates);
        let api = api_for(&server, false, true).with_sample_rates_callback(Arc::new(move |r| {
            sink.lock().unwrap().push(r);
        }));

        assert!(api.send_traces(Bytes::from_static(b"\x92\x90\x90"), 2).await);
        assert!(api.send_traces(Bytes::from_static(b"\x92\x90\x90"), 2).await);
        mock.assert_async().await;

        // identical bodies are only forwarded once
        let rates = rates.lock().unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0]["service:web,env:prod"], 0.5);

        let metrics = api.metrics();
        assert_eq!(metrics.requests(), 2);
        assert_eq!(metrics.errors(), 0);
        assert_eq!(metrics.responses(200), 2);
    }

    #[tokio::test]
    async fn test_non_success_status_is_retried_but_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v0.4/traces")
            .with_status(500)
            .with_body("agent overloaded")
            .expect(5)
            .create_async()
            .await;

        let api = api_for(&server, false, false);
        assert!(!api.send_traces(Bytes::from_static(b"\x90"), 0).await);
        mock.assert_async().await;

        let metrics = api.metrics();
        assert_eq!(metrics.requests(), 5);
        assert_eq!(metrics.errors(), 0);
        assert_eq!(metrics.responses(500), 5);
    }

    #[tokio::test]
    async fn test_network_failure_counts_as_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        drop(listener);

        let factory = Arc::new(HttpClientRequestFactory::new(
            agent_default_headers(),
            Duration::from_secs(5),
            None,
        ));
        let api = AgentApi::new(&base, factory, false, false)
            .unwrap()
            .with_retry_policy(fast_retries());

        assert!(!api.send_traces(Bytes::from_static(b"\x90"), 0).await);
        let metrics = api.metrics();
        assert_eq!(metrics.requests(), 5);
        assert_eq!(metrics.errors(), 5);
    }

    #[tokio::test]
    async fn test_invalid_rate_body_does_not_fail_send() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v0.4/traces")
            .with_status(200)
            .with_body("OK")
            .create_async()
            .await;

        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        let api = api_for(&server, false, false).with_sample_rates_callback(Arc::new(move |_| {
            *flag.lock().unwrap() = true;
        }));

        assert!(api.send_traces(Bytes::from_static(b"\x90"), 0).await);
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test]
    async fn test_send_stats() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v0.6/stats")
            .match_header("content-type", "application/msgpack")
            .match_header("datadog-container-id", "abc123")
            .with_status(200)
            .create_async()
            .await;

        let api = api_for(&server, false, false).with_container_id(Some("abc123".to_string()));
        assert!(api.send_stats(&stats_buffer(), 10_000_000_000).await);
        mock.assert_async().await;
    }
}
