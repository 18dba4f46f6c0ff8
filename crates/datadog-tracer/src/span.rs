// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span record and the v0.4 trace encoding.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub mod tags {
    pub const TOP_LEVEL: &str = "_dd.top_level";
    pub const MEASURED: &str = "_dd.measured";
    pub const HTTP_STATUS_CODE: &str = "http.status_code";
    pub const ERROR_MSG: &str = "error.msg";
    pub const ERROR_TYPE: &str = "error.type";
    pub const ERROR_STACK: &str = "error.stack";
    pub const ORIGIN: &str = "_dd.origin";
}

/// One timed unit of work.
///
/// Spans are mutated by the code that owns them until [`Span::finish`] or
/// [`Span::finish_with`] is called and are treated as read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub service: String,
    pub name: String,
    pub resource: String,
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_id: u64,
    /// Start time in nanoseconds since the unix epoch.
    pub start: i64,
    /// Duration in nanoseconds.
    pub duration: i64,
    #[serde(with = "error_flag")]
    pub error: bool,
    pub meta: HashMap<String, String>,
    pub metrics: HashMap<String, f64>,
    #[serde(rename = "type")]
    pub r#type: String,
}

impl Span {
    /// Creates a root span starting now. Root spans are top-level.
    #[must_use]
    pub fn new(trace_id: u64, span_id: u64, service: &str, name: &str) -> Self {
        let mut span = Span {
            service: service.to_string(),
            name: name.to_string(),
            resource: name.to_string(),
            trace_id,
            span_id,
            parent_id: 0,
            start: now_unix_nanos(),
            duration: 0,
            error: false,
            meta: HashMap::new(),
            metrics: HashMap::new(),
            r#type: String::new(),
        };
        span.set_top_level(true);
        span
    }

    /// Creates a child of `parent`. The child is top-level when it belongs to
    /// a different service than its parent.
    #[must_use]
    pub fn child_of(parent: &Span, span_id: u64, service: &str, name: &str) -> Self {
        let mut span = Span::new(parent.trace_id, span_id, service, name);
        span.parent_id = parent.span_id;
        span.set_top_level(parent.service != service);
        span
    }

    #[must_use]
    pub fn with_resource(mut self, resource: &str) -> Self {
        self.resource = resource.to_string();
        self
    }

    #[must_use]
    pub fn with_type(mut self, span_type: &str) -> Self {
        self.r#type = span_type.to_string();
        self
    }

    #[must_use]
    pub fn with_start(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.set_tag(key, value);
        self
    }

    #[must_use]
    pub fn with_metric(mut self, key: &str, value: f64) -> Self {
        self.set_metric(key, value);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: bool) -> Self {
        self.error = error;
        self
    }

    pub fn set_tag(&mut self, key: &str, value: &str) {
        self.meta.insert(key.to_string(), value.to_string());
    }

    pub fn set_metric(&mut self, key: &str, value: f64) {
        self.metrics.insert(key.to_string(), value);
    }

    pub fn set_top_level(&mut self, top_level: bool) {
        if top_level {
            self.set_metric(tags::TOP_LEVEL, 1.0);
        } else {
            self.metrics.remove(tags::TOP_LEVEL);
        }
    }

    pub fn set_measured(&mut self, measured: bool) {
        if measured {
            self.set_metric(tags::MEASURED, 1.0);
        } else {
            self.metrics.remove(tags::MEASURED);
            self.meta.remove(tags::MEASURED);
        }
    }

    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.parent_id == 0 || self.metrics.get(tags::TOP_LEVEL).is_some_and(|v| *v == 1.0)
    }

    #[must_use]
    pub fn is_measured(&self) -> bool {
        if self.metrics.get(tags::MEASURED).is_some_and(|v| *v == 1.0) {
            return true;
        }
        matches!(
            self.meta.get(tags::MEASURED).map(String::as_str),
            Some("1" | "true")
        )
    }

    /// Status code from the `http.status_code` tag, or 0 when absent.
    #[must_use]
    pub fn http_status_code(&self) -> u32 {
        self.meta
            .get(tags::HTTP_STATUS_CODE)
            .and_then(|v| v.trim().parse().ok())
            .or_else(|| {
                self.metrics
                    .get(tags::HTTP_STATUS_CODE)
                    .filter(|v| v.is_finite() && **v >= 0.0)
                    .map(|v| *v as u32)
            })
            .unwrap_or(0)
    }

    /// Closes the span, measuring the duration from its start.
    pub fn finish(&mut self) {
        let elapsed = now_unix_nanos().saturating_sub(self.start).max(0);
        self.duration = elapsed;
    }

    pub fn finish_with(&mut self, duration: Duration) {
        self.duration = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
    }

    /// Marks the span as failed and records the error details.
    pub fn set_error<E: std::error::Error + ?Sized>(&mut self, err: &E) {
        self.error = true;
        self.set_tag(tags::ERROR_MSG, &err.to_string());
        self.set_tag(tags::ERROR_TYPE, std::any::type_name::<E>());

        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        if !chain.is_empty() {
            self.set_tag(tags::ERROR_STACK, &chain.join("\ncaused by: "));
        }
    }

    /// Tags the span from the outcome of a guarded call.
    pub fn classify_result<T, E: std::error::Error>(&mut self, result: &Result<T, E>) {
        if let Err(err) = result {
            self.set_error(err);
        }
    }
}

/// Runs `f` against the span and classifies its result, whatever the outcome.
pub fn guarded<T, E, F>(span: &mut Span, f: F) -> Result<T, E>
where
    E: std::error::Error,
    F: FnOnce(&mut Span) -> Result<T, E>,
{
    let result = f(span);
    span.classify_result(&result);
    result
}

/// Encodes traces in the `/v0.4/traces` layout: an array of traces, each an
/// array of span maps.
pub fn encode_traces(traces: &[Vec<Span>]) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(traces)
}

#[must_use]
pub fn now_unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

mod error_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(error: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(i32::from(*error))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(i32::deserialize(deserializer)? != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Timeout;

    impl fmt::Display for Timeout {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "query timed out")
        }
    }

    impl std::error::Error for Timeout {}

    #[test]
    fn test_root_and_child_top_level() {
        let root = Span::new(1, 1, "web", "http.request");
        let same_service = Span::child_of(&root, 2, "web", "render");
        let other_service = Span::child_of(&root, 3, "db", "query");

        assert!(root.is_top_level());
        assert!(!same_service.is_top_level());
        assert!(other_service.is_top_level());
        assert_eq!(same_service.parent_id, 1);
        assert_eq!(same_service.trace_id, 1);
    }

    #[test]
    fn test_measured_from_metric_or_tag() {
        let mut span = Span::new(1, 1, "web", "op");
        assert!(!span.is_measured());
        span.set_measured(true);
        assert!(span.is_measured());
        span.set_measured(false);
        assert!(!span.is_measured());

        let tagged = Span::new(1, 2, "web", "op").with_tag(tags::MEASURED, "1");
        assert!(tagged.is_measured());
    }

    #[test]
    fn test_http_status_code() {
        let span = Span::new(1, 1, "web", "op").with_tag(tags::HTTP_STATUS_CODE, "404");
        assert_eq!(span.http_status_code(), 404);
        let metric = Span::new(1, 1, "web", "op").with_metric(tags::HTTP_STATUS_CODE, 503.0);
        assert_eq!(metric.http_status_code(), 503);
        assert_eq!(Span::new(1, 1, "web", "op").http_status_code(), 0);
    }

    #[test]
    fn test_guarded_tags_errors() {
        let mut span = Span::new(1, 1, "db", "query");
        let result: Result<(), Timeout> = guarded(&mut span, |_| Err(Timeout));

        assert!(result.is_err());
        assert!(span.error);
        assert_eq!(span.meta[tags::ERROR_MSG], "query timed out");
        assert!(span.meta[tags::ERROR_TYPE].ends_with("Timeout"));
    }

    #[test]
    fn test_guarded_leaves_successful_span_untouched() {
        let mut span = Span::new(1, 1, "db", "query");
        let result: Result<u32, Timeout> = guarded(&mut span, |s| {
            s.set_tag("db.rows", "3");
            Ok(3)
        });

        assert_eq!(result.unwrap(), 3);
        assert!(!span.error);
        assert!(!span.meta.contains_key(tags::ERROR_MSG));
        assert_eq!(span.meta["db.rows"], "3");
    }

    #[test]
    fn test_finish_with_duration() {
        let mut span = Span::new(1, 1, "web", "op");
        span.finish_with(Duration::from_millis(250));
        assert_eq!(span.duration, 250_000_000);
    }

    #[test]
    fn test_encode_v04_layout() {
        let span = Span::new(7, 8, "web", "http.request")
            .with_resource("GET /users")
            .with_type("web")
            .with_start(1_000)
            .with_error(true);
        let bytes = encode_traces(&[vec![span.clone()]]).unwrap();

        let decoded: Vec<Vec<Span>> = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, vec![vec![span]]);

        #[derive(Deserialize)]
        struct WireSpan {
            error: i32,
            #[serde(rename = "type")]
            kind: String,
            trace_id: u64,
        }
        let wire: Vec<Vec<WireSpan>> = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(wire[0][0].error, 1);
        assert_eq!(wire[0][0].kind, "web");
        assert_eq!(wire[0][0].trace_id, 7);
    }
}
