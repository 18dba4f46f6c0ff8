// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::{Serialize, Serializer};

use crate::errors::StatsError;
use crate::span::{now_unix_nanos, Span};
use crate::stats::bucket::StatsBucket;
use crate::stats::key::StatsAggregationKey;

pub const LANG: &str = "rust";
pub const TRACER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-process identifier reported with every stats payload.
pub fn runtime_id() -> &'static str {
    static RUNTIME_ID: OnceLock<String> = OnceLock::new();
    RUNTIME_ID.get_or_init(|| uuid::Uuid::new_v4().to_string())
}

/// Payload metadata shared by every buffer of one aggregator.
#[derive(Debug, Default)]
pub struct ClientStatsPayload {
    pub hostname: String,
    pub environment: String,
    pub version: String,
    pub service: String,
    sequence: AtomicU64,
}

impl ClientStatsPayload {
    #[must_use]
    pub fn new(hostname: &str, environment: &str, version: &str, service: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            environment: environment.to_string(),
            version: version.to_string(),
            service: service.to_string(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Next payload sequence number, starting at 1.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Buckets for one flush window.
///
/// Producers update buckets through a sharded map so that each
/// `StatsBucket::record` commits as a unit under the shard lock.
#[derive(Debug)]
pub struct StatsBuffer {
    payload: Arc<ClientStatsPayload>,
    buckets: DashMap<StatsAggregationKey, StatsBucket>,
    start: AtomicI64,
}

impl StatsBuffer {
    #[must_use]
    pub fn new(payload: Arc<ClientStatsPayload>) -> Self {
        Self {
            payload,
            buckets: DashMap::new(),
            start: AtomicI64::new(now_unix_nanos()),
        }
    }

    /// Window start in nanoseconds since the unix epoch.
    pub fn start(&self) -> i64 {
        self.start.load(Ordering::Relaxed)
    }

    pub fn record(&self, span: &Span) {
        let key = StatsAggregationKey::from_span(span);
        self.buckets
            .entry(key.clone())
            .or_insert_with(|| StatsBucket::new(key))
            .record(span);
    }

    pub fn bucket(&self, key: &StatsAggregationKey) -> Option<StatsBucket> {
        self.buckets.get(key).map(|b| b.clone())
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn has_hits(&self) -> bool {
        self.buckets.iter().any(|b| b.hits > 0)
    }

    /// Clears the window after it was sent. Buckets that saw traffic are
    /// zeroed and kept so their keys are reused; buckets that were already
    /// empty are dropped.
    pub fn reset(&self) {
        self.buckets.retain(|_, bucket| {
            if bucket.hits == 0 {
                return false;
            }
            bucket.clear();
            true
        });
    }

    /// Stamps the window start. Called when the buffer becomes active.
    pub fn begin_window(&self) {
        self.start.store(now_unix_nanos(), Ordering::Relaxed);
    }

    /// Encodes the buffer as a msgpack client stats payload. Zero-hit buckets
    /// are left out.
    pub fn serialize(&self, duration: i64) -> Result<Vec<u8>, StatsError> {
        let buckets: Vec<StatsBucket> = self
            .buckets
            .iter()
            .filter(|b| b.hits > 0)
            .map(|b| b.clone())
            .collect();

        let stats = buckets
            .iter()
            .map(|b| ClientGroupedStats {
                service: &b.key.service,
                name: &b.key.operation_name,
                resource: &b.key.resource,
                http_status_code: b.key.http_status_code,
                r#type: &b.key.r#type,
                db_type: None,
                hits: b.hits,
                errors: b.errors,
                duration: b.duration,
                ok_summary: b.ok_summary.encode(),
                error_summary: b.error_summary.encode(),
                synthetics: false,
                top_level_hits: b.top_level_hits,
            })
            .collect();

        let payload = ClientStatsPayloadWire {
            hostname: &self.payload.hostname,
            env: &self.payload.environment,
            version: &self.payload.version,
            lang: LANG,
            tracer_version: TRACER_VERSION,
            runtime_id: runtime_id(),
            sequence: self.payload.next_sequence(),
            agent_aggregation: None,
            service: &self.payload.service,
            stats: vec![ClientStatsBucket {
                start: self.start(),
                duration,
                stats,
                agent_time_shift: 0,
            }],
        };

        Ok(rmp_serde::to_vec_named(&payload)?)
    }
}

#[derive(Serialize)]
struct ClientStatsPayloadWire<'a> {
    hostname: &'a str,
    env: &'a str,
    version: &'a str,
    lang: &'a str,
    #[serde(rename = "tracerVersion")]
    tracer_version: &'a str,
    #[serde(rename = "runtimeID")]
    runtime_id: &'a str,
    sequence: u64,
    #[serde(rename = "agentAggregation")]
    agent_aggregation: Option<&'a str>,
    service: &'a str,
    stats: Vec<ClientStatsBucket<'a>>,
}

#[derive(Serialize)]
struct ClientStatsBucket<'a> {
    start: i64,
    duration: i64,
    stats: Vec<ClientGroupedStats<'a>>,
    #[serde(rename = "agentTimeShift")]
    agent_time_shift: i64,
}

#[derive(Serialize)]
struct ClientGroupedStats<'a> {
    service: &'a str,
    name: &'a str,
    resource: &'a str,
    #[serde(rename = "HTTP_status_code")]
    http_status_code: u32,
    #[serde(rename = "type")]
    r#type: &'a str,
    #[serde(rename = "DB_type")]
    db_type: Option<&'a str>,
    hits: i64,
    errors: i64,
    duration: i64,
    #[serde(rename = "okSummary", serialize_with = "as_bin")]
    ok_summary: Vec<u8>,
    #[serde(rename = "errorSummary", serialize_with = "as_bin")]
    error_summary: Vec<u8>,
    synthetics: bool,
    #[serde(rename = "topLevelHits")]
    top_level_hits: i64,
}

// Sketches go out as msgpack bin, not as an array of integers.
fn as_bin<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datadog_ddsketch::DDSketch;
    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer};
    use std::fmt;

    #[derive(Debug, Deserialize)]
    struct Payload {
        hostname: String,
        env: String,
        version: String,
        lang: String,
        #[serde(rename = "tracerVersion")]
        tracer_version: String,
        #[serde(rename = "runtimeID")]
        runtime_id: String,
        sequence: u64,
        #[serde(rename = "agentAggregation")]
        agent_aggregation: Option<String>,
        service: String,
        stats: Vec<Bucket>,
    }

    #[derive(Debug, Deserialize)]
    struct Bucket {
        start: i64,
        duration: i64,
        stats: Vec<Grouped>,
        #[serde(rename = "agentTimeShift")]
        agent_time_shift: i64,
    }

    #[derive(Debug, Deserialize)]
    struct Grouped {
        service: String,
        name: String,
        resource: String,
        #[serde(rename = "HTTP_status_code")]
        http_status_code: u32,
        #[serde(rename = "type")]
        kind: String,
        #[serde(rename = "DB_type")]
        db_type: Option<String>,
        hits: i64,
        errors: i64,
        duration: i64,
        #[serde(rename = "okSummary", deserialize_with = "bin")]
        ok_summary: Vec<u8>,
        #[serde(rename = "errorSummary", deserialize_with = "bin")]
        error_summary: Vec<u8>,
        synthetics: bool,
        #[serde(rename = "topLevelHits")]
        top_level_hits: i64,
    }

    fn bin<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct BinVisitor;

        impl<'de> Visitor<'de> for BinVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("msgpack bin")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
                Ok(v)
            }
        }

        deserializer.deserialize_bytes(BinVisitor)
    }

    fn payload() -> Arc<ClientStatsPayload> {
        Arc::new(ClientStatsPayload::new(
            "TestHost",
            "TestEnv",
            "TestVersion",
            "TestService",
        ))
    }

    fn key(resource: &str) -> StatsAggregationKey {
        StatsAggregationKey::new(resource, "service", "operation", "type", 200)
    }

    fn insert(buffer: &StatsBuffer, key: StatsAggregationKey, hits: i64) {
        let mut bucket = StatsBucket::new(key.clone());
        for _ in 0..hits {
            bucket.add(10, false, true);
        }
        buffer.buckets.insert(key, bucket);
    }

    #[test]
    fn test_serialize_payload() {
        let buffer = StatsBuffer::new(payload());
        let mut bucket = StatsBucket::new(key("resource"));
        bucket.add(100, false, true);
        bucket.add(200, true, false);
        buffer.buckets.insert(bucket.key.clone(), bucket.clone());
        insert(&buffer, key("empty"), 0);

        let bytes = buffer.serialize(10_000_000_000).unwrap();
        let decoded: Payload = rmp_serde::from_slice(&bytes).unwrap();

        assert_eq!(decoded.hostname, "TestHost");
        assert_eq!(decoded.env, "TestEnv");
        assert_eq!(decoded.version, "TestVersion");
        assert_eq!(decoded.lang, "rust");
        assert_eq!(decoded.tracer_version, TRACER_VERSION);
        assert_eq!(decoded.runtime_id, runtime_id());
        assert_eq!(decoded.sequence, 1);
        assert_eq!(decoded.agent_aggregation, None);
        assert_eq!(decoded.service, "TestService");

        assert_eq!(decoded.stats.len(), 1);
        let window = &decoded.stats[0];
        assert_eq!(window.start, buffer.start());
        assert_eq!(window.duration, 10_000_000_000);
        assert_eq!(window.agent_time_shift, 0);

        assert_eq!(window.stats.len(), 1, "zero-hit buckets are omitted");
        let grouped = &window.stats[0];
        assert_eq!(grouped.service, "service");
        assert_eq!(grouped.name, "operation");
        assert_eq!(grouped.resource, "resource");
        assert_eq!(grouped.http_status_code, 200);
        assert_eq!(grouped.kind, "type");
        assert_eq!(grouped.db_type, None);
        assert_eq!(grouped.hits, 2);
        assert_eq!(grouped.errors, 1);
        assert_eq!(grouped.duration, 300);
        assert!(!grouped.synthetics);
        assert_eq!(grouped.top_level_hits, 1);
        assert_eq!(grouped.ok_summary, bucket.ok_summary.encode());
        assert_eq!(grouped.error_summary, bucket.error_summary.encode());

        let ok = DDSketch::decode(&grouped.ok_summary).unwrap();
        assert_eq!(ok.count(), 1.0);
    }

    #[test]
    fn test_sequence_is_monotonic_across_buffers() {
        let shared = payload();
        let first = StatsBuffer::new(Arc::clone(&shared));
        let second = StatsBuffer::new(Arc::clone(&shared));

        let seq = |buffer: &StatsBuffer| {
            let decoded: Payload = rmp_serde::from_slice(&buffer.serialize(1).unwrap()).unwrap();
            decoded.sequence
        };
        assert_eq!(seq(&first), 1);
        assert_eq!(seq(&second), 2);
        assert_eq!(seq(&first), 3);
    }

    #[test]
    fn test_reset() {
        let buffer = StatsBuffer::new(payload());
        insert(&buffer, key("with-hits"), 3);
        insert(&buffer, key("no-hits"), 0);

        buffer.reset();

        assert_eq!(buffer.bucket_count(), 1);
        let kept = buffer.bucket(&key("with-hits")).unwrap();
        assert_eq!(kept.hits, 0);
        assert_eq!(kept.duration, 0);
        assert_eq!(kept.top_level_hits, 0);
        assert!(kept.ok_summary.is_empty());
        assert!(buffer.bucket(&key("no-hits")).is_none());

        buffer.reset();
        assert_eq!(buffer.bucket_count(), 0);
    }

    #[test]
    fn test_begin_window_moves_start_forward() {
        let buffer = StatsBuffer::new(payload());
        let created = buffer.start();
        std::thread::sleep(std::time::Duration::from_millis(5));

        buffer.reset();
        assert_eq!(buffer.start(), created, "reset leaves the window start alone");

        let before = now_unix_nanos();
        buffer.begin_window();
        assert!(buffer.start() >= before);
    }

    #[test]
    fn test_record_groups_by_key() {
        let buffer = StatsBuffer::new(payload());
        let a = Span::new(1, 1, "web", "http.request").with_resource("GET /a");
        let b = Span::new(2, 2, "web", "http.request").with_resource("GET /b");

        buffer.record(&a);
        buffer.record(&a);
        buffer.record(&b);

        assert_eq!(buffer.bucket_count(), 2);
        assert_eq!(
            buffer
                .bucket(&StatsAggregationKey::from_span(&a))
                .unwrap()
                .hits,
            2
        );
        assert!(buffer.has_hits());
    }
}
