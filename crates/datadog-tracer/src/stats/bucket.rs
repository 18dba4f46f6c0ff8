// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use datadog_ddsketch::DDSketch;

use crate::span::Span;
use crate::stats::key::StatsAggregationKey;

/// Accumulator for one aggregation key within one window.
#[derive(Debug, Clone)]
pub struct StatsBucket {
    pub key: StatsAggregationKey,
    /// Sum of span durations in nanoseconds.
    pub duration: i64,
    pub hits: i64,
    pub errors: i64,
    pub top_level_hits: i64,
    pub ok_summary: DDSketch,
    pub error_summary: DDSketch,
}

impl StatsBucket {
    #[must_use]
    pub fn new(key: StatsAggregationKey) -> Self {
        Self {
            key,
            duration: 0,
            hits: 0,
            errors: 0,
            top_level_hits: 0,
            ok_summary: DDSketch::default(),
            error_summary: DDSketch::default(),
        }
    }

    pub fn record(&mut self, span: &Span) {
        self.add(span.duration, span.error, span.is_top_level());
    }

    pub fn add(&mut self, duration: i64, is_error: bool, is_top_level: bool) {
        let duration = duration.max(0);
        self.duration = self.duration.saturating_add(duration);
        self.hits += 1;

        #[allow(clippy::cast_precision_loss)]
        let sample = duration as f64;
        if is_error {
            self.errors += 1;
            self.error_summary.add(sample);
        } else {
            self.ok_summary.add(sample);
        }

        if is_top_level {
            self.top_level_hits += 1;
        }
    }

    pub fn clear(&mut self) {
        self.duration = 0;
        self.hits = 0;
        self.errors = 0;
        self.top_level_hits = 0;
        self.ok_summary.clear();
        self.error_summary.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StatsAggregationKey {
        StatsAggregationKey::new("resource", "service", "operation", "type", 200)
    }

    #[test]
    fn test_mixed_spans_sharing_key() {
        let mut bucket = StatsBucket::new(key());
        bucket.add(100_000_000, false, true);
        bucket.add(200_000_000, true, true);
        bucket.add(300_000_000, false, false);

        assert_eq!(bucket.duration, 600_000_000);
        assert_eq!(bucket.hits, 3);
        assert_eq!(bucket.errors, 1);
        assert_eq!(bucket.top_level_hits, 2);
        assert_eq!(bucket.ok_summary.count(), 2.0);
        assert_eq!(bucket.error_summary.count(), 1.0);
    }

    #[test]
    fn test_hits_split_between_errors_and_ok() {
        let mut bucket = StatsBucket::new(key());
        let mut expected_duration = 0;
        for i in 0..50_i64 {
            let duration = 1_000 * (i + 1);
            expected_duration += duration;
            bucket.add(duration, i % 3 == 0, false);
        }

        assert_eq!(bucket.hits, 50);
        assert_eq!(bucket.errors, 17);
        assert_eq!(bucket.duration, expected_duration);
        assert_eq!(
            bucket.ok_summary.count() + bucket.error_summary.count(),
            bucket.hits as f64
        );
    }

    #[test]
    fn test_clear_zeroes_fields() {
        let mut bucket = StatsBucket::new(key());
        bucket.add(5, true, true);
        bucket.clear();

        assert_eq!(bucket.hits, 0);
        assert_eq!(bucket.errors, 0);
        assert_eq!(bucket.duration, 0);
        assert_eq!(bucket.top_level_hits, 0);
        assert!(bucket.ok_summary.is_empty());
        assert!(bucket.error_summary.is_empty());
        assert_eq!(bucket.key, key());
    }
}
