// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-request evaluation state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use datadog_tracer::Span;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::RuleMatchEngine;
use crate::result::{ReturnCode, RuleMatch, RunResult};
use crate::AddressMap;

pub mod tags {
    pub const APPSEC_ENABLED: &str = "_dd.appsec.enabled";
    pub const APPSEC_EVENT: &str = "appsec.event";
    pub const APPSEC_EVENT_RULES_VERSION: &str = "_dd.appsec.event_rules.version";
    pub const APPSEC_JSON: &str = "_dd.appsec.json";
    pub const APPSEC_WAF_DURATION: &str = "_dd.appsec.waf.duration";
    pub const APPSEC_WAF_TIMEOUTS: &str = "_dd.appsec.waf.timeouts";
    pub const SAMPLING_PRIORITY_V1: &str = "_sampling_priority_v1";
}

const SAMPLING_PRIORITY_USER_KEEP: f64 = 2.0;

#[derive(Serialize)]
struct AppSecEvents<'a> {
    triggers: &'a [RuleMatch],
}

/// Evaluation state for one request.
///
/// Addresses are aggregated as they become known (request first, response
/// later) and every [`Context::run`] sees all of them. A rule is reported at
/// most once per context. The time budget starts at the engine's default
/// timeout and shrinks with every run.
pub struct Context {
    engine: Arc<RuleMatchEngine>,
    addresses: AddressMap,
    reported: HashSet<String>,
    triggers: Vec<RuleMatch>,
    remaining: Duration,
    waf_duration: Duration,
    timeouts: u32,
}

impl Context {
    #[must_use]
    pub fn new(engine: Arc<RuleMatchEngine>) -> Self {
        let remaining = engine.default_timeout();
        Self {
            engine,
            addresses: AddressMap::new(),
            reported: HashSet::new(),
            triggers: Vec::new(),
            remaining,
            waf_duration: Duration::ZERO,
            timeouts: 0,
        }
    }

    /// Adds `addresses` to the request data, replacing earlier values of the
    /// same address.
    pub fn aggregate_addresses<I>(&mut self, addresses: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.addresses.extend(addresses);
    }

    #[must_use]
    pub fn addresses(&self) -> &AddressMap {
        &self.addresses
    }

    /// Runs the engine over everything aggregated so far, bounded by both
    /// `timeout` and the remaining budget. The returned result only holds
    /// rules that had not triggered in an earlier run.
    pub fn run(&mut self, timeout: Duration) -> RunResult {
        let mut result = self.engine.run(&self.addresses, timeout.min(self.remaining));

        self.remaining = self.remaining.saturating_sub(result.duration);
        self.waf_duration += result.duration;
        debug!(
            "appsec: remaining budget is {:?} (total time spent so far: {:?})",
            self.remaining, self.waf_duration
        );

        if result.timed_out {
            info!("appsec: time out reached while evaluating the ruleset; detections may be incomplete. Consider tuning DD_APPSEC_WAF_TIMEOUT");
            self.timeouts += 1;
        }

        result
            .matches
            .retain(|m| self.reported.insert(m.rule.id.clone()));
        if result.matches.is_empty() {
            result.return_code = ReturnCode::Ok;
        }
        self.triggers.extend(result.matches.iter().cloned());
        result
    }

    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.triggers.is_empty()
    }

    #[must_use]
    pub fn triggers(&self) -> &[RuleMatch] {
        &self.triggers
    }

    #[must_use]
    pub fn waf_duration(&self) -> Duration {
        self.waf_duration
    }

    #[must_use]
    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    /// Writes the outcome of the request onto its service entry span.
    pub fn attach_to_span(&self, span: &mut Span) {
        span.set_metric(tags::APPSEC_ENABLED, 1.0);
        span.set_metric(
            tags::APPSEC_WAF_DURATION,
            self.waf_duration.as_secs_f64() * 1_000_000.0,
        );
        if self.timeouts > 0 {
            span.set_metric(tags::APPSEC_WAF_TIMEOUTS, f64::from(self.timeouts));
        }
        if !self.engine.ruleset_version().is_empty() {
            span.set_tag(
                tags::APPSEC_EVENT_RULES_VERSION,
                self.engine.ruleset_version(),
            );
        }

        if !self.has_events() {
            return;
        }
        let events = AppSecEvents {
            triggers: &self.triggers,
        };
        let json = match serde_json::to_string(&events) {
            Ok(json) => json,
            Err(e) => {
                warn!("appsec: failed to serialize triggers, the event will be dropped: {e}");
                return;
            }
        };
        span.set_tag(tags::APPSEC_EVENT, "true");
        span.set_tag(tags::APPSEC_JSON, &json);
        span.set_metric(tags::SAMPLING_PRIORITY_V1, SAMPLING_PRIORITY_USER_KEEP);
    }
}
