// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// No rule matched.
    Ok,
    /// At least one rule matched.
    Match,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTags {
    #[serde(rename = "type", default)]
    pub r#type: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub id: String,
    pub name: String,
    pub tags: RuleTags,
}

/// A single input that satisfied a condition.
///
/// `value` is the whole string the pattern was tested against and `highlight`
/// the parts of it that matched. Both are replaced by
/// [`crate::REDACTED`] when the match is obfuscated, in which case `redacted`
/// is set. The flag is not part of the trigger JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchParameter {
    pub address: String,
    pub key_path: Vec<String>,
    pub value: String,
    pub highlight: Vec<String>,
    #[serde(skip)]
    pub redacted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionMatch {
    pub operator: String,
    pub operator_value: String,
    pub parameters: Vec<MatchParameter>,
}

/// A triggered rule, serialized the way triggers appear in `_dd.appsec.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule: RuleInfo,
    pub rule_matches: Vec<ConditionMatch>,
}

impl RuleMatch {
    #[must_use]
    pub fn parameters(&self) -> impl Iterator<Item = &MatchParameter> {
        self.rule_matches.iter().flat_map(|m| m.parameters.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub return_code: ReturnCode,
    /// Triggered rules in ruleset order.
    pub matches: Vec<RuleMatch>,
    /// Set when the time budget ran out before every rule was evaluated.
    pub timed_out: bool,
    pub duration: Duration,
}

impl RunResult {
    /// JSON array of the triggered rules.
    ///
    /// # Errors
    /// Only fails if serialization of the match list fails, which plain
    /// strings cannot trigger in practice.
    pub fn data(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.matches)
    }

    #[must_use]
    pub fn rule_ids(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.rule.id.as_str()).collect()
    }
}
