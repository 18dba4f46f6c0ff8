// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WafError {
    /// App & API Protection is turned off in the settings.
    #[error("appsec: feature is not enabled")]
    FeatureDisabled,
    /// The user-configured ruleset file could not be read.
    #[error("appsec: failed to open rules file {0:?}: {1}")]
    RulesFile(String, std::io::Error),
    #[error("appsec: failed to parse ruleset: {0}")]
    RulesetParse(#[from] serde_json::Error),
    #[error("appsec: rule {rule} has an invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("appsec: invalid obfuscation pattern {pattern:?}: {source}")]
    InvalidObfuscationPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("appsec: rule {rule} uses unknown operator {operator:?}")]
    UnknownOperator { rule: String, operator: String },
    #[error("appsec: rule {rule} uses unknown transformation {name:?}")]
    UnknownTransformation { rule: String, name: String },
    #[error("appsec: rule {rule} is invalid: {reason}")]
    InvalidRule { rule: String, reason: String },
    /// The ruleset compiled to zero rules.
    #[error("appsec: the ruleset contains no rule")]
    NoRules,
}
