// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use regex::Regex;

use crate::errors::WafError;
use crate::result::MatchParameter;

/// Replacement for sensitive highlights and values.
pub const REDACTED: &str = "<Redacted>";

/// Redacts matches that touch sensitive parameters.
///
/// The key and value patterns are independent: a parameter is redacted when
/// any segment of its key path matches the key pattern, or when its value
/// matches the value pattern. An empty pattern turns its side off.
#[derive(Debug, Clone)]
pub struct Obfuscator {
    key: Option<Regex>,
    value: Option<Regex>,
}

impl Obfuscator {
    /// # Errors
    /// Returns [`WafError::InvalidObfuscationPattern`] when a non-empty
    /// pattern does not compile.
    pub fn new(key_pattern: &str, value_pattern: &str) -> Result<Self, WafError> {
        Ok(Self {
            key: compile(key_pattern)?,
            value: compile(value_pattern)?,
        })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            key: None,
            value: None,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.key.is_some() || self.value.is_some()
    }

    #[must_use]
    pub fn is_sensitive_key(&self, key_path: &[String]) -> bool {
        self.key
            .as_ref()
            .is_some_and(|re| key_path.iter().any(|segment| re.is_match(segment)))
    }

    #[must_use]
    pub fn is_sensitive_value(&self, value: &str) -> bool {
        self.value.as_ref().is_some_and(|re| re.is_match(value))
    }

    /// Redacts `parameter` in place. Returns whether anything was replaced.
    pub fn apply(&self, parameter: &mut MatchParameter) -> bool {
        if !self.is_sensitive_key(&parameter.key_path) && !self.is_sensitive_value(&parameter.value)
        {
            return false;
        }
        parameter.value = REDACTED.to_string();
        for highlight in &mut parameter.highlight {
            *highlight = REDACTED.to_string();
        }
        true
    }
}

fn compile(pattern: &str) -> Result<Option<Regex>, WafError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|source| WafError::InvalidObfuscationPattern {
            pattern: pattern.to_string(),
            source,
        })
}
