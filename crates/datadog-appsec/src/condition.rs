// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Compiled rule conditions and the traversal that feeds them.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::errors::WafError;
use crate::result::MatchParameter;
use crate::transform::{transform_input_key, Transformation};
use crate::AddressMap;

/// Nesting deeper than this is not inspected.
pub const MAX_DEPTH: usize = 20;

/// An address, optionally narrowed to a path inside its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    pub key_path: Vec<String>,
}

impl Target {
    #[must_use]
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            key_path: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_key_path(mut self, key_path: &[&str]) -> Self {
        self.key_path = key_path.iter().map(|k| (*k).to_string()).collect();
        self
    }
}

#[derive(Debug, Clone)]
pub enum Operator {
    MatchRegex(Regex),
    /// Any of a list of literal phrases, compiled into one alternation.
    PhraseMatch(Regex),
    ExactMatch(HashSet<String>),
}

impl Operator {
    /// # Errors
    /// Returns [`WafError::InvalidRegex`] when `pattern` does not compile.
    pub fn match_regex(rule: &str, pattern: &str, case_sensitive: bool) -> Result<Self, WafError> {
        RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map(Self::MatchRegex)
            .map_err(|source| WafError::InvalidRegex {
                rule: rule.to_string(),
                pattern: pattern.to_string(),
                source,
            })
    }

    /// # Errors
    /// Fails on an empty phrase list.
    pub fn phrase_match(rule: &str, phrases: &[String], case_sensitive: bool) -> Result<Self, WafError> {
        if phrases.is_empty() {
            return Err(WafError::InvalidRule {
                rule: rule.to_string(),
                reason: "phrase_match requires a non-empty list".to_string(),
            });
        }
        let pattern = phrases
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map(Self::PhraseMatch)
            .map_err(|source| WafError::InvalidRegex {
                rule: rule.to_string(),
                pattern,
                source,
            })
    }

    #[must_use]
    pub fn exact_match(values: &[String]) -> Self {
        Self::ExactMatch(values.iter().cloned().collect())
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::MatchRegex(_) => "match_regex",
            Self::PhraseMatch(_) => "phrase_match",
            Self::ExactMatch(_) => "exact_match",
        }
    }

    /// What gets reported as `operator_value` in a match.
    #[must_use]
    pub fn operator_value(&self) -> String {
        match self {
            Self::MatchRegex(re) => re.as_str().to_string(),
            Self::PhraseMatch(_) | Self::ExactMatch(_) => String::new(),
        }
    }

    fn highlight<'a>(&self, input: &'a str) -> Option<&'a str> {
        match self {
            Self::MatchRegex(re) | Self::PhraseMatch(re) => re.find(input).map(|m| m.as_str()),
            Self::ExactMatch(values) => values.contains(input).then_some(input),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Condition {
    targets: Vec<Target>,
    operator: Operator,
    min_length: usize,
}

impl Condition {
    #[must_use]
    pub fn new(targets: Vec<Target>, operator: Operator) -> Self {
        Self {
            targets,
            operator,
            min_length: 0,
        }
    }

    /// Strings shorter than `min_length` characters are never tested.
    #[must_use]
    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    #[must_use]
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    #[must_use]
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Whether any string reachable from a target address matches.
    #[must_use]
    pub fn is_match(&self, data: &AddressMap) -> bool {
        self.find_match(|address| data.get(address)).is_some()
    }

    /// Like [`Condition::is_match`], but reads each target from the
    /// `chain`-transformed namespace of `data`.
    #[must_use]
    pub fn is_transformed_match(&self, data: &AddressMap, chain: &[Transformation]) -> bool {
        self.find_match(|address| data.get(&transform_input_key(chain, address)))
            .is_some()
    }

    /// First match across the targets, in target order.
    pub fn find_match<'v, F>(&self, lookup: F) -> Option<MatchParameter>
    where
        F: Fn(&str) -> Option<&'v Value>,
    {
        self.targets.iter().find_map(|target| {
            let root = lookup(&target.address)?;
            let value = select(root, &target.key_path)?;
            let mut path = target.key_path.clone();
            self.search(value, &mut path, 0)
                .map(|(key_path, value, highlight)| MatchParameter {
                    address: target.address.clone(),
                    key_path,
                    value,
                    highlight: vec![highlight],
                    redacted: false,
                })
        })
    }

    // Depth-first over arrays and objects, stopping at the first matching leaf.
    fn search(
        &self,
        value: &Value,
        path: &mut Vec<String>,
        depth: usize,
    ) -> Option<(Vec<String>, String, String)> {
        if depth > MAX_DEPTH {
            return None;
        }
        match value {
            Value::String(s) => {
                if s.chars().count() < self.min_length {
                    return None;
                }
                self.operator
                    .highlight(s)
                    .map(|h| (path.clone(), s.clone(), h.to_string()))
            }
            Value::Array(items) => items.iter().enumerate().find_map(|(i, item)| {
                path.push(i.to_string());
                let found = self.search(item, path, depth + 1);
                path.pop();
                found
            }),
            Value::Object(map) => map.iter().find_map(|(key, item)| {
                path.push(key.clone());
                let found = self.search(item, path, depth + 1);
                path.pop();
                found
            }),
            _ => None,
        }
    }
}

fn select<'v>(mut value: &'v Value, key_path: &[String]) -> Option<&'v Value> {
    for key in key_path {
        value = match value {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}
