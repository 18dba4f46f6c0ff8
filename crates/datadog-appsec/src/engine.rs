// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::errors::WafError;
use crate::obfuscation::Obfuscator;
use crate::result::{ReturnCode, RunResult};
use crate::rule::{Rule, RulesetDocument};
use crate::ruleset;
use crate::settings::SecuritySettings;
use crate::transform::{transform_input_key, transform_value};
use crate::AddressMap;

/// Compiled ruleset.
///
/// The engine is immutable once built; [`RuleMatchEngine::run`] keeps every
/// piece of evaluation state on its own stack, so one engine can be shared
/// behind an `Arc` and run from any number of threads at once.
#[derive(Debug)]
pub struct RuleMatchEngine {
    rules: Vec<Rule>,
    obfuscator: Obfuscator,
    ruleset_version: String,
    default_timeout: Duration,
}

impl RuleMatchEngine {
    /// Compiles every enabled rule of `document`.
    ///
    /// # Errors
    /// Fails if any enabled rule does not compile, or if no rule is left.
    pub fn new(document: RulesetDocument, obfuscator: Obfuscator) -> Result<Self, WafError> {
        let ruleset_version = document
            .metadata
            .and_then(|m| m.rules_version)
            .unwrap_or_default();

        let mut rules = Vec::with_capacity(document.rules.len());
        for definition in document.rules {
            if !definition.enabled {
                debug!("appsec: skipping disabled rule {}", definition.id);
                continue;
            }
            rules.push(Rule::compile(definition)?);
        }
        if rules.is_empty() {
            return Err(WafError::NoRules);
        }

        debug!(
            "appsec: loaded {} rules (ruleset version {ruleset_version:?})",
            rules.len()
        );
        Ok(Self {
            rules,
            obfuscator,
            ruleset_version,
            default_timeout: SecuritySettings::default().waf_timeout,
        })
    }

    /// # Errors
    /// Fails if `json` is not a ruleset document or does not compile.
    pub fn from_json(json: &str, obfuscator: Obfuscator) -> Result<Self, WafError> {
        Self::new(serde_json::from_str(json)?, obfuscator)
    }

    /// Builds an engine over the embedded default ruleset.
    ///
    /// # Errors
    /// Only fails if the embedded ruleset is broken.
    pub fn with_default_rules(obfuscator: Obfuscator) -> Result<Self, WafError> {
        Self::new(ruleset::default_ruleset()?, obfuscator)
    }

    /// Builds the engine described by `settings`.
    ///
    /// # Errors
    /// - [`WafError::FeatureDisabled`] when App & API Protection is off;
    /// - [`WafError::RulesFile`] / [`WafError::RulesetParse`] when the
    ///   configured ruleset cannot be read;
    /// - any compilation error of the ruleset or obfuscation patterns.
    pub fn from_settings(settings: &SecuritySettings) -> Result<Self, WafError> {
        if !settings.enabled {
            return Err(WafError::FeatureDisabled);
        }
        let obfuscator = Obfuscator::new(
            &settings.obfuscation_key_regex,
            &settings.obfuscation_value_regex,
        )?;
        let engine = Self::new(ruleset::load(settings)?, obfuscator)?
            .with_default_timeout(settings.waf_timeout);
        info!(
            "appsec: rule matching engine started with {} rules",
            engine.rules.len()
        );
        Ok(engine)
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn ruleset_version(&self) -> &str {
        &self.ruleset_version
    }

    #[must_use]
    pub fn obfuscator(&self) -> &Obfuscator {
        &self.obfuscator
    }

    /// Per-request budget handed to new contexts.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Evaluates every rule against `addresses`, in ruleset order.
    ///
    /// Rules are not started once `timeout` has elapsed; the result then has
    /// `timed_out` set and only carries the matches found so far.
    #[must_use]
    pub fn run(&self, addresses: &AddressMap, timeout: Duration) -> RunResult {
        let start = Instant::now();
        // transformed views, shared by rules with the same chain
        let mut views = AddressMap::new();
        let mut matches = Vec::new();
        let mut timed_out = false;

        for rule in &self.rules {
            if start.elapsed() >= timeout {
                timed_out = true;
                break;
            }

            let chain = rule.transformers();
            let found = if chain.is_empty() {
                rule.evaluate(|address| addresses.get(address))
            } else {
                for address in rule.addresses() {
                    let key = transform_input_key(chain, address);
                    if views.contains_key(&key) {
                        continue;
                    }
                    if let Some(value) = addresses.get(address) {
                        views.insert(key, transform_value(chain, value));
                    }
                }
                rule.evaluate(|address| views.get(&transform_input_key(chain, address)))
            };

            if let Some(mut found) = found {
                for condition in &mut found.rule_matches {
                    for parameter in &mut condition.parameters {
                        parameter.redacted = self.obfuscator.apply(parameter);
                    }
                }
                matches.push(found);
            }
        }

        let duration = start.elapsed();
        debug!(
            "appsec: ruleset evaluation took {duration:?} and matched {} rules",
            matches.len()
        );

        RunResult {
            return_code: if matches.is_empty() {
                ReturnCode::Ok
            } else {
                ReturnCode::Match
            },
            matches,
            timed_out,
            duration,
        }
    }
}
