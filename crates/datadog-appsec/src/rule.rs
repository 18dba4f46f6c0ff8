// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use serde_json::Value;

use crate::condition::{Condition, Operator, Target};
use crate::errors::WafError;
use crate::result::{ConditionMatch, RuleInfo, RuleMatch, RuleTags};
use crate::transform::Transformation;

/// Top level of a ruleset document.
#[derive(Debug, Deserialize)]
pub struct RulesetDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: Option<RulesetMetadata>,
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RulesetMetadata {
    #[serde(default)]
    pub rules_version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: RuleTags,
    pub conditions: Vec<ConditionDefinition>,
    #[serde(default)]
    pub transformers: Vec<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConditionDefinition {
    pub operator: String,
    pub parameters: ConditionParameters,
}

#[derive(Debug, Deserialize)]
pub struct ConditionParameters {
    pub inputs: Vec<InputDefinition>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub list: Option<Vec<String>>,
    #[serde(default)]
    pub options: ConditionOptions,
}

#[derive(Debug, Deserialize)]
pub struct InputDefinition {
    pub address: String,
    #[serde(default)]
    pub key_path: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConditionOptions {
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub min_length: usize,
}

fn enabled_by_default() -> bool {
    true
}

/// A compiled rule. Every condition must match for the rule to trigger.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) info: RuleInfo,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) transformers: Vec<Transformation>,
}

impl Rule {
    /// # Errors
    /// Fails on an unknown operator or transformation, a missing operator
    /// parameter, a rule without conditions or inputs, or a regex that does
    /// not compile.
    pub fn compile(definition: RuleDefinition) -> Result<Self, WafError> {
        let id = definition.id;
        if definition.conditions.is_empty() {
            return Err(WafError::InvalidRule {
                rule: id,
                reason: "no conditions".to_string(),
            });
        }

        let transformers = definition
            .transformers
            .iter()
            .map(|name| {
                name.parse::<Transformation>()
                    .map_err(|name| WafError::UnknownTransformation {
                        rule: id.clone(),
                        name,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let conditions = definition
            .conditions
            .into_iter()
            .map(|condition| compile_condition(&id, condition))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            info: RuleInfo {
                id,
                name: definition.name,
                tags: definition.tags,
            },
            conditions,
            transformers,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    #[must_use]
    pub fn info(&self) -> &RuleInfo {
        &self.info
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn transformers(&self) -> &[Transformation] {
        &self.transformers
    }

    /// Every address any condition of the rule reads.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .flat_map(|c| c.targets().iter().map(|t| t.address.as_str()))
    }

    /// Evaluates the rule against the values returned by `lookup`.
    pub fn evaluate<'v, F>(&self, lookup: F) -> Option<RuleMatch>
    where
        F: Fn(&str) -> Option<&'v Value>,
    {
        let mut rule_matches = Vec::with_capacity(self.conditions.len());
        for condition in &self.conditions {
            let parameter = condition.find_match(&lookup)?;
            rule_matches.push(ConditionMatch {
                operator: condition.operator().name().to_string(),
                operator_value: condition.operator().operator_value(),
                parameters: vec![parameter],
            });
        }
        Some(RuleMatch {
            rule: self.info.clone(),
            rule_matches,
        })
    }
}

fn compile_condition(rule: &str, definition: ConditionDefinition) -> Result<Condition, WafError> {
    let ConditionParameters {
        inputs,
        regex,
        list,
        options,
    } = definition.parameters;

    if inputs.is_empty() {
        return Err(WafError::InvalidRule {
            rule: rule.to_string(),
            reason: format!("{} condition has no inputs", definition.operator),
        });
    }
    let missing = |parameter: &str| WafError::InvalidRule {
        rule: rule.to_string(),
        reason: format!("{} requires a {parameter} parameter", definition.operator),
    };

    let operator = match definition.operator.as_str() {
        "match_regex" => {
            let pattern = regex.ok_or_else(|| missing("regex"))?;
            Operator::match_regex(rule, &pattern, options.case_sensitive)?
        }
        "phrase_match" => {
            let phrases = list.ok_or_else(|| missing("list"))?;
            Operator::phrase_match(rule, &phrases, options.case_sensitive)?
        }
        "exact_match" => Operator::exact_match(&list.ok_or_else(|| missing("list"))?),
        other => {
            return Err(WafError::UnknownOperator {
                rule: rule.to_string(),
                operator: other.to_string(),
            })
        }
    };

    let targets = inputs
        .into_iter()
        .map(|input| Target {
            address: input.address,
            key_path: input.key_path,
        })
        .collect();

    Ok(Condition::new(targets, operator).with_min_length(options.min_length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(value: Value) -> RuleDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn compiles_a_rule() {
        let rule = Rule::compile(definition(json!({
            "id": "r-1",
            "name": "test rule",
            "tags": {"type": "sql_injection", "category": "attack_attempt"},
            "conditions": [{
                "operator": "match_regex",
                "parameters": {
                    "inputs": [{"address": "server.request.query"}, {"address": "server.request.body"}],
                    "regex": "pg_sleep",
                    "options": {"min_length": 4}
                }
            }],
            "transformers": ["urlDecode", "lowercase"]
        })))
        .unwrap();

        assert_eq!(rule.id(), "r-1");
        assert_eq!(rule.info().tags.r#type, "sql_injection");
        assert_eq!(
            rule.transformers(),
            &[Transformation::UrlDecode, Transformation::Lowercase]
        );
        assert_eq!(
            rule.addresses().collect::<Vec<_>>(),
            vec!["server.request.query", "server.request.body"]
        );
    }

    #[test]
    fn all_conditions_must_match() {
        let rule = Rule::compile(definition(json!({
            "id": "r-2",
            "name": "two conditions",
            "conditions": [
                {"operator": "match_regex", "parameters": {"inputs": [{"address": "a"}], "regex": "x"}},
                {"operator": "exact_match", "parameters": {"inputs": [{"address": "b"}], "list": ["y"]}}
            ]
        })))
        .unwrap();

        let a = json!("xx");
        let b = json!("y");
        let other = json!("n");

        let both = rule
            .evaluate(|address| match address {
                "a" => Some(&a),
                "b" => Some(&b),
                _ => None,
            })
            .unwrap();
        assert_eq!(both.rule_matches.len(), 2);
        assert_eq!(both.rule_matches[1].operator, "exact_match");

        assert!(rule
            .evaluate(|address| match address {
                "a" => Some(&a),
                "b" => Some(&other),
                _ => None,
            })
            .is_none());
    }

    #[test]
    fn rejects_invalid_definitions() {
        let unknown_operator = definition(json!({
            "id": "r", "name": "n",
            "conditions": [{"operator": "is_sqli", "parameters": {"inputs": [{"address": "a"}]}}]
        }));
        assert!(matches!(
            Rule::compile(unknown_operator),
            Err(WafError::UnknownOperator { .. })
        ));

        let unknown_transformation = definition(json!({
            "id": "r", "name": "n",
            "conditions": [{"operator": "match_regex", "parameters": {"inputs": [{"address": "a"}], "regex": "x"}}],
            "transformers": ["base64Decode"]
        }));
        assert!(matches!(
            Rule::compile(unknown_transformation),
            Err(WafError::UnknownTransformation { name, .. }) if name == "base64Decode"
        ));

        let missing_regex = definition(json!({
            "id": "r", "name": "n",
            "conditions": [{"operator": "match_regex", "parameters": {"inputs": [{"address": "a"}]}}]
        }));
        assert!(matches!(
            Rule::compile(missing_regex),
            Err(WafError::InvalidRule { .. })
        ));

        let no_inputs = definition(json!({
            "id": "r", "name": "n",
            "conditions": [{"operator": "match_regex", "parameters": {"inputs": [], "regex": "x"}}]
        }));
        assert!(Rule::compile(no_inputs).is_err());
    }
}
