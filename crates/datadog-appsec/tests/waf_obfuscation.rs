// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use datadog_appsec::addresses::{REQUEST_METHOD, REQUEST_QUERY, REQUEST_URI_RAW};
use datadog_appsec::{Context, ReturnCode, RuleMatchEngine, SecuritySettings, REDACTED};
use serde_json::{json, Value};

fn engine(obfuscate: bool) -> Arc<RuleMatchEngine> {
    let mut settings = SecuritySettings {
        enabled: true,
        ..SecuritySettings::default()
    };
    if !obfuscate {
        settings.obfuscation_key_regex = String::new();
        settings.obfuscation_value_regex = String::new();
    }
    Arc::new(RuleMatchEngine::from_settings(&settings).unwrap())
}

fn attack_with_secret(obfuscate: bool, key: &str, full_attack: &str, highlight: &str) {
    let mut context = Context::new(engine(obfuscate));
    context.aggregate_addresses([
        (REQUEST_QUERY.to_string(), json!({ key: [full_attack] })),
        (REQUEST_URI_RAW.to_string(), json!("http://localhost:54587/")),
        (REQUEST_METHOD.to_string(), json!("GET")),
    ]);

    let result = context.run(Duration::from_secs(1));
    assert_eq!(result.return_code, ReturnCode::Match);

    let (expected_highlight, expected_value) = if obfuscate {
        (REDACTED, REDACTED)
    } else {
        (highlight, full_attack)
    };
    let parameter = result.matches[0].parameters().next().unwrap();
    assert_eq!(parameter.redacted, obfuscate);

    let data: Vec<Value> = serde_json::from_str(&result.data().unwrap()).unwrap();
    let parameter = &data[0]["rule_matches"][0]["parameters"][0];
    assert_eq!(parameter["address"], REQUEST_QUERY);
    assert_eq!(parameter["highlight"][0], expected_highlight);
    assert_eq!(parameter["value"], expected_value);
    assert!(parameter.get("redacted").is_none());
}

#[test]
fn literal_redacted_input_is_not_flagged() {
    let mut context = Context::new(engine(true));
    let attack = format!("{REDACTED} select pg_sleep");
    context.aggregate_addresses([(REQUEST_QUERY.to_string(), json!({ "q": [attack] }))]);

    let result = context.run(Duration::from_secs(1));
    assert_eq!(result.return_code, ReturnCode::Match);
    let parameter = result.matches[0].parameters().next().unwrap();
    assert!(!parameter.redacted);
    assert_eq!(parameter.value, attack);
}

#[test]
fn bearer_in_clear() {
    attack_with_secret(
        false,
        "bearer",
        "this is a very secret value having the select pg_sleep attack",
        "select pg_sleep",
    );
}

#[test]
fn password_in_clear() {
    attack_with_secret(false, "password", "select pg_sleep", "select pg_sleep");
}

#[test]
fn pwd_in_clear() {
    attack_with_secret(false, "pwd", "select pg_sleep", "select pg_sleep");
}

#[test]
fn bearer_obfuscated() {
    attack_with_secret(
        true,
        "bearer",
        "this is a very secret value having the select pg_sleep attack",
        "select pg_sleep",
    );
}

#[test]
fn password_obfuscated() {
    attack_with_secret(true, "password", "select pg_sleep", "select pg_sleep");
}

#[test]
fn pwd_obfuscated() {
    attack_with_secret(true, "pwd", "select pg_sleep", "select pg_sleep");
}
