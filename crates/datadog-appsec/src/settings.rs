// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use datadog_tracer::ConfigError;

/// Parameter names whose values are always redacted from reported matches.
pub const OBFUSCATION_KEY_REGEX_DEFAULT: &str = r"(?i)(?:p(?:ass)?w(?:or)?d|pass(?:_?phrase)?|secret|(?:api_?|private_?|public_?)key)|token|consumer_?(?:id|key|secret)|sign(?:ed|ature)|bearer|authorization";

/// Values that look like credentials regardless of the parameter they came in.
pub const OBFUSCATION_VALUE_REGEX_DEFAULT: &str = r#"(?i)(?:p(?:ass)?w(?:or)?d|pass(?:_?phrase)?|secret|(?:api_?|private_?|public_?|access_?|secret_?)key(?:_?id)?|token|consumer_?(?:id|key|secret)|sign(?:ed|ature)?|auth(?:entication|orization)?)(?:\s*=[^;]|"\s*:\s*"[^"]+")|bearer\s+[a-z0-9._\-]+|token:[a-z0-9]{13}|gh[opsu]_[0-9a-zA-Z]{36}|ey[I-L][\w=-]+\.ey[I-L][\w=-]+(?:\.[\w.+/=-]+)?|[\-]{5}BEGIN[a-z\s]+PRIVATE\sKEY[\-]{5}[^\-]+[\-]{5}END[a-z\s]+PRIVATE\sKEY|ssh-rsa\s*[a-z0-9/\.+]{100,}"#;

const DEFAULT_WAF_TIMEOUT: Duration = Duration::from_micros(100_000);

#[derive(Debug, Clone, PartialEq)]
pub struct SecuritySettings {
    pub enabled: bool,
    /// Path of a JSON ruleset replacing the embedded default one.
    pub rules: Option<PathBuf>,
    /// Empty disables key-based redaction.
    pub obfuscation_key_regex: String,
    /// Empty disables value-based redaction.
    pub obfuscation_value_regex: String,
    /// Budget for a single run of the engine.
    pub waf_timeout: Duration,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            rules: None,
            obfuscation_key_regex: OBFUSCATION_KEY_REGEX_DEFAULT.to_string(),
            obfuscation_value_regex: OBFUSCATION_VALUE_REGEX_DEFAULT.to_string(),
            waf_timeout: DEFAULT_WAF_TIMEOUT,
        }
    }
}

impl SecuritySettings {
    /// Builds settings from `DD_APPSEC_*` environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] when a boolean or numeric variable
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(value) = non_empty_var("DD_APPSEC_ENABLED") {
            settings.enabled = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "DD_APPSEC_ENABLED",
                        value,
                    })
                }
            };
        }
        settings.rules = non_empty_var("DD_APPSEC_RULES").map(PathBuf::from);

        // An explicitly empty pattern is meaningful here, so these are read
        // without the non-empty filter.
        if let Ok(pattern) = env::var("DD_APPSEC_OBFUSCATION_PARAMETER_KEY_REGEXP") {
            settings.obfuscation_key_regex = pattern;
        }
        if let Ok(pattern) = env::var("DD_APPSEC_OBFUSCATION_PARAMETER_VALUE_REGEXP") {
            settings.obfuscation_value_regex = pattern;
        }

        if let Some(value) = non_empty_var("DD_APPSEC_WAF_TIMEOUT") {
            let micros = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|micros| *micros > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "DD_APPSEC_WAF_TIMEOUT",
                    value,
                })?;
            settings.waf_timeout = Duration::from_micros(micros);
        }

        Ok(settings)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "DD_APPSEC_ENABLED",
        "DD_APPSEC_RULES",
        "DD_APPSEC_OBFUSCATION_PARAMETER_KEY_REGEXP",
        "DD_APPSEC_OBFUSCATION_PARAMETER_VALUE_REGEXP",
        "DD_APPSEC_WAF_TIMEOUT",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults() {
        clear_env();
        let settings = SecuritySettings::from_env().unwrap();
        assert_eq!(settings, SecuritySettings::default());
        assert!(!settings.enabled);
        assert_eq!(settings.waf_timeout, Duration::from_millis(100));
    }

    #[test]
    #[serial]
    fn reads_environment() {
        clear_env();
        env::set_var("DD_APPSEC_ENABLED", "true");
        env::set_var("DD_APPSEC_RULES", "/etc/dd/rules.json");
        env::set_var("DD_APPSEC_OBFUSCATION_PARAMETER_KEY_REGEXP", "");
        env::set_var("DD_APPSEC_OBFUSCATION_PARAMETER_VALUE_REGEXP", "secret");
        env::set_var("DD_APPSEC_WAF_TIMEOUT", "2500");

        let settings = SecuritySettings::from_env().unwrap();
        clear_env();

        assert!(settings.enabled);
        assert_eq!(settings.rules, Some(PathBuf::from("/etc/dd/rules.json")));
        assert_eq!(settings.obfuscation_key_regex, "");
        assert_eq!(settings.obfuscation_value_regex, "secret");
        assert_eq!(settings.waf_timeout, Duration::from_micros(2500));
    }

    #[test]
    #[serial]
    fn rejects_invalid_values() {
        clear_env();
        env::set_var("DD_APPSEC_WAF_TIMEOUT", "0");
        assert!(matches!(
            SecuritySettings::from_env(),
            Err(ConfigError::InvalidValue {
                name: "DD_APPSEC_WAF_TIMEOUT",
                ..
            })
        ));

        clear_env();
        env::set_var("DD_APPSEC_ENABLED", "maybe");
        assert!(SecuritySettings::from_env().is_err());
        clear_env();
    }
}
