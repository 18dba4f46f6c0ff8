// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Embedded default ruleset and loading of user-provided ones.

use std::fs::File;
use std::io::BufReader;

use crate::errors::WafError;
use crate::rule::RulesetDocument;
use crate::settings::SecuritySettings;

const DEFAULT_RULESET: &str = include_str!("default-ruleset.json");

pub(crate) fn default_ruleset() -> Result<RulesetDocument, WafError> {
    Ok(serde_json::from_str(DEFAULT_RULESET)?)
}

/// Reads the ruleset pointed to by [`SecuritySettings::rules`], or the
/// embedded default when none is configured.
pub(crate) fn load(settings: &SecuritySettings) -> Result<RulesetDocument, WafError> {
    let Some(path) = &settings.rules else {
        return default_ruleset();
    };
    let file = File::open(path)
        .map_err(|e| WafError::RulesFile(path.display().to_string(), e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
