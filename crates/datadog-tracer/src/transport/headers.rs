// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::stats::buffer::{LANG, TRACER_VERSION};

pub const LANG_HEADER: &str = "Datadog-Meta-Lang";
pub const LANG_VERSION_HEADER: &str = "Datadog-Meta-Lang-Version";
pub const LANG_INTERPRETER_HEADER: &str = "Datadog-Meta-Lang-Interpreter";
pub const TRACER_VERSION_HEADER: &str = "Datadog-Meta-Tracer-Version";
pub const CONTAINER_ID_HEADER: &str = "Datadog-Container-ID";
pub const TRACE_COUNT_HEADER: &str = "X-Datadog-Trace-Count";
pub const COMPUTED_STATS_HEADER: &str = "Datadog-Client-Computed-Stats";
pub const COMPUTED_TOP_LEVEL_HEADER: &str = "Datadog-Client-Computed-Top-Level";
pub const AGENT_VERSION_HEADER: &str = "Datadog-Agent-Version";
pub const API_KEY_HEADER: &str = "DD-API-KEY";

/// Headers sent with every request to the agent.
#[must_use]
pub fn agent_default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, LANG_HEADER, LANG);
    if let Some(version) = option_env!("CARGO_PKG_RUST_VERSION").filter(|v| !v.is_empty()) {
        insert(&mut headers, LANG_VERSION_HEADER, version);
    }
    insert(
        &mut headers,
        LANG_INTERPRETER_HEADER,
        &format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
    );
    insert(&mut headers, TRACER_VERSION_HEADER, TRACER_VERSION);
    insert(&mut headers, COMPUTED_TOP_LEVEL_HEADER, "1");
    headers
}

/// Inserts a header, skipping (with a warning) names or values that are not
/// valid HTTP.
pub fn insert(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => warn!("Skipping invalid header {name}"),
    }
}
