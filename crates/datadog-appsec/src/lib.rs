// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process rule matching for App & API Protection.
//!
//! A [`RuleMatchEngine`] is compiled once from a JSON ruleset and shared
//! read-only between requests. Each request gets its own [`Context`], which
//! accumulates request addresses, runs the engine against them and finally
//! attaches any triggered rules to the service entry [`datadog_tracer::Span`].
//!
//! ```text
//!   addresses ──> Context ──> RuleMatchEngine::run ──> RunResult
//!                    │                                     │
//!                    └──────── attach_to_span <────────────┘
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod addresses;
pub mod condition;
pub mod context;
pub mod engine;
pub mod errors;
pub mod obfuscation;
pub mod result;
pub mod rule;
mod ruleset;
pub mod settings;
pub mod transform;

use std::collections::HashMap;

pub use condition::{Condition, Operator, Target};
pub use context::Context;
pub use engine::RuleMatchEngine;
pub use errors::WafError;
pub use obfuscation::{Obfuscator, REDACTED};
pub use result::{MatchParameter, ReturnCode, RuleMatch, RunResult};
pub use rule::Rule;
pub use settings::SecuritySettings;
pub use transform::Transformation;

/// Request data keyed by address name, e.g. `server.request.query`.
pub type AddressMap = HashMap<String, serde_json::Value>;
