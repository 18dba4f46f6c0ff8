// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tracing client: span model, client-side stats and delivery to the agent.
//!
//! Finished traces go to an [`writer::AgentWriter`], which feeds top-level and
//! measured spans into the [`stats::StatsAggregator`] and buffers the traces
//! themselves. Both are flushed on background tasks through an [`api::Api`]
//! that retries with exponential backoff over the transport picked by
//! [`transport::strategy::agent_factory`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod api;
pub mod config;
pub mod container;
pub mod errors;
pub mod logger;
pub mod registry;
pub mod retry;
pub mod span;
pub mod stats;
pub mod transport;
pub mod writer;

pub use api::{AgentApi, Api, ApiMetrics};
pub use config::{TracerSettings, TracesTransportType};
pub use errors::{ConfigError, StatsError, TransportError};
pub use retry::{send_with_retry, RetryPolicy};
pub use span::{guarded, Span};
pub use stats::{StatsAggregationKey, StatsAggregator, StatsBucket, StatsBuffer};
pub use writer::AgentWriter;
