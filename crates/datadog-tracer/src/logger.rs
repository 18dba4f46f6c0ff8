// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log formatting for tracer diagnostics.
//!
//! Lines are prefixed with `DD_TRACE` so they stand out from the host
//! application's own output:
//!
//! ```text
//! DD_TRACE | WARN | Partial flush should only be enabled with agent 7.26.0+
//! DD_TRACE | DEBUG | stats_flush{sequence=4}: Successfully sent stats
//! ```

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::TracerSettings;

const NOISY_DEPENDENCIES: &str = "h2=off,hyper=off,rustls=off";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "DD_TRACE | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Builds the filter directive for a configured level.
#[must_use]
pub fn filter_directive(log_level: &str) -> String {
    format!("{log_level},{NOISY_DEPENDENCIES}")
}

/// Installs the global subscriber. Returns `false` when one is already set,
/// which is the normal case when the host application configured logging.
pub fn init(settings: &TracerSettings) -> bool {
    let filter = EnvFilter::try_new(filter_directive(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new(filter_directive("info")));

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
