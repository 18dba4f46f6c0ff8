// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::span::Span;

/// Aggregation cell identity. Two spans land in the same bucket when all five
/// fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatsAggregationKey {
    pub resource: String,
    pub service: String,
    pub operation_name: String,
    pub r#type: String,
    pub http_status_code: u32,
}

impl StatsAggregationKey {
    #[must_use]
    pub fn new(
        resource: &str,
        service: &str,
        operation_name: &str,
        span_type: &str,
        http_status_code: u32,
    ) -> Self {
        Self {
            resource: resource.to_string(),
            service: service.to_string(),
            operation_name: operation_name.to_string(),
            r#type: span_type.to_string(),
            http_status_code,
        }
    }

    #[must_use]
    pub fn from_span(span: &Span) -> Self {
        Self::new(
            &span.resource,
            &span.service,
            &span.name,
            &span.r#type,
            span.http_status_code(),
        )
    }
}
