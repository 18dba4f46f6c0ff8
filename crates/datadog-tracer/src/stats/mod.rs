// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod aggregator;
pub mod bucket;
pub mod buffer;
pub mod key;

pub use aggregator::StatsAggregator;
pub use bucket::StatsBucket;
pub use buffer::{ClientStatsPayload, StatsBuffer};
pub use key::StatsAggregationKey;
