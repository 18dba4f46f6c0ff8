// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mergeable quantile sketch with relative-error guarantees.
//!
//! Values are mapped to logarithmically sized bins so that any quantile read
//! back from the sketch is within a fixed relative accuracy of the true value.
//! The sketch is the summary attached to every client stats group (`okSummary`
//! and `errorSummary`) and is shipped to the agent in its protobuf encoding.
//!
//! ```rust
//! use datadog_ddsketch::DDSketch;
//!
//! let mut sketch = DDSketch::default();
//! for v in [100.0, 200.0, 300.0] {
//!     sketch.add(v);
//! }
//! assert_eq!(sketch.count(), 3.0);
//!
//! let bytes = sketch.encode();
//! let decoded = DDSketch::decode(&bytes).unwrap();
//! assert_eq!(decoded.count(), 3.0);
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod errors;
pub mod mapping;
pub mod pb;
pub mod sketch;
pub mod store;

pub use errors::SketchError;
pub use mapping::LogIndexMapping;
pub use sketch::DDSketch;
pub use store::DenseStore;
