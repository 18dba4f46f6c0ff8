// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logarithmic value-to-bin mapping.
//!
//! Bin `i` covers the half-open range `(γ^(i-1-offset), γ^(i-offset)]`. The
//! representative value of a bin sits at the point where the relative distance
//! to both bounds equals `(γ-1)/(γ+1)`, which is the accuracy guarantee of the
//! sketch.

use crate::errors::SketchError;

/// Gamma used by the trace agent when it decodes client summaries.
pub const AGENT_GAMMA: f64 = 1.015_625;
/// Index offset used by the trace agent when it decodes client summaries.
pub const AGENT_INDEX_OFFSET: f64 = 1338.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogIndexMapping {
    gamma: f64,
    index_offset: f64,
    multiplier: f64,
    relative_accuracy: f64,
    min_indexable_value: f64,
    max_indexable_value: f64,
}

impl LogIndexMapping {
    /// Creates a mapping from its wire parameters.
    ///
    /// # Errors
    /// Returns [`SketchError::InvalidGamma`] when `gamma` is not a finite value
    /// greater than 1.
    pub fn new(gamma: f64, index_offset: f64) -> Result<Self, SketchError> {
        if !gamma.is_finite() || gamma <= 1.0 || !index_offset.is_finite() {
            return Err(SketchError::InvalidGamma(gamma));
        }
        Ok(Self::from_parts(gamma, index_offset))
    }

    /// Creates a mapping that guarantees the given relative accuracy.
    ///
    /// # Errors
    /// Returns [`SketchError::InvalidRelativeAccuracy`] unless
    /// `0 < relative_accuracy < 1`.
    pub fn with_relative_accuracy(relative_accuracy: f64) -> Result<Self, SketchError> {
        if !(relative_accuracy > 0.0 && relative_accuracy < 1.0) {
            return Err(SketchError::InvalidRelativeAccuracy(relative_accuracy));
        }
        let gamma = (1.0 + relative_accuracy) / (1.0 - relative_accuracy);
        Ok(Self::from_parts(gamma, 0.0))
    }

    /// The mapping the agent expects for `okSummary` / `errorSummary`.
    #[must_use]
    pub fn agent() -> Self {
        Self::from_parts(AGENT_GAMMA, AGENT_INDEX_OFFSET)
    }

    fn from_parts(gamma: f64, index_offset: f64) -> Self {
        let multiplier = 1.0 / gamma.ln();
        let min_indexable_value = f64::max(
            ((f64::from(i32::MIN) - index_offset) / multiplier + 1.0).exp(),
            f64::MIN_POSITIVE * gamma,
        );
        let max_indexable_value = f64::min(
            ((f64::from(i32::MAX) - index_offset) / multiplier - 1.0).exp(),
            f64::MAX / gamma,
        );
        Self {
            gamma,
            index_offset,
            multiplier,
            relative_accuracy: (gamma - 1.0) / (gamma + 1.0),
            min_indexable_value,
            max_indexable_value,
        }
    }

    /// Bin index of a strictly positive value.
    #[must_use]
    pub fn index(&self, value: f64) -> i32 {
        let index = (value.ln() * self.multiplier + self.index_offset).ceil();
        // min/max indexable values keep this within i32 range
        index.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
    }

    #[must_use]
    pub fn lower_bound(&self, index: i32) -> f64 {
        ((f64::from(index) - self.index_offset - 1.0) / self.multiplier).exp()
    }

    #[must_use]
    pub fn upper_bound(&self, index: i32) -> f64 {
        self.lower_bound(index) * self.gamma
    }

    /// Representative value of a bin.
    #[must_use]
    pub fn value(&self, index: i32) -> f64 {
        self.lower_bound(index) * (1.0 + self.relative_accuracy)
    }

    #[must_use]
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    #[must_use]
    pub fn index_offset(&self) -> f64 {
        self.index_offset
    }

    #[must_use]
    pub fn relative_accuracy(&self) -> f64 {
        self.relative_accuracy
    }

    #[must_use]
    pub fn min_indexable_value(&self) -> f64 {
        self.min_indexable_value
    }

    #[must_use]
    pub fn max_indexable_value(&self) -> f64 {
        self.max_indexable_value
    }

    /// Smallest and largest bin index any indexable value maps to.
    #[must_use]
    pub fn index_range(&self) -> (i32, i32) {
        (
            self.index(self.min_indexable_value),
            self.index(self.max_indexable_value),
        )
    }
}

impl Default for LogIndexMapping {
    fn default() -> Self {
        Self::agent()
    }
}
