// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use prost::Message;

use crate::errors::SketchError;
use crate::mapping::LogIndexMapping;
use crate::pb;
use crate::store::DenseStore;

/// Quantile sketch with a fixed relative accuracy.
///
/// Counts are exact; sums and quantiles are reconstructed from bin
/// representatives and are within [`LogIndexMapping::relative_accuracy`] of the
/// true values. Two sketches sharing a mapping merge losslessly.
#[derive(Debug, Clone, PartialEq)]
pub struct DDSketch {
    mapping: LogIndexMapping,
    positive: DenseStore,
    negative: DenseStore,
    zero_count: f64,
}

impl DDSketch {
    #[must_use]
    pub fn new(mapping: LogIndexMapping) -> Self {
        Self {
            mapping,
            positive: DenseStore::new(),
            negative: DenseStore::new(),
            zero_count: 0.0,
        }
    }

    #[must_use]
    pub fn mapping(&self) -> &LogIndexMapping {
        &self.mapping
    }

    #[must_use]
    pub fn relative_accuracy(&self) -> f64 {
        self.mapping.relative_accuracy()
    }

    pub fn add(&mut self, value: f64) {
        self.add_with_count(value, 1.0);
    }

    /// Records `value` `count` times. Non-finite values and non-positive counts
    /// are ignored.
    pub fn add_with_count(&mut self, value: f64, count: f64) {
        if !value.is_finite() || !(count > 0.0) {
            return;
        }
        let min = self.mapping.min_indexable_value();
        let max = self.mapping.max_indexable_value();
        if value > min {
            let index = self.mapping.index(value.min(max));
            self.positive.add(index, count);
        } else if value < -min {
            let index = self.mapping.index((-value).min(max));
            self.negative.add(index, count);
        } else {
            self.zero_count += count;
        }
    }

    #[must_use]
    pub fn count(&self) -> f64 {
        self.zero_count + self.positive.total_count() + self.negative.total_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zero_count == 0.0 && self.positive.is_empty() && self.negative.is_empty()
    }

    /// Approximate sum of every recorded value.
    #[must_use]
    pub fn sum(&self) -> f64 {
        let positive: f64 = self
            .positive
            .bins()
            .map(|(index, count)| self.mapping.value(index) * count)
            .sum();
        let negative: f64 = self
            .negative
            .bins()
            .map(|(index, count)| self.mapping.value(index) * count)
            .sum();
        positive - negative
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        if let Some(index) = self.negative.max_index() {
            return Some(-self.mapping.value(index));
        }
        if self.zero_count > 0.0 {
            return Some(0.0);
        }
        self.positive.min_index().map(|index| self.mapping.value(index))
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        if let Some(index) = self.positive.max_index() {
            return Some(self.mapping.value(index));
        }
        if self.zero_count > 0.0 {
            return Some(0.0);
        }
        self.negative.min_index().map(|index| -self.mapping.value(index))
    }

    /// Value at quantile `q` (`0.0..=1.0`), or `None` for an empty sketch.
    #[must_use]
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if !(0.0..=1.0).contains(&q) || self.is_empty() {
            return None;
        }

        let rank = q * (self.count() - 1.0);
        let mut seen = 0.0;

        for (index, count) in self.negative.bins().rev() {
            seen += count;
            if seen > rank {
                return Some(-self.mapping.value(index));
            }
        }

        seen += self.zero_count;
        if seen > rank {
            return Some(0.0);
        }

        for (index, count) in self.positive.bins() {
            seen += count;
            if seen > rank {
                return Some(self.mapping.value(index));
            }
        }

        self.max()
    }

    /// Folds `other` into this sketch.
    ///
    /// # Errors
    /// Returns [`SketchError::MappingMismatch`] when the two sketches were built
    /// with different index mappings.
    pub fn merge(&mut self, other: &DDSketch) -> Result<(), SketchError> {
        if self.mapping != other.mapping {
            return Err(SketchError::MappingMismatch);
        }
        self.positive.merge(&other.positive);
        self.negative.merge(&other.negative);
        self.zero_count += other.zero_count;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.positive.clear();
        self.negative.clear();
        self.zero_count = 0.0;
    }

    #[must_use]
    pub fn to_proto(&self) -> pb::DdSketch {
        pb::DdSketch {
            mapping: Some(pb::IndexMapping {
                gamma: self.mapping.gamma(),
                index_offset: self.mapping.index_offset(),
                interpolation: pb::Interpolation::None as i32,
            }),
            positive_values: Some(store_to_proto(&self.positive)),
            negative_values: Some(store_to_proto(&self.negative)),
            zero_count: self.zero_count,
        }
    }

    /// Protobuf encoding consumed by the agent.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    /// Rebuilds a sketch from its protobuf encoding.
    ///
    /// # Errors
    /// Fails when the bytes are not a valid sketch message or carry an invalid
    /// index mapping.
    pub fn decode(bytes: &[u8]) -> Result<Self, SketchError> {
        let proto = pb::DdSketch::decode(bytes)?;
        Self::from_proto(proto)
    }

    /// # Errors
    /// Fails when the message has no mapping, the mapping is invalid, or a
    /// store holds a bin index the mapping can never produce.
    pub fn from_proto(proto: pb::DdSketch) -> Result<Self, SketchError> {
        let mapping = proto.mapping.ok_or(SketchError::MissingMapping)?;
        let mapping = LogIndexMapping::new(mapping.gamma, mapping.index_offset)?;
        let mut sketch = DDSketch::new(mapping);
        if let Some(store) = proto.positive_values {
            sketch.positive = store_from_proto(store, &mapping)?;
        }
        if let Some(store) = proto.negative_values {
            sketch.negative = store_from_proto(store, &mapping)?;
        }
        if proto.zero_count > 0.0 {
            sketch.zero_count = proto.zero_count;
        }
        Ok(sketch)
    }
}

impl Default for DDSketch {
    fn default() -> Self {
        Self::new(LogIndexMapping::agent())
    }
}

fn store_to_proto(store: &DenseStore) -> pb::Store {
    pb::Store {
        bin_counts: Default::default(),
        contiguous_bin_counts: store.counts().to_vec(),
        contiguous_bin_index_offset: store.offset(),
    }
}

// Bins are bounded by the mapping's index range so a hostile payload cannot
// make the dense store span the whole i32 range.
fn store_from_proto(
    proto: pb::Store,
    mapping: &LogIndexMapping,
) -> Result<DenseStore, SketchError> {
    let (min, max) = mapping.index_range();
    let check = |index: i64| {
        if index < i64::from(min) || index > i64::from(max) {
            Err(SketchError::IndexOutOfRange(index))
        } else {
            Ok(())
        }
    };

    if let Some(last) = proto.contiguous_bin_counts.len().checked_sub(1) {
        let offset = i64::from(proto.contiguous_bin_index_offset);
        check(offset)?;
        check(offset.saturating_add(i64::try_from(last).unwrap_or(i64::MAX)))?;
    }
    for index in proto.bin_counts.keys() {
        check(i64::from(*index))?;
    }

    let mut store = DenseStore::from_contiguous(
        proto.contiguous_bin_index_offset,
        proto.contiguous_bin_counts,
    );
    for (index, count) in proto.bin_counts {
        store.add(index, count);
    }
    Ok(store)
}
