// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Contiguous bin counts starting at `offset`.
///
/// The layout matches the `contiguousBinCounts` / `contiguousBinIndexOffset`
/// pair of the wire format so encoding is a straight copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DenseStore {
    counts: Vec<f64>,
    offset: i32,
}

impl DenseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_contiguous(offset: i32, counts: Vec<f64>) -> Self {
        let mut store = Self { counts, offset };
        store.trim();
        store
    }

    pub fn add(&mut self, index: i32, count: f64) {
        if count <= 0.0 || !count.is_finite() {
            return;
        }
        if self.counts.is_empty() {
            self.counts.push(count);
            self.offset = index;
            return;
        }

        if index < self.offset {
            let shift = (i64::from(self.offset) - i64::from(index)) as usize;
            let mut counts = vec![0.0; shift + self.counts.len()];
            counts[shift..].copy_from_slice(&self.counts);
            self.counts = counts;
            self.offset = index;
        }

        let position = (i64::from(index) - i64::from(self.offset)) as usize;
        if position >= self.counts.len() {
            self.counts.resize(position + 1, 0.0);
        }
        self.counts[position] += count;
    }

    pub fn merge(&mut self, other: &DenseStore) {
        for (index, count) in other.bins() {
            self.add(index, count);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    #[must_use]
    pub fn total_count(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Non-empty bins in ascending index order.
    pub fn bins(&self) -> impl DoubleEndedIterator<Item = (i32, f64)> + '_ {
        let offset = self.offset;
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0.0)
            .map(move |(position, count)| (offset + position as i32, *count))
    }

    #[must_use]
    pub fn min_index(&self) -> Option<i32> {
        self.bins().next().map(|(index, _)| index)
    }

    #[must_use]
    pub fn max_index(&self) -> Option<i32> {
        self.bins().next_back().map(|(index, _)| index)
    }

    #[must_use]
    pub fn offset(&self) -> i32 {
        self.offset
    }

    #[must_use]
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.offset = 0;
    }

    // Drops leading and trailing empty bins coming from a decoded payload.
    fn trim(&mut self) {
        let Some(first) = self.counts.iter().position(|c| *c > 0.0) else {
            self.clear();
            return;
        };
        let last = self.counts.iter().rposition(|c| *c > 0.0).unwrap_or(first);
        self.counts.truncate(last + 1);
        self.counts.drain(..first);
        self.offset += first as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_grows_in_both_directions() {
        let mut store = DenseStore::new();
        store.add(10, 1.0);
        store.add(7, 2.0);
        store.add(12, 3.0);
        store.add(10, 1.0);

        assert_eq!(store.offset(), 7);
        assert_eq!(store.counts(), &[2.0, 0.0, 0.0, 2.0, 0.0, 3.0]);
        assert_eq!(store.total_count(), 7.0);
        assert_eq!(store.min_index(), Some(7));
        assert_eq!(store.max_index(), Some(12));
    }

    #[test]
    fn ignores_non_positive_counts() {
        let mut store = DenseStore::new();
        store.add(3, 0.0);
        store.add(3, -1.0);
        assert!(store.is_empty());
    }

    #[test]
    fn merge_sums_counts() {
        let mut a = DenseStore::new();
        a.add(1, 1.0);
        a.add(5, 1.0);
        let mut b = DenseStore::new();
        b.add(-2, 4.0);
        b.add(5, 2.0);

        a.merge(&b);
        let bins: Vec<_> = a.bins().collect();
        assert_eq!(bins, vec![(-2, 4.0), (1, 1.0), (5, 3.0)]);
    }

    #[test]
    fn from_contiguous_trims_empty_edges() {
        let store = DenseStore::from_contiguous(4, vec![0.0, 0.0, 1.0, 0.0, 2.0, 0.0]);
        assert_eq!(store.offset(), 6);
        assert_eq!(store.counts(), &[1.0, 0.0, 2.0]);

        let empty = DenseStore::from_contiguous(4, vec![0.0, 0.0]);
        assert!(empty.is_empty());
    }
}
