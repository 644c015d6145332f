//! Text-range scoping
//!
//! A scope restricts which parts of a conversation a query may match.
//! Each scope *selector* (fixed ranges, a date range, matched messages)
//! produces one [`TextRangeCollection`]; a candidate range is in scope only
//! when every collection accepts it. Within one collection, any containing
//! range suffices.

use serde::{Deserialize, Serialize};

use crate::types::TextRange;

/// An ordered collection of text ranges, kept sorted by range start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRangeCollection {
    ranges: Vec<TextRange>,
}

impl TextRangeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from unordered ranges; sorts by start.
    pub fn from_ranges(mut ranges: Vec<TextRange>) -> Self {
        ranges.sort_by(|a, b| a.start.cmp(&b.start));
        Self { ranges }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Insert a range, preserving start order.
    pub fn add_range(&mut self, range: TextRange) {
        let pos = self.ranges.partition_point(|r| r.start <= range.start);
        self.ranges.insert(pos, range);
    }

    pub fn add_ranges(&mut self, ranges: impl IntoIterator<Item = TextRange>) {
        for range in ranges {
            self.add_range(range);
        }
    }

    /// True iff some stored range contains `inner`.
    pub fn is_in_range(&self, inner: &TextRange) -> bool {
        // Only ranges starting at or before `inner` can contain it; walk the
        // sorted prefix backwards from the insertion point.
        let upper = self.ranges.partition_point(|r| r.start <= inner.start);
        self.ranges[..upper].iter().rev().any(|r| r.contains(inner))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextRange> {
        self.ranges.iter()
    }
}

/// Conjunction of per-selector range collections
///
/// Empty means "no scope restriction": every range is in scope.
#[derive(Debug, Clone, Default)]
pub struct TextRangesInScope {
    collections: Vec<TextRangeCollection>,
}

impl TextRangesInScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collection(&mut self, collection: TextRangeCollection) {
        self.collections.push(collection);
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// A range is in scope iff every selector's collection accepts it.
    pub fn is_range_in_scope(&self, inner: &TextRange) -> bool {
        self.collections.iter().all(|c| c.is_in_range(inner))
    }
}
