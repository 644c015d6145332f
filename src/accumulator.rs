//! Score-combining accumulators
//!
//! A [`MatchAccumulator`] is a keyed multiset of [`Match`] records: exact
//! hits add into `score`, related-term hits add into `related_score`, and
//! boolean operators combine whole accumulators by union or intersection.
//! [`SemanticRefAccumulator`] and [`MessageAccumulator`] specialize the
//! machinery for semantic-ref and message ordinals.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::ranker::smooth_score;
use crate::term::Term;
use crate::types::{
    MessageOrdinal, ScoredMessageOrdinal, ScoredSemanticRefOrdinal, SemanticRef,
    SemanticRefOrdinal,
};

/// A matched value with its accumulated hit counts and scores
///
/// A match exists only while `hit_count >= 1`; accumulators never store
/// zero-hit entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<T> {
    pub value: T,
    pub hit_count: u32,
    pub score: f64,
    pub related_hit_count: u32,
    pub related_score: f64,
}

impl<T> Match<T> {
    fn exact(value: T, score: f64) -> Self {
        Self {
            value,
            hit_count: 1,
            score,
            related_hit_count: 0,
            related_score: 0.0,
        }
    }

    fn related(value: T, score: f64) -> Self {
        Self {
            value,
            hit_count: 1,
            score: 0.0,
            related_hit_count: 1,
            related_score: score,
        }
    }
}

/// Generic accumulator keyed by a hashable value type
#[derive(Debug, Clone)]
pub struct MatchAccumulator<T: Eq + Hash + Copy> {
    matches: HashMap<T, Match<T>>,
}

impl<T: Eq + Hash + Copy> Default for MatchAccumulator<T> {
    fn default() -> Self {
        Self {
            matches: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Copy> MatchAccumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn has(&self, value: T) -> bool {
        self.matches.contains_key(&value)
    }

    pub fn get(&self, value: T) -> Option<&Match<T>> {
        self.matches.get(&value)
    }

    /// Insert or replace a match record wholesale.
    pub fn set_match(&mut self, m: Match<T>) {
        self.matches.insert(m.value, m);
    }

    /// Record an exact hit: first sighting inserts a fresh match, later
    /// sightings bump the hit count and add to the score.
    pub fn add_exact(&mut self, value: T, score: f64) {
        match self.matches.entry(value) {
            Entry::Vacant(slot) => {
                slot.insert(Match::exact(value, score));
            }
            Entry::Occupied(mut slot) => {
                let m = slot.get_mut();
                m.hit_count += 1;
                m.score += score;
            }
        }
    }

    /// Record a related-term hit. The first sighting still counts as a hit
    /// so the value stays reachable; the related contribution accumulates
    /// separately and is folded in by [`calculate_total_score`].
    ///
    /// [`calculate_total_score`]: MatchAccumulator::calculate_total_score
    pub fn add_related(&mut self, value: T, score: f64) {
        match self.matches.entry(value) {
            Entry::Vacant(slot) => {
                slot.insert(Match::related(value, score));
            }
            Entry::Occupied(mut slot) => {
                let m = slot.get_mut();
                m.related_hit_count += 1;
                m.related_score += score;
            }
        }
    }

    /// Max-merge add used for message projection: keep the best score seen
    /// while counting how many times the value was reached.
    pub fn add_max(&mut self, value: T, score: f64) {
        match self.matches.entry(value) {
            Entry::Vacant(slot) => {
                slot.insert(Match::exact(value, score));
            }
            Entry::Occupied(mut slot) => {
                let m = slot.get_mut();
                m.hit_count += 1;
                if score > m.score {
                    m.score = score;
                }
            }
        }
    }

    /// Union: copy absent keys, sum all four fields on collisions.
    pub fn add_union(&mut self, other: MatchAccumulator<T>) {
        for (value, incoming) in other.matches {
            match self.matches.entry(value) {
                Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
                Entry::Occupied(mut slot) => {
                    let m = slot.get_mut();
                    m.hit_count += incoming.hit_count;
                    m.score += incoming.score;
                    m.related_hit_count += incoming.related_hit_count;
                    m.related_score += incoming.related_score;
                }
            }
        }
    }

    /// Intersection: keep keys present in both sides, summing all fields.
    pub fn intersect(&self, other: &MatchAccumulator<T>) -> MatchAccumulator<T> {
        let mut result = MatchAccumulator::new();
        for (value, left) in &self.matches {
            if let Some(right) = other.matches.get(value) {
                result.set_match(Match {
                    value: *value,
                    hit_count: left.hit_count + right.hit_count,
                    score: left.score + right.score,
                    related_hit_count: left.related_hit_count + right.related_hit_count,
                    related_score: left.related_score + right.related_score,
                });
            }
        }
        result
    }

    /// Fold smoothed related contributions into the primary score.
    ///
    /// The related fields are consumed (zeroed) once folded, which makes
    /// this idempotent: booleans score their result and a later top-N
    /// selection may score again without double counting.
    pub fn calculate_total_score(&mut self) {
        self.calculate_total_score_with(|m| {
            m.score += smooth_score(m.related_score, m.related_hit_count);
            m.related_score = 0.0;
            m.related_hit_count = 0;
        });
    }

    /// Apply a custom scorer to every match.
    pub fn calculate_total_score_with(&mut self, scorer: impl Fn(&mut Match<T>)) {
        for m in self.matches.values_mut() {
            scorer(m);
        }
    }

    /// Matches with `hit_count >= min_hit_count`, descending by score.
    /// Ties break arbitrarily.
    pub fn get_sorted_by_score(&self, min_hit_count: u32) -> Vec<Match<T>> {
        let mut matched: Vec<Match<T>> = self
            .matches
            .values()
            .filter(|m| m.hit_count >= min_hit_count)
            .copied()
            .collect();
        matched.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        matched
    }

    /// Combine scores, keep the best `max_matches` entries with at least
    /// `min_hit_count` hits. `None` means no limit. Mutates in place.
    pub fn select_top_n_scoring(&mut self, max_matches: Option<usize>, min_hit_count: u32) {
        self.calculate_total_score();
        let mut sorted = self.get_sorted_by_score(min_hit_count);
        if let Some(max) = max_matches {
            sorted.truncate(max);
        }
        self.matches = sorted.into_iter().map(|m| (m.value, m)).collect();
    }

    /// Keep only matches with `hit_count >= min_hit_count`.
    pub fn select_with_hit_count(&mut self, min_hit_count: u32) {
        self.matches.retain(|_, m| m.hit_count >= min_hit_count);
    }

    /// Largest hit count over all entries; 0 when empty.
    pub fn get_max_hit_count(&self) -> u32 {
        self.matches.values().map(|m| m.hit_count).max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Match<T>> {
        self.matches.values()
    }

    pub fn values(&self) -> impl Iterator<Item = T> + '_ {
        self.matches.keys().copied()
    }

    pub fn clear(&mut self) {
        self.matches.clear();
    }
}

/// Accumulator over semantic-ref ordinals, tracking contributing term texts
#[derive(Debug, Clone, Default)]
pub struct SemanticRefAccumulator {
    pub matches: MatchAccumulator<SemanticRefOrdinal>,
    /// Texts of the search terms that produced matches
    pub search_term_matches: HashSet<String>,
}

impl SemanticRefAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Add scored ordinals matched by `term`, weighted by the term weight
    /// (or `weight_override` when the term carries none).
    pub fn add_term_matches(
        &mut self,
        term: &Term,
        scored_ordinals: impl IntoIterator<Item = ScoredSemanticRefOrdinal>,
        is_exact_match: bool,
        weight_override: Option<f64>,
    ) {
        let weight = term.weight.or(weight_override).unwrap_or(1.0);
        for scored in scored_ordinals {
            let score = scored.score * weight;
            if is_exact_match {
                self.matches.add_exact(scored.semantic_ref_ordinal, score);
            } else {
                self.matches.add_related(scored.semantic_ref_ordinal, score);
            }
        }
        self.search_term_matches.insert(term.text.clone());
    }

    /// Like [`add_term_matches`], but only for ordinals not already present.
    /// Used by related-term expansion so a related term cannot re-count a
    /// value its primary already matched.
    ///
    /// [`add_term_matches`]: SemanticRefAccumulator::add_term_matches
    pub fn add_term_matches_if_new(
        &mut self,
        term: &Term,
        scored_ordinals: impl IntoIterator<Item = ScoredSemanticRefOrdinal>,
        is_exact_match: bool,
        weight_override: Option<f64>,
    ) {
        let weight = term.weight.or(weight_override).unwrap_or(1.0);
        let mut matched_any = false;
        for scored in scored_ordinals {
            if self.matches.has(scored.semantic_ref_ordinal) {
                continue;
            }
            let score = scored.score * weight;
            if is_exact_match {
                self.matches.add_exact(scored.semantic_ref_ordinal, score);
            } else {
                self.matches.add_related(scored.semantic_ref_ordinal, score);
            }
            matched_any = true;
        }
        if matched_any {
            self.search_term_matches.insert(term.text.clone());
        }
    }

    /// Union with another accumulator, merging contributing term texts.
    pub fn add_union(&mut self, other: SemanticRefAccumulator) {
        self.matches.add_union(other.matches);
        self.search_term_matches.extend(other.search_term_matches);
    }

    /// Intersect with another accumulator. Term texts union: a surviving key
    /// was reached by both sides' terms.
    pub fn intersect(&self, other: &SemanticRefAccumulator) -> SemanticRefAccumulator {
        let mut term_matches = self.search_term_matches.clone();
        term_matches.extend(other.search_term_matches.iter().cloned());
        SemanticRefAccumulator {
            matches: self.matches.intersect(&other.matches),
            search_term_matches: term_matches,
        }
    }

    pub fn calculate_total_score(&mut self) {
        self.matches.calculate_total_score();
    }

    pub fn select_with_hit_count(&mut self, min_hit_count: u32) {
        self.matches.select_with_hit_count(min_hit_count);
    }

    pub fn get_max_hit_count(&self) -> u32 {
        self.matches.get_max_hit_count()
    }

    pub fn select_top_n_scoring(&mut self, max_matches: Option<usize>, min_hit_count: u32) {
        self.matches.select_top_n_scoring(max_matches, min_hit_count);
    }

    /// Project to scored ordinals, descending by score.
    pub fn to_scored_ordinals(&self) -> Vec<ScoredSemanticRefOrdinal> {
        self.matches
            .get_sorted_by_score(0)
            .into_iter()
            .map(|m| ScoredSemanticRefOrdinal::new(m.value, m.score))
            .collect()
    }
}

/// Accumulator over message ordinals
#[derive(Debug, Clone, Default)]
pub struct MessageAccumulator {
    pub matches: MatchAccumulator<MessageOrdinal>,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Max-merge add: see [`MatchAccumulator::add_max`].
    pub fn add_max(&mut self, ordinal: MessageOrdinal, score: f64) {
        self.matches.add_max(ordinal, score);
    }

    /// Add every message the semantic ref's range spans: inclusive start,
    /// exclusive end; a point range touches its start message only.
    pub fn add_from_semantic_ref(&mut self, semantic_ref: &SemanticRef, score: f64) {
        let start = semantic_ref.range.start.message_ordinal;
        match semantic_ref.range.end {
            Some(end) => {
                for ordinal in start..end.message_ordinal {
                    self.add_max(ordinal, score);
                }
            }
            None => self.add_max(start, score),
        }
    }

    /// Replace each score with its smoothed value over the hit count.
    pub fn smooth_scores(&mut self) {
        self.matches
            .calculate_total_score_with(|m| m.score = smooth_score(m.score, m.hit_count));
    }

    pub fn select_with_hit_count(&mut self, min_hit_count: u32) {
        self.matches.select_with_hit_count(min_hit_count);
    }

    /// Project to scored ordinals, descending by score.
    pub fn to_scored_ordinals(&self) -> Vec<ScoredMessageOrdinal> {
        self.matches
            .get_sorted_by_score(0)
            .into_iter()
            .map(|m| ScoredMessageOrdinal::new(m.value, m.score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Knowledge, TextLocation, TextRange, Topic};

    fn acc_with(entries: &[(u32, f64)]) -> MatchAccumulator<u32> {
        let mut acc = MatchAccumulator::new();
        for &(value, score) in entries {
            acc.add_exact(value, score);
        }
        acc
    }

    #[test]
    fn test_add_exact_round_trip() {
        let mut acc = MatchAccumulator::new();
        for _ in 0..4 {
            acc.add_exact(7u32, 0.5);
        }
        let m = acc.get(7).unwrap();
        assert_eq!(m.hit_count, 4);
        assert_eq!(m.score, 2.0);
        assert_eq!(m.related_hit_count, 0);
        assert_eq!(m.related_score, 0.0);
    }

    #[test]
    fn test_add_related_first_sighting_counts_as_hit() {
        let mut acc = MatchAccumulator::new();
        acc.add_related(7u32, 0.25);
        let m = acc.get(7).unwrap();
        assert_eq!(m.hit_count, 1);
        assert_eq!(m.score, 0.0);
        assert_eq!(m.related_hit_count, 1);
        assert_eq!(m.related_score, 0.25);

        // Later related hits leave hit_count alone
        acc.add_related(7u32, 0.25);
        let m = acc.get(7).unwrap();
        assert_eq!(m.hit_count, 1);
        assert_eq!(m.related_hit_count, 2);
        assert_eq!(m.related_score, 0.5);
    }

    #[test]
    fn test_union_sums_all_fields() {
        let mut left = acc_with(&[(1, 1.0), (2, 2.0)]);
        let mut right = acc_with(&[(2, 3.0), (3, 4.0)]);
        right.add_related(2, 0.5);
        left.add_union(right);

        assert_eq!(left.len(), 3);
        let m = left.get(2).unwrap();
        assert_eq!(m.hit_count, 2);
        assert_eq!(m.score, 5.0);
        assert_eq!(m.related_hit_count, 1);
        assert_eq!(m.related_score, 0.5);
    }

    #[test]
    fn test_intersect_keeps_common_keys_and_sums() {
        let left = acc_with(&[(1, 1.0), (2, 2.0)]);
        let right = acc_with(&[(2, 3.0), (3, 4.0)]);
        let result = left.intersect(&right);

        assert_eq!(result.len(), 1);
        let m = result.get(2).unwrap();
        assert_eq!(m.hit_count, 2);
        assert_eq!(m.score, 5.0);
    }

    #[test]
    fn test_calculate_total_score_smooths_related() {
        let mut acc = MatchAccumulator::new();
        acc.add_exact(1u32, 0.8);
        acc.add_related(2u32, 0.25);
        acc.calculate_total_score();

        assert_eq!(acc.get(1).unwrap().score, 0.8);
        // One related hit: smoothing is the identity
        assert_eq!(acc.get(2).unwrap().score, 0.25);
    }

    #[test]
    fn test_calculate_total_score_is_idempotent() {
        let mut acc = MatchAccumulator::new();
        acc.add_exact(1u32, 0.8);
        acc.add_related(1u32, 0.4);
        acc.add_related(1u32, 0.4);
        acc.calculate_total_score();
        let once = acc.get(1).unwrap().score;
        acc.calculate_total_score();
        assert_eq!(acc.get(1).unwrap().score, once);
        assert_eq!(acc.get(1).unwrap().related_hit_count, 0);
    }

    #[test]
    fn test_select_top_n_scoring_bounds_and_sorts() {
        let mut acc = acc_with(&[(1, 1.0), (2, 5.0), (3, 3.0), (4, 2.0)]);
        acc.select_top_n_scoring(Some(2), 0);
        assert_eq!(acc.len(), 2);
        assert!(acc.has(2));
        assert!(acc.has(3));
    }

    #[test]
    fn test_select_top_n_none_means_unlimited() {
        let mut acc = acc_with(&[(1, 1.0), (2, 2.0), (3, 3.0)]);
        acc.select_top_n_scoring(None, 0);
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn test_select_with_hit_count() {
        let mut acc = acc_with(&[(1, 1.0), (2, 1.0)]);
        acc.add_exact(2, 1.0);
        acc.select_with_hit_count(2);
        assert!(!acc.has(1));
        assert!(acc.has(2));
        assert_eq!(acc.get_max_hit_count(), 2);
    }

    #[test]
    fn test_max_hit_count_empty() {
        let acc: MatchAccumulator<u32> = MatchAccumulator::new();
        assert_eq!(acc.get_max_hit_count(), 0);
    }

    #[test]
    fn test_add_max_merges_by_maximum() {
        let mut acc = MessageAccumulator::new();
        acc.add_max(9, 0.4);
        acc.add_max(9, 0.9);
        acc.add_max(9, 0.2);
        let m = acc.matches.get(9).unwrap();
        assert_eq!(m.hit_count, 3);
        assert_eq!(m.score, 0.9);
    }

    #[test]
    fn test_add_from_semantic_ref_spans_messages() {
        let sref = SemanticRef {
            semantic_ref_ordinal: 0,
            range: TextRange::new(TextLocation::new(4), Some(TextLocation::new(7))),
            knowledge: Knowledge::Topic(Topic { text: "t".into() }),
        };
        let mut acc = MessageAccumulator::new();
        acc.add_from_semantic_ref(&sref, 1.0);
        let mut ords: Vec<u32> = acc.matches.values().collect();
        ords.sort_unstable();
        assert_eq!(ords, vec![4, 5, 6]);
    }

    #[test]
    fn test_add_from_semantic_ref_point_range() {
        let sref = SemanticRef {
            semantic_ref_ordinal: 0,
            range: TextRange::for_message(11),
            knowledge: Knowledge::Topic(Topic { text: "t".into() }),
        };
        let mut acc = MessageAccumulator::new();
        acc.add_from_semantic_ref(&sref, 0.7);
        assert_eq!(acc.len(), 1);
        assert!(acc.matches.has(11));
    }

    #[test]
    fn test_smooth_scores_uses_hit_count() {
        let mut acc = MessageAccumulator::new();
        acc.add_max(1, 2.0);
        acc.add_max(1, 2.0);
        acc.add_max(1, 2.0);
        acc.smooth_scores();
        let expected = (4.0_f64).ln() * (2.0 / 3.0);
        assert!((acc.matches.get(1).unwrap().score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_semantic_ref_accumulator_records_term_text() {
        let mut acc = SemanticRefAccumulator::new();
        acc.add_term_matches(
            &Term::new("novel"),
            vec![ScoredSemanticRefOrdinal::new(17, 0.8)],
            true,
            None,
        );
        assert!(acc.search_term_matches.contains("novel"));
        assert_eq!(acc.matches.get(17).unwrap().score, 0.8);
    }

    #[test]
    fn test_add_term_matches_if_new_skips_existing() {
        let mut acc = SemanticRefAccumulator::new();
        acc.add_term_matches(
            &Term::new("novel"),
            vec![ScoredSemanticRefOrdinal::new(17, 0.8)],
            true,
            None,
        );
        acc.add_term_matches_if_new(
            &Term::new("novel"),
            vec![
                ScoredSemanticRefOrdinal::new(17, 0.5),
                ScoredSemanticRefOrdinal::new(22, 0.6),
            ],
            false,
            Some(0.5),
        );

        // 17 untouched by the related pass
        let m17 = acc.matches.get(17).unwrap();
        assert_eq!(m17.hit_count, 1);
        assert_eq!(m17.score, 0.8);
        assert_eq!(m17.related_hit_count, 0);

        // 22 entered as related with the override weight
        let m22 = acc.matches.get(22).unwrap();
        assert_eq!(m22.hit_count, 1);
        assert_eq!(m22.score, 0.0);
        assert_eq!(m22.related_score, 0.3);
    }

    #[test]
    fn test_term_weight_beats_override() {
        let mut acc = SemanticRefAccumulator::new();
        acc.add_term_matches(
            &Term::with_weight("book", 0.5),
            vec![ScoredSemanticRefOrdinal::new(1, 1.0)],
            false,
            Some(0.9),
        );
        assert_eq!(acc.matches.get(1).unwrap().related_score, 0.5);
    }

    #[test]
    fn test_intersect_unions_term_texts() {
        let mut left = SemanticRefAccumulator::new();
        left.add_term_matches(
            &Term::new("a"),
            vec![ScoredSemanticRefOrdinal::new(1, 1.0)],
            true,
            None,
        );
        let mut right = SemanticRefAccumulator::new();
        right.add_term_matches(
            &Term::new("b"),
            vec![ScoredSemanticRefOrdinal::new(1, 2.0)],
            true,
            None,
        );
        let result = left.intersect(&right);
        assert!(result.search_term_matches.contains("a"));
        assert!(result.search_term_matches.contains("b"));
        assert_eq!(result.matches.get(1).unwrap().score, 3.0);
    }

    #[test]
    fn test_to_scored_ordinals_descending() {
        let mut acc = SemanticRefAccumulator::new();
        acc.add_term_matches(
            &Term::new("t"),
            vec![
                ScoredSemanticRefOrdinal::new(1, 0.2),
                ScoredSemanticRefOrdinal::new(2, 0.9),
                ScoredSemanticRefOrdinal::new(3, 0.5),
            ],
            true,
            None,
        );
        let scored = acc.to_scored_ordinals();
        let ords: Vec<u32> = scored.iter().map(|s| s.semantic_ref_ordinal).collect();
        assert_eq!(ords, vec![2, 3, 1]);
    }
}
