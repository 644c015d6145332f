//! External collaborator interfaces
//!
//! The engine evaluates queries against index and collection adapters the
//! host supplies: term and property indices over semantic refs, a timestamp
//! index, the message and semantic-ref collections, and the related-term
//! indices (exact aliases plus an embedding-backed fuzzy index). All are
//! read-only during a query and every call is a suspension point.
//!
//! Adapters report failures with their own error types; the engine wraps
//! them as [`RecollectError::Upstream`](crate::error::RecollectError),
//! naming the operator that observed the failure. A lookup miss is
//! `Ok(None)` / empty, never an error.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::term::Term;
use crate::types::{
    ConversationMessage, DateRange, MessageOrdinal, ScoredMessageOrdinal,
    ScoredSemanticRefOrdinal, SemanticRef, SemanticRefOrdinal, TimestampedTextRange,
};

/// Adapter result type; errors are boxed and wrapped by the engine.
pub type AdapterResult<T> = std::result::Result<T, crate::error::ExternalError>;

/// Term text -> scored semantic-ref ordinals
///
/// Contract: results sorted ascending by ordinal; `None` is equivalent to
/// an empty result. Callers pass prepared (trimmed, case-folded) text.
#[async_trait]
pub trait TermToSemanticRefIndex: Send + Sync {
    async fn lookup_term(&self, text: &str) -> AdapterResult<Option<Vec<ScoredSemanticRefOrdinal>>>;
}

/// `(property name, value)` -> scored semantic-ref ordinals
#[async_trait]
pub trait PropertyToSemanticRefIndex: Send + Sync {
    async fn lookup_property(
        &self,
        property_name: &str,
        value: &str,
    ) -> AdapterResult<Option<Vec<ScoredSemanticRefOrdinal>>>;
}

/// Date range -> text ranges of messages timestamped within it
#[async_trait]
pub trait TimestampToTextRangeIndex: Send + Sync {
    async fn lookup_range(&self, date_range: &DateRange)
        -> AdapterResult<Vec<TimestampedTextRange>>;
}

/// Read-only access to the semantic-ref collection
#[async_trait]
pub trait SemanticRefCollection: Send + Sync {
    /// `None` for an ordinal outside the collection; the engine treats that
    /// as data corruption.
    async fn get(&self, ordinal: SemanticRefOrdinal) -> AdapterResult<Option<SemanticRef>>;

    /// Batch get preserving input order.
    async fn get_many(&self, ordinals: &[SemanticRefOrdinal]) -> AdapterResult<Vec<SemanticRef>>;
}

/// Read-only access to the message collection
#[async_trait]
pub trait MessageCollection: Send + Sync {
    async fn get(&self, ordinal: MessageOrdinal) -> AdapterResult<Option<ConversationMessage>>;

    /// Length of the largest prefix of `ordered_ordinals` whose summed
    /// message char length stays within `max_chars`.
    async fn count_in_char_budget(
        &self,
        ordered_ordinals: &[MessageOrdinal],
        max_chars: usize,
    ) -> AdapterResult<usize>;
}

/// Similarity index over message text
#[async_trait]
pub trait MessageTextIndex: Send + Sync {
    async fn lookup_messages(
        &self,
        query_text: &str,
        max_matches: Option<usize>,
        min_score: Option<f64>,
    ) -> AdapterResult<Vec<ScoredMessageOrdinal>>;

    /// Like [`lookup_messages`], restricted to the given ordinals.
    ///
    /// [`lookup_messages`]: MessageTextIndex::lookup_messages
    async fn lookup_messages_in_subset(
        &self,
        query_text: &str,
        ordinals: &[MessageOrdinal],
        max_matches: Option<usize>,
        min_score: Option<f64>,
    ) -> AdapterResult<Vec<ScoredMessageOrdinal>>;
}

/// Exact alias index: term text -> curated related terms
#[async_trait]
pub trait TermToRelatedTerms: Send + Sync {
    /// Batch lookup; the map only contains entries for texts with aliases.
    async fn lookup_terms(&self, texts: &[String]) -> AdapterResult<HashMap<String, Vec<Term>>>;
}

/// Embedding-backed fuzzy related-term index
#[async_trait]
pub trait TermToRelatedTermsFuzzy: Send + Sync {
    /// Batch lookup; the outer vec is parallel to `texts`.
    async fn lookup_terms(
        &self,
        texts: &[String],
        max_matches: Option<usize>,
        min_score: Option<f64>,
    ) -> AdapterResult<Vec<Vec<Term>>>;
}

/// Read-only view over everything a query runs against
///
/// Required pieces are the message and semantic-ref collections and the
/// term index; the rest are optional secondary indices. A missing optional
/// index behaves as a lookup miss, never an error.
#[derive(Clone, Copy)]
pub struct Conversation<'a> {
    pub messages: &'a dyn MessageCollection,
    pub semantic_refs: &'a dyn SemanticRefCollection,
    pub semantic_ref_index: &'a dyn TermToSemanticRefIndex,
    pub property_index: Option<&'a dyn PropertyToSemanticRefIndex>,
    pub timestamp_index: Option<&'a dyn TimestampToTextRangeIndex>,
    pub message_index: Option<&'a dyn MessageTextIndex>,
    pub related_terms: Option<&'a dyn TermToRelatedTerms>,
    pub fuzzy_index: Option<&'a dyn TermToRelatedTermsFuzzy>,
}

impl<'a> Conversation<'a> {
    pub fn new(
        messages: &'a dyn MessageCollection,
        semantic_refs: &'a dyn SemanticRefCollection,
        semantic_ref_index: &'a dyn TermToSemanticRefIndex,
    ) -> Self {
        Self {
            messages,
            semantic_refs,
            semantic_ref_index,
            property_index: None,
            timestamp_index: None,
            message_index: None,
            related_terms: None,
            fuzzy_index: None,
        }
    }

    pub fn with_property_index(mut self, index: &'a dyn PropertyToSemanticRefIndex) -> Self {
        self.property_index = Some(index);
        self
    }

    pub fn with_timestamp_index(mut self, index: &'a dyn TimestampToTextRangeIndex) -> Self {
        self.timestamp_index = Some(index);
        self
    }

    pub fn with_message_index(mut self, index: &'a dyn MessageTextIndex) -> Self {
        self.message_index = Some(index);
        self
    }

    pub fn with_related_terms(mut self, index: &'a dyn TermToRelatedTerms) -> Self {
        self.related_terms = Some(index);
        self
    }

    pub fn with_fuzzy_index(mut self, index: &'a dyn TermToRelatedTermsFuzzy) -> Self {
        self.fuzzy_index = Some(index);
        self
    }
}
