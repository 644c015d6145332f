//! Core types for recollect
//!
//! A conversation is an ordered sequence of messages. Knowledge extracted
//! from message text (entities, topics, actions, tags) is stored as
//! *semantic references*, each grounded in a text range within the
//! conversation. Queries resolve to scored ordinals of semantic refs or
//! messages.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dense, non-negative identifier of a semantic reference
pub type SemanticRefOrdinal = u32;

/// Dense, non-negative identifier of a message
pub type MessageOrdinal = u32;

/// The closed set of knowledge kinds extracted from conversations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeType {
    Entity,
    Topic,
    Action,
    Tag,
}

impl std::fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KnowledgeType::Entity => write!(f, "entity"),
            KnowledgeType::Topic => write!(f, "topic"),
            KnowledgeType::Action => write!(f, "action"),
            KnowledgeType::Tag => write!(f, "tag"),
        }
    }
}

/// A named facet of an entity, e.g. `color: blue` on a `car` entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub name: String,
    pub value: String,
}

/// An entity mentioned in a conversation, with optional typed facets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteEntity {
    pub name: String,
    /// Entity types, e.g. `["book", "media"]`
    #[serde(default)]
    pub type_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Vec<Facet>>,
}

/// A topic of discussion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub text: String,
}

/// An action relating a subject to an object, e.g. "Alice sent the draft"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub verbs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indirect_object: Option<String>,
}

/// A structured tag attached to a span of conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub text: String,
}

/// Knowledge payload of a semantic reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Knowledge {
    Entity(ConcreteEntity),
    Topic(Topic),
    Action(Action),
    Tag(Tag),
}

impl Knowledge {
    pub fn knowledge_type(&self) -> KnowledgeType {
        match self {
            Knowledge::Entity(_) => KnowledgeType::Entity,
            Knowledge::Topic(_) => KnowledgeType::Topic,
            Knowledge::Action(_) => KnowledgeType::Action,
            Knowledge::Tag(_) => KnowledgeType::Tag,
        }
    }
}

/// A position within a conversation
///
/// `chunk_ordinal` and `char_offset` refine the position inside the message;
/// both default to 0, which keeps ordering well defined for message-level
/// locations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TextLocation {
    pub message_ordinal: MessageOrdinal,
    #[serde(default)]
    pub chunk_ordinal: u32,
    #[serde(default)]
    pub char_offset: u32,
}

impl TextLocation {
    pub fn new(message_ordinal: MessageOrdinal) -> Self {
        Self {
            message_ordinal,
            chunk_ordinal: 0,
            char_offset: 0,
        }
    }
}

/// A span of conversation text
///
/// `end` is exclusive; `None` means a single-point range at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: TextLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<TextLocation>,
}

impl TextRange {
    pub fn new(start: TextLocation, end: Option<TextLocation>) -> Self {
        Self { start, end }
    }

    /// Point range covering a single message
    pub fn for_message(message_ordinal: MessageOrdinal) -> Self {
        Self {
            start: TextLocation::new(message_ordinal),
            end: None,
        }
    }

    /// True iff this range contains `inner`.
    ///
    /// An endless outer range contains any inner range starting at or after
    /// it within the same message. A bounded outer range must start at or
    /// before the inner range and end strictly after the inner range's end
    /// (or start, for point ranges).
    pub fn contains(&self, inner: &TextRange) -> bool {
        if self.start > inner.start {
            return false;
        }
        match self.end {
            None => self.start.message_ordinal == inner.start.message_ordinal,
            Some(end) => end > inner.end.unwrap_or(inner.start),
        }
    }
}

/// An extracted knowledge object grounded in a conversation span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticRef {
    pub semantic_ref_ordinal: SemanticRefOrdinal,
    pub range: TextRange,
    pub knowledge: Knowledge,
}

impl SemanticRef {
    pub fn knowledge_type(&self) -> KnowledgeType {
        self.knowledge.knowledge_type()
    }
}

/// Half-open interval of timestamps; `end: None` means "from `start` onward"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// An inverted range can never match and is rejected at compile time.
    pub fn is_inverted(&self) -> bool {
        matches!(self.end, Some(end) if end < self.start)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && self.end.map_or(true, |end| ts <= end)
    }
}

/// A semantic-ref ordinal with its match score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredSemanticRefOrdinal {
    pub semantic_ref_ordinal: SemanticRefOrdinal,
    pub score: f64,
}

impl ScoredSemanticRefOrdinal {
    pub fn new(semantic_ref_ordinal: SemanticRefOrdinal, score: f64) -> Self {
        Self {
            semantic_ref_ordinal,
            score,
        }
    }
}

/// A message ordinal with its match score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredMessageOrdinal {
    pub message_ordinal: MessageOrdinal,
    pub score: f64,
}

impl ScoredMessageOrdinal {
    pub fn new(message_ordinal: MessageOrdinal, score: f64) -> Self {
        Self {
            message_ordinal,
            score,
        }
    }
}

/// A timestamped text range returned by the timestamp index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedTextRange {
    pub timestamp: DateTime<Utc>,
    pub range: TextRange,
}

/// A single message of a conversation, as the engine sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConversationMessage {
    /// Message text, pre-split into chunks by the ingest pipeline
    pub text_chunks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ConversationMessage {
    /// Total character length across chunks, used for char budgeting
    pub fn char_len(&self) -> usize {
        self.text_chunks.iter().map(|c| c.chars().count()).sum()
    }
}

/// Per-knowledge-type search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SemanticRefSearchResult {
    /// Texts of the search terms that contributed matches
    pub term_matches: HashSet<String>,
    /// Matched semantic refs, descending by score
    pub semantic_ref_matches: Vec<ScoredSemanticRefOrdinal>,
}

/// Results of a knowledge search, grouped by knowledge type
pub type KnowledgeSearchResults = HashMap<KnowledgeType, SemanticRefSearchResult>;
