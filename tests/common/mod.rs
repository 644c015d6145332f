//! In-memory fakes for the external index and collection interfaces
//!
//! Each fake is a hash map with the adapter contract bolted on; the
//! [`ConversationFixture`] bundles one of everything and hands out
//! [`Conversation`] views over it.

#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use recollect::error::ExternalError;
use recollect::interfaces::{
    AdapterResult, Conversation, MessageCollection, MessageTextIndex, PropertyToSemanticRefIndex,
    SemanticRefCollection, TermToRelatedTerms, TermToRelatedTermsFuzzy, TermToSemanticRefIndex,
    TimestampToTextRangeIndex,
};
use recollect::term::Term;
use recollect::types::{
    ConcreteEntity, ConversationMessage, DateRange, Knowledge, MessageOrdinal,
    ScoredMessageOrdinal, ScoredSemanticRefOrdinal, SemanticRef, SemanticRefOrdinal, Tag,
    TextLocation, TextRange, TimestampedTextRange, Topic,
};

#[derive(Default)]
pub struct FakeTermIndex {
    entries: HashMap<String, Vec<ScoredSemanticRefOrdinal>>,
}

impl FakeTermIndex {
    pub fn add(&mut self, text: &str, scored: Vec<(SemanticRefOrdinal, f64)>) {
        let mut scored: Vec<ScoredSemanticRefOrdinal> = scored
            .into_iter()
            .map(|(ordinal, score)| ScoredSemanticRefOrdinal::new(ordinal, score))
            .collect();
        scored.sort_by_key(|s| s.semantic_ref_ordinal);
        self.entries.insert(text.to_string(), scored);
    }
}

#[async_trait]
impl TermToSemanticRefIndex for FakeTermIndex {
    async fn lookup_term(
        &self,
        text: &str,
    ) -> AdapterResult<Option<Vec<ScoredSemanticRefOrdinal>>> {
        Ok(self.entries.get(text).cloned())
    }
}

/// Term index whose every lookup fails; for upstream-error tests
pub struct FailingTermIndex;

#[async_trait]
impl TermToSemanticRefIndex for FailingTermIndex {
    async fn lookup_term(
        &self,
        _text: &str,
    ) -> AdapterResult<Option<Vec<ScoredSemanticRefOrdinal>>> {
        Err(ExternalError::from("index unavailable"))
    }
}

#[derive(Default)]
pub struct FakePropertyIndex {
    entries: HashMap<(String, String), Vec<ScoredSemanticRefOrdinal>>,
}

impl FakePropertyIndex {
    pub fn add(&mut self, name: &str, value: &str, scored: Vec<(SemanticRefOrdinal, f64)>) {
        self.entries.insert(
            (name.to_string(), value.to_string()),
            scored
                .into_iter()
                .map(|(ordinal, score)| ScoredSemanticRefOrdinal::new(ordinal, score))
                .collect(),
        );
    }
}

#[async_trait]
impl PropertyToSemanticRefIndex for FakePropertyIndex {
    async fn lookup_property(
        &self,
        property_name: &str,
        value: &str,
    ) -> AdapterResult<Option<Vec<ScoredSemanticRefOrdinal>>> {
        Ok(self
            .entries
            .get(&(property_name.to_string(), value.to_string()))
            .cloned())
    }
}

#[derive(Default)]
pub struct FakeSemanticRefs {
    refs: Vec<SemanticRef>,
}

impl FakeSemanticRefs {
    pub fn push(&mut self, sref: SemanticRef) {
        assert_eq!(
            sref.semantic_ref_ordinal as usize,
            self.refs.len(),
            "ordinals must be dense"
        );
        self.refs.push(sref);
    }
}

#[async_trait]
impl SemanticRefCollection for FakeSemanticRefs {
    async fn get(&self, ordinal: SemanticRefOrdinal) -> AdapterResult<Option<SemanticRef>> {
        Ok(self.refs.get(ordinal as usize).cloned())
    }

    async fn get_many(&self, ordinals: &[SemanticRefOrdinal]) -> AdapterResult<Vec<SemanticRef>> {
        let mut out = Vec::with_capacity(ordinals.len());
        for ordinal in ordinals {
            match self.refs.get(*ordinal as usize) {
                Some(sref) => out.push(sref.clone()),
                None => return Err(ExternalError::from(format!("no semantic ref {ordinal}"))),
            }
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct FakeMessages {
    messages: Vec<ConversationMessage>,
}

impl FakeMessages {
    /// Add `count` empty messages.
    pub fn fill(&mut self, count: usize) {
        self.messages
            .resize_with(self.messages.len() + count, Default::default);
    }

    pub fn push_text(&mut self, text: &str) {
        self.messages.push(ConversationMessage {
            text_chunks: vec![text.to_string()],
            timestamp: None,
            tags: Vec::new(),
        });
    }

    /// Add a message of exactly `chars` characters.
    pub fn push_with_len(&mut self, chars: usize) {
        self.push_text(&"x".repeat(chars));
    }
}

#[async_trait]
impl MessageCollection for FakeMessages {
    async fn get(&self, ordinal: MessageOrdinal) -> AdapterResult<Option<ConversationMessage>> {
        Ok(self.messages.get(ordinal as usize).cloned())
    }

    async fn count_in_char_budget(
        &self,
        ordered_ordinals: &[MessageOrdinal],
        max_chars: usize,
    ) -> AdapterResult<usize> {
        let mut total = 0usize;
        for (count, ordinal) in ordered_ordinals.iter().enumerate() {
            let message = self
                .messages
                .get(*ordinal as usize)
                .ok_or_else(|| ExternalError::from(format!("no message {ordinal}")))?;
            total += message.char_len();
            if total > max_chars {
                return Ok(count);
            }
        }
        Ok(ordered_ordinals.len())
    }
}

#[derive(Default)]
pub struct FakeTimestampIndex {
    entries: Vec<TimestampedTextRange>,
}

impl FakeTimestampIndex {
    pub fn add(&mut self, timestamp: DateTime<Utc>, message_ordinal: MessageOrdinal) {
        self.entries.push(TimestampedTextRange {
            timestamp,
            range: TextRange::for_message(message_ordinal),
        });
    }
}

#[async_trait]
impl TimestampToTextRangeIndex for FakeTimestampIndex {
    async fn lookup_range(
        &self,
        date_range: &DateRange,
    ) -> AdapterResult<Vec<TimestampedTextRange>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| date_range.contains(entry.timestamp))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeMessageTextIndex {
    scores: HashMap<MessageOrdinal, f64>,
}

impl FakeMessageTextIndex {
    pub fn add(&mut self, ordinal: MessageOrdinal, score: f64) {
        self.scores.insert(ordinal, score);
    }

    fn ranked(
        &self,
        candidates: impl Iterator<Item = MessageOrdinal>,
        max_matches: Option<usize>,
        min_score: Option<f64>,
    ) -> Vec<ScoredMessageOrdinal> {
        let floor = min_score.unwrap_or(f64::MIN);
        let mut scored: Vec<ScoredMessageOrdinal> = candidates
            .filter_map(|ordinal| {
                self.scores
                    .get(&ordinal)
                    .filter(|score| **score >= floor)
                    .map(|score| ScoredMessageOrdinal::new(ordinal, *score))
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        if let Some(max) = max_matches {
            scored.truncate(max);
        }
        scored
    }
}

#[async_trait]
impl MessageTextIndex for FakeMessageTextIndex {
    async fn lookup_messages(
        &self,
        _query_text: &str,
        max_matches: Option<usize>,
        min_score: Option<f64>,
    ) -> AdapterResult<Vec<ScoredMessageOrdinal>> {
        Ok(self.ranked(self.scores.keys().copied(), max_matches, min_score))
    }

    async fn lookup_messages_in_subset(
        &self,
        _query_text: &str,
        ordinals: &[MessageOrdinal],
        max_matches: Option<usize>,
        min_score: Option<f64>,
    ) -> AdapterResult<Vec<ScoredMessageOrdinal>> {
        Ok(self.ranked(ordinals.iter().copied(), max_matches, min_score))
    }
}

#[derive(Default)]
pub struct FakeAliases {
    entries: HashMap<String, Vec<Term>>,
}

impl FakeAliases {
    pub fn add(&mut self, text: &str, related: Vec<Term>) {
        self.entries.insert(text.to_string(), related);
    }
}

#[async_trait]
impl TermToRelatedTerms for FakeAliases {
    async fn lookup_terms(&self, texts: &[String]) -> AdapterResult<HashMap<String, Vec<Term>>> {
        Ok(texts
            .iter()
            .filter_map(|text| {
                self.entries
                    .get(text)
                    .map(|related| (text.clone(), related.clone()))
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeFuzzyIndex {
    entries: HashMap<String, Vec<Term>>,
}

impl FakeFuzzyIndex {
    pub fn add(&mut self, text: &str, related: Vec<Term>) {
        self.entries.insert(text.to_string(), related);
    }
}

#[async_trait]
impl TermToRelatedTermsFuzzy for FakeFuzzyIndex {
    async fn lookup_terms(
        &self,
        texts: &[String],
        max_matches: Option<usize>,
        _min_score: Option<f64>,
    ) -> AdapterResult<Vec<Vec<Term>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut related = self.entries.get(text).cloned().unwrap_or_default();
                if let Some(max) = max_matches {
                    related.truncate(max);
                }
                related
            })
            .collect())
    }
}

/// One of everything, plus builders for conversation content
#[derive(Default)]
pub struct ConversationFixture {
    pub messages: FakeMessages,
    pub semantic_refs: FakeSemanticRefs,
    pub term_index: FakeTermIndex,
    pub property_index: FakePropertyIndex,
    pub timestamp_index: FakeTimestampIndex,
    pub message_text_index: FakeMessageTextIndex,
    pub aliases: FakeAliases,
    pub fuzzy_index: FakeFuzzyIndex,
}

impl ConversationFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full view with every secondary index attached.
    pub fn conversation(&self) -> Conversation<'_> {
        Conversation::new(&self.messages, &self.semantic_refs, &self.term_index)
            .with_property_index(&self.property_index)
            .with_timestamp_index(&self.timestamp_index)
            .with_message_index(&self.message_text_index)
            .with_related_terms(&self.aliases)
            .with_fuzzy_index(&self.fuzzy_index)
    }

    /// Minimal view: just the required collections and term index.
    pub fn bare_conversation(&self) -> Conversation<'_> {
        Conversation::new(&self.messages, &self.semantic_refs, &self.term_index)
    }

    /// Add an entity semantic ref grounded at `message_ordinal`.
    pub fn add_entity(&mut self, name: &str, message_ordinal: MessageOrdinal) -> SemanticRefOrdinal {
        self.add_ref(
            Knowledge::Entity(ConcreteEntity {
                name: name.to_string(),
                type_names: Vec::new(),
                facets: None,
            }),
            TextRange::for_message(message_ordinal),
        )
    }

    /// Add a topic semantic ref grounded at `message_ordinal`.
    pub fn add_topic(&mut self, text: &str, message_ordinal: MessageOrdinal) -> SemanticRefOrdinal {
        self.add_ref(
            Knowledge::Topic(Topic {
                text: text.to_string(),
            }),
            TextRange::for_message(message_ordinal),
        )
    }

    /// Add a tag semantic ref grounded at `message_ordinal`.
    pub fn add_tag(&mut self, text: &str, message_ordinal: MessageOrdinal) -> SemanticRefOrdinal {
        self.add_ref(
            Knowledge::Tag(Tag {
                text: text.to_string(),
            }),
            TextRange::for_message(message_ordinal),
        )
    }

    /// Add a topic semantic ref spanning `start..end` messages.
    pub fn add_topic_spanning(
        &mut self,
        text: &str,
        start: MessageOrdinal,
        end: MessageOrdinal,
    ) -> SemanticRefOrdinal {
        self.add_ref(
            Knowledge::Topic(Topic {
                text: text.to_string(),
            }),
            TextRange::new(TextLocation::new(start), Some(TextLocation::new(end))),
        )
    }

    fn add_ref(&mut self, knowledge: Knowledge, range: TextRange) -> SemanticRefOrdinal {
        let ordinal = self.semantic_refs.refs.len() as SemanticRefOrdinal;
        self.semantic_refs.push(SemanticRef {
            semantic_ref_ordinal: ordinal,
            range,
            knowledge,
        });
        ordinal
    }
}
