//! Search term vocabulary
//!
//! Queries arrive as a [`SearchTermGroup`]: a boolean tree of search terms,
//! property terms and nested groups. Terms compare by *prepared* text
//! (trimmed, case-folded); the evaluator uses [`TermSet`] and
//! [`PropertyTermSet`] to suppress double counting across a boolean.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Placeholder text of a wildcard term
pub const WILDCARD: &str = "*";

/// Normalize term text for hashing and comparison: trim + case-fold.
pub fn prepare_term_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A single term with an optional match weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub text: String,
    /// Multiplier applied to index scores for this term; defaults to 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl Term {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            weight: None,
        }
    }

    pub fn with_weight(text: impl Into<String>, weight: f64) -> Self {
        Self {
            text: text.into(),
            weight: Some(weight),
        }
    }

    /// Prepared (trimmed, case-folded) text used for equality and hashing
    pub fn prepared_text(&self) -> String {
        prepare_term_text(&self.text)
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        self.prepared_text() == other.prepared_text()
    }
}

impl Eq for Term {}

impl From<&str> for Term {
    fn from(text: &str) -> Self {
        Term::new(text)
    }
}

/// A search term with optional related-term expansions
///
/// `related_terms` tri-state: `None` means "not yet resolved" (the resolver
/// will fill it), `Some(vec![])` means exact-match-only (resolution is
/// inhibited), `Some(terms)` carries resolved aliases / fuzzy neighbors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTerm {
    pub term: Term,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_terms: Option<Vec<Term>>,
}

impl SearchTerm {
    pub fn new(term: Term) -> Self {
        Self {
            term,
            related_terms: None,
        }
    }

    /// A term that must match literally; related-term resolution is skipped.
    pub fn exact(term: Term) -> Self {
        Self {
            term,
            related_terms: Some(Vec::new()),
        }
    }

    /// A wildcard placeholder: always compilable, matches nothing by lookup.
    pub fn wildcard() -> Self {
        Self::exact(Term::new(WILDCARD))
    }

    pub fn is_wildcard(&self) -> bool {
        self.term.text == WILDCARD
    }

    /// True when the resolver should fill `related_terms` for this term
    pub fn needs_related_terms(&self) -> bool {
        !self.is_wildcard() && self.related_terms.is_none()
    }
}

impl From<&str> for SearchTerm {
    fn from(text: &str) -> Self {
        SearchTerm::new(Term::new(text))
    }
}

/// Well-known property names a semantic ref can be indexed under
///
/// The string forms are the wire names used by property indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KnowledgePropertyName {
    /// Entity name
    Name,
    /// Entity type
    Type,
    Verb,
    Subject,
    Object,
    IndirectObject,
    Tag,
    Topic,
}

impl KnowledgePropertyName {
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgePropertyName::Name => "name",
            KnowledgePropertyName::Type => "type",
            KnowledgePropertyName::Verb => "verb",
            KnowledgePropertyName::Subject => "subject",
            KnowledgePropertyName::Object => "object",
            KnowledgePropertyName::IndirectObject => "indirectObject",
            KnowledgePropertyName::Tag => "tag",
            KnowledgePropertyName::Topic => "topic",
        }
    }
}

/// Internal property keys for free-form facet lookups
pub(crate) const PROP_FACET_NAME: &str = "facet.name";
pub(crate) const PROP_FACET_VALUE: &str = "facet.value";

/// How a property search names the property it filters on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyNameTerm {
    /// A well-known, typed property
    Known(KnowledgePropertyName),
    /// A free-form facet name, itself matched as a search term
    Facet(SearchTerm),
}

/// Match semantic refs carrying `name = value`, e.g. `type == "book"` or the
/// facet `color == "blue"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySearchTerm {
    pub name: PropertyNameTerm,
    pub value: SearchTerm,
}

impl PropertySearchTerm {
    pub fn known(name: KnowledgePropertyName, value: impl Into<SearchTerm>) -> Self {
        Self {
            name: PropertyNameTerm::Known(name),
            value: value.into(),
        }
    }

    pub fn facet(name: impl Into<SearchTerm>, value: impl Into<SearchTerm>) -> Self {
        Self {
            name: PropertyNameTerm::Facet(name.into()),
            value: value.into(),
        }
    }
}

/// Boolean combinator of a search term group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTermBooleanOp {
    And,
    Or,
    /// Union, then keep only values hit by the maximal number of children
    OrMax,
}

/// One member of a search term group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchTermGroupEntry {
    Term(SearchTerm),
    Property(PropertySearchTerm),
    SubGroup(SearchTermGroup),
}

/// A recursive boolean tree of search terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTermGroup {
    pub boolean_op: SearchTermBooleanOp,
    pub terms: Vec<SearchTermGroupEntry>,
}

impl SearchTermGroup {
    pub fn new(boolean_op: SearchTermBooleanOp) -> Self {
        Self {
            boolean_op,
            terms: Vec::new(),
        }
    }

    pub fn or() -> Self {
        Self::new(SearchTermBooleanOp::Or)
    }

    pub fn or_max() -> Self {
        Self::new(SearchTermBooleanOp::OrMax)
    }

    pub fn and() -> Self {
        Self::new(SearchTermBooleanOp::And)
    }

    pub fn add_term(&mut self, term: impl Into<SearchTerm>) -> &mut Self {
        self.terms.push(SearchTermGroupEntry::Term(term.into()));
        self
    }

    pub fn add_property(&mut self, property: PropertySearchTerm) -> &mut Self {
        self.terms.push(SearchTermGroupEntry::Property(property));
        self
    }

    pub fn add_sub_group(&mut self, group: SearchTermGroup) -> &mut Self {
        self.terms.push(SearchTermGroupEntry::SubGroup(group));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Set of terms keyed by prepared text
///
/// Used by the evaluator to record which terms already matched, so a term
/// shared between a primary and a related expansion is counted once.
#[derive(Debug, Clone, Default)]
pub struct TermSet {
    terms: HashMap<String, Term>,
}

impl TermSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, term: &Term) -> bool {
        self.terms.contains_key(&term.prepared_text())
    }

    /// Insert `term`; returns false if an equal term was already present.
    pub fn add(&mut self, term: Term) -> bool {
        let key = term.prepared_text();
        if self.terms.contains_key(&key) {
            return false;
        }
        self.terms.insert(key, term);
        true
    }

    /// Insert or keep the existing entry with the maximum weight.
    pub fn add_or_union(&mut self, term: &Term) {
        let key = term.prepared_text();
        match self.terms.get_mut(&key) {
            None => {
                self.terms.insert(key, term.clone());
            }
            Some(existing) => {
                let new = term.weight.unwrap_or(1.0);
                if new > existing.weight.unwrap_or(1.0) {
                    existing.weight = Some(new);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.terms.clear();
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Consume the set, yielding its terms in arbitrary order.
    pub fn into_terms(self) -> Vec<Term> {
        self.terms.into_values().collect()
    }
}

/// Set of `(property name, value term)` pairs already matched
#[derive(Debug, Clone, Default)]
pub struct PropertyTermSet {
    terms: HashMap<(String, String), Term>,
}

impl PropertyTermSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, property_name: &str, value: &Term) -> bool {
        self.terms
            .contains_key(&(property_name.to_string(), value.prepared_text()))
    }

    pub fn add(&mut self, property_name: &str, value: Term) {
        let key = (property_name.to_string(), value.prepared_text());
        self.terms.entry(key).or_insert(value);
    }

    pub fn clear(&mut self) {
        self.terms.clear();
    }
}
