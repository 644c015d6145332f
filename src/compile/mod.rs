//! Query compilation
//!
//! Lowers a [`SearchTermGroup`] plus an optional [`WhenFilter`] into an
//! operator tree: related terms are resolved first, the filter becomes
//! scope selectors and a knowledge-type predicate, and the boolean tree is
//! wrapped in the grouping/selection pipeline that shapes the public
//! result.

mod related;

pub(crate) use related::resolve_related_terms;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RecollectError, Result};
use crate::interfaces::Conversation;
use crate::query::{
    boolean_expr, FixedTextRangeSelector, GetScopeExpr, GetScoredMessagesExpr,
    GroupByKnowledgeTypeExpr, GroupSearchResultsExpr, KnowledgeGroupExpr, MatchPropertySearchTermExpr,
    MatchSearchTermExpr, MessageExpr, MessagesFromKnowledgeExpr, RankMessagesBySimilarityExpr,
    ScoreBooster, SelectMessagesInCharBudgetExpr, SelectTopNKnowledgeGroupExpr, SemanticRefExpr,
    TextRangeSelector, TextRangesInDateRangeSelector, WhereKnowledgeTypeExpr,
};
use crate::ranker::{boost_entities, DEFAULT_ENTITY_WEIGHT, DEFAULT_TERM_WEIGHT};
use crate::term::{
    PropertyNameTerm, PropertySearchTerm, SearchTerm, SearchTermBooleanOp, SearchTermGroup,
    SearchTermGroupEntry,
};
use crate::types::{DateRange, KnowledgeType, TextRange};

/// Scope restrictions applied to a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhenFilter {
    /// Restrict matches to one knowledge type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_type: Option<KnowledgeType>,
    /// Restrict matches to messages timestamped within any of these ranges
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_ranges: Vec<DateRange>,
    /// Restrict matches to these conversation spans
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_ranges_in_scope: Vec<TextRange>,
}

impl WhenFilter {
    pub fn for_knowledge_type(knowledge_type: KnowledgeType) -> Self {
        Self {
            knowledge_type: Some(knowledge_type),
            ..Default::default()
        }
    }

    pub fn for_date_range(date_range: DateRange) -> Self {
        Self {
            date_ranges: vec![date_range],
            ..Default::default()
        }
    }
}

/// Knobs for compilation and selection
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Per-knowledge-type cap on returned matches; `None` = unlimited
    pub max_knowledge_matches: Option<usize>,
    /// Minimum hit count for a match to be returned
    pub min_hit_count: u32,
    /// Skip related-term resolution entirely
    pub exact_match: bool,
    /// Fuzzy-index cap per term
    pub max_related_terms: usize,
    /// Fuzzy-index similarity floor
    pub min_related_score: f64,
    /// Score weight of entity matches relative to `default_term_weight`
    pub entity_term_weight: f64,
    pub default_term_weight: f64,
    /// Cap applied by similarity re-ranking of message results
    pub max_message_matches: Option<usize>,
    /// Char budget applied to message results; `None` = unbudgeted
    pub max_message_chars: Option<usize>,
    /// Similarity floor for message re-ranking
    pub min_similarity_score: Option<f64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_knowledge_matches: None,
            min_hit_count: 0,
            exact_match: false,
            max_related_terms: 10,
            min_related_score: 0.85,
            entity_term_weight: DEFAULT_ENTITY_WEIGHT,
            default_term_weight: DEFAULT_TERM_WEIGHT,
            max_message_matches: None,
            max_message_chars: None,
            min_similarity_score: None,
        }
    }
}

/// Compile a knowledge search: results grouped by knowledge type, each
/// group trimmed to the configured top N.
pub async fn compile_knowledge_query(
    conversation: Conversation<'_>,
    group: &SearchTermGroup,
    when: Option<&WhenFilter>,
    options: &SearchOptions,
) -> Result<GroupSearchResultsExpr> {
    let inner = compile_inner(conversation, group, when, options).await?;
    let grouped: KnowledgeGroupExpr = Box::new(GroupByKnowledgeTypeExpr::new(inner));
    Ok(GroupSearchResultsExpr::new(Box::new(
        SelectTopNKnowledgeGroupExpr::new(
            grouped,
            options.max_knowledge_matches,
            options.min_hit_count,
        ),
    )))
}

/// Compile a message search: knowledge matches projected onto message
/// ordinals, optionally similarity re-ranked against `similarity_query`
/// and trimmed to a char budget.
pub async fn compile_message_query(
    conversation: Conversation<'_>,
    group: &SearchTermGroup,
    when: Option<&WhenFilter>,
    options: &SearchOptions,
    similarity_query: Option<&str>,
) -> Result<GetScoredMessagesExpr> {
    let inner = compile_inner(conversation, group, when, options).await?;
    let grouped: KnowledgeGroupExpr = Box::new(GroupByKnowledgeTypeExpr::new(inner));
    let intersect_types = group.boolean_op == SearchTermBooleanOp::And;
    let mut messages: MessageExpr =
        Box::new(MessagesFromKnowledgeExpr::new(grouped, intersect_types));
    if let (Some(query_text), Some(max_matches)) = (similarity_query, options.max_message_matches) {
        if conversation.message_index.is_some() {
            messages = Box::new(RankMessagesBySimilarityExpr::new(
                messages,
                query_text,
                max_matches,
                options.min_similarity_score,
            ));
        }
    }
    if let Some(max_chars) = options.max_message_chars {
        messages = Box::new(SelectMessagesInCharBudgetExpr::new(messages, max_chars));
    }
    Ok(GetScoredMessagesExpr::new(messages))
}

/// Shared front half: validate, resolve related terms, compile scope and
/// the boolean tree.
async fn compile_inner(
    conversation: Conversation<'_>,
    group: &SearchTermGroup,
    when: Option<&WhenFilter>,
    options: &SearchOptions,
) -> Result<SemanticRefExpr> {
    validate_group(group)?;
    validate_when(when)?;

    let mut group = group.clone();
    if !options.exact_match {
        resolve_related_terms(conversation, &mut group, options).await?;
    }

    let scope_expr = compile_scope(when);
    let knowledge_type = when.and_then(|w| w.knowledge_type);
    debug!(
        terms = group.terms.len(),
        op = ?group.boolean_op,
        scoped = scope_expr.is_some(),
        "compiled search group"
    );
    Ok(compile_group(&group, knowledge_type, options, scope_expr))
}

fn validate_group(group: &SearchTermGroup) -> Result<()> {
    if group.is_empty() {
        return Err(RecollectError::InvalidInput(
            "search term group has no terms".into(),
        ));
    }
    for entry in &group.terms {
        match entry {
            SearchTermGroupEntry::Term(term) => validate_search_term(term)?,
            SearchTermGroupEntry::Property(property) => {
                match &property.name {
                    PropertyNameTerm::Known(_) => {}
                    PropertyNameTerm::Facet(name_term) => {
                        if name_term.is_wildcard() {
                            return Err(RecollectError::InvalidInput(
                                "facet name cannot be a wildcard".into(),
                            ));
                        }
                        validate_search_term(name_term)?;
                    }
                }
                validate_search_term(&property.value)?;
            }
            SearchTermGroupEntry::SubGroup(sub_group) => validate_group(sub_group)?,
        }
    }
    Ok(())
}

fn validate_search_term(term: &SearchTerm) -> Result<()> {
    if !term.is_wildcard() && term.term.prepared_text().is_empty() {
        return Err(RecollectError::InvalidInput("empty search term text".into()));
    }
    Ok(())
}

fn validate_when(when: Option<&WhenFilter>) -> Result<()> {
    let Some(when) = when else {
        return Ok(());
    };
    for date_range in &when.date_ranges {
        if date_range.is_inverted() {
            return Err(RecollectError::InvalidInput(format!(
                "inverted date range: {} > {:?}",
                date_range.start, date_range.end
            )));
        }
    }
    Ok(())
}

/// Build scope selectors from the filter; `None` when nothing restricts
/// scope.
fn compile_scope(when: Option<&WhenFilter>) -> Option<GetScopeExpr> {
    let when = when?;
    let mut selectors: Vec<Box<dyn TextRangeSelector>> = Vec::new();
    if !when.text_ranges_in_scope.is_empty() {
        selectors.push(Box::new(FixedTextRangeSelector::new(
            when.text_ranges_in_scope.clone(),
        )));
    }
    for date_range in &when.date_ranges {
        selectors.push(Box::new(TextRangesInDateRangeSelector::new(*date_range)));
    }
    if selectors.is_empty() {
        None
    } else {
        Some(GetScopeExpr::new(selectors))
    }
}

/// Compile a group into its boolean expression. The scope attaches only at
/// the outermost boolean; nested groups inherit it through the context.
fn compile_group(
    group: &SearchTermGroup,
    knowledge_type: Option<KnowledgeType>,
    options: &SearchOptions,
    scope_expr: Option<GetScopeExpr>,
) -> SemanticRefExpr {
    let mut children: Vec<SemanticRefExpr> = Vec::with_capacity(group.terms.len());
    for entry in &group.terms {
        children.push(match entry {
            SearchTermGroupEntry::Term(term) => {
                compile_search_term(term, knowledge_type, options)
            }
            SearchTermGroupEntry::Property(property) => {
                compile_property_term(property, knowledge_type)
            }
            SearchTermGroupEntry::SubGroup(sub_group) => {
                compile_group(sub_group, knowledge_type, options, None)
            }
        });
    }
    boolean_expr(group.boolean_op, children, scope_expr)
}

fn compile_search_term(
    term: &SearchTerm,
    knowledge_type: Option<KnowledgeType>,
    options: &SearchOptions,
) -> SemanticRefExpr {
    let boost_weight = options.entity_term_weight / options.default_term_weight;
    let booster: ScoreBooster =
        Arc::new(move |sref, scored| boost_entities(sref, scored, boost_weight));
    let expr: SemanticRefExpr = Box::new(MatchSearchTermExpr::with_booster(term.clone(), booster));
    wrap_knowledge_type(expr, knowledge_type)
}

fn compile_property_term(
    property: &PropertySearchTerm,
    knowledge_type: Option<KnowledgeType>,
) -> SemanticRefExpr {
    let expr: SemanticRefExpr = Box::new(MatchPropertySearchTermExpr::new(property.clone()));
    wrap_knowledge_type(expr, knowledge_type)
}

fn wrap_knowledge_type(
    expr: SemanticRefExpr,
    knowledge_type: Option<KnowledgeType>,
) -> SemanticRefExpr {
    match knowledge_type {
        Some(knowledge_type) => Box::new(WhereKnowledgeTypeExpr::new(expr, knowledge_type)),
        None => expr,
    }
}
