//! Term lookup operators
//!
//! Leaves of the operator tree. Each looks a term or property up in an
//! external index, rejects hits outside the active scope, applies an
//! optional score booster, and folds the survivors into a
//! [`SemanticRefAccumulator`]. A leaf returning `None` contributed nothing.

use std::sync::Arc;

use async_trait::async_trait;

use crate::accumulator::SemanticRefAccumulator;
use crate::error::{RecollectError, Result};
use crate::query::{QueryEvalContext, QueryOp, SemanticRefExpr};
use crate::term::{
    PropertyNameTerm, PropertySearchTerm, SearchTerm, PROP_FACET_NAME, PROP_FACET_VALUE,
};
use crate::types::{KnowledgeType, ScoredSemanticRefOrdinal, SemanticRef};

/// Per-ordinal score adjustment applied at the leaf, e.g. the entity boost
pub type ScoreBooster =
    Arc<dyn Fn(&SemanticRef, ScoredSemanticRefOrdinal) -> ScoredSemanticRefOrdinal + Send + Sync>;

/// Scope-filter and boost a raw index result.
///
/// Fetching semantic refs is only needed when a scope is active or a
/// booster is attached; the plain path passes the index result through.
async fn filter_scored(
    ctx: &mut QueryEvalContext<'_>,
    scored: Vec<ScoredSemanticRefOrdinal>,
    booster: Option<&ScoreBooster>,
) -> Result<Option<Vec<ScoredSemanticRefOrdinal>>> {
    if ctx.text_ranges_in_scope.is_none() && booster.is_none() {
        return Ok(Some(scored));
    }
    let mut filtered = Vec::with_capacity(scored.len());
    for entry in scored {
        let sref = ctx.get_semantic_ref(entry.semantic_ref_ordinal).await?;
        if !ctx.is_range_in_scope(&sref.range) {
            continue;
        }
        filtered.push(match booster {
            Some(boost) => boost(&sref, entry),
            None => entry,
        });
    }
    if filtered.is_empty() {
        Ok(None)
    } else {
        Ok(Some(filtered))
    }
}

/// Look prepared term text up in the term index, scope-filtered and boosted.
pub(crate) async fn lookup_term_filtered(
    ctx: &mut QueryEvalContext<'_>,
    text: &str,
    booster: Option<&ScoreBooster>,
) -> Result<Option<Vec<ScoredSemanticRefOrdinal>>> {
    ctx.check_cancel()?;
    let scored = ctx
        .conversation
        .semantic_ref_index
        .lookup_term(text)
        .await
        .map_err(|source| RecollectError::upstream("term index lookup", source))?;
    match scored {
        Some(scored) if !scored.is_empty() => filter_scored(ctx, scored, booster).await,
        _ => Ok(None),
    }
}

/// Look a property/value pair up in the property index, scope-filtered.
/// A conversation without a property index misses every lookup.
pub(crate) async fn lookup_property_filtered(
    ctx: &mut QueryEvalContext<'_>,
    property_name: &str,
    value_text: &str,
) -> Result<Option<Vec<ScoredSemanticRefOrdinal>>> {
    let Some(index) = ctx.conversation.property_index else {
        return Ok(None);
    };
    ctx.check_cancel()?;
    let scored = index
        .lookup_property(property_name, value_text)
        .await
        .map_err(|source| RecollectError::upstream("property index lookup", source))?;
    match scored {
        Some(scored) if !scored.is_empty() => filter_scored(ctx, scored, None).await,
        _ => Ok(None),
    }
}

/// Match one search term and its related-term expansions
pub struct MatchSearchTermExpr {
    pub search_term: SearchTerm,
    pub score_booster: Option<ScoreBooster>,
}

impl MatchSearchTermExpr {
    pub fn new(search_term: SearchTerm) -> Self {
        Self {
            search_term,
            score_booster: None,
        }
    }

    pub fn with_booster(search_term: SearchTerm, booster: ScoreBooster) -> Self {
        Self {
            search_term,
            score_booster: Some(booster),
        }
    }
}

#[async_trait]
impl QueryOp for MatchSearchTermExpr {
    type Output = Option<SemanticRefAccumulator>;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        if self.search_term.is_wildcard() {
            return Ok(None);
        }
        let mut matches = SemanticRefAccumulator::new();
        let term = &self.search_term.term;

        // Primary term: counted once per boolean, first-seen-wins
        if !ctx.matched_terms.has(term) {
            if let Some(scored) =
                lookup_term_filtered(ctx, &term.prepared_text(), self.score_booster.as_ref())
                    .await?
            {
                matches.add_term_matches(term, scored, true, None);
                ctx.matched_terms.add(term.clone());
            }
        }

        // Related terms accrue to the primary, without re-counting ordinals
        // the primary already matched
        if let Some(related_terms) = &self.search_term.related_terms {
            for related in related_terms {
                if ctx.matched_terms.has(related) {
                    continue;
                }
                if let Some(scored) = lookup_term_filtered(
                    ctx,
                    &related.prepared_text(),
                    self.score_booster.as_ref(),
                )
                .await?
                {
                    matches.add_term_matches_if_new(term, scored, false, related.weight);
                    ctx.matched_terms.add(related.clone());
                }
            }
        }

        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches)
        })
    }
}

/// Match a property search term: a typed property or a free-form facet
pub struct MatchPropertySearchTermExpr {
    pub property_term: PropertySearchTerm,
}

impl MatchPropertySearchTermExpr {
    pub fn new(property_term: PropertySearchTerm) -> Self {
        Self { property_term }
    }

    /// Match `value` (and its related terms) under `property_name`,
    /// accumulating into `matches`.
    async fn match_property(
        &self,
        ctx: &mut QueryEvalContext<'_>,
        property_name: &str,
        value: &SearchTerm,
        matches: &mut SemanticRefAccumulator,
    ) -> Result<()> {
        if value.is_wildcard() {
            return Ok(());
        }
        let term = &value.term;

        if !ctx.matched_property_terms.has(property_name, term) {
            if let Some(scored) =
                lookup_property_filtered(ctx, property_name, &term.prepared_text()).await?
            {
                matches.add_term_matches(term, scored, true, None);
                ctx.matched_property_terms.add(property_name, term.clone());
            }
        }

        if let Some(related_terms) = &value.related_terms {
            for related in related_terms {
                if ctx.matched_property_terms.has(property_name, related) {
                    continue;
                }
                if let Some(scored) =
                    lookup_property_filtered(ctx, property_name, &related.prepared_text()).await?
                {
                    matches.add_term_matches_if_new(term, scored, false, related.weight);
                    ctx.matched_property_terms
                        .add(property_name, related.clone());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QueryOp for MatchPropertySearchTermExpr {
    type Output = Option<SemanticRefAccumulator>;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let mut matches = SemanticRefAccumulator::new();
        match &self.property_term.name {
            PropertyNameTerm::Known(name) => {
                self.match_property(ctx, name.as_str(), &self.property_term.value, &mut matches)
                    .await?;
            }
            PropertyNameTerm::Facet(name_term) => {
                // Facet lookups run against the dedicated facet keys; the
                // value half is skipped for wildcard values.
                self.match_property(ctx, PROP_FACET_NAME, name_term, &mut matches)
                    .await?;
                if !self.property_term.value.is_wildcard() {
                    self.match_property(
                        ctx,
                        PROP_FACET_VALUE,
                        &self.property_term.value,
                        &mut matches,
                    )
                    .await?;
                }
            }
        }
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches)
        })
    }
}

/// Keep only matches whose semantic ref has the given knowledge type
pub struct WhereKnowledgeTypeExpr {
    pub source: SemanticRefExpr,
    pub knowledge_type: KnowledgeType,
}

impl WhereKnowledgeTypeExpr {
    pub fn new(source: SemanticRefExpr, knowledge_type: KnowledgeType) -> Self {
        Self {
            source,
            knowledge_type,
        }
    }
}

#[async_trait]
impl QueryOp for WhereKnowledgeTypeExpr {
    type Output = Option<SemanticRefAccumulator>;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let Some(source) = self.source.eval(ctx).await? else {
            return Ok(None);
        };
        let mut filtered = SemanticRefAccumulator {
            matches: Default::default(),
            search_term_matches: source.search_term_matches.clone(),
        };
        let entries: Vec<_> = source.matches.iter().copied().collect();
        for entry in entries {
            let sref = ctx.get_semantic_ref(entry.value).await?;
            if sref.knowledge_type() == self.knowledge_type {
                filtered.matches.set_match(entry);
            }
        }
        Ok(if filtered.is_empty() {
            None
        } else {
            Some(filtered)
        })
    }
}
