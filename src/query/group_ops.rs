//! Grouping, selection and message projection
//!
//! The tail of a compiled query: bucket semantic-ref matches by knowledge
//! type, trim each bucket to the best N, convert buckets to public results,
//! or project knowledge matches onto message ordinals with char budgeting
//! and optional similarity re-ranking.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::accumulator::{MessageAccumulator, SemanticRefAccumulator};
use crate::error::{RecollectError, Result};
use crate::query::{MessageExpr, QueryEvalContext, QueryOp, SemanticRefExpr};
use crate::types::{
    KnowledgeSearchResults, KnowledgeType, ScoredMessageOrdinal, SemanticRefSearchResult,
};

/// Semantic-ref matches bucketed by knowledge type
pub type KnowledgeGroups = HashMap<KnowledgeType, SemanticRefAccumulator>;

/// Boxed expression yielding knowledge-type buckets
pub type KnowledgeGroupExpr = Box<dyn QueryOp<Output = KnowledgeGroups>>;

/// Bucket source matches by the knowledge type of their semantic ref
///
/// Every bucket inherits the source's contributing term texts.
pub struct GroupByKnowledgeTypeExpr {
    pub source: SemanticRefExpr,
}

impl GroupByKnowledgeTypeExpr {
    pub fn new(source: SemanticRefExpr) -> Self {
        Self { source }
    }
}

#[async_trait]
impl QueryOp for GroupByKnowledgeTypeExpr {
    type Output = KnowledgeGroups;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let mut groups = KnowledgeGroups::new();
        let Some(source) = self.source.eval(ctx).await? else {
            return Ok(groups);
        };
        let entries: Vec<_> = source.matches.iter().copied().collect();
        for entry in entries {
            let sref = ctx.get_semantic_ref(entry.value).await?;
            groups
                .entry(sref.knowledge_type())
                .or_default()
                .matches
                .set_match(entry);
        }
        for group in groups.values_mut() {
            group.search_term_matches = source.search_term_matches.clone();
        }
        Ok(groups)
    }
}

/// Keep the top-N scoring matches of every knowledge-type bucket
pub struct SelectTopNKnowledgeGroupExpr {
    pub source: KnowledgeGroupExpr,
    pub max_matches: Option<usize>,
    pub min_hit_count: u32,
}

impl SelectTopNKnowledgeGroupExpr {
    pub fn new(source: KnowledgeGroupExpr, max_matches: Option<usize>, min_hit_count: u32) -> Self {
        Self {
            source,
            max_matches,
            min_hit_count,
        }
    }
}

#[async_trait]
impl QueryOp for SelectTopNKnowledgeGroupExpr {
    type Output = KnowledgeGroups;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let mut groups = self.source.eval(ctx).await?;
        for group in groups.values_mut() {
            group.select_top_n_scoring(self.max_matches, self.min_hit_count);
        }
        Ok(groups)
    }
}

/// Convert non-empty buckets into the public per-type result shape
pub struct GroupSearchResultsExpr {
    pub source: KnowledgeGroupExpr,
}

impl GroupSearchResultsExpr {
    pub fn new(source: KnowledgeGroupExpr) -> Self {
        Self { source }
    }
}

#[async_trait]
impl QueryOp for GroupSearchResultsExpr {
    type Output = KnowledgeSearchResults;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let groups = self.source.eval(ctx).await?;
        let mut results = KnowledgeSearchResults::new();
        for (knowledge_type, group) in groups {
            if group.is_empty() {
                continue;
            }
            results.insert(
                knowledge_type,
                SemanticRefSearchResult {
                    semantic_ref_matches: group.to_scored_ordinals(),
                    term_matches: group.search_term_matches,
                },
            );
        }
        Ok(results)
    }
}

/// Project knowledge buckets onto the messages their ranges span
///
/// A message is added once per knowledge type that reached it, so its hit
/// count equals the number of distinct types; with
/// `intersect_knowledge_types` a message must be reached from every
/// non-empty type. Scores are smoothed over the hit count at the end.
pub struct MessagesFromKnowledgeExpr {
    pub source: KnowledgeGroupExpr,
    pub intersect_knowledge_types: bool,
}

impl MessagesFromKnowledgeExpr {
    pub fn new(source: KnowledgeGroupExpr, intersect_knowledge_types: bool) -> Self {
        Self {
            source,
            intersect_knowledge_types,
        }
    }
}

#[async_trait]
impl QueryOp for MessagesFromKnowledgeExpr {
    type Output = MessageAccumulator;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let groups = self.source.eval(ctx).await?;
        let mut message_matches = MessageAccumulator::new();
        let mut types_hit: u32 = 0;
        for group in groups.values() {
            if group.is_empty() {
                continue;
            }
            types_hit += 1;
            // Stage per type so multiple semantic refs of one type touching
            // the same message count as a single hit
            let mut staged = MessageAccumulator::new();
            let entries: Vec<_> = group.matches.iter().copied().collect();
            for entry in entries {
                let sref = ctx.get_semantic_ref(entry.value).await?;
                staged.add_from_semantic_ref(&sref, entry.score);
            }
            for staged_match in staged.matches.iter() {
                message_matches.add_max(staged_match.value, staged_match.score);
            }
        }
        if self.intersect_knowledge_types && types_hit > 1 {
            message_matches.select_with_hit_count(types_hit);
        }
        message_matches.smooth_scores();
        Ok(message_matches)
    }
}

/// Trim message matches to the best-scoring prefix within a char budget
pub struct SelectMessagesInCharBudgetExpr {
    pub source: MessageExpr,
    pub max_chars: usize,
}

impl SelectMessagesInCharBudgetExpr {
    pub fn new(source: MessageExpr, max_chars: usize) -> Self {
        Self { source, max_chars }
    }
}

#[async_trait]
impl QueryOp for SelectMessagesInCharBudgetExpr {
    type Output = MessageAccumulator;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let source = self.source.eval(ctx).await?;
        if source.is_empty() {
            return Ok(source);
        }
        let ordered: Vec<_> = source
            .to_scored_ordinals()
            .into_iter()
            .map(|s| s.message_ordinal)
            .collect();
        ctx.check_cancel()?;
        let budgeted = ctx
            .conversation
            .messages
            .count_in_char_budget(&ordered, self.max_chars)
            .await
            .map_err(|source| RecollectError::upstream("message char budget", source))?;
        if budgeted >= ordered.len() {
            return Ok(source);
        }
        let mut trimmed = MessageAccumulator::new();
        for ordinal in &ordered[..budgeted] {
            if let Some(entry) = source.matches.get(*ordinal) {
                trimmed.matches.set_match(*entry);
            }
        }
        Ok(trimmed)
    }
}

/// Re-rank message matches by text similarity to the original query
///
/// Small result sets pass through untouched; so does a conversation
/// without a message similarity index.
pub struct RankMessagesBySimilarityExpr {
    pub source: MessageExpr,
    pub query_text: String,
    pub max_matches: usize,
    pub min_score: Option<f64>,
}

impl RankMessagesBySimilarityExpr {
    pub fn new(
        source: MessageExpr,
        query_text: impl Into<String>,
        max_matches: usize,
        min_score: Option<f64>,
    ) -> Self {
        Self {
            source,
            query_text: query_text.into(),
            max_matches,
            min_score,
        }
    }
}

#[async_trait]
impl QueryOp for RankMessagesBySimilarityExpr {
    type Output = MessageAccumulator;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let source = self.source.eval(ctx).await?;
        if source.len() <= self.max_matches {
            return Ok(source);
        }
        let Some(index) = ctx.conversation.message_index else {
            return Ok(source);
        };
        let mut ordinals: Vec<_> = source.matches.values().collect();
        ordinals.sort_unstable();
        ctx.check_cancel()?;
        let ranked = index
            .lookup_messages_in_subset(
                &self.query_text,
                &ordinals,
                Some(self.max_matches),
                self.min_score,
            )
            .await
            .map_err(|source| RecollectError::upstream("message similarity lookup", source))?;
        let mut matches = MessageAccumulator::new();
        for scored in ranked {
            matches.add_max(scored.message_ordinal, scored.score);
        }
        Ok(matches)
    }
}

/// Project a message accumulator to scored ordinals, descending by score
pub struct GetScoredMessagesExpr {
    pub source: MessageExpr,
}

impl GetScoredMessagesExpr {
    pub fn new(source: MessageExpr) -> Self {
        Self { source }
    }
}

#[async_trait]
impl QueryOp for GetScoredMessagesExpr {
    type Output = Vec<ScoredMessageOrdinal>;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let source = self.source.eval(ctx).await?;
        Ok(source.to_scored_ordinals())
    }
}
