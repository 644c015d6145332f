//! Query operator tree and evaluation runtime
//!
//! A compiled query is a tree of [`QueryOp`] nodes. Leaves look terms up in
//! external indices and produce [`SemanticRefAccumulator`]s; boolean nodes
//! combine them; grouping nodes bucket by knowledge type and project onto
//! messages. Evaluation is a single cooperative-async task: every external
//! call suspends, pure accumulator work does not.
//!
//! Per-query mutable state lives in [`QueryEvalContext`]: the matched-term
//! sets that suppress double counting, the active scope, a semantic-ref
//! memo cache, and the cancellation token.

mod boolean_ops;
mod group_ops;
mod scope_ops;
mod term_ops;

pub use boolean_ops::*;
pub use group_ops::*;
pub use scope_ops::*;
pub use term_ops::*;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::accumulator::SemanticRefAccumulator;
use crate::cancel::CancelToken;
use crate::error::{RecollectError, Result};
use crate::interfaces::Conversation;
use crate::scope::TextRangesInScope;
use crate::term::{PropertyTermSet, TermSet};
use crate::types::{SemanticRef, SemanticRefOrdinal, TextRange};

/// An asynchronously evaluable query expression
#[async_trait]
pub trait QueryOp: Send + Sync {
    type Output;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output>;
}

/// Boxed expression yielding a semantic-ref accumulator; `None` means
/// "no matches, skip" and is distinct from an empty accumulator.
pub type SemanticRefExpr = Box<dyn QueryOp<Output = Option<SemanticRefAccumulator>>>;

/// Boxed expression yielding a message accumulator
pub type MessageExpr = Box<dyn QueryOp<Output = crate::accumulator::MessageAccumulator>>;

/// Per-query evaluation state
///
/// Owned by a single evaluation task; borrows the conversation's external
/// collections read-only for its lifetime.
pub struct QueryEvalContext<'a> {
    pub conversation: Conversation<'a>,
    /// Primary and related terms that already matched, first-seen-wins
    pub matched_terms: TermSet,
    /// Property/value pairs that already matched
    pub matched_property_terms: PropertyTermSet,
    /// Active scope; `None` until a scope expression runs
    pub text_ranges_in_scope: Option<TextRangesInScope>,
    semantic_ref_cache: HashMap<SemanticRefOrdinal, Arc<SemanticRef>>,
    cancel: CancelToken,
}

impl<'a> QueryEvalContext<'a> {
    pub fn new(conversation: Conversation<'a>, cancel: CancelToken) -> Self {
        Self {
            conversation,
            matched_terms: TermSet::new(),
            matched_property_terms: PropertyTermSet::new(),
            text_ranges_in_scope: None,
            semantic_ref_cache: HashMap::new(),
            cancel,
        }
    }

    /// Propagate cancellation at an I/O boundary.
    pub fn check_cancel(&self) -> Result<()> {
        self.cancel.check()
    }

    /// Fetch a semantic ref through the per-query memo cache.
    ///
    /// An ordinal the collection does not know is data corruption: indices
    /// only hand out ordinals they were built from.
    pub async fn get_semantic_ref(
        &mut self,
        ordinal: SemanticRefOrdinal,
    ) -> Result<Arc<SemanticRef>> {
        if let Some(sref) = self.semantic_ref_cache.get(&ordinal) {
            return Ok(sref.clone());
        }
        self.check_cancel()?;
        let fetched = self
            .conversation
            .semantic_refs
            .get(ordinal)
            .await
            .map_err(|source| RecollectError::upstream("semantic ref get", source))?
            .ok_or_else(|| {
                RecollectError::DataCorruption(format!(
                    "semantic ref ordinal {ordinal} out of collection bounds"
                ))
            })?;
        let sref = Arc::new(fetched);
        self.semantic_ref_cache.insert(ordinal, sref.clone());
        Ok(sref)
    }

    /// True when `range` passes the active scope (or no scope is active).
    pub fn is_range_in_scope(&self, range: &TextRange) -> bool {
        match &self.text_ranges_in_scope {
            Some(scope) => scope.is_range_in_scope(range),
            None => true,
        }
    }

    /// Reset the matched-term records; booleans call this on entry so each
    /// evaluates its children against fresh state.
    pub fn clear_matched_terms(&mut self) {
        self.matched_terms.clear();
        self.matched_property_terms.clear();
    }
}

/// Evaluate a compiled expression against a conversation.
///
/// Builds a fresh [`QueryEvalContext`]; the output type follows the root
/// operator.
pub async fn run<O: QueryOp + ?Sized>(
    conversation: Conversation<'_>,
    expr: &O,
    cancel: CancelToken,
) -> Result<O::Output> {
    let mut ctx = QueryEvalContext::new(conversation, cancel);
    expr.eval(&mut ctx).await
}
