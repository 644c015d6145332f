//! Scope operators
//!
//! [`GetScopeExpr`] runs a list of range selectors and collects each
//! produced [`TextRangeCollection`] into a [`TextRangesInScope`]. Leaf
//! lookups consult the result to reject out-of-scope hits.

use async_trait::async_trait;

use crate::error::{RecollectError, Result};
use crate::query::{MessageExpr, QueryEvalContext, QueryOp};
use crate::scope::{TextRangeCollection, TextRangesInScope};
use crate::types::{DateRange, TextRange};

/// A source of text ranges contributing one collection to the scope
#[async_trait]
pub trait TextRangeSelector: Send + Sync {
    /// `None` means the selector has nothing to say and constrains nothing.
    async fn eval_ranges(
        &self,
        ctx: &mut QueryEvalContext<'_>,
    ) -> Result<Option<TextRangeCollection>>;
}

/// Evaluate all selectors into the scope for this boolean
pub struct GetScopeExpr {
    pub range_selectors: Vec<Box<dyn TextRangeSelector>>,
}

impl GetScopeExpr {
    pub fn new(range_selectors: Vec<Box<dyn TextRangeSelector>>) -> Self {
        Self { range_selectors }
    }
}

#[async_trait]
impl QueryOp for GetScopeExpr {
    type Output = TextRangesInScope;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let mut scope = TextRangesInScope::new();
        for selector in &self.range_selectors {
            if let Some(collection) = selector.eval_ranges(ctx).await? {
                scope.add_collection(collection);
            }
        }
        Ok(scope)
    }
}

/// Selector over a fixed, caller-supplied set of ranges
pub struct FixedTextRangeSelector {
    ranges: TextRangeCollection,
}

impl FixedTextRangeSelector {
    pub fn new(ranges: Vec<TextRange>) -> Self {
        Self {
            ranges: TextRangeCollection::from_ranges(ranges),
        }
    }
}

#[async_trait]
impl TextRangeSelector for FixedTextRangeSelector {
    async fn eval_ranges(
        &self,
        _ctx: &mut QueryEvalContext<'_>,
    ) -> Result<Option<TextRangeCollection>> {
        Ok(Some(self.ranges.clone()))
    }
}

/// Selector over the messages timestamped within a date range
///
/// An empty index result still contributes an (empty) collection: nothing
/// happened in the window, so nothing is in scope.
pub struct TextRangesInDateRangeSelector {
    pub date_range: DateRange,
}

impl TextRangesInDateRangeSelector {
    pub fn new(date_range: DateRange) -> Self {
        Self { date_range }
    }
}

#[async_trait]
impl TextRangeSelector for TextRangesInDateRangeSelector {
    async fn eval_ranges(
        &self,
        ctx: &mut QueryEvalContext<'_>,
    ) -> Result<Option<TextRangeCollection>> {
        let Some(index) = ctx.conversation.timestamp_index else {
            return Ok(None);
        };
        ctx.check_cancel()?;
        let timestamped = index
            .lookup_range(&self.date_range)
            .await
            .map_err(|source| RecollectError::upstream("timestamp range lookup", source))?;
        Ok(Some(TextRangeCollection::from_ranges(
            timestamped.into_iter().map(|t| t.range).collect(),
        )))
    }
}

/// Selector producing one point range per message matched by a source
/// expression; used to scope one query leg by the results of another
pub struct TextRangesFromMessagesSelector {
    pub source: MessageExpr,
}

impl TextRangesFromMessagesSelector {
    pub fn new(source: MessageExpr) -> Self {
        Self { source }
    }
}

#[async_trait]
impl TextRangeSelector for TextRangesFromMessagesSelector {
    async fn eval_ranges(
        &self,
        ctx: &mut QueryEvalContext<'_>,
    ) -> Result<Option<TextRangeCollection>> {
        let messages = self.source.eval(ctx).await?;
        if messages.is_empty() {
            return Ok(None);
        }
        let mut ordinals: Vec<_> = messages.matches.values().collect();
        ordinals.sort_unstable();
        let mut collection = TextRangeCollection::new();
        collection.add_ranges(ordinals.into_iter().map(TextRange::for_message));
        Ok(Some(collection))
    }
}
