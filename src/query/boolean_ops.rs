//! Boolean operators over semantic-ref expressions
//!
//! Each boolean clears the matched-term records on entry so its children
//! evaluate against fresh state, and evaluates an attached scope expression
//! first so leaf lookups can reject out-of-scope hits. Children combine in
//! declaration order with first-seen-wins term recording: reordering
//! children that share a related term may change scores (never the key set
//! of an OR).

use async_trait::async_trait;

use crate::accumulator::SemanticRefAccumulator;
use crate::error::Result;
use crate::query::{GetScopeExpr, QueryEvalContext, QueryOp, SemanticRefExpr};
use crate::term::SearchTermBooleanOp;

/// Reset matched-term state and install the scope, if any.
async fn begin_match(
    ctx: &mut QueryEvalContext<'_>,
    scope_expr: Option<&GetScopeExpr>,
) -> Result<()> {
    if let Some(scope_expr) = scope_expr {
        let scope = scope_expr.eval(ctx).await?;
        ctx.text_ranges_in_scope = Some(scope);
    }
    ctx.clear_matched_terms();
    Ok(())
}

/// Build the boolean expression for `op` over `term_exprs`.
pub fn boolean_expr(
    op: SearchTermBooleanOp,
    term_exprs: Vec<SemanticRefExpr>,
    scope_expr: Option<GetScopeExpr>,
) -> SemanticRefExpr {
    match op {
        SearchTermBooleanOp::And => Box::new(MatchTermsAndExpr::new(term_exprs, scope_expr)),
        SearchTermBooleanOp::Or => Box::new(MatchTermsOrExpr::new(term_exprs, scope_expr)),
        SearchTermBooleanOp::OrMax => Box::new(MatchTermsOrMaxExpr::new(term_exprs, scope_expr)),
    }
}

/// Union of all child matches
pub struct MatchTermsOrExpr {
    pub term_exprs: Vec<SemanticRefExpr>,
    pub scope_expr: Option<GetScopeExpr>,
}

impl MatchTermsOrExpr {
    pub fn new(term_exprs: Vec<SemanticRefExpr>, scope_expr: Option<GetScopeExpr>) -> Self {
        Self {
            term_exprs,
            scope_expr,
        }
    }
}

#[async_trait]
impl QueryOp for MatchTermsOrExpr {
    type Output = Option<SemanticRefAccumulator>;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        begin_match(ctx, self.scope_expr.as_ref()).await?;
        let mut all_matches: Option<SemanticRefAccumulator> = None;
        for expr in &self.term_exprs {
            if let Some(term_matches) = expr.eval(ctx).await? {
                match &mut all_matches {
                    Some(all) => all.add_union(term_matches),
                    None => all_matches = Some(term_matches),
                }
            }
        }
        if let Some(all) = &mut all_matches {
            all.calculate_total_score();
        }
        Ok(all_matches)
    }
}

/// Union, then keep only values hit by the maximal number of children
pub struct MatchTermsOrMaxExpr {
    inner: MatchTermsOrExpr,
}

impl MatchTermsOrMaxExpr {
    pub fn new(term_exprs: Vec<SemanticRefExpr>, scope_expr: Option<GetScopeExpr>) -> Self {
        Self {
            inner: MatchTermsOrExpr::new(term_exprs, scope_expr),
        }
    }
}

#[async_trait]
impl QueryOp for MatchTermsOrMaxExpr {
    type Output = Option<SemanticRefAccumulator>;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        let mut matches = self.inner.eval(ctx).await?;
        if let Some(all) = &mut matches {
            let max_hit_count = all.get_max_hit_count();
            if max_hit_count > 1 {
                all.select_with_hit_count(max_hit_count);
            }
        }
        Ok(matches)
    }
}

/// Intersection of all child matches
///
/// Any child producing nothing yields an *empty* accumulator, not `None`:
/// the AND evaluated and proved there is no common value.
pub struct MatchTermsAndExpr {
    pub term_exprs: Vec<SemanticRefExpr>,
    pub scope_expr: Option<GetScopeExpr>,
}

impl MatchTermsAndExpr {
    pub fn new(term_exprs: Vec<SemanticRefExpr>, scope_expr: Option<GetScopeExpr>) -> Self {
        Self {
            term_exprs,
            scope_expr,
        }
    }
}

#[async_trait]
impl QueryOp for MatchTermsAndExpr {
    type Output = Option<SemanticRefAccumulator>;

    async fn eval(&self, ctx: &mut QueryEvalContext<'_>) -> Result<Self::Output> {
        begin_match(ctx, self.scope_expr.as_ref()).await?;
        let mut all_matches: Option<SemanticRefAccumulator> = None;
        for expr in &self.term_exprs {
            let term_matches = match expr.eval(ctx).await? {
                Some(m) if !m.is_empty() => m,
                _ => return Ok(Some(SemanticRefAccumulator::new())),
            };
            all_matches = Some(match all_matches.take() {
                Some(previous) => previous.intersect(&term_matches),
                None => term_matches,
            });
            if all_matches.as_ref().is_some_and(|all| all.is_empty()) {
                return Ok(Some(SemanticRefAccumulator::new()));
            }
        }
        let mut all = all_matches.unwrap_or_default();
        all.calculate_total_score();
        // After intersection every surviving key was hit by each child, so
        // this gate holds by construction; it stays as a cheap assertion.
        all.select_with_hit_count(self.term_exprs.len() as u32);
        Ok(Some(all))
    }
}
