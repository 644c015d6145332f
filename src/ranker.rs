//! Score smoothing and boost policies

use crate::types::{ScoredSemanticRefOrdinal, SemanticRef};

/// Entity weight used by the default compiler boost policy
pub const DEFAULT_ENTITY_WEIGHT: f64 = 100.0;

/// Baseline term weight the entity weight is measured against
pub const DEFAULT_TERM_WEIGHT: f64 = 10.0;

/// Smooth an accumulated score over its hit count.
///
/// `ln(hits + 1) * total / hits` is concave in the hit count: totals built
/// from many small contributions are damped relative to a single strong hit.
/// One hit passes the total through unchanged; zero hits scores zero.
pub fn smooth_score(total: f64, hit_count: u32) -> f64 {
    match hit_count {
        0 => 0.0,
        1 => total,
        n => ((n as f64) + 1.0).ln() * (total / n as f64),
    }
}

/// Multiply the score by `weight` when the semantic ref is an entity.
///
/// Entities are privileged over topics and tags carrying the same literal
/// text; the compiler derives `weight` from
/// [`DEFAULT_ENTITY_WEIGHT`] / [`DEFAULT_TERM_WEIGHT`].
pub fn boost_entities(
    semantic_ref: &SemanticRef,
    scored: ScoredSemanticRefOrdinal,
    weight: f64,
) -> ScoredSemanticRefOrdinal {
    match semantic_ref.knowledge_type() {
        crate::types::KnowledgeType::Entity => ScoredSemanticRefOrdinal {
            semantic_ref_ordinal: scored.semantic_ref_ordinal,
            score: scored.score * weight,
        },
        _ => scored,
    }
}
