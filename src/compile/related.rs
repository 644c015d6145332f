//! Related-term resolution
//!
//! Before compilation, every unresolved search term in the group tree gets
//! its related terms filled in: the alias index answers first (exact keyed
//! lookup), the embedding-backed fuzzy index covers the leftovers. A term
//! that went through resolution always ends up with `Some(related)`, even
//! when empty, so it is never resolved twice.

use tracing::debug;

use crate::compile::SearchOptions;
use crate::error::{RecollectError, Result};
use crate::interfaces::Conversation;
use crate::term::{
    PropertyNameTerm, SearchTerm, SearchTermGroup, SearchTermGroupEntry, Term, TermSet,
};

/// Dedupe related terms by prepared text keeping the maximum weight, and
/// drop any related term equal to its primary.
fn dedupe_related(primary: &Term, related: Vec<Term>) -> Vec<Term> {
    let primary_text = primary.prepared_text();
    let mut unique = TermSet::new();
    for term in &related {
        if term.prepared_text() == primary_text {
            continue;
        }
        unique.add_or_union(term);
    }
    unique.into_terms()
}

/// Collect mutable references to every term the resolver should fill.
fn collect_unresolved<'g>(group: &'g mut SearchTermGroup, out: &mut Vec<&'g mut SearchTerm>) {
    for entry in &mut group.terms {
        match entry {
            SearchTermGroupEntry::Term(term) => {
                if term.needs_related_terms() {
                    out.push(term);
                }
            }
            SearchTermGroupEntry::Property(property) => {
                if let PropertyNameTerm::Facet(name_term) = &mut property.name {
                    if name_term.needs_related_terms() {
                        out.push(name_term);
                    }
                }
                if property.value.needs_related_terms() {
                    out.push(&mut property.value);
                }
            }
            SearchTermGroupEntry::SubGroup(sub_group) => collect_unresolved(sub_group, out),
        }
    }
}

/// Fill `related_terms` across the group tree from the alias and fuzzy
/// indices. Terms already carrying related terms (or marked exact) are
/// left alone; neither pass re-adds what the other found.
pub(crate) async fn resolve_related_terms(
    conversation: Conversation<'_>,
    group: &mut SearchTermGroup,
    options: &SearchOptions,
) -> Result<()> {
    let mut unresolved: Vec<&mut SearchTerm> = Vec::new();
    collect_unresolved(group, &mut unresolved);
    if unresolved.is_empty() {
        return Ok(());
    }

    if let Some(aliases) = conversation.related_terms {
        let texts: Vec<String> = unresolved
            .iter()
            .map(|term| term.term.prepared_text())
            .collect();
        let found = aliases
            .lookup_terms(&texts)
            .await
            .map_err(|source| RecollectError::upstream("alias lookup", source))?;
        let mut resolved = 0usize;
        for term in unresolved.iter_mut() {
            if let Some(related) = found.get(&term.term.prepared_text()) {
                term.related_terms = Some(dedupe_related(&term.term, related.clone()));
                resolved += 1;
            }
        }
        debug!(total = texts.len(), resolved, "alias pass");
    }

    if let Some(fuzzy) = conversation.fuzzy_index {
        let texts: Vec<String> = unresolved
            .iter()
            .filter(|term| term.related_terms.is_none())
            .map(|term| term.term.prepared_text())
            .collect();
        if !texts.is_empty() {
            let results = fuzzy
                .lookup_terms(
                    &texts,
                    Some(options.max_related_terms),
                    Some(options.min_related_score),
                )
                .await
                .map_err(|source| RecollectError::upstream("fuzzy related-term lookup", source))?;
            debug!(total = texts.len(), "fuzzy pass");
            // `results` is parallel to `texts`, which was collected in the
            // same still-unresolved order we iterate here
            let mut results = results.into_iter();
            for term in unresolved.iter_mut() {
                if term.related_terms.is_some() {
                    continue;
                }
                let Some(related) = results.next() else {
                    break;
                };
                term.related_terms = Some(dedupe_related(&term.term, related));
            }
        }
    }

    Ok(())
}
