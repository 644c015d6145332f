//! Top-level search entry points
//!
//! Convenience wrappers that compile a search group and evaluate it in one
//! call. Hosts wanting to reuse a compiled query across evaluations can
//! call [`compile_knowledge_query`](crate::compile::compile_knowledge_query)
//! and [`run`](crate::query::run) directly.

use tracing::debug;

use crate::cancel::CancelToken;
use crate::compile::{compile_knowledge_query, compile_message_query, SearchOptions, WhenFilter};
use crate::error::Result;
use crate::interfaces::Conversation;
use crate::query::run;
use crate::term::SearchTermGroup;
use crate::types::{KnowledgeSearchResults, ScoredMessageOrdinal};

/// Search a conversation's extracted knowledge.
///
/// Returns matches grouped by knowledge type, each group sorted descending
/// by score and trimmed per `options`.
pub async fn search_conversation_knowledge(
    conversation: Conversation<'_>,
    group: &SearchTermGroup,
    when: Option<&WhenFilter>,
    options: &SearchOptions,
    cancel: CancelToken,
) -> Result<KnowledgeSearchResults> {
    let query = compile_knowledge_query(conversation, group, when, options).await?;
    let results = run(conversation, &query, cancel).await?;
    debug!(groups = results.len(), "knowledge search complete");
    Ok(results)
}

/// Search a conversation for messages reached by matching knowledge.
///
/// `similarity_query` enables re-ranking oversized result sets against the
/// message similarity index when the conversation carries one.
pub async fn search_conversation_messages(
    conversation: Conversation<'_>,
    group: &SearchTermGroup,
    when: Option<&WhenFilter>,
    options: &SearchOptions,
    similarity_query: Option<&str>,
    cancel: CancelToken,
) -> Result<Vec<ScoredMessageOrdinal>> {
    let query =
        compile_message_query(conversation, group, when, options, similarity_query).await?;
    let results = run(conversation, &query, cancel).await?;
    debug!(messages = results.len(), "message search complete");
    Ok(results)
}
