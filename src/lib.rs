//! recollect - Conversation Knowledge Search
//!
//! A query engine over knowledge extracted from conversations: boolean
//! trees of search terms compile into async operator expressions evaluated
//! against host-supplied term/property indices, with score-combining
//! accumulators, related-term expansion, and text-range scoping.

pub mod accumulator;
pub mod cancel;
pub mod compile;
pub mod error;
pub mod interfaces;
pub mod query;
pub mod ranker;
pub mod scope;
pub mod search;
pub mod term;
pub mod types;

pub use cancel::CancelToken;
pub use compile::{SearchOptions, WhenFilter};
pub use error::{RecollectError, Result};
pub use interfaces::Conversation;
pub use search::{search_conversation_knowledge, search_conversation_messages};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
