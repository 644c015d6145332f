//! Error types for recollect

use thiserror::Error;

/// Boxed error produced by external index and collection adapters.
pub type ExternalError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for recollect operations
pub type Result<T> = std::result::Result<T, RecollectError>;

/// Main error type for recollect
#[derive(Error, Debug)]
pub enum RecollectError {
    /// The query was cancelled through its [`CancelToken`](crate::cancel::CancelToken).
    #[error("query cancelled")]
    Cancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    /// An ordinal resolved outside the bounds of its collection. Indicates a
    /// corrupt or mismatched index; fatal for the running query.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// An external index or collection failed. `op` names the operator that
    /// observed the failure.
    #[error("{op}: upstream failure: {source}")]
    Upstream {
        op: &'static str,
        #[source]
        source: ExternalError,
    },
}

impl RecollectError {
    /// Wrap an adapter error, recording the operator that observed it.
    pub fn upstream(op: &'static str, source: ExternalError) -> Self {
        RecollectError::Upstream { op, source }
    }

    /// Fatal errors abort the evaluation; they are never downgraded to
    /// "no contribution".
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecollectError::Cancelled | RecollectError::DataCorruption(_)
        )
    }
}
