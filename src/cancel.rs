//! Cooperative cancellation for query evaluation
//!
//! A query is a sequence of async index lookups interleaved with in-memory
//! accumulator work. The evaluation context checks its token before every
//! external call, so cancellation takes effect at the next I/O boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{RecollectError, Result};

/// Cloneable cancellation signal shared between a query host and the
/// evaluation it started.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Fail with [`RecollectError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RecollectError::Cancelled)
        } else {
            Ok(())
        }
    }
}
