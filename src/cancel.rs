//! Cooperative cancellation for long-running analyses.
//!
//! A [`CancellationToken`] is a cloneable handle over a shared flag. The
//! dominance fixpoint and the per-region rewrite loop poll it at iteration
//! and node boundaries; polling never blocks. A triggered token surfaces as
//! [`Error::Cancelled`], distinct from any analysis failure.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag polled by the structuring pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones of this token observe the request.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Non-blocking poll of the cancellation flag.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Poll the flag, converting a pending cancellation into an error.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
