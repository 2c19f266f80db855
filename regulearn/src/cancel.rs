use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{LearnError, Result};

/// Handle for cooperatively cancelling a learning run. The token can be
/// cloned and cancelled from another thread; the learners check it at their
/// loop tops (between counterexamples, between block finalizations and
/// between blue dequeues) and bail out with [`LearnError::Cancelled`],
/// leaving their data structures in an invariant-satisfying state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. This is sticky, there is no way to un-cancel.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LearnError::Cancelled)
        } else {
            Ok(())
        }
    }
}
