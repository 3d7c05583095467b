use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{QuarryError, Result};

/// Cooperative cancellation signal.
///
/// Import honors it at batch boundaries, search at decoded-read boundaries.
/// Cloning shares the underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The next suspension point observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Abort with `Cancelled` if the flag is set.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(QuarryError::Cancelled)
        } else {
            Ok(())
        }
    }
}
