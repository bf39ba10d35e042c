use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::{UpdaterError, UpdaterResult};

/// Shared cancellation flag threaded through every download, extraction and
/// sequencer step. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once the flag is set.
    pub fn check(&self) -> UpdaterResult<()> {
        if self.is_cancelled() {
            Err(UpdaterError::Cancelled)
        } else {
            Ok(())
        }
    }
}
