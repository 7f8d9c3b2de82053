//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancel flag for one uploader.
///
/// Clones observe the same flag. The uploader checks it between steps and
/// between page writes; a page already in flight is finished first.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag. The uploader does this itself after a cancelled upload.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
