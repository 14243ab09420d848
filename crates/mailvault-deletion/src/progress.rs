//! Deletion progress callback (§6 "Exposed" interfaces)
//!
//! Mirrors the shape of the ingest crate's sync progress callback: a plain
//! trait object supplied by the caller, with a no-op default for callers
//! that don't care (CLI invocations that only want the final summary).

/// Progress notifications emitted while a manifest executes.
pub trait DeletionProgress: Send + Sync {
    /// Called once, before the first item is attempted, with the total
    /// item count.
    fn on_start(&self, total: usize) {
        let _ = total;
    }

    /// Called after each item or chunk settles.
    fn on_progress(&self, processed: usize, succeeded: u64, failed: u64) {
        let _ = (processed, succeeded, failed);
    }

    /// Called once execution reaches a terminal state.
    fn on_complete(&self, succeeded: u64, failed: u64) {
        let _ = (succeeded, failed);
    }
}

/// A [`DeletionProgress`] that does nothing, for callers with no UI to drive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDeletionProgress;

impl DeletionProgress for NullDeletionProgress {}
