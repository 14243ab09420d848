//! Sync progress callback (§6 "Exposed" interfaces)
//!
//! Mirrors the shape of `mailvault-deletion`'s `DeletionProgress`: a plain
//! trait object supplied by the caller, with a no-op default for callers
//! (tests, headless invocations) that don't want to drive a UI.

use chrono::{DateTime, Utc};

/// Progress notifications emitted while a full or incremental sync runs.
pub trait SyncProgress: Send + Sync {
    /// Called once, on the first page, with an estimate of the total item
    /// count if the provider reports one.
    fn on_start(&self, total_estimate: Option<u64>) {
        let _ = total_estimate;
    }

    /// Called after each page settles, with cumulative counters.
    fn on_progress(&self, processed: u64, added: u64, skipped: u64) {
        let _ = (processed, added, skipped);
    }

    /// Called whenever a newly-ingested message's `sent_at` is the earliest
    /// seen so far this run, for a "caught up through …" display.
    fn on_latest_date(&self, at: DateTime<Utc>) {
        let _ = at;
    }

    /// Called once the run reaches a terminal state, with its one-line summary.
    fn on_complete(&self, summary: &str) {
        let _ = summary;
    }

    /// Called on a fatal error before the run ends.
    fn on_error(&self, error: &str) {
        let _ = error;
    }
}

/// A [`SyncProgress`] that does nothing, for callers with no UI to drive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSyncProgress;

impl SyncProgress for NullSyncProgress {}
