//! Sync run domain entity
//!
//! A `SyncRun` is one invocation of the full- or incremental-sync
//! controller. At most one run per source may be `active` at a time;
//! resuming rebinds to that row rather than creating a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Cursor, SourceId, SyncRunId};

/// Which controller produced this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// Full paginated listing (`C7`).
    Full,
    /// History-cursor replay (`C8`).
    Incremental,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKind::Full => write!(f, "full"),
            SyncKind::Incremental => write!(f, "incremental"),
        }
    }
}

/// Terminal or in-flight status of a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Still running, or left in this state by a crash/cancellation so the
    /// next invocation resumes it.
    Active,
    /// Finished without a fatal error (individual item errors may still
    /// have been counted).
    Completed,
    /// Finished with a fatal error; `reason` is a short description
    /// (including `"panic: ..."` for a recovered panic).
    Failed(String),
}

impl SyncStatus {
    /// Returns true if the run is still (or again) resumable.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Active)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Active => write!(f, "active"),
            SyncStatus::Completed => write!(f, "completed"),
            SyncStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A durable checkpoint: an opaque page token plus the counters observed
/// when it was written. Lets a full sync resume at the next page with no
/// double-ingest and no gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Opaque pagination token for the next page to fetch, or `None` if the
    /// run has not yet fetched a page (or has exhausted all pages).
    pub page_token: Option<String>,
    /// Messages processed (attempted) so far.
    pub processed: u64,
    /// Messages newly added so far.
    pub added: u64,
    /// Existing messages updated so far (label changes, tombstones).
    pub updated: u64,
    /// Persistence/parse errors counted so far.
    pub errors: u64,
}

/// One invocation of the full- or incremental-sync controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    id: SyncRunId,
    source_id: SourceId,
    kind: SyncKind,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    checkpoint: Checkpoint,
    status: SyncStatus,
}

impl SyncRun {
    /// Starts a new run for `source_id`.
    pub fn new(source_id: SourceId, kind: SyncKind) -> Self {
        Self {
            id: SyncRunId::new(),
            source_id,
            kind,
            started_at: Utc::now(),
            completed_at: None,
            checkpoint: Checkpoint::default(),
            status: SyncStatus::Active,
        }
    }

    /// Reconstitutes a run from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: SyncRunId,
        source_id: SourceId,
        kind: SyncKind,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        checkpoint: Checkpoint,
        status: SyncStatus,
    ) -> Self {
        Self {
            id,
            source_id,
            kind,
            started_at,
            completed_at,
            checkpoint,
            status,
        }
    }

    /// Returns the run's internal identifier.
    pub fn id(&self) -> SyncRunId {
        self.id
    }

    /// Returns the source this run belongs to.
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Returns which controller produced this run.
    pub fn kind(&self) -> SyncKind {
        self.kind
    }

    /// Returns when the run started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run finished, if it has.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the current durable checkpoint.
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Returns the current status.
    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// Returns true if this run can still be resumed.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Replaces the checkpoint (§4.7 Page loop step 4: "persist checkpoint").
    /// Invariant 3 (§8): counters must never regress between successive
    /// checkpoints within the same run; this is enforced here rather than
    /// left to callers.
    pub fn update_checkpoint(&mut self, checkpoint: Checkpoint) {
        debug_assert!(checkpoint.processed >= self.checkpoint.processed);
        debug_assert!(checkpoint.added >= self.checkpoint.added);
        self.checkpoint = checkpoint;
    }

    /// Marks the run completed.
    pub fn complete(&mut self) {
        self.status = SyncStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Marks the run failed with a short reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = SyncStatus::Failed(reason.into());
        self.completed_at = Some(Utc::now());
    }

    /// A human-readable one-line summary, used by the progress callback's
    /// `on_complete(summary)`.
    pub fn summary(&self) -> String {
        format!(
            "{} sync: processed={} added={} updated={} errors={}",
            self.kind,
            self.checkpoint.processed,
            self.checkpoint.added,
            self.checkpoint.updated,
            self.checkpoint.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_is_active_with_empty_checkpoint() {
        let run = SyncRun::new(SourceId::new(), SyncKind::Full);
        assert!(run.is_active());
        assert_eq!(run.checkpoint().processed, 0);
        assert!(run.completed_at().is_none());
    }

    #[test]
    fn checkpoint_updates_accumulate() {
        let mut run = SyncRun::new(SourceId::new(), SyncKind::Incremental);
        run.update_checkpoint(Checkpoint {
            page_token: Some("p1".into()),
            processed: 10,
            added: 8,
            updated: 1,
            errors: 1,
        });
        assert_eq!(run.checkpoint().processed, 10);
        run.update_checkpoint(Checkpoint {
            page_token: None,
            processed: 20,
            added: 15,
            updated: 2,
            errors: 1,
        });
        assert_eq!(run.checkpoint().added, 15);
    }

    #[test]
    fn complete_and_fail_set_terminal_state() {
        let mut run = SyncRun::new(SourceId::new(), SyncKind::Full);
        run.complete();
        assert!(!run.is_active());
        assert_eq!(*run.status(), SyncStatus::Completed);
        assert!(run.completed_at().is_some());

        let mut run2 = SyncRun::new(SourceId::new(), SyncKind::Full);
        run2.fail("panic: index out of bounds");
        assert!(matches!(run2.status(), SyncStatus::Failed(reason) if reason.contains("panic")));
    }

    #[test]
    fn summary_includes_counters() {
        let mut run = SyncRun::new(SourceId::new(), SyncKind::Full);
        run.update_checkpoint(Checkpoint {
            page_token: None,
            processed: 3,
            added: 3,
            updated: 0,
            errors: 0,
        });
        let summary = run.summary();
        assert!(summary.contains("added=3"));
    }

    #[test]
    fn status_display() {
        assert_eq!(SyncStatus::Active.to_string(), "active");
        assert_eq!(SyncStatus::Completed.to_string(), "completed");
        assert_eq!(
            SyncStatus::Failed("history expired".into()).to_string(),
            "failed: history expired"
        );
    }
}
