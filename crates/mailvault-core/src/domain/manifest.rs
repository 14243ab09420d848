//! Deletion manifest domain entity
//!
//! A manifest names a batch of remote messages to delete and tracks that
//! batch through its lifecycle (§4.9). Manifests are persisted as one JSON
//! file per manifest under a per-status directory; moving between
//! directories IS the state transition (`mailvault-deletion` owns that I/O),
//! this module only models the states and the in-memory shape.
//!
//! The persisted shape follows §6's wire format, except the `gmail_ids`
//! field is named `target_ids` here: this manager targets either remote
//! adapter variant (§4.4), not only a Gmail-shaped JSON API, so the
//! provider-specific field name from the spec's own wire shape does not
//! carry over. See `DESIGN.md` for this decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::{ManifestId, RemoteMessageId, SourceId};

/// Lifecycle state of a deletion manifest.
///
/// `cancelled` is a logical state only (§4.9): cancelling a manifest removes
/// its file from `pending` or `in_progress` rather than moving it to a
/// fifth persisted directory, so there is no `Cancelled` variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestStatus {
    /// Created but not yet started.
    Pending,
    /// Execution started; may be resumed from its last-processed index.
    InProgress,
    /// Execution finished (batch mode tolerates partial failure).
    Completed,
    /// Execution stopped on a non-retryable error (non-batch mode, all
    /// items failed).
    Failed,
}

impl ManifestStatus {
    /// Directory name this status is persisted under, relative to the
    /// manifests root. A table, not string coercion (§9 Design Notes).
    pub fn directory_name(&self) -> &'static str {
        match self {
            ManifestStatus::Pending => "pending",
            ManifestStatus::InProgress => "in_progress",
            ManifestStatus::Completed => "completed",
            ManifestStatus::Failed => "failed",
        }
    }

    /// Every persisted status, in directory-table order.
    pub const ALL: [ManifestStatus; 4] = [
        ManifestStatus::Pending,
        ManifestStatus::InProgress,
        ManifestStatus::Completed,
        ManifestStatus::Failed,
    ];

    /// Returns true if a manifest in this state can still make progress.
    pub fn is_resumable(&self) -> bool {
        matches!(self, ManifestStatus::Pending | ManifestStatus::InProgress)
    }
}

impl std::fmt::Display for ManifestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.directory_name())
    }
}

/// The remote operation a manifest's execution performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMethod {
    /// Move to the provider's trash (recoverable).
    Trash,
    /// Permanently delete.
    Delete,
}

impl std::fmt::Display for DeleteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteMethod::Trash => write!(f, "trash"),
            DeleteMethod::Delete => write!(f, "delete"),
        }
    }
}

/// Progress of one execution attempt against a manifest. Re-attached (not
/// replaced) across resumed executions so `failed_ids` and
/// `last_processed_index` survive a crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub method: DeleteMethod,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub succeeded: u64,
    pub failed: u64,
    pub failed_ids: Vec<RemoteMessageId>,
    /// Count of attempted (not merely succeeded) items as of the last
    /// persisted state (§3 invariant: equals attempted count, not completed).
    pub last_processed_index: usize,
}

impl ExecutionRecord {
    fn new(method: DeleteMethod, started_at: DateTime<Utc>) -> Self {
        Self {
            method,
            started_at,
            completed_at: None,
            succeeded: 0,
            failed: 0,
            failed_ids: Vec::new(),
            last_processed_index: 0,
        }
    }
}

/// A batch of remote messages to delete, tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionManifest {
    id: ManifestId,
    source_id: SourceId,
    created_at: DateTime<Utc>,
    created_by: String,
    description: String,
    filters: Value,
    target_ids: Vec<RemoteMessageId>,
    summary: Option<Value>,
    status: ManifestStatus,
    execution: Option<ExecutionRecord>,
}

impl DeletionManifest {
    /// Creates a new pending manifest targeting the given remote ids.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: SourceId,
        slug: impl AsRef<str>,
        created_by: impl Into<String>,
        description: impl Into<String>,
        filters: Value,
        target_ids: Vec<RemoteMessageId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ManifestId::generate(created_at, slug.as_ref())
                .expect("generated manifest ids are always well-formed"),
            source_id,
            created_at,
            created_by: created_by.into(),
            description: description.into(),
            filters,
            target_ids,
            summary: None,
            status: ManifestStatus::Pending,
            execution: None,
        }
    }

    /// Reconstitutes a manifest read back from its JSON file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: ManifestId,
        source_id: SourceId,
        created_at: DateTime<Utc>,
        created_by: impl Into<String>,
        description: impl Into<String>,
        filters: Value,
        target_ids: Vec<RemoteMessageId>,
        summary: Option<Value>,
        status: ManifestStatus,
        execution: Option<ExecutionRecord>,
    ) -> Self {
        Self {
            id,
            source_id,
            created_at,
            created_by: created_by.into(),
            description: description.into(),
            filters,
            target_ids,
            summary,
            status,
            execution,
        }
    }

    pub fn id(&self) -> &ManifestId {
        &self.id
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn filters(&self) -> &Value {
        &self.filters
    }

    pub fn target_ids(&self) -> &[RemoteMessageId] {
        &self.target_ids
    }

    pub fn summary(&self) -> Option<&Value> {
        self.summary.as_ref()
    }

    pub fn set_summary(&mut self, summary: Value) {
        self.summary = Some(summary);
    }

    pub fn status(&self) -> ManifestStatus {
        self.status
    }

    pub fn execution(&self) -> Option<&ExecutionRecord> {
        self.execution.as_ref()
    }

    /// Transitions `Pending` -> `InProgress` and attaches a fresh execution
    /// record on first attempt; on a resumed attempt the existing record
    /// (with its `failed_ids`/`last_processed_index`) is left untouched.
    pub fn start(&mut self, method: DeleteMethod, started_at: DateTime<Utc>) {
        self.status = ManifestStatus::InProgress;
        if self.execution.is_none() {
            self.execution = Some(ExecutionRecord::new(method, started_at));
        }
    }

    /// Records one successful item (including idempotent not-found).
    pub fn record_success(&mut self) {
        if let Some(exec) = &mut self.execution {
            exec.succeeded += 1;
            exec.last_processed_index += 1;
        }
    }

    /// Records one failed item, appending it to `failed_ids` unless already present.
    pub fn record_failure(&mut self, id: RemoteMessageId) {
        if let Some(exec) = &mut self.execution {
            exec.failed += 1;
            exec.last_processed_index += 1;
            if !exec.failed_ids.contains(&id) {
                exec.failed_ids.push(id);
            }
        }
    }

    /// Removes an id from `failed_ids` once a retry succeeds.
    pub fn clear_failure(&mut self, id: &RemoteMessageId) {
        if let Some(exec) = &mut self.execution {
            exec.failed_ids.retain(|f| f != id);
        }
    }

    /// Moves a previously-failed id to succeeded, used by the batch
    /// execution path's end-of-run individual retry of `failed_ids` (§4.9).
    pub fn retry_succeeded(&mut self, id: &RemoteMessageId) {
        if let Some(exec) = &mut self.execution {
            if exec.failed_ids.iter().any(|f| f == id) {
                exec.failed_ids.retain(|f| f != id);
                exec.failed = exec.failed.saturating_sub(1);
                exec.succeeded += 1;
            }
        }
    }

    /// Advances `last_processed_index` directly, for the batch execution
    /// path where whole chunks are attempted at once.
    pub fn advance_last_processed_index(&mut self, to: usize) {
        if let Some(exec) = &mut self.execution {
            exec.last_processed_index = exec.last_processed_index.max(to);
        }
    }

    /// Marks the manifest completed (batch mode tolerates `failed > 0`).
    pub fn complete(&mut self, completed_at: DateTime<Utc>) {
        self.status = ManifestStatus::Completed;
        if let Some(exec) = &mut self.execution {
            exec.completed_at = Some(completed_at);
        }
    }

    /// Marks the manifest failed (non-batch mode, every item failed).
    pub fn fail(&mut self, completed_at: DateTime<Utc>) {
        self.status = ManifestStatus::Failed;
        if let Some(exec) = &mut self.execution {
            exec.completed_at = Some(completed_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeletionManifest {
        DeletionManifest::new(
            SourceId::new(),
            "trash-cleanup",
            "cli",
            "Old promotions",
            serde_json::json!({"label": "Promotions"}),
            vec![
                RemoteMessageId::new("m1").unwrap(),
                RemoteMessageId::new("m2").unwrap(),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn new_manifest_is_pending_with_no_execution() {
        let manifest = sample();
        assert_eq!(manifest.status(), ManifestStatus::Pending);
        assert!(manifest.execution().is_none());
        assert_eq!(manifest.target_ids().len(), 2);
    }

    #[test]
    fn start_attaches_execution_record_once() {
        let mut manifest = sample();
        let now = Utc::now();
        manifest.start(DeleteMethod::Delete, now);
        assert_eq!(manifest.status(), ManifestStatus::InProgress);
        assert_eq!(manifest.execution().unwrap().method, DeleteMethod::Delete);

        manifest.record_success();
        manifest.start(DeleteMethod::Delete, now + chrono::Duration::seconds(5));
        assert_eq!(manifest.execution().unwrap().succeeded, 1, "resumed start must not reset progress");
    }

    #[test]
    fn record_failure_deduplicates_ids() {
        let mut manifest = sample();
        manifest.start(DeleteMethod::Delete, Utc::now());
        let id = manifest.target_ids()[0].clone();
        manifest.record_failure(id.clone());
        manifest.record_failure(id.clone());
        assert_eq!(manifest.execution().unwrap().failed_ids.len(), 1);
        assert_eq!(manifest.execution().unwrap().last_processed_index, 2);
    }

    #[test]
    fn complete_tolerates_partial_failure() {
        let mut manifest = sample();
        manifest.start(DeleteMethod::Delete, Utc::now());
        manifest.record_failure(manifest.target_ids()[0].clone());
        manifest.record_success();
        manifest.complete(Utc::now());
        assert_eq!(manifest.status(), ManifestStatus::Completed);
        assert_eq!(manifest.execution().unwrap().failed, 1);
        assert_eq!(manifest.execution().unwrap().succeeded, 1);
    }

    #[test]
    fn directory_names_match_status() {
        assert_eq!(ManifestStatus::InProgress.directory_name(), "in_progress");
        assert!(ManifestStatus::Pending.is_resumable());
        assert!(!ManifestStatus::Completed.is_resumable());
    }
}
