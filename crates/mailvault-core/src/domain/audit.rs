//! Audit entry domain entities
//!
//! Defines the audit event vocabulary for tracking significant operations
//! across sync runs and deletion manifests, enabling later inspection of
//! what happened and why.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::{AuditId, SourceId, SyncRunId};

/// Actions that can be recorded in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A full or incremental sync run started.
    SyncStart,
    /// A sync run completed without a fatal error.
    SyncComplete,
    /// A sync run failed with a fatal error.
    SyncFailed,
    /// An incremental sync's history cursor expired and fell back to a full
    /// resync (§4.8 step 1).
    HistoryExpired,
    /// A deletion manifest was created.
    ManifestCreated,
    /// A deletion manifest execution started.
    ManifestExecuteStart,
    /// A deletion manifest execution completed.
    ManifestExecuteComplete,
    /// A message or attachment failed to parse or persist.
    ItemError,
    /// Source configuration was changed.
    ConfigChange,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::SyncStart => "sync_start",
            AuditAction::SyncComplete => "sync_complete",
            AuditAction::SyncFailed => "sync_failed",
            AuditAction::HistoryExpired => "history_expired",
            AuditAction::ManifestCreated => "manifest_created",
            AuditAction::ManifestExecuteStart => "manifest_execute_start",
            AuditAction::ManifestExecuteComplete => "manifest_execute_complete",
            AuditAction::ItemError => "item_error",
            AuditAction::ConfigChange => "config_change",
        };
        write!(f, "{}", s)
    }
}

/// Result of an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    /// The action completed successfully.
    Success,
    /// The action failed with an error code and message.
    Failed {
        /// Error code for categorization.
        code: String,
        /// Human-readable error message.
        message: String,
    },
}

impl AuditResult {
    /// Creates a successful result.
    pub fn success() -> Self {
        AuditResult::Success
    }

    /// Creates a failed result with the given code and message.
    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        AuditResult::Failed {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true if the result is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, AuditResult::Success)
    }

    /// Returns true if the result is a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, AuditResult::Failed { .. })
    }
}

/// An audit log entry recording a significant operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier for this audit entry (assigned by the store).
    id: Option<AuditId>,
    /// When the action occurred.
    timestamp: DateTime<Utc>,
    /// Source this entry is associated with, if any.
    source_id: Option<SourceId>,
    /// Sync run this entry is associated with, if any.
    sync_run_id: Option<SyncRunId>,
    /// The type of action that was performed.
    action: AuditAction,
    /// The result of the action.
    result: AuditResult,
    /// Additional structured details about the action.
    details: Value,
    /// How long the action took in milliseconds.
    duration_ms: Option<u64>,
}

impl AuditEntry {
    /// Creates a new audit entry with the required fields.
    ///
    /// The `id` field is set to `None` and will be assigned when the entry
    /// is persisted.
    pub fn new(action: AuditAction, result: AuditResult) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            source_id: None,
            sync_run_id: None,
            action,
            result,
            details: Value::Null,
            duration_ms: None,
        }
    }

    /// Returns the audit entry ID (None if not yet persisted).
    pub fn id(&self) -> Option<AuditId> {
        self.id
    }

    /// Sets the ID for this audit entry (typically called after insert).
    pub fn with_id(mut self, id: AuditId) -> Self {
        self.id = Some(id);
        self
    }

    /// Overrides the timestamp, for reconstructing an entry read back from
    /// storage (the `new` constructor otherwise always stamps "now").
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns when the action occurred.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the source ID if present.
    pub fn source_id(&self) -> Option<SourceId> {
        self.source_id
    }

    /// Returns the sync run ID if present.
    pub fn sync_run_id(&self) -> Option<SyncRunId> {
        self.sync_run_id
    }

    /// Returns the action type.
    pub fn action(&self) -> &AuditAction {
        &self.action
    }

    /// Returns the action result.
    pub fn result(&self) -> &AuditResult {
        &self.result
    }

    /// Returns the additional details.
    pub fn details(&self) -> &Value {
        &self.details
    }

    /// Returns the duration in milliseconds if recorded.
    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Associates this entry with a source.
    pub fn with_source_id(mut self, source_id: SourceId) -> Self {
        self.source_id = Some(source_id);
        self
    }

    /// Associates this entry with a sync run.
    pub fn with_sync_run_id(mut self, sync_run_id: SyncRunId) -> Self {
        self.sync_run_id = Some(sync_run_id);
        self
    }

    /// Sets additional details for this audit entry.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Sets the duration in milliseconds for this audit entry.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn audit_action_serialization() {
        let action = AuditAction::SyncStart;
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, "\"sync_start\"");

        let deserialized: AuditAction = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, action);
    }

    #[test]
    fn audit_action_display() {
        assert_eq!(AuditAction::HistoryExpired.to_string(), "history_expired");
        assert_eq!(AuditAction::ManifestExecuteComplete.to_string(), "manifest_execute_complete");
    }

    #[test]
    fn audit_result_success() {
        let result = AuditResult::success();
        assert!(result.is_success());
        assert!(!result.is_failed());
    }

    #[test]
    fn audit_result_failed() {
        let result = AuditResult::failed("E001", "Network error");
        assert!(!result.is_success());
        assert!(result.is_failed());

        if let AuditResult::Failed { code, message } = result {
            assert_eq!(code, "E001");
            assert_eq!(message, "Network error");
        } else {
            panic!("Expected Failed variant");
        }
    }

    #[test]
    fn audit_entry_new() {
        let entry = AuditEntry::new(AuditAction::SyncStart, AuditResult::success());

        assert!(entry.id().is_none());
        assert_eq!(*entry.action(), AuditAction::SyncStart);
        assert!(entry.result().is_success());
        assert!(entry.source_id().is_none());
        assert!(entry.sync_run_id().is_none());
        assert_eq!(*entry.details(), Value::Null);
        assert!(entry.duration_ms().is_none());
    }

    #[test]
    fn audit_entry_with_id() {
        let entry = AuditEntry::new(AuditAction::SyncStart, AuditResult::success()).with_id(AuditId::new(42));

        assert_eq!(entry.id(), Some(AuditId::new(42)));
    }

    #[test]
    fn audit_entry_builder_pattern() {
        let source_id = SourceId::new();
        let run_id = SyncRunId::new();
        let details = json!({"page_token": "abc", "processed": 120});

        let entry = AuditEntry::new(AuditAction::SyncComplete, AuditResult::success())
            .with_source_id(source_id)
            .with_sync_run_id(run_id)
            .with_details(details.clone())
            .with_duration_ms(150);

        assert_eq!(entry.source_id(), Some(source_id));
        assert_eq!(entry.sync_run_id(), Some(run_id));
        assert_eq!(*entry.details(), details);
        assert_eq!(entry.duration_ms(), Some(150));
    }

    #[test]
    fn audit_entry_serialization() {
        let entry = AuditEntry::new(AuditAction::ManifestExecuteComplete, AuditResult::success())
            .with_details(json!({"manifest": "20260115-093000-trash-cleanup"}))
            .with_duration_ms(500);

        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: AuditEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.action(), entry.action());
        assert_eq!(deserialized.result(), entry.result());
        assert_eq!(deserialized.details(), entry.details());
        assert_eq!(deserialized.duration_ms(), entry.duration_ms());
    }

    #[test]
    fn audit_entry_error_action() {
        let entry = AuditEntry::new(AuditAction::ItemError, AuditResult::failed("MIME_PARSE", "malformed multipart boundary"))
            .with_details(json!({"remote_message_id": "msg-123", "retry_count": 3}));

        assert_eq!(*entry.action(), AuditAction::ItemError);
        assert!(entry.result().is_failed());
    }
}
