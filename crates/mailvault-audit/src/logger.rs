//! `AuditLogger` - high-level audit logging service
//!
//! Wraps [`Store::save_audit`] with convenience methods for each audited
//! action in [`AuditAction`] (§9 "best-effort, swallow and warn"). Every
//! method is non-fatal: a failure to persist an audit entry is logged via
//! `tracing::warn!` but never propagated to the caller.

use std::sync::Arc;

use mailvault_core::domain::{AuditAction, AuditEntry, AuditResult, SourceId, SyncRunId};
use mailvault_core::ports::Store;
use serde_json::json;

use crate::reason::ReasonCode;

/// High-level audit logger wrapping a [`Store`]'s audit persistence.
pub struct AuditLogger {
    store: Arc<dyn Store>,
}

impl AuditLogger {
    /// Creates a new logger backed by the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn save(&self, entry: AuditEntry) {
        if let Err(e) = self.store.save_audit(entry).await {
            tracing::warn!(error = %e, "failed to save audit entry");
        }
    }

    /// Logs the start of a full or incremental sync run.
    pub async fn log_sync_start(&self, source_id: SourceId, sync_run_id: SyncRunId) {
        let entry = AuditEntry::new(AuditAction::SyncStart, AuditResult::success())
            .with_source_id(source_id)
            .with_sync_run_id(sync_run_id);
        self.save(entry).await;
    }

    /// Logs the successful completion of a sync run (§4.7 Finalize, §4.8 step 5).
    pub async fn log_sync_complete(
        &self,
        source_id: SourceId,
        sync_run_id: SyncRunId,
        duration_ms: u64,
        processed: u64,
        added: u64,
        updated: u64,
        errors: u64,
    ) {
        let entry = AuditEntry::new(AuditAction::SyncComplete, AuditResult::success())
            .with_source_id(source_id)
            .with_sync_run_id(sync_run_id)
            .with_duration_ms(duration_ms)
            .with_details(json!({
                "processed": processed,
                "added": added,
                "updated": updated,
                "errors": errors,
            }));
        self.save(entry).await;
    }

    /// Logs a sync run that ended in a fatal error, including a recovered panic.
    pub async fn log_sync_failed(&self, source_id: SourceId, sync_run_id: SyncRunId, reason: &str) {
        let entry = AuditEntry::new(AuditAction::SyncFailed, AuditResult::failed("SYNC_FAILED", reason))
            .with_source_id(source_id)
            .with_sync_run_id(sync_run_id);
        self.save(entry).await;
    }

    /// Logs an incremental sync's history cursor expiring and falling back
    /// to a full resync (§4.8 step 1).
    pub async fn log_history_expired(&self, source_id: SourceId, sync_run_id: SyncRunId) {
        let entry = AuditEntry::new(AuditAction::HistoryExpired, AuditResult::success())
            .with_source_id(source_id)
            .with_sync_run_id(sync_run_id);
        self.save(entry).await;
    }

    /// Logs creation of a deletion manifest.
    pub async fn log_manifest_created(&self, source_id: SourceId, manifest_id: &str, target_count: usize) {
        let entry = AuditEntry::new(AuditAction::ManifestCreated, AuditResult::success())
            .with_source_id(source_id)
            .with_details(json!({
                "manifest_id": manifest_id,
                "target_count": target_count,
            }));
        self.save(entry).await;
    }

    /// Logs the start of a deletion manifest's execution.
    pub async fn log_manifest_execute_start(&self, source_id: SourceId, manifest_id: &str) {
        let entry = AuditEntry::new(AuditAction::ManifestExecuteStart, AuditResult::success())
            .with_source_id(source_id)
            .with_details(json!({ "manifest_id": manifest_id }));
        self.save(entry).await;
    }

    /// Logs completion of a deletion manifest's execution (batch mode
    /// tolerates `failed > 0`, so this is always a success result).
    pub async fn log_manifest_execute_complete(
        &self,
        source_id: SourceId,
        manifest_id: &str,
        duration_ms: u64,
        succeeded: u64,
        failed: u64,
    ) {
        let entry = AuditEntry::new(AuditAction::ManifestExecuteComplete, AuditResult::success())
            .with_source_id(source_id)
            .with_duration_ms(duration_ms)
            .with_details(json!({
                "manifest_id": manifest_id,
                "succeeded": succeeded,
                "failed": failed,
            }));
        self.save(entry).await;
    }

    /// Logs a message or attachment that failed to parse or persist during
    /// ingest, tagged with a structured [`ReasonCode`] where one applies.
    pub async fn log_item_error(&self, source_id: SourceId, remote_message_id: &str, reason: ReasonCode, message: &str) {
        let entry = AuditEntry::new(AuditAction::ItemError, AuditResult::failed(reason.to_string(), message))
            .with_source_id(source_id)
            .with_details(json!({ "remote_message_id": remote_message_id }));
        self.save(entry).await;
    }

    /// Logs a change to a source's configuration.
    pub async fn log_config_change(&self, source_id: SourceId, details: serde_json::Value) {
        let entry = AuditEntry::new(AuditAction::ConfigChange, AuditResult::success())
            .with_source_id(source_id)
            .with_details(details);
        self.save(entry).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use mailvault_core::domain::{
        Attachment, AttachmentId, Checkpoint, Conversation, ConversationId, Cursor, Email, Label,
        LabelId, MailSource, MessageId, MessageRecord, ParticipantId, RecipientKind, RemoteLabelId,
        RemoteMessageId, RemoteThreadId, SourceId, SourceKind, SyncKind, SyncRun, SyncRunId,
    };
    use mailvault_core::ports::StoreError;

    use super::*;

    /// In-memory fake store that only records saved audit entries; every
    /// other method is unreachable from these tests.
    #[derive(Default)]
    struct RecordingStore {
        entries: Mutex<Vec<AuditEntry>>,
    }

    impl RecordingStore {
        fn entries(&self) -> Vec<AuditEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn get_or_create_source(&self, _: &str, _: SourceKind) -> Result<MailSource, StoreError> {
            unimplemented!()
        }
        async fn get_source_by_identifier(&self, _: &str) -> Result<Option<MailSource>, StoreError> {
            unimplemented!()
        }
        async fn update_source_sync_cursor(&self, _: SourceId, _: Cursor) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn start_sync(&self, _: SourceId, _: SyncKind) -> Result<SyncRun, StoreError> {
            unimplemented!()
        }
        async fn get_active_sync(&self, _: SourceId, _: SyncKind) -> Result<Option<SyncRun>, StoreError> {
            unimplemented!()
        }
        async fn update_sync_checkpoint(&self, _: SyncRunId, _: Checkpoint) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn complete_sync(&self, _: SyncRunId, _: DateTime<Utc>) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn fail_sync(&self, _: SyncRunId, _: &str, _: DateTime<Utc>) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn messages_exist_batch(
            &self,
            _: SourceId,
            _: &[RemoteMessageId],
        ) -> Result<HashSet<RemoteMessageId>, StoreError> {
            unimplemented!()
        }
        async fn get_message_by_remote_id(
            &self,
            _: SourceId,
            _: &RemoteMessageId,
        ) -> Result<Option<MessageRecord>, StoreError> {
            unimplemented!()
        }
        async fn ensure_participants_batch(
            &self,
            _: &[(Email, Option<String>)],
        ) -> Result<HashMap<Email, ParticipantId>, StoreError> {
            unimplemented!()
        }
        async fn ensure_labels_batch(
            &self,
            _: SourceId,
            _: &[(RemoteLabelId, String)],
        ) -> Result<HashMap<RemoteLabelId, LabelId>, StoreError> {
            unimplemented!()
        }
        async fn ensure_conversation(&self, _: SourceId, _: RemoteThreadId, _: &str) -> Result<ConversationId, StoreError> {
            unimplemented!()
        }
        async fn get_conversation(&self, _: ConversationId) -> Result<Option<Conversation>, StoreError> {
            unimplemented!()
        }
        async fn upsert_message(&self, _: &MessageRecord) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn upsert_message_body(&self, _: MessageId, _: Option<&str>, _: Option<&str>) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn upsert_message_raw(&self, _: MessageId, _: &[u8]) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn replace_message_recipients(
            &self,
            _: MessageId,
            _: &[(RecipientKind, ParticipantId, Option<String>)],
        ) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn replace_message_labels(&self, _: MessageId, _: &[LabelId]) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn add_message_labels(&self, _: MessageId, _: &[LabelId]) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn remove_message_labels(&self, _: MessageId, _: &[LabelId]) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn mark_messages_deleted_batch(
            &self,
            _: SourceId,
            _: &[RemoteMessageId],
            _: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            unimplemented!()
        }
        async fn upsert_attachment(&self, _: &Attachment) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn save_audit(&self, entry: AuditEntry) -> Result<mailvault_core::domain::AuditId, StoreError> {
            self.entries.lock().unwrap().push(entry);
            Ok(mailvault_core::domain::AuditId::new(1))
        }
    }

    /// A store whose `save_audit` always fails, to exercise the swallow-and-warn path.
    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn get_or_create_source(&self, _: &str, _: SourceKind) -> Result<MailSource, StoreError> {
            unimplemented!()
        }
        async fn get_source_by_identifier(&self, _: &str) -> Result<Option<MailSource>, StoreError> {
            unimplemented!()
        }
        async fn update_source_sync_cursor(&self, _: SourceId, _: Cursor) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn start_sync(&self, _: SourceId, _: SyncKind) -> Result<SyncRun, StoreError> {
            unimplemented!()
        }
        async fn get_active_sync(&self, _: SourceId, _: SyncKind) -> Result<Option<SyncRun>, StoreError> {
            unimplemented!()
        }
        async fn update_sync_checkpoint(&self, _: SyncRunId, _: Checkpoint) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn complete_sync(&self, _: SyncRunId, _: DateTime<Utc>) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn fail_sync(&self, _: SyncRunId, _: &str, _: DateTime<Utc>) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn messages_exist_batch(
            &self,
            _: SourceId,
            _: &[RemoteMessageId],
        ) -> Result<HashSet<RemoteMessageId>, StoreError> {
            unimplemented!()
        }
        async fn get_message_by_remote_id(
            &self,
            _: SourceId,
            _: &RemoteMessageId,
        ) -> Result<Option<MessageRecord>, StoreError> {
            unimplemented!()
        }
        async fn ensure_participants_batch(
            &self,
            _: &[(Email, Option<String>)],
        ) -> Result<HashMap<Email, ParticipantId>, StoreError> {
            unimplemented!()
        }
        async fn ensure_labels_batch(
            &self,
            _: SourceId,
            _: &[(RemoteLabelId, String)],
        ) -> Result<HashMap<RemoteLabelId, LabelId>, StoreError> {
            unimplemented!()
        }
        async fn ensure_conversation(&self, _: SourceId, _: RemoteThreadId, _: &str) -> Result<ConversationId, StoreError> {
            unimplemented!()
        }
        async fn get_conversation(&self, _: ConversationId) -> Result<Option<Conversation>, StoreError> {
            unimplemented!()
        }
        async fn upsert_message(&self, _: &MessageRecord) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn upsert_message_body(&self, _: MessageId, _: Option<&str>, _: Option<&str>) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn upsert_message_raw(&self, _: MessageId, _: &[u8]) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn replace_message_recipients(
            &self,
            _: MessageId,
            _: &[(RecipientKind, ParticipantId, Option<String>)],
        ) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn replace_message_labels(&self, _: MessageId, _: &[LabelId]) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn add_message_labels(&self, _: MessageId, _: &[LabelId]) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn remove_message_labels(&self, _: MessageId, _: &[LabelId]) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn mark_messages_deleted_batch(
            &self,
            _: SourceId,
            _: &[RemoteMessageId],
            _: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            unimplemented!()
        }
        async fn upsert_attachment(&self, _: &Attachment) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn save_audit(&self, _: AuditEntry) -> Result<mailvault_core::domain::AuditId, StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn log_sync_start_persists_one_entry() {
        let store = Arc::new(RecordingStore::default());
        let logger = AuditLogger::new(store.clone());
        let source_id = SourceId::new();
        let run_id = SyncRunId::new();

        logger.log_sync_start(source_id, run_id).await;

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(*entries[0].action(), AuditAction::SyncStart);
        assert_eq!(entries[0].source_id(), Some(source_id));
        assert_eq!(entries[0].sync_run_id(), Some(run_id));
    }

    #[tokio::test]
    async fn log_sync_complete_carries_counters() {
        let store = Arc::new(RecordingStore::default());
        let logger = AuditLogger::new(store.clone());

        logger.log_sync_complete(SourceId::new(), SyncRunId::new(), 1500, 120, 100, 15, 5).await;

        let entries = store.entries();
        assert_eq!(*entries[0].action(), AuditAction::SyncComplete);
        assert_eq!(entries[0].duration_ms(), Some(1500));
        assert_eq!(entries[0].details()["added"], 100);
        assert_eq!(entries[0].details()["errors"], 5);
    }

    #[tokio::test]
    async fn log_item_error_marks_result_failed() {
        let store = Arc::new(RecordingStore::default());
        let logger = AuditLogger::new(store.clone());

        logger
            .log_item_error(SourceId::new(), "msg-123", ReasonCode::NetworkError, "request timed out")
            .await;

        let entries = store.entries();
        assert_eq!(*entries[0].action(), AuditAction::ItemError);
        assert!(entries[0].result().is_failed());
        assert_eq!(entries[0].details()["remote_message_id"], "msg-123");
    }

    #[tokio::test]
    async fn manifest_lifecycle_is_logged() {
        let store = Arc::new(RecordingStore::default());
        let logger = AuditLogger::new(store.clone());
        let source_id = SourceId::new();

        logger.log_manifest_created(source_id, "20260115-093000-trash-cleanup", 42).await;
        logger.log_manifest_execute_start(source_id, "20260115-093000-trash-cleanup").await;
        logger.log_manifest_execute_complete(source_id, "20260115-093000-trash-cleanup", 3000, 40, 2).await;

        let entries = store.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(*entries[2].action(), AuditAction::ManifestExecuteComplete);
        assert_eq!(entries[2].details()["failed"], 2);
    }

    #[tokio::test]
    async fn audit_failure_is_swallowed_not_propagated() {
        let logger = AuditLogger::new(Arc::new(FailingStore));

        // None of these return a Result, so a panic here would be the only
        // observable failure mode; reaching the end of the test is the assertion.
        logger.log_sync_start(SourceId::new(), SyncRunId::new()).await;
        logger.log_item_error(SourceId::new(), "msg-1", ReasonCode::NetworkError, "boom").await;
    }
}
