//! Store port
//!
//! The durable record of everything ingest and deletion touch: sources,
//! sync runs and their checkpoints, the message/conversation/label/
//! participant/attachment tables, and the audit log (§3, §6). `mailvault-store`
//! provides the SQLite-backed implementation; tests may provide an in-memory
//! fake built on the same trait.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    Attachment, AuditEntry, AuditId, Checkpoint, Conversation, ConversationId, Cursor, Email,
    Label, LabelId, MailSource, MessageId, MessageRecord, ParticipantId, RecipientKind,
    RemoteLabelId, RemoteMessageId, RemoteThreadId, SourceId, SourceKind, SyncKind, SyncRun,
    SyncRunId,
};

/// Errors raised by a [`Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("referenced {0} does not exist")]
    NotFound(String),
    #[error("invalid domain data: {0}")]
    InvalidData(String),
}

/// Durable persistence for sources, sync state, and the mail archive itself.
///
/// Every batch method (`*_batch`) exists because the ingest worker (§4.6)
/// calls it once per page of up to a few hundred messages rather than once
/// per message; implementations should use a single statement or a single
/// transaction per call, not one round trip per item.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the source for `identifier`, creating it with `kind` if it
    /// does not yet exist. `kind` is ignored if the source already exists.
    async fn get_or_create_source(&self, identifier: &str, kind: SourceKind) -> Result<MailSource, StoreError>;

    /// Looks up a source by its external identifier without creating one.
    async fn get_source_by_identifier(&self, identifier: &str) -> Result<Option<MailSource>, StoreError>;

    /// Advances a source's durable history cursor (§4.7 Finalize, §4.8 step 5).
    async fn update_source_sync_cursor(&self, source_id: SourceId, cursor: Cursor) -> Result<(), StoreError>;

    /// Starts a new sync run, or returns the existing active run for
    /// `(source_id, kind)` unchanged if one is already in flight — callers
    /// resume rather than create a duplicate (§4.7/§4.8 step "Init").
    async fn start_sync(&self, source_id: SourceId, kind: SyncKind) -> Result<SyncRun, StoreError>;

    /// Returns the active (unfinished) run for `(source_id, kind)`, if any.
    async fn get_active_sync(&self, source_id: SourceId, kind: SyncKind) -> Result<Option<SyncRun>, StoreError>;

    /// Persists a new checkpoint for a run (§4.7 Page loop step 4). Must be
    /// durable before the next page is fetched, so a crash resumes here.
    async fn update_sync_checkpoint(&self, run_id: SyncRunId, checkpoint: Checkpoint) -> Result<(), StoreError>;

    /// Marks a run completed.
    async fn complete_sync(&self, run_id: SyncRunId, completed_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Marks a run failed with a short reason (including a recovered panic).
    async fn fail_sync(&self, run_id: SyncRunId, reason: &str, completed_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Returns the subset of `remote_ids` that already have a (possibly
    /// tombstoned) message row for `source_id` — the ingest worker's
    /// existence check (§4.6 step 1) so it skips re-fetching known messages.
    async fn messages_exist_batch(
        &self,
        source_id: SourceId,
        remote_ids: &[RemoteMessageId],
    ) -> Result<HashSet<RemoteMessageId>, StoreError>;

    /// Looks up a single message by its remote id, used when an incremental
    /// sync's label-added event names a message id the store does not
    /// recognize yet and must fetch and ingest it first (§4.8 step 4).
    async fn get_message_by_remote_id(
        &self,
        source_id: SourceId,
        remote_id: &RemoteMessageId,
    ) -> Result<Option<MessageRecord>, StoreError>;

    /// Ensures a participant row exists for each `(email, display_name)` pair,
    /// updating the best-seen display name in place, and returns the
    /// resulting id for each address.
    async fn ensure_participants_batch(
        &self,
        participants: &[(Email, Option<String>)],
    ) -> Result<HashMap<Email, ParticipantId>, StoreError>;

    /// Ensures a label row exists for each `(remote_label_id, name)` pair
    /// under `source_id` and returns the resulting id for each.
    async fn ensure_labels_batch(
        &self,
        source_id: SourceId,
        labels: &[(RemoteLabelId, String)],
    ) -> Result<HashMap<RemoteLabelId, LabelId>, StoreError>;

    /// Ensures a conversation row exists for `(source_id, remote_thread_id)`,
    /// taking `subject` only if the conversation is newly created.
    async fn ensure_conversation(
        &self,
        source_id: SourceId,
        remote_thread_id: RemoteThreadId,
        subject: &str,
    ) -> Result<ConversationId, StoreError>;

    /// Returns a conversation by internal id, used by CLI inspection commands.
    async fn get_conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError>;

    /// Inserts a new message row, or replaces it in place if one already
    /// exists for `(source_id, remote_message_id)` (re-ingest after a
    /// previous partial failure).
    async fn upsert_message(&self, message: &MessageRecord) -> Result<(), StoreError>;

    /// Replaces a message's decoded body text/HTML side-table row.
    async fn upsert_message_body(
        &self,
        message_id: MessageId,
        text: Option<&str>,
        html: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Replaces a message's raw-bytes side-table row.
    async fn upsert_message_raw(&self, message_id: MessageId, raw: &[u8]) -> Result<(), StoreError>;

    /// Atomically replaces every recipient join row for a message (§3: "an
    /// atomic replace-all, never an incremental diff").
    async fn replace_message_recipients(
        &self,
        message_id: MessageId,
        recipients: &[(RecipientKind, ParticipantId, Option<String>)],
    ) -> Result<(), StoreError>;

    /// Atomically replaces a message's entire label set (used on full sync
    /// and whenever a message is re-ingested).
    async fn replace_message_labels(&self, message_id: MessageId, label_ids: &[LabelId]) -> Result<(), StoreError>;

    /// Adds labels to a message's existing set without touching the rest
    /// (incremental sync's history-event diffing, §4.8 step 4).
    async fn add_message_labels(&self, message_id: MessageId, label_ids: &[LabelId]) -> Result<(), StoreError>;

    /// Removes labels from a message's existing set without touching the rest.
    async fn remove_message_labels(&self, message_id: MessageId, label_ids: &[LabelId]) -> Result<(), StoreError>;

    /// Sets the tombstone timestamp for every message among `remote_ids` that
    /// is not already tombstoned, returning how many rows were changed.
    async fn mark_messages_deleted_batch(
        &self,
        source_id: SourceId,
        remote_ids: &[RemoteMessageId],
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Inserts an attachment row, or replaces it in place if one already
    /// exists for `(message_id, content_hash)`.
    async fn upsert_attachment(&self, attachment: &Attachment) -> Result<(), StoreError>;

    /// Appends an audit entry and returns its assigned id. Callers treat
    /// failures here as non-fatal (§9: "best-effort, swallow and warn").
    async fn save_audit(&self, entry: AuditEntry) -> Result<AuditId, StoreError>;
}
