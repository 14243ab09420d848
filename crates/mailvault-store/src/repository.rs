//! SQLite implementation of the `Store` port
//!
//! Handles all domain type serialization/deserialization and SQL query
//! construction for the mail archive (§3, §6).
//!
//! ## Type Mapping
//!
//! | Domain Type            | SQL Type | Strategy                              |
//! |-------------------------|----------|----------------------------------------|
//! | SourceId, MessageId, …  | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | AuditId                 | INTEGER  | raw row id                             |
//! | RemoteMessageId, …      | TEXT     | String via `.as_str()` / `new()`       |
//! | Email                   | TEXT     | String via `.as_str()` / `new()`       |
//! | ContentHash              | TEXT     | 64 hex chars via `.as_str()` / `new()` |
//! | DateTime<Utc>            | TEXT     | RFC 3339 via `to_rfc3339()` / `parse_from_rfc3339()` |
//! | serde_json::Value        | TEXT     | `serde_json` serialization             |

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailvault_core::domain::{
    Attachment, AuditAction, AuditEntry, AuditId, AuditResult, Checkpoint,
    Conversation, ConversationId, Cursor, Email, Label, LabelId, MailSource, MessageId,
    MessageRecord, ParticipantId, RecipientKind, RemoteLabelId, RemoteMessageId, RemoteThreadId,
    SourceId, SourceKind, SyncKind, SyncRun, SyncRunId, SyncStatus,
};
use mailvault_core::ports::{Store, StoreError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// SQLite-backed implementation of the [`Store`] port.
///
/// All operations go through a connection pool; batch methods use a single
/// transaction so the ingest worker's per-page calls (§4.6) don't pay one
/// round trip per message.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wraps an already-open connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn invalid(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::InvalidData(format!("{context}: {e}"))
}

fn parse_datetime(s: &str, context: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(context, e))
}

fn source_kind_to_str(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::JsonApi => "json_api",
        SourceKind::MailboxProtocol => "mailbox_protocol",
    }
}

fn source_kind_from_str(s: &str) -> Result<SourceKind, StoreError> {
    match s {
        "json_api" => Ok(SourceKind::JsonApi),
        "mailbox_protocol" => Ok(SourceKind::MailboxProtocol),
        other => Err(invalid("source kind", other)),
    }
}

fn sync_kind_to_str(kind: SyncKind) -> &'static str {
    match kind {
        SyncKind::Full => "full",
        SyncKind::Incremental => "incremental",
    }
}

fn sync_kind_from_str(s: &str) -> Result<SyncKind, StoreError> {
    match s {
        "full" => Ok(SyncKind::Full),
        "incremental" => Ok(SyncKind::Incremental),
        other => Err(invalid("sync kind", other)),
    }
}

fn recipient_kind_to_str(kind: RecipientKind) -> &'static str {
    match kind {
        RecipientKind::From => "from",
        RecipientKind::To => "to",
        RecipientKind::Cc => "cc",
        RecipientKind::Bcc => "bcc",
    }
}

fn recipient_kind_from_str(s: &str) -> Result<RecipientKind, StoreError> {
    match s {
        "from" => Ok(RecipientKind::From),
        "to" => Ok(RecipientKind::To),
        "cc" => Ok(RecipientKind::Cc),
        "bcc" => Ok(RecipientKind::Bcc),
        other => Err(invalid("recipient kind", other)),
    }
}

fn source_from_row(row: &SqliteRow) -> Result<MailSource, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let identifier: String = row.try_get("identifier").map_err(backend)?;
    let kind: String = row.try_get("kind").map_err(backend)?;
    let cursor: Option<i64> = row.try_get("cursor").map_err(backend)?;
    let created_at: String = row.try_get("created_at").map_err(backend)?;

    Ok(MailSource::with_id(
        SourceId::from_str(&id).map_err(|e| invalid("source id", e))?,
        identifier,
        source_kind_from_str(&kind)?,
        cursor.map(Cursor::new),
        parse_datetime(&created_at, "source created_at")?,
    ))
}

fn checkpoint_from_row(row: &SqliteRow) -> Result<Checkpoint, StoreError> {
    Ok(Checkpoint {
        page_token: row.try_get("checkpoint_page_token").map_err(backend)?,
        processed: row.try_get::<i64, _>("checkpoint_processed").map_err(backend)? as u64,
        added: row.try_get::<i64, _>("checkpoint_added").map_err(backend)? as u64,
        updated: row.try_get::<i64, _>("checkpoint_updated").map_err(backend)? as u64,
        errors: row.try_get::<i64, _>("checkpoint_errors").map_err(backend)? as u64,
    })
}

fn sync_run_from_row(row: &SqliteRow) -> Result<SyncRun, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let source_id: String = row.try_get("source_id").map_err(backend)?;
    let kind: String = row.try_get("kind").map_err(backend)?;
    let started_at: String = row.try_get("started_at").map_err(backend)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;
    let fail_reason: Option<String> = row.try_get("fail_reason").map_err(backend)?;

    let status = match status.as_str() {
        "active" => SyncStatus::Active,
        "completed" => SyncStatus::Completed,
        "failed" => SyncStatus::Failed(fail_reason.unwrap_or_default()),
        other => return Err(invalid("sync status", other)),
    };

    Ok(SyncRun::with_id(
        SyncRunId::from_str(&id).map_err(|e| invalid("sync run id", e))?,
        SourceId::from_str(&source_id).map_err(|e| invalid("source id", e))?,
        sync_kind_from_str(&kind)?,
        parse_datetime(&started_at, "sync run started_at")?,
        completed_at.map(|s| parse_datetime(&s, "sync run completed_at")).transpose()?,
        checkpoint_from_row(row)?,
        status,
    ))
}

fn message_from_row(row: &SqliteRow) -> Result<MessageRecord, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let source_id: String = row.try_get("source_id").map_err(backend)?;
    let remote_message_id: String = row.try_get("remote_message_id").map_err(backend)?;
    let conversation_id: String = row.try_get("conversation_id").map_err(backend)?;
    let from_participant_id: Option<String> = row.try_get("from_participant_id").map_err(backend)?;
    let sent_at: String = row.try_get("sent_at").map_err(backend)?;
    let size_estimate: i64 = row.try_get("size_estimate").map_err(backend)?;
    let attachment_count: i64 = row.try_get("attachment_count").map_err(backend)?;
    let subject: String = row.try_get("subject").map_err(backend)?;
    let snippet: String = row.try_get("snippet").map_err(backend)?;
    let tombstoned_at: Option<String> = row.try_get("tombstoned_at").map_err(backend)?;

    Ok(MessageRecord::with_id(
        MessageId::from_str(&id).map_err(|e| invalid("message id", e))?,
        SourceId::from_str(&source_id).map_err(|e| invalid("source id", e))?,
        RemoteMessageId::new(remote_message_id).map_err(|e| invalid("remote message id", e))?,
        ConversationId::from_str(&conversation_id).map_err(|e| invalid("conversation id", e))?,
        from_participant_id
            .map(|s| ParticipantId::from_str(&s))
            .transpose()
            .map_err(|e| invalid("participant id", e))?,
        parse_datetime(&sent_at, "message sent_at")?,
        size_estimate as u64,
        attachment_count as u32,
        subject,
        snippet,
        tombstoned_at.map(|s| parse_datetime(&s, "message tombstoned_at")).transpose()?,
    ))
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_or_create_source(&self, identifier: &str, kind: SourceKind) -> Result<MailSource, StoreError> {
        if let Some(existing) = self.get_source_by_identifier(identifier).await? {
            return Ok(existing);
        }

        let source = MailSource::new(identifier, kind);
        let id = source.id().to_string();
        let created_at = source.created_at().to_rfc3339();

        let result = sqlx::query("INSERT INTO sources (id, identifier, kind, cursor, created_at) VALUES (?, ?, ?, NULL, ?)")
            .bind(&id)
            .bind(identifier)
            .bind(source_kind_to_str(kind))
            .bind(&created_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(source),
            // Lost a create race against a concurrent caller; read back what won.
            Err(sqlx::Error::Database(ref db)) if db.is_unique_violation() => self
                .get_source_by_identifier(identifier)
                .await?
                .ok_or_else(|| StoreError::Backend("source vanished after unique violation".to_string())),
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_source_by_identifier(&self, identifier: &str) -> Result<Option<MailSource>, StoreError> {
        let row = sqlx::query("SELECT * FROM sources WHERE identifier = ?")
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn update_source_sync_cursor(&self, source_id: SourceId, cursor: Cursor) -> Result<(), StoreError> {
        sqlx::query("UPDATE sources SET cursor = ? WHERE id = ?")
            .bind(cursor.value())
            .bind(source_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn start_sync(&self, source_id: SourceId, kind: SyncKind) -> Result<SyncRun, StoreError> {
        if let Some(active) = self.get_active_sync(source_id, kind).await? {
            return Ok(active);
        }

        let run = SyncRun::new(source_id, kind);
        sqlx::query(
            "INSERT INTO sync_runs (id, source_id, kind, started_at, completed_at, \
             checkpoint_page_token, checkpoint_processed, checkpoint_added, checkpoint_updated, \
             checkpoint_errors, status, fail_reason) \
             VALUES (?, ?, ?, ?, NULL, NULL, 0, 0, 0, 0, 'active', NULL)",
        )
        .bind(run.id().to_string())
        .bind(source_id.to_string())
        .bind(sync_kind_to_str(kind))
        .bind(run.started_at().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(run)
    }

    async fn get_active_sync(&self, source_id: SourceId, kind: SyncKind) -> Result<Option<SyncRun>, StoreError> {
        let row = sqlx::query("SELECT * FROM sync_runs WHERE source_id = ? AND kind = ? AND status = 'active'")
            .bind(source_id.to_string())
            .bind(sync_kind_to_str(kind))
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(sync_run_from_row).transpose()
    }

    async fn update_sync_checkpoint(&self, run_id: SyncRunId, checkpoint: Checkpoint) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sync_runs SET checkpoint_page_token = ?, checkpoint_processed = ?, \
             checkpoint_added = ?, checkpoint_updated = ?, checkpoint_errors = ? WHERE id = ?",
        )
        .bind(checkpoint.page_token)
        .bind(checkpoint.processed as i64)
        .bind(checkpoint.added as i64)
        .bind(checkpoint.updated as i64)
        .bind(checkpoint.errors as i64)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn complete_sync(&self, run_id: SyncRunId, completed_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE sync_runs SET status = 'completed', completed_at = ? WHERE id = ?")
            .bind(completed_at.to_rfc3339())
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn fail_sync(&self, run_id: SyncRunId, reason: &str, completed_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE sync_runs SET status = 'failed', fail_reason = ?, completed_at = ? WHERE id = ?")
            .bind(reason)
            .bind(completed_at.to_rfc3339())
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn messages_exist_batch(
        &self,
        source_id: SourceId,
        remote_ids: &[RemoteMessageId],
    ) -> Result<HashSet<RemoteMessageId>, StoreError> {
        if remote_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = std::iter::repeat("?").take(remote_ids.len()).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT remote_message_id FROM messages WHERE source_id = ? AND remote_message_id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(source_id.to_string());
        for id in remote_ids {
            query = query.bind(id.as_str());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(backend)?;

        rows.iter()
            .map(|row| {
                let s: String = row.try_get("remote_message_id").map_err(backend)?;
                RemoteMessageId::new(s).map_err(|e| invalid("remote message id", e))
            })
            .collect()
    }

    async fn get_message_by_remote_id(
        &self,
        source_id: SourceId,
        remote_id: &RemoteMessageId,
    ) -> Result<Option<MessageRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM messages WHERE source_id = ? AND remote_message_id = ?")
            .bind(source_id.to_string())
            .bind(remote_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn ensure_participants_batch(
        &self,
        participants: &[(Email, Option<String>)],
    ) -> Result<HashMap<Email, ParticipantId>, StoreError> {
        let mut result = HashMap::with_capacity(participants.len());
        let mut tx = self.pool.begin().await.map_err(backend)?;

        for (email, display_name) in participants {
            if result.contains_key(email) {
                continue;
            }

            let existing = sqlx::query("SELECT id, display_name FROM participants WHERE email = ?")
                .bind(email.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;

            let id = if let Some(row) = existing {
                let id: String = row.try_get("id").map_err(backend)?;
                let id = ParticipantId::from_str(&id).map_err(|e| invalid("participant id", e))?;
                if let Some(name) = display_name.as_deref().filter(|n| !n.is_empty()) {
                    sqlx::query("UPDATE participants SET display_name = ? WHERE id = ?")
                        .bind(name)
                        .bind(id.to_string())
                        .execute(&mut *tx)
                        .await
                        .map_err(backend)?;
                }
                id
            } else {
                let id = ParticipantId::new();
                sqlx::query("INSERT INTO participants (id, email, display_name) VALUES (?, ?, ?)")
                    .bind(id.to_string())
                    .bind(email.as_str())
                    .bind(display_name.as_deref().filter(|n| !n.is_empty()))
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
                id
            };

            result.insert(email.clone(), id);
        }

        tx.commit().await.map_err(backend)?;
        Ok(result)
    }

    async fn ensure_labels_batch(
        &self,
        source_id: SourceId,
        labels: &[(RemoteLabelId, String)],
    ) -> Result<HashMap<RemoteLabelId, LabelId>, StoreError> {
        let mut result = HashMap::with_capacity(labels.len());
        let mut tx = self.pool.begin().await.map_err(backend)?;

        for (remote_label_id, name) in labels {
            let existing = sqlx::query("SELECT id FROM labels WHERE source_id = ? AND remote_label_id = ?")
                .bind(source_id.to_string())
                .bind(remote_label_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;

            let id = if let Some(row) = existing {
                let id: String = row.try_get("id").map_err(backend)?;
                LabelId::from_str(&id).map_err(|e| invalid("label id", e))?
            } else {
                let id = LabelId::new();
                sqlx::query("INSERT INTO labels (id, source_id, remote_label_id, name) VALUES (?, ?, ?, ?)")
                    .bind(id.to_string())
                    .bind(source_id.to_string())
                    .bind(remote_label_id.as_str())
                    .bind(name)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
                id
            };

            result.insert(remote_label_id.clone(), id);
        }

        tx.commit().await.map_err(backend)?;
        Ok(result)
    }

    async fn ensure_conversation(
        &self,
        source_id: SourceId,
        remote_thread_id: RemoteThreadId,
        subject: &str,
    ) -> Result<ConversationId, StoreError> {
        let existing = sqlx::query("SELECT id FROM conversations WHERE source_id = ? AND remote_thread_id = ?")
            .bind(source_id.to_string())
            .bind(remote_thread_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        if let Some(row) = existing {
            let id: String = row.try_get("id").map_err(backend)?;
            return ConversationId::from_str(&id).map_err(|e| invalid("conversation id", e));
        }

        let conversation = Conversation::new(source_id, remote_thread_id.clone(), subject);
        let result = sqlx::query(
            "INSERT INTO conversations (id, source_id, remote_thread_id, subject) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation.id().to_string())
        .bind(source_id.to_string())
        .bind(remote_thread_id.as_str())
        .bind(subject)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(conversation.id()),
            Err(sqlx::Error::Database(ref db)) if db.is_unique_violation() => {
                let row = sqlx::query("SELECT id FROM conversations WHERE source_id = ? AND remote_thread_id = ?")
                    .bind(source_id.to_string())
                    .bind(remote_thread_id.as_str())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(backend)?;
                let id: String = row.try_get("id").map_err(backend)?;
                ConversationId::from_str(&id).map_err(|e| invalid("conversation id", e))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        let Some(row) = row else { return Ok(None) };
        let id: String = row.try_get("id").map_err(backend)?;
        let source_id: String = row.try_get("source_id").map_err(backend)?;
        let remote_thread_id: String = row.try_get("remote_thread_id").map_err(backend)?;
        let subject: String = row.try_get("subject").map_err(backend)?;

        Ok(Some(Conversation::with_id(
            ConversationId::from_str(&id).map_err(|e| invalid("conversation id", e))?,
            SourceId::from_str(&source_id).map_err(|e| invalid("source id", e))?,
            RemoteThreadId::new(remote_thread_id).map_err(|e| invalid("remote thread id", e))?,
            subject,
        )))
    }

    async fn upsert_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO messages (id, source_id, remote_message_id, conversation_id, \
             from_participant_id, sent_at, size_estimate, attachment_count, subject, snippet, tombstoned_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(source_id, remote_message_id) DO UPDATE SET \
               conversation_id = excluded.conversation_id, \
               from_participant_id = excluded.from_participant_id, \
               sent_at = excluded.sent_at, \
               size_estimate = excluded.size_estimate, \
               attachment_count = excluded.attachment_count, \
               subject = excluded.subject, \
               snippet = excluded.snippet, \
               tombstoned_at = excluded.tombstoned_at",
        )
        .bind(message.id().to_string())
        .bind(message.source_id().to_string())
        .bind(message.remote_message_id().as_str())
        .bind(message.conversation_id().to_string())
        .bind(message.from_participant_id().map(|id| id.to_string()))
        .bind(message.sent_at().to_rfc3339())
        .bind(message.size_estimate() as i64)
        .bind(message.attachment_count() as i64)
        .bind(message.subject())
        .bind(message.snippet())
        .bind(message.tombstoned_at().map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn upsert_message_body(
        &self,
        message_id: MessageId,
        text: Option<&str>,
        html: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO message_bodies (message_id, text, html) VALUES (?, ?, ?) \
             ON CONFLICT(message_id) DO UPDATE SET text = excluded.text, html = excluded.html",
        )
        .bind(message_id.to_string())
        .bind(text)
        .bind(html)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn upsert_message_raw(&self, message_id: MessageId, raw: &[u8]) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO message_raw (message_id, raw) VALUES (?, ?) \
             ON CONFLICT(message_id) DO UPDATE SET raw = excluded.raw",
        )
        .bind(message_id.to_string())
        .bind(raw)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn replace_message_recipients(
        &self,
        message_id: MessageId,
        recipients: &[(RecipientKind, ParticipantId, Option<String>)],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("DELETE FROM message_recipients WHERE message_id = ?")
            .bind(message_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for (kind, participant_id, display_name) in recipients {
            sqlx::query(
                "INSERT INTO message_recipients (message_id, kind, participant_id, display_name) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(message_id.to_string())
            .bind(recipient_kind_to_str(*kind))
            .bind(participant_id.to_string())
            .bind(display_name.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn replace_message_labels(&self, message_id: MessageId, label_ids: &[LabelId]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("DELETE FROM message_labels WHERE message_id = ?")
            .bind(message_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for label_id in label_ids {
            sqlx::query("INSERT INTO message_labels (message_id, label_id) VALUES (?, ?)")
                .bind(message_id.to_string())
                .bind(label_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn add_message_labels(&self, message_id: MessageId, label_ids: &[LabelId]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for label_id in label_ids {
            sqlx::query("INSERT OR IGNORE INTO message_labels (message_id, label_id) VALUES (?, ?)")
                .bind(message_id.to_string())
                .bind(label_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn remove_message_labels(&self, message_id: MessageId, label_ids: &[LabelId]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for label_id in label_ids {
            sqlx::query("DELETE FROM message_labels WHERE message_id = ? AND label_id = ?")
                .bind(message_id.to_string())
                .bind(label_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn mark_messages_deleted_batch(
        &self,
        source_id: SourceId,
        remote_ids: &[RemoteMessageId],
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if remote_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = std::iter::repeat("?").take(remote_ids.len()).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "UPDATE messages SET tombstoned_at = ? WHERE source_id = ? AND tombstoned_at IS NULL \
             AND remote_message_id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(at.to_rfc3339()).bind(source_id.to_string());
        for id in remote_ids {
            query = query.bind(id.as_str());
        }
        let result = query.execute(&self.pool).await.map_err(backend)?;
        Ok(result.rows_affected())
    }

    async fn upsert_attachment(&self, attachment: &Attachment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO attachments (id, message_id, content_hash, filename, media_type, size) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(message_id, content_hash) DO UPDATE SET \
               filename = excluded.filename, media_type = excluded.media_type, size = excluded.size",
        )
        .bind(attachment.id().to_string())
        .bind(attachment.message_id().to_string())
        .bind(attachment.content_hash().as_str())
        .bind(attachment.filename())
        .bind(attachment.media_type())
        .bind(attachment.size() as i64)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn save_audit(&self, entry: AuditEntry) -> Result<AuditId, StoreError> {
        let (result_code, result_message) = match entry.result() {
            AuditResult::Success => (None, None),
            AuditResult::Failed { code, message } => (Some(code.as_str()), Some(message.as_str())),
        };
        let details = serde_json::to_string(entry.details()).map_err(|e| invalid("audit details", e))?;

        let result = sqlx::query(
            "INSERT INTO audit_log (timestamp, source_id, sync_run_id, action, result_code, \
             result_message, details, duration_ms) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.timestamp().to_rfc3339())
        .bind(entry.source_id().map(|id| id.to_string()))
        .bind(entry.sync_run_id().map(|id| id.to_string()))
        .bind(entry.action().to_string())
        .bind(result_code)
        .bind(result_message)
        .bind(details)
        .bind(entry.duration_ms().map(|d| d as i64))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(AuditId::new(result.last_insert_rowid()))
    }
}

/// Reconstitutes an [`AuditEntry`] from a `audit_log` row, for callers
/// outside the `Store` trait that need to query the audit trail directly
/// (the CLI's `audit` command, §7).
pub fn audit_entry_from_row(row: &SqliteRow) -> Result<AuditEntry, StoreError> {
    let id: i64 = row.try_get("id").map_err(backend)?;
    let timestamp: String = row.try_get("timestamp").map_err(backend)?;
    let source_id: Option<String> = row.try_get("source_id").map_err(backend)?;
    let sync_run_id: Option<String> = row.try_get("sync_run_id").map_err(backend)?;
    let action: String = row.try_get("action").map_err(backend)?;
    let result_code: Option<String> = row.try_get("result_code").map_err(backend)?;
    let result_message: Option<String> = row.try_get("result_message").map_err(backend)?;
    let details: String = row.try_get("details").map_err(backend)?;
    let duration_ms: Option<i64> = row.try_get("duration_ms").map_err(backend)?;

    let action = audit_action_from_str(&action)?;
    let result = match (result_code, result_message) {
        (Some(code), Some(message)) => AuditResult::failed(code, message),
        _ => AuditResult::success(),
    };

    let mut entry = AuditEntry::new(action, result).with_id(AuditId::new(id));
    if let Some(source_id) = source_id {
        entry = entry.with_source_id(SourceId::from_str(&source_id).map_err(|e| invalid("source id", e))?);
    }
    if let Some(sync_run_id) = sync_run_id {
        entry = entry.with_sync_run_id(SyncRunId::from_str(&sync_run_id).map_err(|e| invalid("sync run id", e))?);
    }
    entry = entry.with_details(serde_json::from_str(&details).map_err(|e| invalid("audit details", e))?);
    if let Some(duration_ms) = duration_ms {
        entry = entry.with_duration_ms(duration_ms as u64);
    }
    entry = entry.with_timestamp(parse_datetime(&timestamp, "audit timestamp")?);
    Ok(entry)
}

fn audit_action_from_str(s: &str) -> Result<AuditAction, StoreError> {
    match s {
        "sync_start" => Ok(AuditAction::SyncStart),
        "sync_complete" => Ok(AuditAction::SyncComplete),
        "sync_failed" => Ok(AuditAction::SyncFailed),
        "history_expired" => Ok(AuditAction::HistoryExpired),
        "manifest_created" => Ok(AuditAction::ManifestCreated),
        "manifest_execute_start" => Ok(AuditAction::ManifestExecuteStart),
        "manifest_execute_complete" => Ok(AuditAction::ManifestExecuteComplete),
        "item_error" => Ok(AuditAction::ItemError),
        "config_change" => Ok(AuditAction::ConfigChange),
        other => Err(invalid("audit action", other)),
    }
}
