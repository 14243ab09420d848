//! Ingest worker (§4.6)
//!
//! Turns one page of remote message summaries into persisted rows: checks
//! which ids are already known, batch-fetches the raw bytes of the rest,
//! maps each to model-ready fields via `mailvault-mime`, and persists it as
//! a sequence of store calls per message. A single message's persistence
//! failure is counted and skipped; it never aborts the rest of the batch.
//!
//! Grounded on `mailvault-deletion`'s `execute.rs` for the "classify, count,
//! keep going" shape, generalized from one remote call per item to one
//! batch-fetch plus N local persistence steps per item.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use chrono::{DateTime, Utc};
use mailvault_core::domain::{
    Attachment, Checkpoint, ContentHash, Email, LabelId, MessageRecord, ParticipantId, RecipientKind,
    RemoteLabelId, RemoteMessageId, RemoteThreadId, SourceId,
};
use mailvault_core::ports::{Clock, RemoteAdapter, RemoteMessageSummary, Store};
use mailvault_mime::{map_message, MappedMessage, MappedParticipant};
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::progress::SyncProgress;

/// Writes an attachment's bytes to `<dir>/<hash[:2]>/<hash>`, mode 0600.
/// A no-op if a file with this hash is already on disk — content addressing
/// makes repeated writes of identical bytes idempotent by construction (§5, §6).
fn write_attachment_file(dir: &Path, hash: &ContentHash, bytes: &[u8]) -> std::io::Result<()> {
    let shard_dir = dir.join(hash.shard_prefix());
    std::fs::create_dir_all(&shard_dir)?;
    let path = shard_dir.join(hash.as_str());
    if path.exists() {
        return Ok(());
    }
    std::fs::write(&path, bytes)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
}

fn parse_email(raw: &str) -> Option<Email> {
    match Email::new(raw) {
        Ok(email) => Some(email),
        Err(err) => {
            debug!(address = raw, error = %err, "dropping unparseable participant address");
            None
        }
    }
}

/// Deduplicates a recipient list by email, preferring a non-empty display
/// name across duplicate occurrences within the same list (§8 boundary cases).
fn dedupe_participants<'a>(list: &'a [MappedParticipant]) -> Vec<(Email, Option<&'a str>)> {
    let mut seen: Vec<(Email, Option<&'a str>)> = Vec::new();
    for p in list {
        let Some(email) = parse_email(&p.email) else { continue };
        let name = p.display_name.as_deref();
        if let Some(existing) = seen.iter_mut().find(|(e, _)| *e == email) {
            existing.1 = mailvault_core::domain::prefer_non_empty_name(existing.1, name);
        } else {
            seen.push((email, name));
        }
    }
    seen
}

/// Persists one mapped message. Returns an error on the first failing store
/// call; the caller counts it and moves on to the next message (§4.6 step 3).
#[allow(clippy::too_many_arguments)]
async fn persist_message(
    store: &dyn Store,
    attachments_dir: &Path,
    source_id: SourceId,
    remote_id: &RemoteMessageId,
    thread_id: &RemoteThreadId,
    label_ids: &[RemoteLabelId],
    label_map: &HashMap<RemoteLabelId, LabelId>,
    raw: &[u8],
    mapped: &MappedMessage,
    fallback_sent_at: DateTime<Utc>,
) -> Result<DateTime<Utc>, IngestError> {
    let mut every_address: Vec<(Email, Option<&str>)> = Vec::new();
    if let Some(from) = &mapped.from {
        every_address.extend(dedupe_participants(std::slice::from_ref(from)));
    }
    every_address.extend(dedupe_participants(&mapped.to));
    every_address.extend(dedupe_participants(&mapped.cc));
    every_address.extend(dedupe_participants(&mapped.bcc));

    let mut merged: HashMap<Email, Option<String>> = HashMap::new();
    for (email, name) in &every_address {
        merged
            .entry(email.clone())
            .and_modify(|existing| {
                *existing = mailvault_core::domain::prefer_non_empty_name(existing.as_deref(), *name).map(str::to_string);
            })
            .or_insert_with(|| name.map(str::to_string));
    }
    let participant_input: Vec<(Email, Option<String>)> = merged.into_iter().collect();
    let participant_ids = store.ensure_participants_batch(&participant_input).await?;

    let conversation_id = store
        .ensure_conversation(source_id, thread_id.clone(), &mapped.subject)
        .await?;

    let sent_at = mapped.sent_at.unwrap_or(fallback_sent_at);
    let from_participant_id = mapped
        .from
        .as_ref()
        .and_then(|p| parse_email(&p.email))
        .and_then(|email| participant_ids.get(&email).copied());

    let message = MessageRecord::new(
        source_id,
        remote_id.clone(),
        conversation_id,
        from_participant_id,
        sent_at,
        raw.len() as u64,
        mapped.attachments.len() as u32,
        &mapped.subject,
        &mapped.snippet,
    );
    store.upsert_message(&message).await?;
    store
        .upsert_message_body(message.id(), mapped.body_text.as_deref(), mapped.body_html.as_deref())
        .await?;
    store.upsert_message_raw(message.id(), raw).await?;

    let recipients = build_recipient_rows(mapped, &participant_ids);
    store.replace_message_recipients(message.id(), &recipients).await?;

    let internal_label_ids: Vec<LabelId> = label_ids
        .iter()
        .filter_map(|remote| match label_map.get(remote) {
            Some(id) => Some(*id),
            None => {
                debug!(label = remote.as_str(), "label id not in source's label map, skipping");
                None
            }
        })
        .collect();
    store.replace_message_labels(message.id(), &internal_label_ids).await?;

    for attachment in &mapped.attachments {
        let hash = ContentHash::of(&attachment.bytes);
        if let Err(err) = write_attachment_file(attachments_dir, &hash, &attachment.bytes) {
            warn!(error = %err, hash = hash.as_str(), "failed to write attachment file, skipping its row");
            continue;
        }
        let record = Attachment::new(
            message.id(),
            hash,
            &attachment.filename,
            &attachment.media_type,
            attachment.bytes.len() as u64,
        );
        store.upsert_attachment(&record).await?;
    }

    Ok(sent_at)
}

fn build_recipient_rows(
    mapped: &MappedMessage,
    participant_ids: &HashMap<Email, ParticipantId>,
) -> Vec<(RecipientKind, ParticipantId, Option<String>)> {
    let mut rows = Vec::new();
    let mut push_kind = |kind: RecipientKind, list: &[MappedParticipant]| {
        for (email, name) in dedupe_participants(list) {
            if let Some(id) = participant_ids.get(&email) {
                rows.push((kind, *id, name.map(str::to_string)));
            }
        }
    };
    if let Some(from) = &mapped.from {
        push_kind(RecipientKind::From, std::slice::from_ref(from));
    }
    push_kind(RecipientKind::To, &mapped.to);
    push_kind(RecipientKind::Cc, &mapped.cc);
    push_kind(RecipientKind::Bcc, &mapped.bcc);
    rows
}

/// Ingests one page of remote message summaries (§4.6).
///
/// `checkpoint` carries the run's counters as of the previous page; the
/// returned checkpoint has `processed`/`added`/`errors` advanced by this
/// batch (its `page_token` is left untouched — the caller sets that from
/// the page response). Progress is reported once, with the new cumulative
/// totals, before returning.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_batch(
    store: &dyn Store,
    adapter: &dyn RemoteAdapter,
    clock: &dyn Clock,
    attachments_dir: &Path,
    source_id: SourceId,
    summaries: &[RemoteMessageSummary],
    label_map: &HashMap<RemoteLabelId, LabelId>,
    checkpoint: &Checkpoint,
    progress: &dyn SyncProgress,
) -> Result<Checkpoint, IngestError> {
    let mut next = checkpoint.clone();

    if summaries.is_empty() {
        return Ok(next);
    }

    let ids: Vec<RemoteMessageId> = summaries.iter().map(|s| s.id.clone()).collect();
    let existing = store.messages_exist_batch(source_id, &ids).await?;

    let new_summaries: Vec<&RemoteMessageSummary> = summaries.iter().filter(|s| !existing.contains(&s.id)).collect();

    next.processed += summaries.len() as u64;

    if new_summaries.is_empty() {
        progress.on_progress(next.processed, next.added, next.processed - next.added - next.errors);
        return Ok(next);
    }

    let by_id: HashMap<&RemoteMessageId, &RemoteMessageSummary> = new_summaries.iter().map(|s| (&s.id, *s)).collect();
    let new_ids: Vec<RemoteMessageId> = new_summaries.iter().map(|s| s.id.clone()).collect();
    let raw_batch = adapter.get_messages_raw_batch(&new_ids).await?;

    let fetched: HashMap<&RemoteMessageId, &Vec<u8>> = raw_batch.iter().map(|(id, raw)| (id, raw)).collect();
    let mut earliest: Option<DateTime<Utc>> = None;

    for id in &new_ids {
        let Some(summary) = by_id.get(id) else { continue };
        let Some(raw) = fetched.get(id) else {
            warn!(id = id.as_str(), "batch fetch did not return this id, counting as an error");
            next.errors += 1;
            continue;
        };
        if raw.is_empty() {
            warn!(id = id.as_str(), "empty raw message body, counting as an error");
            next.errors += 1;
            continue;
        }

        let mapped = map_message(raw);
        if let Some(reason) = &mapped.parse_error {
            debug!(id = id.as_str(), reason, "message did not parse as MIME, persisting placeholder");
        }

        match persist_message(
            store,
            attachments_dir,
            source_id,
            id,
            &summary.thread_id,
            &summary.label_ids,
            label_map,
            raw,
            &mapped,
            clock.now(),
        )
        .await
        {
            Ok(sent_at) => {
                next.added += 1;
                earliest = Some(earliest.map_or(sent_at, |e: DateTime<Utc>| e.min(sent_at)));
            }
            Err(err) => {
                warn!(id = id.as_str(), error = %err, "failed to persist message, continuing batch");
                next.errors += 1;
            }
        }
    }

    if let Some(at) = earliest {
        progress.on_latest_date(at);
    }
    progress.on_progress(next.processed, next.added, next.processed - next.added - next.errors);

    Ok(next)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use mailvault_core::domain::{ConversationId, Cursor, RemoteThreadId, SyncKind, SyncRun, SyncRunId};
    use mailvault_core::ports::{
        HistoryPage, RemoteError, RemoteLabel, RemotePage, RemoteProfile, StoreError, SystemClock,
    };

    use super::*;

    fn summary(id: &str, thread: &str) -> RemoteMessageSummary {
        RemoteMessageSummary {
            id: RemoteMessageId::new(id).unwrap(),
            thread_id: RemoteThreadId::new(thread).unwrap(),
            label_ids: Vec::new(),
        }
    }

    /// Minimal in-memory `Store` recording what would be persisted, enough
    /// to exercise `ingest_batch`'s control flow without a real database.
    #[derive(Default)]
    struct FakeStore {
        known: Mutex<HashSet<RemoteMessageId>>,
        messages: Mutex<Vec<MessageRecord>>,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn get_or_create_source(
            &self,
            _: &str,
            _: mailvault_core::domain::SourceKind,
        ) -> Result<mailvault_core::domain::MailSource, StoreError> {
            unimplemented!()
        }
        async fn get_source_by_identifier(&self, _: &str) -> Result<Option<mailvault_core::domain::MailSource>, StoreError> {
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
            remote_ids: &[RemoteMessageId],
        ) -> Result<HashSet<RemoteMessageId>, StoreError> {
            let known = self.known.lock().unwrap();
            Ok(remote_ids.iter().filter(|id| known.contains(id)).cloned().collect())
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
            participants: &[(Email, Option<String>)],
        ) -> Result<HashMap<Email, ParticipantId>, StoreError> {
            Ok(participants.iter().map(|(e, _)| (e.clone(), ParticipantId::new())).collect())
        }
        async fn ensure_labels_batch(
            &self,
            _: SourceId,
            _: &[(RemoteLabelId, String)],
        ) -> Result<HashMap<RemoteLabelId, LabelId>, StoreError> {
            unimplemented!()
        }
        async fn ensure_conversation(&self, _: SourceId, _: RemoteThreadId, _: &str) -> Result<ConversationId, StoreError> {
            Ok(ConversationId::new())
        }
        async fn get_conversation(&self, _: ConversationId) -> Result<Option<mailvault_core::domain::Conversation>, StoreError> {
            unimplemented!()
        }
        async fn upsert_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
            self.known.lock().unwrap().insert(message.remote_message_id().clone());
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
        async fn upsert_message_body(&self, _: mailvault_core::domain::MessageId, _: Option<&str>, _: Option<&str>) -> Result<(), StoreError> {
            Ok(())
        }
        async fn upsert_message_raw(&self, _: mailvault_core::domain::MessageId, _: &[u8]) -> Result<(), StoreError> {
            Ok(())
        }
        async fn replace_message_recipients(
            &self,
            _: mailvault_core::domain::MessageId,
            _: &[(RecipientKind, ParticipantId, Option<String>)],
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn replace_message_labels(&self, _: mailvault_core::domain::MessageId, _: &[LabelId]) -> Result<(), StoreError> {
            Ok(())
        }
        async fn add_message_labels(&self, _: mailvault_core::domain::MessageId, _: &[LabelId]) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn remove_message_labels(&self, _: mailvault_core::domain::MessageId, _: &[LabelId]) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn mark_messages_deleted_batch(&self, _: SourceId, _: &[RemoteMessageId], _: DateTime<Utc>) -> Result<u64, StoreError> {
            unimplemented!()
        }
        async fn upsert_attachment(&self, _: &Attachment) -> Result<(), StoreError> {
            Ok(())
        }
        async fn save_audit(&self, _: mailvault_core::domain::AuditEntry) -> Result<mailvault_core::domain::AuditId, StoreError> {
            unimplemented!()
        }
    }

    /// A fake adapter that hands back scripted raw bytes for `get_messages_raw_batch`.
    struct ScriptedAdapter {
        raw: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl RemoteAdapter for ScriptedAdapter {
        async fn profile(&self) -> Result<RemoteProfile, RemoteError> {
            unimplemented!()
        }
        async fn list_labels(&self) -> Result<Vec<RemoteLabel>, RemoteError> {
            unimplemented!()
        }
        async fn list_messages(&self, _: Option<&str>) -> Result<RemotePage<RemoteMessageSummary>, RemoteError> {
            unimplemented!()
        }
        async fn get_message_raw(&self, _: &RemoteMessageId) -> Result<Vec<u8>, RemoteError> {
            unimplemented!()
        }
        async fn get_messages_raw_batch(&self, ids: &[RemoteMessageId]) -> Result<Vec<(RemoteMessageId, Vec<u8>)>, RemoteError> {
            Ok(ids
                .iter()
                .filter_map(|id| self.raw.get(id.as_str()).map(|bytes| (id.clone(), bytes.clone())))
                .collect())
        }
        async fn list_history(&self, _: Cursor, _: Option<&str>) -> Result<HistoryPage, RemoteError> {
            unimplemented!()
        }
        async fn trash(&self, _: &RemoteMessageId) -> Result<(), RemoteError> {
            unimplemented!()
        }
        async fn delete(&self, _: &RemoteMessageId) -> Result<(), RemoteError> {
            unimplemented!()
        }
        async fn batch_delete(&self, _: &[RemoteMessageId]) -> Result<Vec<(RemoteMessageId, RemoteError)>, RemoteError> {
            unimplemented!()
        }
    }

    fn raw_message(subject: &str, from: &str) -> Vec<u8> {
        format!("From: {from}\r\nSubject: {subject}\r\nDate: Mon, 1 Jan 2024 10:00:00 +0000\r\n\r\nbody text\r\n").into_bytes()
    }

    #[tokio::test]
    async fn new_messages_are_ingested_and_counted() {
        let store = FakeStore::default();
        let adapter = ScriptedAdapter {
            raw: HashMap::from([("m1".to_string(), raw_message("Hello", "a@example.com"))]),
        };
        let clock = SystemClock;
        let summaries = vec![summary("m1", "t1")];
        let checkpoint = Checkpoint::default();

        let result = ingest_batch(
            &store,
            &adapter,
            &clock,
            std::path::Path::new("/tmp/mailvault-test-attachments-none"),
            SourceId::new(),
            &summaries,
            &HashMap::new(),
            &checkpoint,
            &crate::progress::NullSyncProgress,
        )
        .await
        .unwrap();

        assert_eq!(result.added, 1);
        assert_eq!(result.errors, 0);
        assert_eq!(store.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn already_known_ids_are_skipped_without_fetching() {
        let store = FakeStore::default();
        store.known.lock().unwrap().insert(RemoteMessageId::new("m1").unwrap());
        let adapter = ScriptedAdapter { raw: HashMap::new() };
        let clock = SystemClock;
        let summaries = vec![summary("m1", "t1")];

        let result = ingest_batch(
            &store,
            &adapter,
            &clock,
            std::path::Path::new("/tmp/mailvault-test-attachments-none"),
            SourceId::new(),
            &summaries,
            &HashMap::new(),
            &Checkpoint::default(),
            &crate::progress::NullSyncProgress,
        )
        .await
        .unwrap();

        assert_eq!(result.added, 0);
        assert_eq!(result.processed, 1);
    }

    #[tokio::test]
    async fn missing_raw_counts_as_error_not_crash() {
        let store = FakeStore::default();
        let adapter = ScriptedAdapter { raw: HashMap::new() };
        let clock = SystemClock;
        let summaries = vec![summary("missing", "t1")];

        let result = ingest_batch(
            &store,
            &adapter,
            &clock,
            std::path::Path::new("/tmp/mailvault-test-attachments-none"),
            SourceId::new(),
            &summaries,
            &HashMap::new(),
            &Checkpoint::default(),
            &crate::progress::NullSyncProgress,
        )
        .await
        .unwrap();

        assert_eq!(result.added, 0);
        assert_eq!(result.errors, 1);
    }

    #[tokio::test]
    async fn empty_page_is_a_no_op() {
        let store = FakeStore::default();
        let adapter = ScriptedAdapter { raw: HashMap::new() };
        let clock = SystemClock;

        let result = ingest_batch(
            &store,
            &adapter,
            &clock,
            std::path::Path::new("/tmp/mailvault-test-attachments-none"),
            SourceId::new(),
            &[],
            &HashMap::new(),
            &Checkpoint::default(),
            &crate::progress::NullSyncProgress,
        )
        .await
        .unwrap();

        assert_eq!(result.processed, 0);
    }

    #[test]
    fn no_parseable_sender_keeps_zero_from_recipients() {
        let mapped = map_message(b"Subject: no from header\r\n\r\nbody");
        assert!(mapped.from.is_none());
        let rows = build_recipient_rows(&mapped, &HashMap::new());
        assert!(rows.is_empty());
    }
}
