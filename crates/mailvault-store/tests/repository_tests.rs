//! Integration tests for `SqliteStore`
//!
//! Each test opens a fresh in-memory database so tests stay isolated from
//! each other (§4.6-4.9 are exercised indirectly through the `Store` port
//! rather than directly against SQL).

use chrono::Utc;
use mailvault_core::domain::{
    Checkpoint, Email, MessageRecord, RecipientKind, RemoteLabelId, RemoteMessageId,
    RemoteThreadId, SourceKind, SyncKind,
};
use mailvault_core::ports::Store;
use mailvault_store::{DatabasePool, SqliteStore};

async fn setup() -> SqliteStore {
    let pool = DatabasePool::in_memory().await.expect("failed to create in-memory database");
    SqliteStore::new(pool.pool().clone())
}

#[tokio::test]
async fn get_or_create_source_is_idempotent() {
    let store = setup().await;
    let a = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let b = store.get_or_create_source("user@example.com", SourceKind::MailboxProtocol).await.unwrap();
    assert_eq!(a.id(), b.id());
    assert_eq!(b.kind(), SourceKind::JsonApi, "kind is ignored once the source exists");
}

#[tokio::test]
async fn get_source_by_identifier_returns_none_when_absent() {
    let store = setup().await;
    assert!(store.get_source_by_identifier("nobody@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn update_source_sync_cursor_persists() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    assert!(source.is_unsynced());

    store.update_source_sync_cursor(source.id(), mailvault_core::domain::Cursor::new(42)).await.unwrap();
    let reloaded = store.get_source_by_identifier("user@example.com").await.unwrap().unwrap();
    assert_eq!(reloaded.cursor().unwrap().value(), 42);
}

#[tokio::test]
async fn start_sync_resumes_an_active_run_instead_of_duplicating() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();

    let first = store.start_sync(source.id(), SyncKind::Full).await.unwrap();
    let second = store.start_sync(source.id(), SyncKind::Full).await.unwrap();
    assert_eq!(first.id(), second.id());

    // A different kind gets its own run.
    let incremental = store.start_sync(source.id(), SyncKind::Incremental).await.unwrap();
    assert_ne!(first.id(), incremental.id());
}

#[tokio::test]
async fn checkpoint_updates_and_completion_round_trip() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let run = store.start_sync(source.id(), SyncKind::Full).await.unwrap();

    store
        .update_sync_checkpoint(
            run.id(),
            Checkpoint {
                page_token: Some("page-2".to_string()),
                processed: 100,
                added: 90,
                updated: 5,
                errors: 1,
            },
        )
        .await
        .unwrap();

    let active = store.get_active_sync(source.id(), SyncKind::Full).await.unwrap().unwrap();
    assert_eq!(active.checkpoint().processed, 100);
    assert_eq!(active.checkpoint().page_token.as_deref(), Some("page-2"));

    store.complete_sync(run.id(), Utc::now()).await.unwrap();
    assert!(store.get_active_sync(source.id(), SyncKind::Full).await.unwrap().is_none());

    // Completing frees the slot for a new run.
    let resumed = store.start_sync(source.id(), SyncKind::Full).await.unwrap();
    assert_ne!(resumed.id(), run.id());
}

#[tokio::test]
async fn fail_sync_records_reason() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let run = store.start_sync(source.id(), SyncKind::Incremental).await.unwrap();

    store.fail_sync(run.id(), "panic: boom", Utc::now()).await.unwrap();
    assert!(store.get_active_sync(source.id(), SyncKind::Incremental).await.unwrap().is_none());
}

async fn seed_conversation(store: &SqliteStore, source_id: mailvault_core::domain::SourceId) -> mailvault_core::domain::ConversationId {
    store
        .ensure_conversation(source_id, RemoteThreadId::new("thread-1").unwrap(), "Welcome aboard")
        .await
        .unwrap()
}

#[tokio::test]
async fn ensure_conversation_keeps_first_subject() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();

    let first = seed_conversation(&store, source.id()).await;
    let second = store
        .ensure_conversation(source.id(), RemoteThreadId::new("thread-1").unwrap(), "A different subject")
        .await
        .unwrap();
    assert_eq!(first, second);

    let conversation = store.get_conversation(first).await.unwrap().unwrap();
    assert_eq!(conversation.subject(), "Welcome aboard");
}

#[tokio::test]
async fn ensure_participants_batch_dedupes_by_email_and_keeps_best_name() {
    let store = setup().await;
    let alice = Email::new("alice@example.com").unwrap();

    let first = store.ensure_participants_batch(&[(alice.clone(), Some("Alice".to_string()))]).await.unwrap();
    let second = store.ensure_participants_batch(&[(alice.clone(), None)]).await.unwrap();
    assert_eq!(first[&alice], second[&alice]);
}

#[tokio::test]
async fn ensure_labels_batch_dedupes_by_remote_label_id() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let label_id = RemoteLabelId::new("Label_1").unwrap();

    let first = store.ensure_labels_batch(source.id(), &[(label_id.clone(), "Important".to_string())]).await.unwrap();
    let second = store.ensure_labels_batch(source.id(), &[(label_id.clone(), "Important".to_string())]).await.unwrap();
    assert_eq!(first[&label_id], second[&label_id]);
}

#[tokio::test]
async fn messages_exist_batch_reports_only_known_ids() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let conversation_id = seed_conversation(&store, source.id()).await;

    let message = MessageRecord::new(
        source.id(),
        RemoteMessageId::new("msg-1").unwrap(),
        conversation_id,
        None,
        Utc::now(),
        1024,
        0,
        "Hello",
        "Hi there",
    );
    store.upsert_message(&message).await.unwrap();

    let known = RemoteMessageId::new("msg-1").unwrap();
    let unknown = RemoteMessageId::new("msg-2").unwrap();
    let existing = store.messages_exist_batch(source.id(), &[known.clone(), unknown.clone()]).await.unwrap();
    assert!(existing.contains(&known));
    assert!(!existing.contains(&unknown));
}

#[tokio::test]
async fn upsert_message_replaces_in_place() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let conversation_id = seed_conversation(&store, source.id()).await;
    let remote_id = RemoteMessageId::new("msg-1").unwrap();

    let message = MessageRecord::new(
        source.id(),
        remote_id.clone(),
        conversation_id,
        None,
        Utc::now(),
        1024,
        0,
        "Hello",
        "Hi there",
    );
    store.upsert_message(&message).await.unwrap();

    let mut updated = message.clone();
    updated.tombstone(Utc::now());
    store.upsert_message(&updated).await.unwrap();

    let reloaded = store.get_message_by_remote_id(source.id(), &remote_id).await.unwrap().unwrap();
    assert!(reloaded.is_tombstoned());
    assert_eq!(reloaded.id(), message.id(), "upsert replaces the same row, not a new one");
}

#[tokio::test]
async fn mark_messages_deleted_batch_only_touches_un_tombstoned_rows() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let conversation_id = seed_conversation(&store, source.id()).await;

    let msg1 = MessageRecord::new(
        source.id(),
        RemoteMessageId::new("msg-1").unwrap(),
        conversation_id,
        None,
        Utc::now(),
        0,
        0,
        "",
        "",
    );
    store.upsert_message(&msg1).await.unwrap();

    let ids = vec![RemoteMessageId::new("msg-1").unwrap(), RemoteMessageId::new("msg-missing").unwrap()];
    let changed = store.mark_messages_deleted_batch(source.id(), &ids, Utc::now()).await.unwrap();
    assert_eq!(changed, 1);

    let changed_again = store.mark_messages_deleted_batch(source.id(), &ids, Utc::now()).await.unwrap();
    assert_eq!(changed_again, 0, "already-tombstoned rows are not re-counted");
}

#[tokio::test]
async fn replace_message_labels_is_atomic_replace_all() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let conversation_id = seed_conversation(&store, source.id()).await;

    let message = MessageRecord::new(
        source.id(),
        RemoteMessageId::new("msg-1").unwrap(),
        conversation_id,
        None,
        Utc::now(),
        0,
        0,
        "",
        "",
    );
    store.upsert_message(&message).await.unwrap();

    let labels = store
        .ensure_labels_batch(
            source.id(),
            &[
                (RemoteLabelId::new("INBOX").unwrap(), "Inbox".to_string()),
                (RemoteLabelId::new("IMPORTANT").unwrap(), "Important".to_string()),
            ],
        )
        .await
        .unwrap();
    let inbox = labels[&RemoteLabelId::new("INBOX").unwrap()];
    let important = labels[&RemoteLabelId::new("IMPORTANT").unwrap()];

    store.replace_message_labels(message.id(), &[inbox, important]).await.unwrap();
    store.replace_message_labels(message.id(), &[inbox]).await.unwrap();

    store.add_message_labels(message.id(), &[important]).await.unwrap();
    store.remove_message_labels(message.id(), &[inbox]).await.unwrap();
}

#[tokio::test]
async fn replace_message_recipients_replaces_whole_set() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let conversation_id = seed_conversation(&store, source.id()).await;

    let message = MessageRecord::new(
        source.id(),
        RemoteMessageId::new("msg-1").unwrap(),
        conversation_id,
        None,
        Utc::now(),
        0,
        0,
        "",
        "",
    );
    store.upsert_message(&message).await.unwrap();

    let participants = store
        .ensure_participants_batch(&[
            (Email::new("alice@example.com").unwrap(), Some("Alice".to_string())),
            (Email::new("bob@example.com").unwrap(), Some("Bob".to_string())),
        ])
        .await
        .unwrap();
    let alice = participants[&Email::new("alice@example.com").unwrap()];
    let bob = participants[&Email::new("bob@example.com").unwrap()];

    store
        .replace_message_recipients(message.id(), &[(RecipientKind::To, alice, None), (RecipientKind::Cc, bob, None)])
        .await
        .unwrap();

    // A second replace with a smaller set must not leave the old rows behind.
    store.replace_message_recipients(message.id(), &[(RecipientKind::To, alice, None)]).await.unwrap();
}

#[tokio::test]
async fn upsert_message_body_and_raw_round_trip() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let conversation_id = seed_conversation(&store, source.id()).await;

    let message = MessageRecord::new(
        source.id(),
        RemoteMessageId::new("msg-1").unwrap(),
        conversation_id,
        None,
        Utc::now(),
        0,
        0,
        "",
        "",
    );
    store.upsert_message(&message).await.unwrap();

    store.upsert_message_body(message.id(), Some("hello"), Some("<p>hello</p>")).await.unwrap();
    store.upsert_message_raw(message.id(), b"From: a@b.com\r\n\r\nhello").await.unwrap();

    // Re-ingest overwrites in place rather than erroring on conflict.
    store.upsert_message_body(message.id(), Some("hello again"), None).await.unwrap();
}

#[tokio::test]
async fn upsert_attachment_dedupes_by_message_and_content_hash() {
    let store = setup().await;
    let source = store.get_or_create_source("user@example.com", SourceKind::JsonApi).await.unwrap();
    let conversation_id = seed_conversation(&store, source.id()).await;

    let message = MessageRecord::new(
        source.id(),
        RemoteMessageId::new("msg-1").unwrap(),
        conversation_id,
        None,
        Utc::now(),
        4096,
        1,
        "",
        "",
    );
    store.upsert_message(&message).await.unwrap();

    let hash = mailvault_core::domain::ContentHash::of(b"attachment bytes");
    let attachment = mailvault_core::domain::Attachment::new(message.id(), hash, "report.pdf", "application/pdf", 4096);
    store.upsert_attachment(&attachment).await.unwrap();
    store.upsert_attachment(&attachment).await.unwrap();
}

#[tokio::test]
async fn save_audit_assigns_an_id_and_is_queryable_through_the_helper() {
    let store = setup().await;
    let entry = mailvault_core::domain::AuditEntry::new(
        mailvault_core::domain::AuditAction::SyncStart,
        mailvault_core::domain::AuditResult::success(),
    );
    let id = store.save_audit(entry).await.unwrap();
    assert!(id.value() > 0);
}
