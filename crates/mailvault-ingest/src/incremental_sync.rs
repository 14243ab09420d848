//! Incremental-sync controller (§4.8)
//!
//! Replays a source's remote history since its last cursor: labels first,
//! then a page loop over `RemoteAdapter::list_history`, classifying each
//! event as a brand-new message (routed through the same ingest worker full
//! sync uses), a label change on a message already on disk, or a tombstone.
//! Shares its Init/Finalize/panic-recovery shape with [`crate::full_sync`].

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures_util::FutureExt;
use mailvault_audit::AuditLogger;
use mailvault_core::domain::{
    Checkpoint, Cursor, DomainError, LabelId, MailSource, RemoteLabelId, RemoteMessageId, SourceId,
    SyncKind, SyncRun,
};
use mailvault_core::ports::{Clock, HistoryEvent, RemoteAdapter, RemoteError, Store};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::full_sync::panic_message;
use crate::progress::SyncProgress;
use crate::worker::ingest_batch;

async fn sync_labels(
    store: &dyn Store,
    adapter: &dyn RemoteAdapter,
    source_id: SourceId,
) -> Result<HashMap<RemoteLabelId, LabelId>, IngestError> {
    let labels = adapter.list_labels().await?;
    let pairs: Vec<(RemoteLabelId, String)> = labels.into_iter().map(|l| (l.id, l.name)).collect();
    Ok(store.ensure_labels_batch(source_id, &pairs).await?)
}

async fn init_run(store: &dyn Store, source_id: SourceId) -> Result<SyncRun, IngestError> {
    Ok(store.start_sync(source_id, SyncKind::Incremental).await?)
}

/// Runs (or resumes) an incremental sync for `source`. Returns
/// [`IngestError::HistoryExpired`] if the provider has evicted the cursor;
/// the caller is expected to fall back to [`crate::full_sync::run_full_sync`].
pub async fn run_incremental_sync(
    store: Arc<dyn Store>,
    adapter: Arc<dyn RemoteAdapter>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditLogger>,
    attachments_dir: &Path,
    source: &MailSource,
    progress: &dyn SyncProgress,
    cancellation: &CancellationToken,
) -> Result<SyncRun, IngestError> {
    let source_id = source.id();
    let Some(since) = source.cursor() else {
        return Err(IngestError::HistoryExpired);
    };

    let mut run = init_run(store.as_ref(), source_id).await?;
    audit.log_sync_start(source_id, run.id()).await;
    let started_at = clock.now();

    let outcome = AssertUnwindSafe(run_inner(
        store.as_ref(),
        adapter.as_ref(),
        clock.as_ref(),
        attachments_dir,
        source_id,
        since,
        &mut run,
        progress,
        cancellation,
    ))
    .catch_unwind()
    .await;

    match outcome {
        Ok(Ok(latest_cursor)) => {
            run.complete();
            store.complete_sync(run.id(), clock.now()).await?;
            store.update_source_sync_cursor(source_id, latest_cursor).await.ok();
            let elapsed_ms = (clock.now() - started_at).num_milliseconds().max(0) as u64;
            audit
                .log_sync_complete(
                    source_id,
                    run.id(),
                    elapsed_ms,
                    run.checkpoint().processed,
                    run.checkpoint().added,
                    run.checkpoint().updated,
                    run.checkpoint().errors,
                )
                .await;
            progress.on_complete(&run.summary());
            info!(source = source_id.to_string(), summary = %run.summary(), "incremental sync completed");
            Ok(run)
        }
        Ok(Err(IngestError::HistoryExpired)) => {
            audit.log_history_expired(source_id, run.id()).await;
            let reason = "history cursor expired";
            run.fail(reason);
            store.fail_sync(run.id(), reason, clock.now()).await.ok();
            progress.on_error(reason);
            Err(IngestError::HistoryExpired)
        }
        Ok(Err(IngestError::Cancelled)) => {
            // Leave the run `in_progress`; the checkpoint was already
            // flushed best-effort inside the history-page loop, so a later
            // invocation resumes from it rather than starting over (§4.8
            // "Cancellation").
            info!(source = source_id.to_string(), run = run.id().to_string(), "incremental sync cancelled, left active");
            progress.on_error("cancelled");
            Err(IngestError::Cancelled)
        }
        Ok(Err(err)) => {
            let reason = err.to_string();
            run.fail(reason.clone());
            store.fail_sync(run.id(), &reason, clock.now()).await.ok();
            audit.log_sync_failed(source_id, run.id(), &reason).await;
            progress.on_error(&reason);
            Err(err)
        }
        Err(panic) => {
            let reason = format!("panic: {}", panic_message(&panic));
            run.fail(reason.clone());
            store.fail_sync(run.id(), &reason, clock.now()).await.ok();
            audit.log_sync_failed(source_id, run.id(), &reason).await;
            progress.on_error(&reason);
            Err(IngestError::Domain(DomainError::ValidationFailed(reason)))
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_inner(
    store: &dyn Store,
    adapter: &dyn RemoteAdapter,
    clock: &dyn Clock,
    attachments_dir: &Path,
    source_id: SourceId,
    since: Cursor,
    run: &mut SyncRun,
    progress: &dyn SyncProgress,
    cancellation: &CancellationToken,
) -> Result<Cursor, IngestError> {
    let profile = adapter.profile().await?;
    if let Some(current) = profile.history_position {
        if since >= current {
            progress.on_start(Some(0));
            return Ok(current);
        }
    }

    let label_map = sync_labels(store, adapter, source_id).await?;

    let mut checkpoint = run.checkpoint().clone();
    let mut page_token = checkpoint.page_token.clone();
    let mut latest_cursor = since;
    let mut first_page = true;

    loop {
        if cancellation.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let page = match adapter.list_history(since, page_token.as_deref()).await {
            Ok(page) => page,
            Err(RemoteError::HistoryExpired) => return Err(IngestError::HistoryExpired),
            Err(err) => return Err(err.into()),
        };
        latest_cursor = page.latest_cursor;

        if first_page {
            if page.events.is_empty() && page.next_page_token.is_none() {
                progress.on_start(Some(0));
                return Ok(latest_cursor);
            }
            progress.on_start(None);
            first_page = false;
        }

        checkpoint = apply_history_page(
            store,
            adapter,
            clock,
            attachments_dir,
            source_id,
            &page.events,
            &label_map,
            &checkpoint,
            progress,
        )
        .await?;

        checkpoint.page_token = page.next_page_token.clone();
        run.update_checkpoint(checkpoint.clone());
        if let Err(err) = store.update_sync_checkpoint(run.id(), checkpoint.clone()).await {
            warn!(error = %err, "failed to persist checkpoint, continuing in memory");
        }

        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    Ok(latest_cursor)
}

/// A label-set change carried on a `LabelsAdded`/`LabelsRemoved` history
/// event, naming only the label ids that changed (not the message's full
/// current label set).
enum LabelDelta {
    Added(Vec<RemoteLabelId>),
    Removed(Vec<RemoteLabelId>),
}

/// Classifies and persists one page of history events (§4.8 step 4).
///
/// `Added` and `LabelsAdded` events for a message not yet on disk are
/// routed through the same [`ingest_batch`] the full sync uses (the
/// summary's `label_ids` snapshot covers the newly-added labels, so a
/// regular ingest already lands the right label set). `LabelsRemoved` on a
/// message not yet on disk is a pure no-op: there is nothing on disk to
/// remove a label from, and a removal carries no other information worth
/// materializing. For a message already on disk, `LabelsAdded`/
/// `LabelsRemoved` apply their carried label ids as a set diff rather than
/// replacing the whole label set; a plain `Added` on an already-known
/// message falls back to a full-snapshot replace. `Deleted` events are
/// tombstoned in one batch call per page.
#[allow(clippy::too_many_arguments)]
async fn apply_history_page(
    store: &dyn Store,
    adapter: &dyn RemoteAdapter,
    clock: &dyn Clock,
    attachments_dir: &Path,
    source_id: SourceId,
    events: &[HistoryEvent],
    label_map: &HashMap<RemoteLabelId, LabelId>,
    checkpoint: &Checkpoint,
    progress: &dyn SyncProgress,
) -> Result<Checkpoint, IngestError> {
    let mut full_replace: Vec<RemoteMessageSummary> = Vec::new();
    let mut label_changes: Vec<(RemoteMessageSummary, LabelDelta)> = Vec::new();
    let mut deleted: Vec<RemoteMessageId> = Vec::new();

    for event in events {
        match event {
            HistoryEvent::Added(summary) => full_replace.push(summary.clone()),
            HistoryEvent::LabelsAdded { summary, label_ids } => {
                label_changes.push((summary.clone(), LabelDelta::Added(label_ids.clone())));
            }
            HistoryEvent::LabelsRemoved { summary, label_ids } => {
                label_changes.push((summary.clone(), LabelDelta::Removed(label_ids.clone())));
            }
            HistoryEvent::Deleted(id) => deleted.push(id.clone()),
        }
    }

    let mut next = checkpoint.clone();

    let check_ids: Vec<RemoteMessageId> = full_replace
        .iter()
        .map(|s| s.id.clone())
        .chain(label_changes.iter().map(|(s, _)| s.id.clone()))
        .collect();
    let existing = if check_ids.is_empty() {
        Default::default()
    } else {
        store.messages_exist_batch(source_id, &check_ids).await?
    };

    let mut new_messages: Vec<RemoteMessageSummary> = Vec::new();
    let mut known_full_replace: Vec<RemoteMessageSummary> = Vec::new();
    for summary in full_replace {
        if existing.contains(&summary.id) {
            known_full_replace.push(summary);
        } else {
            new_messages.push(summary);
        }
    }

    let mut add_diffs: Vec<(RemoteMessageSummary, Vec<RemoteLabelId>)> = Vec::new();
    let mut remove_diffs: Vec<(RemoteMessageSummary, Vec<RemoteLabelId>)> = Vec::new();
    for (summary, delta) in label_changes {
        match delta {
            LabelDelta::Added(label_ids) => {
                if existing.contains(&summary.id) {
                    add_diffs.push((summary, label_ids));
                } else {
                    new_messages.push(summary);
                }
            }
            LabelDelta::Removed(label_ids) => {
                if existing.contains(&summary.id) {
                    remove_diffs.push((summary, label_ids));
                }
                // Absent message: §4.8 step 4 treats a removal against a
                // message the store has never heard of as a no-op, not
                // even worth a processed count.
            }
        }
    }

    if !new_messages.is_empty() {
        next = ingest_batch(store, adapter, clock, attachments_dir, source_id, &new_messages, label_map, &next, progress)
            .await?;
    }

    for summary in &known_full_replace {
        next.processed += 1;
        match store.get_message_by_remote_id(source_id, &summary.id).await? {
            Some(message) => {
                let internal_labels: Vec<LabelId> = summary
                    .label_ids
                    .iter()
                    .filter_map(|remote| label_map.get(remote).copied())
                    .collect();
                store.replace_message_labels(message.id(), &internal_labels).await?;
                next.updated += 1;
            }
            None => {
                debug!(id = summary.id.as_str(), "message vanished between existence check and fetch, skipping");
            }
        }
    }

    for (summary, label_ids) in &add_diffs {
        next.processed += 1;
        match store.get_message_by_remote_id(source_id, &summary.id).await? {
            Some(message) => {
                let internal_labels: Vec<LabelId> = label_ids.iter().filter_map(|remote| label_map.get(remote).copied()).collect();
                store.add_message_labels(message.id(), &internal_labels).await?;
                next.updated += 1;
            }
            None => {
                debug!(id = summary.id.as_str(), "message vanished between existence check and fetch, skipping");
            }
        }
    }

    for (summary, label_ids) in &remove_diffs {
        next.processed += 1;
        match store.get_message_by_remote_id(source_id, &summary.id).await? {
            Some(message) => {
                let internal_labels: Vec<LabelId> = label_ids.iter().filter_map(|remote| label_map.get(remote).copied()).collect();
                store.remove_message_labels(message.id(), &internal_labels).await?;
                next.updated += 1;
            }
            None => {
                debug!(id = summary.id.as_str(), "message vanished between existence check and fetch, skipping");
            }
        }
    }

    if !deleted.is_empty() {
        next.processed += deleted.len() as u64;
        let tombstoned = store.mark_messages_deleted_batch(source_id, &deleted, clock.now()).await?;
        next.updated += tombstoned;
    }

    progress.on_progress(next.processed, next.added, next.processed.saturating_sub(next.added + next.errors));

    Ok(next)
}
