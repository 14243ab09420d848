//! Full-sync controller (§4.7)
//!
//! Drives a source through its initial (or re-run) complete listing: Init,
//! Probe, Labels, a page loop that calls the ingest worker once per page,
//! and Finalize. Grounded on the donor sync engine's page-loop/checkpoint/
//! panic-boundary shape, replayed against `mailvault-mime`/`mailvault-store`
//! instead of a local-filesystem/cloud-provider pair.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures_util::FutureExt;
use mailvault_audit::AuditLogger;
use mailvault_core::domain::{Checkpoint, LabelId, SourceId, SourceKind, SyncKind, SyncRun};
use mailvault_core::ports::{Clock, RemoteAdapter, Store};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::IngestError;
use crate::progress::SyncProgress;
use crate::worker::ingest_batch;

/// Options for one full-sync invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullSyncOptions {
    /// Bypass the active-run check and start a fresh run even if one is
    /// already in flight (§4.7 "Concurrency note").
    pub no_resume: bool,
}

/// Builds the `remote_label_id -> internal LabelId` map for a source
/// (§4.7 "Labels" step), used by every page's ingest call.
async fn sync_labels(
    store: &dyn Store,
    adapter: &dyn RemoteAdapter,
    source_id: SourceId,
) -> Result<HashMap<mailvault_core::domain::RemoteLabelId, LabelId>, IngestError> {
    let labels = adapter.list_labels().await?;
    let pairs: Vec<(mailvault_core::domain::RemoteLabelId, String)> =
        labels.into_iter().map(|l| (l.id, l.name)).collect();
    Ok(store.ensure_labels_batch(source_id, &pairs).await?)
}

async fn init_run(
    store: &dyn Store,
    clock: &dyn Clock,
    source_id: SourceId,
    opts: FullSyncOptions,
) -> Result<SyncRun, IngestError> {
    if opts.no_resume {
        if let Some(active) = store.get_active_sync(source_id, SyncKind::Full).await? {
            store
                .fail_sync(active.id(), "superseded by a fresh run (no_resume)", clock.now())
                .await?;
        }
    }
    Ok(store.start_sync(source_id, SyncKind::Full).await?)
}

/// Obtains the history position to anchor this run's cursor to at Finalize.
/// Mailbox-protocol sources have no history concept at all (§4.4) and are
/// left with no cursor; JSON API sources that report the cursor as expired
/// against a cold start are left unanchored too, so the next full sync retries.
async fn probe_history_position(
    adapter: &dyn RemoteAdapter,
    source_kind: SourceKind,
) -> Result<Option<mailvault_core::domain::Cursor>, IngestError> {
    if source_kind != SourceKind::JsonApi {
        return Ok(None);
    }
    match adapter.list_history(mailvault_core::domain::Cursor::new(0), None).await {
        Ok(page) => Ok(Some(page.latest_cursor)),
        Err(mailvault_core::ports::RemoteError::HistoryExpired) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Runs (or resumes) a full sync for `source_id`. Mirrors the shape of
/// `mailvault-deletion::execute`: the controller owns retries across pages
/// only in the sense that each page's ingest is attempted once and errors
/// are counted, never retried at this layer (retries live in `mailvault-transport`).
pub async fn run_full_sync(
    store: Arc<dyn Store>,
    adapter: Arc<dyn RemoteAdapter>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditLogger>,
    attachments_dir: &Path,
    source_id: SourceId,
    source_kind: SourceKind,
    opts: FullSyncOptions,
    progress: &dyn SyncProgress,
    cancellation: &CancellationToken,
) -> Result<SyncRun, IngestError> {
    let mut run = init_run(store.as_ref(), clock.as_ref(), source_id, opts).await?;
    audit.log_sync_start(source_id, run.id()).await;
    let started_at = clock.now();

    let outcome = AssertUnwindSafe(run_inner(
        store.as_ref(),
        adapter.as_ref(),
        clock.as_ref(),
        attachments_dir,
        source_id,
        source_kind,
        &mut run,
        progress,
        cancellation,
    ))
    .catch_unwind()
    .await;

    match outcome {
        Ok(Ok(history_position)) => {
            run.complete();
            store.complete_sync(run.id(), clock.now()).await?;
            if let Some(cursor) = history_position {
                store.update_source_sync_cursor(source_id, cursor).await.ok();
            }
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
            info!(source = source_id.to_string(), summary = %run.summary(), "full sync completed");
            Ok(run)
        }
        Ok(Err(IngestError::Cancelled)) => {
            // Leave the run `in_progress`; the checkpoint was already
            // flushed best-effort inside the page loop, so a later
            // invocation resumes from it rather than starting over (§4.7
            // "Cancellation").
            info!(source = source_id.to_string(), run = run.id().to_string(), "full sync cancelled, left active");
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
            Err(IngestError::Domain(mailvault_core::domain::DomainError::ValidationFailed(reason)))
        }
    }
}

pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_inner(
    store: &dyn Store,
    adapter: &dyn RemoteAdapter,
    clock: &dyn Clock,
    attachments_dir: &Path,
    source_id: SourceId,
    source_kind: SourceKind,
    run: &mut SyncRun,
    progress: &dyn SyncProgress,
    cancellation: &CancellationToken,
) -> Result<Option<mailvault_core::domain::Cursor>, IngestError> {
    let _profile = adapter.profile().await?;
    let history_position = probe_history_position(adapter, source_kind).await?;

    let label_map = sync_labels(store, adapter, source_id).await?;

    let mut checkpoint = run.checkpoint().clone();
    let mut first_page = checkpoint.page_token.is_none() && checkpoint.processed == 0;
    let mut page_token = checkpoint.page_token.clone();

    loop {
        if cancellation.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let page = adapter.list_messages(page_token.as_deref()).await?;
        if first_page {
            progress.on_start(None);
            first_page = false;
        }

        checkpoint = ingest_batch(
            store,
            adapter,
            clock,
            attachments_dir,
            source_id,
            &page.items,
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

    Ok(history_position)
}
