//! Manifest execution (§4.9 execution contract)
//!
//! Drives a manifest's `target_ids` through the remote adapter's `trash`/
//! `delete`/`batch_delete` operations, persisting progress as it goes so a
//! crash or cancellation can resume from `last_processed_index` rather than
//! re-attempting already-settled items.

use std::sync::Arc;

use chrono::Utc;
use mailvault_core::domain::{DeleteMethod, DeletionManifest, ManifestId, ManifestStatus, RemoteMessageId};
use mailvault_core::ports::{Clock, RemoteAdapter, RemoteError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ManifestError;
use crate::manifest_store::ManifestStore;
use crate::progress::DeletionProgress;

/// How a batch-delete call's individual item result, or a non-batch call's
/// result, is classified (§7 "Scope/permission during delete", §4.9).
enum Outcome {
    Success,
    /// Idempotent: the message was already gone.
    AlreadyGone,
    /// Not retryable; persist and propagate immediately.
    ScopeOrPermission(RemoteError),
    /// Retryable in a later execution; recorded in `failed_ids`.
    Transient(RemoteError),
}

fn classify(result: Result<(), RemoteError>) -> Outcome {
    match result {
        Ok(()) => Outcome::Success,
        Err(RemoteError::NotFound(_)) => Outcome::AlreadyGone,
        Err(RemoteError::Unauthorized(msg)) => Outcome::ScopeOrPermission(RemoteError::Unauthorized(msg)),
        Err(other) => Outcome::Transient(other),
    }
}

/// How often (in items attempted) to flush execution state to disk when
/// nothing noteworthy has happened, beyond the mandatory flush points
/// (on error, before a scope-error propagates, on completion).
const PERSIST_INTERVAL: usize = 25;

/// Options for one execution attempt against a manifest.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    pub method: DeleteMethod,
    pub batch_size: usize,
    pub resume: bool,
}

/// Executes (or resumes) a manifest's deletion batch.
///
/// Requires the manifest to be `pending`, or `in_progress` with
/// `opts.resume == true` (§4.9). Returns the manifest in its terminal or
/// resumable state; on cancellation the manifest is left `in_progress` and
/// [`ManifestError::Cancelled`] is returned.
pub async fn execute(
    store: &ManifestStore,
    adapter: Arc<dyn RemoteAdapter>,
    clock: &dyn Clock,
    manifest_id: &ManifestId,
    opts: ExecuteOptions,
    progress: &dyn DeletionProgress,
    cancellation: &CancellationToken,
) -> Result<DeletionManifest, ManifestError> {
    let mut manifest = store.load(manifest_id)?;

    let starting_status = manifest.status();
    match starting_status {
        ManifestStatus::Pending => {}
        ManifestStatus::InProgress if opts.resume => {}
        other => {
            return Err(ManifestError::WrongStatus {
                id: manifest_id.clone(),
                expected: "pending (or in_progress with resume=true)",
                actual: other,
            });
        }
    }
    let started_fresh = starting_status == ManifestStatus::Pending;

    manifest.start(opts.method, clock.now());
    if manifest.status() != starting_status {
        store.move_status(manifest_id, starting_status, manifest.status())?;
    }
    store.save(&manifest)?;

    progress.on_start(manifest.target_ids().len());

    let use_batch_path = started_fresh && opts.method == DeleteMethod::Delete && opts.batch_size > 0;

    let result = if use_batch_path {
        run_batch(&mut manifest, store, adapter.clone(), opts.batch_size, progress, cancellation).await
    } else {
        run_individual(&mut manifest, store, adapter.clone(), opts.method, progress, cancellation).await
    };

    if let Err(err) = result {
        store.save(&manifest)?;
        return Err(err);
    }

    let exec = manifest.execution().expect("start() always attaches an execution record");
    let all_failed = !manifest.target_ids().is_empty() && exec.failed == manifest.target_ids().len() as u64;
    let before = manifest.status();
    if use_batch_path || !all_failed {
        manifest.complete(clock.now());
    } else {
        manifest.fail(clock.now());
    }
    store.move_status(manifest_id, before, manifest.status())?;
    store.save(&manifest)?;

    let exec = manifest.execution().expect("execution record survives completion");
    progress.on_complete(exec.succeeded, exec.failed);
    info!(
        manifest = manifest_id.as_str(),
        status = %manifest.status(),
        succeeded = exec.succeeded,
        failed = exec.failed,
        "manifest execution finished"
    );

    Ok(manifest)
}

/// Non-batch path: one remote call per id, starting from
/// `last_processed_index` so a resumed execution skips settled items.
async fn run_individual(
    manifest: &mut DeletionManifest,
    store: &ManifestStore,
    adapter: Arc<dyn RemoteAdapter>,
    method: DeleteMethod,
    progress: &dyn DeletionProgress,
    cancellation: &CancellationToken,
) -> Result<(), ManifestError> {
    let start_index = manifest.execution().map(|e| e.last_processed_index).unwrap_or(0);
    let ids: Vec<RemoteMessageId> = manifest.target_ids()[start_index.min(manifest.target_ids().len())..].to_vec();

    for (offset, id) in ids.into_iter().enumerate() {
        if cancellation.is_cancelled() {
            store.save(manifest)?;
            return Err(ManifestError::Cancelled);
        }

        let result = match method {
            DeleteMethod::Trash => adapter.trash(&id).await,
            DeleteMethod::Delete => adapter.delete(&id).await,
        };

        match classify(result) {
            Outcome::Success | Outcome::AlreadyGone => manifest.record_success(),
            Outcome::ScopeOrPermission(err) => {
                manifest.record_failure(id.clone());
                store.save(manifest)?;
                return Err(ManifestError::Remote(err));
            }
            Outcome::Transient(err) => {
                warn!(id = id.as_str(), error = %err, "item delete failed, recording for retry");
                manifest.record_failure(id.clone());
            }
        }

        let processed = start_index + offset + 1;
        let exec = manifest.execution().expect("start() attaches a record");
        progress.on_progress(processed, exec.succeeded, exec.failed);
        if processed % PERSIST_INTERVAL == 0 {
            store.save(manifest)?;
        }
    }

    Ok(())
}

/// Batch path: chunks of up to `batch_size`, followed by an individual
/// retry pass over every id left in `failed_ids` (§4.9 "Batch-to-individual
/// fallback" — both for the dedicated retry pass and for a whole chunk that
/// failed transiently at the `batch_delete` call level).
async fn run_batch(
    manifest: &mut DeletionManifest,
    store: &ManifestStore,
    adapter: Arc<dyn RemoteAdapter>,
    batch_size: usize,
    progress: &dyn DeletionProgress,
    cancellation: &CancellationToken,
) -> Result<(), ManifestError> {
    let ids = manifest.target_ids().to_vec();

    for chunk in ids.chunks(batch_size) {
        if cancellation.is_cancelled() {
            store.save(manifest)?;
            return Err(ManifestError::Cancelled);
        }

        match adapter.batch_delete(chunk).await {
            Ok(failed) => record_chunk_result(manifest, chunk, &failed),
            Err(err) => {
                warn!(error = %err, chunk_len = chunk.len(), "batch_delete call failed, falling back to individual deletes");
                for id in chunk {
                    let outcome = classify(adapter.delete(id).await);
                    apply_item_outcome(manifest, id, outcome, store)?;
                }
            }
        }

        let exec = manifest.execution().expect("start() attaches a record");
        manifest.advance_last_processed_index(exec.last_processed_index.max(0));
        progress.on_progress(exec.last_processed_index, exec.succeeded, exec.failed);
        store.save(manifest)?;
    }

    let retry_ids: Vec<RemoteMessageId> = manifest
        .execution()
        .map(|e| e.failed_ids.clone())
        .unwrap_or_default();

    for id in retry_ids {
        if cancellation.is_cancelled() {
            store.save(manifest)?;
            return Err(ManifestError::Cancelled);
        }
        match classify(adapter.delete(&id).await) {
            Outcome::Success | Outcome::AlreadyGone => manifest.retry_succeeded(&id),
            Outcome::ScopeOrPermission(err) => {
                store.save(manifest)?;
                return Err(ManifestError::Remote(err));
            }
            Outcome::Transient(_) => {
                // Stays in failed_ids; a later execution may retry it again.
            }
        }
    }
    store.save(manifest)?;

    Ok(())
}

fn record_chunk_result(manifest: &mut DeletionManifest, chunk: &[RemoteMessageId], failed: &[(RemoteMessageId, RemoteError)]) {
    let failed_set: std::collections::HashSet<&RemoteMessageId> = failed.iter().map(|(id, _)| id).collect();
    for id in chunk {
        if failed_set.contains(id) {
            manifest.record_failure(id.clone());
        } else {
            manifest.record_success();
        }
    }
}

fn apply_item_outcome(
    manifest: &mut DeletionManifest,
    id: &RemoteMessageId,
    outcome: Outcome,
    store: &ManifestStore,
) -> Result<(), ManifestError> {
    match outcome {
        Outcome::Success | Outcome::AlreadyGone => {
            manifest.record_success();
            Ok(())
        }
        Outcome::ScopeOrPermission(err) => {
            manifest.record_failure(id.clone());
            store.save(manifest)?;
            Err(ManifestError::Remote(err))
        }
        Outcome::Transient(_) => {
            manifest.record_failure(id.clone());
            Ok(())
        }
    }
}
