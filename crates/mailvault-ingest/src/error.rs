//! Ingest controller error type

use mailvault_core::domain::DomainError;
use mailvault_core::ports::{RemoteError, StoreError};
use thiserror::Error;

/// Errors raised by the ingest worker or either sync controller (§4.6-§4.8, §7).
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("remote operation failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// The incremental sync's history cursor was evicted by the provider;
    /// the caller should schedule a full resync (§4.8 step 1, §7).
    #[error("history cursor expired, a full resync is required")]
    HistoryExpired,

    #[error("sync cancelled")]
    Cancelled,
}
