//! Deletion manager error type

use mailvault_core::domain::ManifestId;
use mailvault_core::domain::ManifestStatus;
use mailvault_core::ports::RemoteError;
use thiserror::Error;

/// Errors raised by the deletion manager (§4.9, §7 "Scope/permission during delete").
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("no manifest found with id {0}")]
    NotFound(ManifestId),

    #[error("manifest {id} is {actual}, required {expected}")]
    WrongStatus {
        id: ManifestId,
        expected: &'static str,
        actual: ManifestStatus,
    },

    #[error("manifest {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: ManifestId,
        from: ManifestStatus,
        to: ManifestStatus,
    },

    #[error("remote operation failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("execution cancelled")]
    Cancelled,
}
