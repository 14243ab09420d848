//! Domain error types
//!
//! Validation and invariant failures raised by domain constructors and
//! mutators. Distinct from `TransportError`/`AdapterError`/`StoreError`,
//! which live in their respective crates and wrap I/O and protocol failures.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid email address format.
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// Invalid content hash (expected 64 lowercase hex characters).
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid identifier format.
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid remote identifier (message, label, or thread id).
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid sync cursor.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Invalid state transition attempt.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// Generic validation failure not covered by a more specific variant.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = DomainError::InvalidEmail("notanemail".to_string());
        assert_eq!(err.to_string(), "Invalid email format: notanemail");

        let err = DomainError::InvalidState {
            from: "active".to_string(),
            to: "completed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from active to completed"
        );
    }

    #[test]
    fn error_equality() {
        let err1 = DomainError::InvalidCursor("abc".to_string());
        let err2 = DomainError::InvalidCursor("abc".to_string());
        let err3 = DomainError::InvalidCursor("xyz".to_string());
        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
