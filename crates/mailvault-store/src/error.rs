//! Pool-level error type
//!
//! Separate from [`mailvault_core::ports::StoreError`], which covers
//! failures of individual `Store` operations once a pool already exists:
//! this one covers opening the database itself.

use thiserror::Error;

/// Errors raised while opening or migrating a database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to connect to database: {0}")]
    Connect(String),

    #[error("schema migration failed: {0}")]
    Migration(String),
}
