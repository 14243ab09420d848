//! mailvault-store - SQLite-backed implementation of the `Store` port
//!
//! Persists everything `mailvault-ingest` and `mailvault-deletion` touch
//! through the port (§3, §6): sources, sync runs and their checkpoints,
//! conversations, labels, participants, messages and their body/raw/
//! recipient/label side tables, attachments, and the audit log.

pub mod error;
pub mod pool;
pub mod repository;

pub use error::PoolError;
pub use pool::DatabasePool;
pub use repository::{audit_entry_from_row, SqliteStore};
