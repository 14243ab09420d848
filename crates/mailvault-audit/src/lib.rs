//! mailvault-audit - structured audit logging
//!
//! Provides:
//! - Structured event logging for sync runs, deletion manifests, and
//!   per-item ingest errors (§9)
//! - A queryable audit history via the `Store` port
//! - Reason codes for categorizing item-level failures

pub mod logger;
pub mod reason;

pub use logger::AuditLogger;
pub use reason::ReasonCode;
