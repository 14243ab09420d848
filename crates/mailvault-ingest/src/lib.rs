//! mailvault-ingest - sync controllers and the per-page ingest worker
//!
//! Three pieces, each written only against `mailvault-core`'s `Clock`/
//! `RemoteAdapter`/`Store` ports so they run identically over either
//! provider shape (§4.4):
//!
//! - [`worker`]: turns one page of remote message summaries into persisted
//!   rows (§4.6).
//! - [`full_sync`]: the initial/re-run controller over `list_messages`
//!   pagination (§4.7).
//! - [`incremental_sync`]: the steady-state controller over
//!   `list_history` replay (§4.8).

pub mod error;
pub mod full_sync;
pub mod incremental_sync;
pub mod progress;
pub mod worker;

pub use error::IngestError;
pub use full_sync::{run_full_sync, FullSyncOptions};
pub use incremental_sync::run_incremental_sync;
pub use progress::{NullSyncProgress, SyncProgress};
pub use worker::ingest_batch;
