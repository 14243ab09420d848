//! Remote adapter port
//!
//! Generalizes the two provider shapes a source can have (§1, §6): a JSON
//! HTTP API (Gmail-/Graph-style, paginated listing plus a history cursor)
//! and a generic mailbox protocol (IMAP-like, folder-scoped UIDs with no
//! native history cursor). `mailvault-provider-json` and
//! `mailvault-provider-mailbox` each implement this trait once; the ingest
//! controllers in `mailvault-ingest` are written against the trait only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Cursor, RemoteLabelId, RemoteMessageId, RemoteThreadId};

/// Failure modes a remote adapter can surface, matching the error-kind
/// vocabulary the rate limiter and retry engine branch on.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The provider asked the caller to slow down (HTTP 429 or equivalent).
    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },
    /// Credentials were rejected or have expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The history cursor is older than the provider's retention window and
    /// must be discarded in favor of a full resync (§4.8 step 1).
    #[error("history cursor expired")]
    HistoryExpired,
    /// The provider returned a 5xx or otherwise transient server failure.
    #[error("server error: {0}")]
    ServerError(String),
    /// A transport-level failure (connection reset, timeout, DNS, TLS).
    #[error("network error: {0}")]
    Network(String),
    /// Anything else, preserved verbatim for logging.
    #[error("{0}")]
    Other(String),
}

/// The authenticated identity a source resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProfile {
    pub address: String,
    pub display_name: Option<String>,
    /// The provider's current history position, if it exposes one ahead of
    /// a `list_history` call (§4.8 step 2). `None` for mailbox-protocol
    /// sources, which have no history concept at all (§4.4).
    pub history_position: Option<Cursor>,
}

/// A label/folder as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLabel {
    pub id: RemoteLabelId,
    pub name: String,
}

/// A minimal per-message summary returned by listing/history calls; the
/// full envelope is fetched separately via [`RemoteAdapter::get_message_raw`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessageSummary {
    pub id: RemoteMessageId,
    pub thread_id: RemoteThreadId,
    pub label_ids: Vec<RemoteLabelId>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePage<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// One entry in a history-cursor replay. The three "changed" shapes are
/// kept distinct (rather than collapsed into one `Changed` variant)
/// because §4.8 step 4 handles them differently: a brand-new message is
/// always fetched and ingested, a label addition on a message not yet on
/// disk is also fetched and ingested, but a label removal on a message not
/// yet on disk is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEvent {
    /// A message not previously seen in this replay (history's
    /// `messages_added`).
    Added(RemoteMessageSummary),
    /// Labels were added to `summary`; `label_ids` names only the labels
    /// that changed in this event, not the message's full current label set.
    LabelsAdded {
        summary: RemoteMessageSummary,
        label_ids: Vec<RemoteLabelId>,
    },
    /// Labels were removed from `summary`; same `label_ids` semantics as
    /// `LabelsAdded`.
    LabelsRemoved {
        summary: RemoteMessageSummary,
        label_ids: Vec<RemoteLabelId>,
    },
    Deleted(RemoteMessageId),
}

/// One page of a history-cursor replay, carrying the cursor to resume from
/// on the next page (distinct from `next_page_token`, which only covers
/// pagination within the current replay).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub events: Vec<HistoryEvent>,
    pub next_page_token: Option<String>,
    pub latest_cursor: Cursor,
}

/// The boundary between the ingest controllers and a specific mail
/// provider. Implementations own their own authentication and wire format;
/// this trait only sees domain-shaped requests and responses.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Resolves the identity this source is authenticated as.
    async fn profile(&self) -> Result<RemoteProfile, RemoteError>;

    /// Lists all labels/folders visible to this source.
    async fn list_labels(&self) -> Result<Vec<RemoteLabel>, RemoteError>;

    /// Lists one page of message summaries (§4.7 full sync page loop).
    async fn list_messages(&self, page_token: Option<&str>) -> Result<RemotePage<RemoteMessageSummary>, RemoteError>;

    /// Fetches the raw MIME bytes of one message.
    async fn get_message_raw(&self, id: &RemoteMessageId) -> Result<Vec<u8>, RemoteError>;

    /// Fetches the raw MIME bytes of a batch of messages in as few
    /// round-trips as the provider allows.
    async fn get_messages_raw_batch(&self, ids: &[RemoteMessageId]) -> Result<Vec<(RemoteMessageId, Vec<u8>)>, RemoteError>;

    /// Replays history since `since`, one page at a time (§4.8).
    async fn list_history(&self, since: Cursor, page_token: Option<&str>) -> Result<HistoryPage, RemoteError>;

    /// Moves one message to the provider's trash.
    async fn trash(&self, id: &RemoteMessageId) -> Result<(), RemoteError>;

    /// Permanently deletes one message.
    async fn delete(&self, id: &RemoteMessageId) -> Result<(), RemoteError>;

    /// Permanently deletes a batch of messages, returning the ids that
    /// failed (so the caller can retry only those) alongside their error.
    async fn batch_delete(&self, ids: &[RemoteMessageId]) -> Result<Vec<(RemoteMessageId, RemoteError)>, RemoteError>;
}
