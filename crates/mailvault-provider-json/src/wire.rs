//! JSON wire types for the HTTP API variant (§4.4).
//!
//! These mirror the shape of a Gmail-style JSON mail API: paginated
//! listings with an opaque `nextPageToken`, a monotonic history cursor, and
//! base64url-encoded raw message bytes. Field names use `camelCase` to
//! match the wire format; the adapter converts every field into the
//! provider-agnostic `mailvault-core` domain types before returning.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireProfile {
    pub email_address: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Current history cursor position (§4.8 step 2).
    #[serde(default)]
    pub history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireLabel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct WireLabelsResponse {
    #[serde(default)]
    pub labels: Vec<WireLabel>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WireMessageSummary {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireListMessagesResponse {
    #[serde(default)]
    pub messages: Vec<WireMessageSummary>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRawMessage {
    pub id: String,
    /// Base64url-encoded raw MIME bytes, with or without `=` padding.
    pub raw: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHistoryEntry {
    #[serde(default)]
    pub messages_added: Vec<WireHistoryMessageRef>,
    #[serde(default)]
    pub labels_added: Vec<WireHistoryMessageRef>,
    #[serde(default)]
    pub labels_removed: Vec<WireHistoryMessageRef>,
    #[serde(default)]
    pub messages_deleted: Vec<WireHistoryMessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHistoryMessageRef {
    pub message: WireMessageSummary,
    /// The label ids that changed in this event. Meaningful on
    /// `labelsAdded`/`labelsRemoved` entries; absent (and ignored) on
    /// `messagesAdded`/`messagesDeleted`, where it names no specific delta.
    #[serde(default)]
    pub label_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHistoryResponse {
    #[serde(default)]
    pub history: Vec<WireHistoryEntry>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    /// Present on every response; the cursor to resume from on the next
    /// call once this page has been fully consumed.
    pub history_id: String,
    /// Returned instead of `history` when `start_history_id` is older than
    /// the provider's retention window (§4.8 step 1).
    #[serde(default)]
    pub history_id_too_old: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBatchDeleteFailure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WireBatchDeleteResponse {
    #[serde(default)]
    pub failed: Vec<WireBatchDeleteFailure>,
}
