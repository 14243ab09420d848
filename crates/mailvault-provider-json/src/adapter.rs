//! [`RemoteAdapter`] implementation for the JSON HTTP API variant (§4.4).
//!
//! Each port method maps to one logical endpoint on top of the shared
//! [`RequestEngine`] (rate limiting, retries, and status classification all
//! live there — this module only builds requests and parses responses).

use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use mailvault_core::domain::{Cursor, RemoteLabelId, RemoteMessageId, RemoteThreadId};
use mailvault_core::ports::{
    HistoryEvent, HistoryPage, RemoteAdapter, RemoteError, RemoteLabel, RemoteMessageSummary, RemotePage,
    RemoteProfile,
};
use mailvault_transport::RequestEngine;
use reqwest::Method;
use tokio::sync::{RwLock, Semaphore};
use tracing::warn;

use crate::wire::{
    WireBatchDeleteResponse, WireHistoryResponse, WireLabelsResponse, WireListMessagesResponse, WireProfile,
    WireRawMessage,
};

/// Decodes base64url, accepting both padded and unpadded encodings (§4.4).
fn decode_base64url(raw: &str) -> Result<Vec<u8>, RemoteError> {
    URL_SAFE_NO_PAD
        .decode(raw)
        .or_else(|_| URL_SAFE.decode(raw))
        .or_else(|_| STANDARD_NO_PAD.decode(raw))
        .map_err(|e| RemoteError::Other(format!("invalid base64 message body: {e}")))
}

fn parse_json<T: serde::de::DeserializeOwned>(bytes: &[u8], op: &str) -> Result<T, RemoteError> {
    serde_json::from_slice(bytes).map_err(|e| RemoteError::Other(format!("{op}: malformed response JSON: {e}")))
}

fn summary_to_domain(summary: crate::wire::WireMessageSummary) -> Result<RemoteMessageSummary, RemoteError> {
    let label_ids = wire_label_ids_to_domain(summary.label_ids)?;
    Ok(RemoteMessageSummary {
        id: RemoteMessageId::new(summary.id).map_err(|e| RemoteError::Other(e.to_string()))?,
        thread_id: RemoteThreadId::new(summary.thread_id).map_err(|e| RemoteError::Other(e.to_string()))?,
        label_ids,
    })
}

fn wire_label_ids_to_domain(ids: Vec<String>) -> Result<Vec<RemoteLabelId>, RemoteError> {
    ids.into_iter()
        .map(|l| RemoteLabelId::new(l).map_err(|e| RemoteError::Other(e.to_string())))
        .collect()
}

/// A JSON HTTP API mail source (§4.4 "JSON API variant").
///
/// Owns an access token, refreshed out-of-band by whatever authenticates
/// the source; every request method reads the current token without
/// blocking on anything other than the in-memory lock.
pub struct JsonProviderAdapter {
    engine: Arc<RequestEngine>,
    access_token: RwLock<String>,
    batch_fetch_concurrency: usize,
}

impl JsonProviderAdapter {
    pub fn new(engine: Arc<RequestEngine>, access_token: impl Into<String>, batch_fetch_concurrency: usize) -> Self {
        Self {
            engine,
            access_token: RwLock::new(access_token.into()),
            batch_fetch_concurrency: batch_fetch_concurrency.max(1),
        }
    }

    /// Replaces the access token in place, for callers that refresh
    /// credentials between sync cycles.
    pub async fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write().await = token.into();
    }

    async fn token(&self) -> String {
        self.access_token.read().await.clone()
    }
}

#[async_trait::async_trait]
impl RemoteAdapter for JsonProviderAdapter {
    async fn profile(&self) -> Result<RemoteProfile, RemoteError> {
        let token = self.token().await;
        let bytes = self.engine.request("profile", Method::GET, "/profile", None, &token).await?;
        let wire: WireProfile = parse_json(&bytes, "profile")?;
        let history_position = wire
            .history_id
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Cursor::new);
        Ok(RemoteProfile {
            address: wire.email_address,
            display_name: wire.display_name,
            history_position,
        })
    }

    async fn list_labels(&self) -> Result<Vec<RemoteLabel>, RemoteError> {
        let token = self.token().await;
        let bytes = self.engine.request("list_labels", Method::GET, "/labels", None, &token).await?;
        let wire: WireLabelsResponse = parse_json(&bytes, "list_labels")?;
        Ok(wire
            .labels
            .into_iter()
            .map(|l| {
                Ok(RemoteLabel {
                    id: RemoteLabelId::new(l.id).map_err(|e| RemoteError::Other(e.to_string()))?,
                    name: l.name,
                })
            })
            .collect::<Result<Vec<_>, RemoteError>>()?)
    }

    async fn list_messages(&self, page_token: Option<&str>) -> Result<RemotePage<RemoteMessageSummary>, RemoteError> {
        let token = self.token().await;
        let path = match page_token {
            Some(t) => format!("/messages?pageToken={}", urlencoding_encode(t)),
            None => "/messages".to_string(),
        };
        let bytes = self.engine.request("list_messages", Method::GET, &path, None, &token).await?;
        let wire: WireListMessagesResponse = parse_json(&bytes, "list_messages")?;
        let items = wire
            .messages
            .into_iter()
            .map(summary_to_domain)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RemotePage {
            items,
            next_page_token: wire.next_page_token,
        })
    }

    async fn get_message_raw(&self, id: &RemoteMessageId) -> Result<Vec<u8>, RemoteError> {
        let token = self.token().await;
        let path = format!("/messages/{}?format=raw", id.as_str());
        let bytes = self.engine.request("get_message_raw", Method::GET, &path, None, &token).await?;
        let wire: WireRawMessage = parse_json(&bytes, "get_message_raw")?;
        decode_base64url(&wire.raw)
    }

    async fn get_messages_raw_batch(&self, ids: &[RemoteMessageId]) -> Result<Vec<(RemoteMessageId, Vec<u8>)>, RemoteError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.batch_fetch_concurrency));
        let fetches = ids.iter().cloned().map(|id| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                match self.get_message_raw(&id).await {
                    Ok(raw) => Some((id, raw)),
                    Err(err) => {
                        warn!(id = id.as_str(), error = %err, "batch fetch: message failed, leaving slot empty");
                        None
                    }
                }
            }
        });

        Ok(futures_util::future::join_all(fetches).await.into_iter().flatten().collect())
    }

    async fn list_history(&self, since: Cursor, page_token: Option<&str>) -> Result<HistoryPage, RemoteError> {
        let token = self.token().await;
        let mut path = format!("/history?startHistoryId={}", since);
        if let Some(t) = page_token {
            path.push_str(&format!("&pageToken={}", urlencoding_encode(t)));
        }
        let bytes = self.engine.request("list_history", Method::GET, &path, None, &token).await?;
        let wire: WireHistoryResponse = parse_json(&bytes, "list_history")?;

        if wire.history_id_too_old {
            return Err(RemoteError::HistoryExpired);
        }

        let mut events = Vec::new();
        for entry in wire.history {
            for added in entry.messages_added {
                events.push(HistoryEvent::Added(summary_to_domain(added.message)?));
            }
            for added in entry.labels_added {
                let label_ids = wire_label_ids_to_domain(added.label_ids)?;
                events.push(HistoryEvent::LabelsAdded { summary: summary_to_domain(added.message)?, label_ids });
            }
            for removed in entry.labels_removed {
                let label_ids = wire_label_ids_to_domain(removed.label_ids)?;
                events.push(HistoryEvent::LabelsRemoved { summary: summary_to_domain(removed.message)?, label_ids });
            }
            for deleted in entry.messages_deleted {
                let id = RemoteMessageId::new(deleted.message.id).map_err(|e| RemoteError::Other(e.to_string()))?;
                events.push(HistoryEvent::Deleted(id));
            }
        }

        let latest_cursor = wire.history_id.parse::<i64>().map(Cursor::new).unwrap_or(since);

        Ok(HistoryPage {
            events,
            next_page_token: wire.next_page_token,
            latest_cursor,
        })
    }

    async fn trash(&self, id: &RemoteMessageId) -> Result<(), RemoteError> {
        let token = self.token().await;
        let path = format!("/messages/{}/trash", id.as_str());
        self.engine.request("trash", Method::POST, &path, None, &token).await?;
        Ok(())
    }

    async fn delete(&self, id: &RemoteMessageId) -> Result<(), RemoteError> {
        let token = self.token().await;
        let path = format!("/messages/{}", id.as_str());
        self.engine.request("delete", Method::DELETE, &path, None, &token).await?;
        Ok(())
    }

    async fn batch_delete(&self, ids: &[RemoteMessageId]) -> Result<Vec<(RemoteMessageId, RemoteError)>, RemoteError> {
        let token = self.token().await;
        let body = serde_json::json!({ "ids": ids.iter().map(RemoteMessageId::as_str).collect::<Vec<_>>() });
        let bytes = self
            .engine
            .request("batch_delete", Method::POST, "/messages/batchDelete", Some(body), &token)
            .await?;
        let wire: WireBatchDeleteResponse = parse_json(&bytes, "batch_delete")?;
        wire.failed
            .into_iter()
            .map(|f| {
                let id = RemoteMessageId::new(f.id).map_err(|e| RemoteError::Other(e.to_string()))?;
                Ok((id, RemoteError::Other(f.error)))
            })
            .collect()
    }
}

/// Percent-encodes a page token for safe inclusion in a query string.
/// Page tokens are opaque provider-issued strings; this only guards
/// against characters that would break query-string parsing.
fn urlencoding_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
