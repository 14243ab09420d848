//! mailvault-provider-json - JSON HTTP API remote adapter (§4.4)
//!
//! Implements [`mailvault_core::ports::RemoteAdapter`] for mail providers
//! that expose a paginated JSON HTTP API with a monotonic history cursor
//! (the "JSON API variant" in the remote-adapter contract, as opposed to
//! `mailvault-provider-mailbox`'s IMAP-like variant). Wire parsing lives in
//! [`wire`]; request dispatch, retries, and rate limiting are all delegated
//! to `mailvault-transport::RequestEngine`.

pub mod adapter;
pub mod wire;

pub use adapter::JsonProviderAdapter;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mailvault_core::domain::{Cursor, RemoteMessageId};
    use mailvault_core::ports::{RemoteAdapter, SystemClock, TestClock};
    use mailvault_transport::{RateLimiter, RequestEngine};
    use reqwest::Client;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn adapter_against(server: &MockServer) -> JsonProviderAdapter {
        let clock = Arc::new(SystemClock);
        let limiter = Arc::new(RateLimiter::new(100.0, 100.0, clock.clone()));
        let engine = Arc::new(RequestEngine::new(Client::new(), server.uri(), limiter, clock));
        JsonProviderAdapter::new(engine, "test-token", 4)
    }

    #[tokio::test]
    async fn profile_maps_wire_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "emailAddress": "person@example.com",
                "displayName": "A Person",
            })))
            .mount(&server)
            .await;

        let adapter = adapter_against(&server).await;
        let profile = adapter.profile().await.unwrap();
        assert_eq!(profile.address, "person@example.com");
        assert_eq!(profile.display_name.as_deref(), Some("A Person"));
    }

    #[tokio::test]
    async fn list_messages_follows_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "m1", "threadId": "t1", "labelIds": ["INBOX"]}],
                "nextPageToken": "p2",
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/messages"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "m2", "threadId": "t1", "labelIds": []}],
            })))
            .mount(&server)
            .await;

        let adapter = adapter_against(&server).await;
        let first = adapter.list_messages(None).await.unwrap();
        assert_eq!(first.items[0].id.as_str(), "m1");
        let second = adapter.list_messages(first.next_page_token.as_deref()).await.unwrap();
        assert_eq!(second.items[0].id.as_str(), "m2");
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn get_message_raw_decodes_unpadded_base64url() {
        let server = MockServer::start().await;
        // "hello" base64url-encoded without padding.
        Mock::given(method("GET"))
            .and(path("/messages/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "m1",
                "raw": "aGVsbG8",
            })))
            .mount(&server)
            .await;

        let adapter = adapter_against(&server).await;
        let id = RemoteMessageId::new("m1").unwrap();
        let raw = adapter.get_message_raw(&id).await.unwrap();
        assert_eq!(raw, b"hello");
    }

    #[tokio::test]
    async fn get_messages_raw_batch_skips_individual_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "ok", "raw": "b2s"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/messages/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let adapter = adapter_against(&server).await;
        let ids = vec![RemoteMessageId::new("ok").unwrap(), RemoteMessageId::new("missing").unwrap()];
        let results = adapter.get_messages_raw_batch(&ids).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.as_str(), "ok");
    }

    #[tokio::test]
    async fn list_history_reports_expired_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "historyId": "99",
                "historyIdTooOld": true,
            })))
            .mount(&server)
            .await;

        let adapter = adapter_against(&server).await;
        let err = adapter.list_history(Cursor::new(1), None).await.unwrap_err();
        assert!(matches!(err, mailvault_core::ports::RemoteError::HistoryExpired));
    }

    #[tokio::test]
    async fn list_history_flattens_added_and_deleted_events() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "historyId": "150",
                "history": [{
                    "messagesAdded": [{"message": {"id": "m1", "threadId": "t1", "labelIds": ["INBOX"]}}],
                    "messagesDeleted": [{"message": {"id": "m2", "threadId": "t1", "labelIds": []}}],
                }],
            })))
            .mount(&server)
            .await;

        let adapter = adapter_against(&server).await;
        let page = adapter.list_history(Cursor::new(100), None).await.unwrap();
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.latest_cursor, Cursor::new(150));
    }
}
