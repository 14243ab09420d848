//! Retrying HTTP request engine
//!
//! Issues one logical request at a time against a mail provider's JSON HTTP
//! API: acquire a rate-limit token, send, classify the response, and either
//! return the body or retry with jittered exponential backoff (§4.3). Every
//! status outcome is translated directly into [`RemoteError`] so provider
//! adapters never see raw `reqwest` types.

use std::sync::Arc;
use std::time::Duration;

use mailvault_core::ports::{Clock, RemoteError};
use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::rate_limit::{parse_retry_after, RateLimiter};

/// Maximum number of retry attempts before giving up (§4.3).
pub const MAX_RETRIES: u32 = 12;

const DEFAULT_429_RETRY_AFTER: Duration = Duration::from_secs(30);
const DEFAULT_403_THROTTLE: Duration = Duration::from_secs(60);
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// 403 response bodies matching one of these substrings are a rate-limit in
/// disguise (providers that reuse the permission-denied status code for
/// quota exhaustion); anything else is a genuine permission failure.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "rateLimitExceeded",
    "RATE_LIMIT_EXCEEDED",
    "userRateLimitExceeded",
    "Quota exceeded",
];

/// Token cost charged against the rate limiter per logical operation
/// (§4.2). Unrecognized operation names cost 1, same as cheap metadata
/// calls.
fn op_cost(op: &str) -> f64 {
    match op {
        "list_messages" | "get_message_raw" => 5.0,
        "list_history" => 2.0,
        "trash" => 5.0,
        "delete" => 10.0,
        "batch_delete" => 50.0,
        _ => 1.0,
    }
}

/// Issues retrying, rate-limited requests against one mail provider.
pub struct RequestEngine {
    http: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl RequestEngine {
    /// Creates an engine targeting `base_url`, drawing from `limiter` before
    /// every attempt.
    pub fn new(http: Client, base_url: impl Into<String>, limiter: Arc<RateLimiter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            limiter,
            clock,
            max_retries: MAX_RETRIES,
        }
    }

    /// Overrides the retry ceiling, for tests that want to exhaust it quickly.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Performs one logical request, retrying transient failures.
    ///
    /// `path` is joined to the engine's base URL; `body`, if present, is
    /// sent as the JSON request body.
    pub async fn request(
        &self,
        op: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
        access_token: &str,
    ) -> Result<Vec<u8>, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            self.limiter.acquire(op_cost(op)).await;

            let mut builder = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(access_token);
            if let Some(ref json) = body {
                builder = builder.json(json);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| RemoteError::Network(e.to_string()))?;
            let status = response.status();

            if status.is_success() {
                if attempt > 0 {
                    info!(op, attempt, "request succeeded after retry");
                }
                return response
                    .bytes()
                    .await
                    .map(|b| b.to_vec())
                    .map_err(|e| RemoteError::Network(e.to_string()));
            }

            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .map(|v| parse_retry_after(v, DEFAULT_429_RETRY_AFTER))
                        .unwrap_or(DEFAULT_429_RETRY_AFTER);
                    self.limiter.throttle(retry_after);
                    if attempt >= self.max_retries {
                        return Err(RemoteError::RateLimited {
                            retry_after_secs: Some(retry_after.as_secs()),
                        });
                    }
                    warn!(op, attempt, retry_after_secs = retry_after.as_secs(), "429, throttling");
                    attempt += 1;
                    tokio::time::sleep(retry_after).await;
                }
                StatusCode::FORBIDDEN => {
                    let text = response.text().await.unwrap_or_default();
                    if RATE_LIMIT_MARKERS.iter().any(|marker| text.contains(marker)) {
                        self.limiter.throttle(DEFAULT_403_THROTTLE);
                        if attempt >= self.max_retries {
                            return Err(RemoteError::RateLimited {
                                retry_after_secs: Some(DEFAULT_403_THROTTLE.as_secs()),
                            });
                        }
                        warn!(op, attempt, "403 rate-limit-shaped response, throttling");
                        attempt += 1;
                        tokio::time::sleep(DEFAULT_403_THROTTLE).await;
                    } else {
                        return Err(RemoteError::Unauthorized(text));
                    }
                }
                StatusCode::UNAUTHORIZED => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(RemoteError::Unauthorized(text));
                }
                StatusCode::NOT_FOUND => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(RemoteError::NotFound(text));
                }
                StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT => {
                    let text = response.text().await.unwrap_or_default();
                    if attempt >= self.max_retries {
                        return Err(RemoteError::ServerError(text));
                    }
                    let wait = self.backoff(attempt);
                    debug!(op, attempt, status = %status, wait_ms = wait.as_millis() as u64, "server error, retrying");
                    attempt += 1;
                    tokio::time::sleep(wait).await;
                }
                s if s.is_client_error() => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(RemoteError::Other(format!("{status}: {text}")));
                }
                _ => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(RemoteError::ServerError(format!("{status}: {text}")));
                }
            }
        }
    }

    /// Jittered exponential backoff for the retryable-server-error path:
    /// `base * 2^attempt`, clamped to `BACKOFF_MAX`, plus up to 25% jitter so
    /// concurrent callers don't retry in lockstep.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = BACKOFF_BASE.saturating_mul(1u32 << attempt.min(10));
        let capped = exp.min(BACKOFF_MAX);
        let jitter_fraction: f64 = rand::thread_rng().gen_range(0.0..0.25);
        capped.mul_f64(1.0 + jitter_fraction)
    }

    /// Returns the current time via the injected clock, for callers that
    /// need to stamp requests (e.g. audit logging around a call).
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mailvault_core::ports::TestClock;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn engine(base_url: String, max_retries: u32) -> RequestEngine {
        let clock = Arc::new(TestClock::new(chrono::Utc::now()));
        let limiter = Arc::new(RateLimiter::new(100.0, 100.0, clock.clone()));
        RequestEngine::new(Client::new(), base_url, limiter, clock).with_max_retries(max_retries)
    }

    #[tokio::test]
    async fn successful_request_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let engine = engine(server.uri(), 3);
        let body = engine
            .request("get_message", Method::GET, "/messages/1", None, "token")
            .await
            .unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn unauthorized_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine(server.uri(), 3);
        let err = engine
            .request("get_message", Method::GET, "/messages/1", None, "token")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn not_found_is_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let engine = engine(server.uri(), 3);
        let err = engine
            .request("get_message", Method::GET, "/messages/missing", None, "token")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn server_error_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/messages/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let engine = engine(server.uri(), 5);
        let body = engine
            .request("get_message", Method::GET, "/messages/1", None, "token")
            .await
            .unwrap();
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn server_error_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let engine = engine(server.uri(), 1);
        let err = engine
            .request("get_message", Method::GET, "/messages/1", None, "token")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::ServerError(_)));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let engine = engine("http://localhost".to_string(), 12);
        assert!(engine.backoff(0) >= BACKOFF_BASE);
        assert!(engine.backoff(20) <= BACKOFF_MAX.mul_f64(1.25));
    }

    #[test]
    fn op_cost_matches_table() {
        assert_eq!(op_cost("list_messages"), 5.0);
        assert_eq!(op_cost("get_message_raw"), 5.0);
        assert_eq!(op_cost("list_history"), 2.0);
        assert_eq!(op_cost("trash"), 5.0);
        assert_eq!(op_cost("delete"), 10.0);
        assert_eq!(op_cost("batch_delete"), 50.0);
        assert_eq!(op_cost("profile"), 1.0);
        assert_eq!(op_cost("anything_else"), 1.0);
    }
}
