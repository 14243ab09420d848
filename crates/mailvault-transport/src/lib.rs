//! mailvault-transport - rate limiting and retrying request engine
//!
//! Provider-agnostic transport plumbing shared by every `RemoteAdapter`
//! implementation:
//!
//! - [`rate_limit`] - a single shared token-bucket rate limiter per source (§4.2)
//! - [`request`] - a retrying HTTP request engine built on that limiter (§4.3)
//!
//! Neither module knows about any specific provider's wire format; that
//! lives in `mailvault-provider-json` and `mailvault-provider-mailbox`.

pub mod rate_limit;
pub mod request;

pub use rate_limit::RateLimiter;
pub use request::RequestEngine;
