//! Adaptive token-bucket rate limiter
//!
//! A single shared bucket per mail account (§4.2): every request drawn
//! against one source goes through the same [`RateLimiter`], not a
//! per-endpoint table, because the provider's quota is account-wide.
//!
//! `acquire(cost)` waits out any active throttle window, refills tokens by
//! elapsed wall-clock time, then either deducts `cost` or sleeps until
//! enough tokens accumulate and retries. `throttle(duration)` is called by
//! the request engine on a 429/403 response: it widens the throttle window,
//! drains the bucket, and halves the refill rate until time catches back up
//! past the window, at which point the base rate is restored.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mailvault_core::ports::Clock;
use tracing::{debug, trace};

/// Floor on the wait computed for a deficit, so a near-zero refill rate
/// never produces a busy-loop of zero-length sleeps.
const MIN_WAIT: Duration = Duration::from_millis(10);

struct State {
    tokens: f64,
    last_refill: DateTime<Utc>,
    refill_rate: f64,
    throttled_until: Option<DateTime<Utc>>,
}

/// A token bucket shared by every request issued against one mail source.
pub struct RateLimiter {
    clock: std::sync::Arc<dyn Clock>,
    capacity: f64,
    base_refill_rate: f64,
    state: Mutex<State>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("rate limiter mutex poisoned");
        f.debug_struct("RateLimiter")
            .field("capacity", &self.capacity)
            .field("base_refill_rate", &self.base_refill_rate)
            .field("tokens", &state.tokens)
            .field("refill_rate", &state.refill_rate)
            .field("throttled_until", &state.throttled_until)
            .finish()
    }
}

impl RateLimiter {
    /// Creates a limiter starting full, at `capacity` tokens and refilling
    /// at `refill_rate` tokens/second.
    pub fn new(capacity: f64, refill_rate: f64, clock: std::sync::Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            capacity,
            base_refill_rate: refill_rate,
            state: Mutex::new(State {
                tokens: capacity,
                last_refill: now,
                refill_rate,
                throttled_until: None,
            }),
        }
    }

    /// Refills `state` up to `now`, restoring the base refill rate once
    /// `now` has passed any active throttle window.
    fn refill(&self, state: &mut State, now: DateTime<Utc>) {
        if let Some(until) = state.throttled_until {
            if now >= until {
                state.refill_rate = self.base_refill_rate;
                state.throttled_until = None;
            }
        }
        let elapsed = (now - state.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * state.refill_rate).min(self.capacity);
            state.last_refill = now;
        }
    }

    /// Returns how long to wait before `cost` tokens could be acquired, or
    /// `None` if they are available right now. Deducts the cost as a side
    /// effect when it returns `None` — callers loop on `Some`.
    fn try_acquire_or_wait(&self, cost: f64) -> Option<Duration> {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");

        if let Some(until) = state.throttled_until {
            if now < until {
                let wait = (until - now).to_std().unwrap_or(Duration::ZERO);
                return Some(wait.max(MIN_WAIT));
            }
        }

        self.refill(&mut state, now);

        if state.tokens >= cost {
            state.tokens -= cost;
            return None;
        }

        let deficit = cost - state.tokens;
        let wait_secs = if state.refill_rate > 0.0 {
            deficit / state.refill_rate
        } else {
            f64::MAX
        };
        Some(Duration::from_secs_f64(wait_secs).max(MIN_WAIT))
    }

    /// Waits for `cost` tokens, sleeping (and retrying) as needed.
    pub async fn acquire(&self, cost: f64) {
        loop {
            match self.try_acquire_or_wait(cost) {
                None => return,
                Some(wait) => {
                    trace!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Widens the throttle window to at least `now + duration`, drains the
    /// bucket, and halves the refill rate until the window passes.
    pub fn throttle(&self, duration: Duration) {
        let now = self.clock.now();
        let candidate = now + chrono::Duration::from_std(duration).unwrap_or_default();
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        let until = match state.throttled_until {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        };
        debug!(until = %until, "rate limiter throttled");
        state.throttled_until = Some(until);
        state.last_refill = until;
        state.tokens = 0.0;
        state.refill_rate = self.base_refill_rate / 2.0;
    }

    /// Returns the tokens currently available, for diagnostics/metrics.
    pub fn available_tokens(&self) -> f64 {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        self.refill(&mut state, now);
        state.tokens
    }

    /// Returns true if the bucket is inside an active throttle window.
    pub fn is_throttled(&self) -> bool {
        let now = self.clock.now();
        let state = self.state.lock().expect("rate limiter mutex poisoned");
        state.throttled_until.is_some_and(|until| now < until)
    }
}

/// Parses an HTTP `Retry-After` header value as either integer seconds or an
/// HTTP-date, falling back to `default` if neither parses (§4.3).
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = chrono::Utc::now();
        let target = date.with_timezone(&chrono::Utc);
        if target > now {
            let diff = target - now;
            if let Some(secs) = diff.num_seconds().try_into().ok().filter(|&s: &u64| s <= 3600) {
                return Duration::from_secs(secs);
            }
        }
    }

    tracing::warn!(value, "could not parse Retry-After header, using default");
    default
}
