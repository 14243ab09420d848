//! Clock port
//!
//! Every component that reasons about time (the rate limiter's throttle
//! window, the retry engine's backoff schedule, checkpoint timestamps) reads
//! it through this trait instead of calling `Utc::now()` directly, so tests
//! can advance time deterministically instead of sleeping.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// A source of the current time, injectable for deterministic tests.
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually-advanced clock for tests.
#[derive(Debug)]
pub struct TestClock {
    inner: std::sync::Mutex<DateTime<Utc>>,
}

impl TestClock {
    /// Creates a test clock starting at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: std::sync::Mutex::new(start),
        }
    }

    /// Advances the clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut guard = self.inner.lock().expect("test clock mutex poisoned");
        *guard += chrono::Duration::from_std(duration).expect("duration fits in chrono::Duration");
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.inner.lock().expect("test clock mutex poisoned") = at;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock().expect("test clock mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_monotonically() {
        let start = Utc::now();
        let clock = TestClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(30));
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
