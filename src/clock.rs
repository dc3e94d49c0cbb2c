//! Millisecond clocks.
//!
//! Components that age data (window retention, cache TTL) take a [`Clock`]
//! instead of reading wall time directly, so tests can drive time by hand.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Shared clock returning Unix time in milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Wall clock backed by [`current_timestamp_ms`].
pub fn system_clock() -> Clock {
    Arc::new(current_timestamp_ms)
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn now(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Clock view sharing this instance's time.
    pub fn as_clock(&self) -> Clock {
        let now_ms = self.now_ms.clone();
        Arc::new(move || now_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_view() {
        let manual = ManualClock::new(1_000);
        let clock = manual.as_clock();

        assert_eq!(clock(), 1_000);
        manual.advance(250);
        assert_eq!(clock(), 1_250);
        manual.set(5);
        assert_eq!(clock(), 5);
    }

    #[test]
    fn test_system_clock_is_positive() {
        let clock = system_clock();
        assert!(clock() > 0);
    }
}
