//! Monotonic time source (Component I).
//!
//! A thin wrapper over [`std::time::Instant`] so the rest of the crate reads
//! "when did this hold start" without talking to `std::time` directly —
//! this is the only support component this crate needs; wall-clock time
//! never crosses the public API.

use std::time::{Duration, Instant};

/// A single point in monotonic time, used to measure how long a lock has
/// been held for the §7 `STALE_LOCK` warning.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    started_at: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::now()
    }
}

impl Clock {
    /// Capture the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    /// Time elapsed since this clock was captured.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether more than `threshold` has elapsed since capture.
    #[must_use]
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.elapsed() >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn freshly_captured_clock_is_not_stale() {
        let clock = Clock::now();
        assert!(!clock.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn clock_reports_staleness_after_threshold() {
        let clock = Clock::now();
        sleep(Duration::from_millis(10));
        assert!(clock.is_stale(Duration::from_millis(1)));
    }
}
