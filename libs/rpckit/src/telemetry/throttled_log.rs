//! Lock-free log rate limiting.
//!
//! Decides whether a repeated warning may be emitted now; it never logs by
//! itself. Used by the registry to keep session-loss storms readable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Allows at most one log line per interval across all threads.
///
/// ```
/// use std::time::Duration;
/// use rpckit::telemetry::ThrottledLog;
///
/// let throttle = ThrottledLog::new(Duration::from_secs(10));
/// if throttle.should_log() {
///     tracing::warn!("store session lost");
/// }
/// ```
#[derive(Debug)]
pub struct ThrottledLog {
    start: Instant,
    next_log_ms: AtomicU64,
    throttle_ms: u64,
    suppressed: AtomicU64,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl ThrottledLog {
    #[must_use]
    pub fn new(throttle: Duration) -> Self {
        Self {
            start: Instant::now(),
            next_log_ms: AtomicU64::new(0),
            throttle_ms: millis(throttle),
            suppressed: AtomicU64::new(0),
        }
    }

    /// `true` for exactly one caller per interval.
    pub fn should_log(&self) -> bool {
        let now_ms = millis(self.start.elapsed());
        let next = self.next_log_ms.load(Ordering::Relaxed);

        if now_ms < next {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let allowed = self
            .next_log_ms
            .compare_exchange(
                next,
                now_ms.saturating_add(self.throttle_ms),
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok();
        if !allowed {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
        }
        allowed
    }

    /// Number of suppressed lines since the last call; resets the counter.
    pub fn take_suppressed(&self) -> u64 {
        self.suppressed.swap(0, Ordering::Relaxed)
    }
}
