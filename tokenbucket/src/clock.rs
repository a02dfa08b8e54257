//! Time sources consumed by the buckets.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clocksource::precise::Instant;

/// A source of nanosecond timestamps.
///
/// Readings must be monotonically nondecreasing across calls from any thread.
/// Buckets sample the clock once per operation, before entering the atomic
/// section.
pub trait Clock: Send + Sync {
    /// Return the current reading, in nanoseconds.
    fn now_nanos(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_nanos(&self) -> u64 {
        (**self).now_nanos()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_nanos(&self) -> u64 {
        (**self).now_nanos()
    }
}

/// A clock which reads the system monotonic clock, reported relative to the
/// moment the clock was created.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos()
    }
}

/// A manually advanceable clock.
///
/// Useful for tests and doc examples which need deterministic time. The clock
/// starts at zero and only moves when told to, so refill behavior can be
/// checked exactly.
///
/// # Examples
///
/// ```
/// use tokenbucket::{Clock, ManualClock};
/// use core::time::Duration;
///
/// let clock = ManualClock::default();
/// assert_eq!(clock.now_nanos(), 0);
///
/// clock.advance(Duration::from_millis(500));
/// assert_eq!(clock.now_nanos(), 500_000_000);
/// ```
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_nanos: u64) -> Self {
        Self {
            now: AtomicU64::new(now_nanos),
        }
    }

    /// Move the clock forward by the provided duration.
    pub fn advance(&self, duration: core::time::Duration) {
        self.now
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}
