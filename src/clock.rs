//! Monotonic time source for the failsafe watchdog and loop pacing.

use std::time::Instant;

/// Monotonic "now" provider
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The process-wide monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
