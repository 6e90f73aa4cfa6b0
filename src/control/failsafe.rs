//! # Failsafe Watchdog
//!
//! Declares the radio link lost when no valid frame has been seen within the
//! timeout. The watchdog is a pure time comparison evaluated by the control
//! loop once per tick; it owns the connection status and nothing else writes it.

use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Link recency tracker
#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    last_frame: Option<Instant>,
    connected: bool,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_frame: None,
            connected: false,
        }
    }

    /// Record the arrival of a valid frame at `now`.
    pub fn feed(&mut self, now: Instant) {
        self.last_frame = Some(now);
    }

    /// Re-evaluate the link at `now` and return whether it is up.
    ///
    /// The link is up while `now - last_frame < timeout`, and down before
    /// the first frame ever arrives. Transitions are logged once.
    pub fn evaluate(&mut self, now: Instant) -> bool {
        let connected = match self.last_frame {
            Some(last) => now.saturating_duration_since(last) < self.timeout,
            None => false,
        };

        if connected != self.connected {
            if connected {
                info!("RC link acquired");
            } else {
                warn!(
                    "RC link lost: no valid frame for {}ms, forcing neutral",
                    self.timeout.as_millis()
                );
            }
            self.connected = connected;
        }

        connected
    }

    /// Status as of the last [`Watchdog::evaluate`] call
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Time since the last valid frame, if one was ever seen
    pub fn since_last_frame(&self, now: Instant) -> Option<Duration> {
        self.last_frame.map(|last| now.saturating_duration_since(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn test_disconnected_before_first_frame() {
        let mut watchdog = Watchdog::new(TIMEOUT);
        let now = Instant::now();

        assert!(!watchdog.evaluate(now));
        assert!(!watchdog.is_connected());
        assert_eq!(watchdog.since_last_frame(now), None);
    }

    #[test]
    fn test_connected_after_frame() {
        let mut watchdog = Watchdog::new(TIMEOUT);
        let start = Instant::now();

        watchdog.feed(start);
        assert!(watchdog.evaluate(start));
        assert!(watchdog.evaluate(start + Duration::from_millis(499)));
    }

    #[test]
    fn test_times_out_at_exactly_timeout() {
        let mut watchdog = Watchdog::new(TIMEOUT);
        let start = Instant::now();

        watchdog.feed(start);
        assert!(!watchdog.evaluate(start + TIMEOUT));
        assert!(!watchdog.is_connected());
    }

    #[test]
    fn test_recovers_on_new_frame() {
        let mut watchdog = Watchdog::new(TIMEOUT);
        let start = Instant::now();

        watchdog.feed(start);
        let later = start + Duration::from_secs(2);
        assert!(!watchdog.evaluate(later));

        watchdog.feed(later);
        assert!(watchdog.evaluate(later + Duration::from_millis(10)));
        assert_eq!(
            watchdog.since_last_frame(later + Duration::from_millis(10)),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_clock_before_last_frame_counts_as_fresh() {
        let mut watchdog = Watchdog::new(TIMEOUT);
        let start = Instant::now() + Duration::from_secs(1);

        watchdog.feed(start);
        assert!(watchdog.evaluate(start - Duration::from_millis(5)));
    }
}
