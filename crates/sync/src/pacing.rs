//! Adaptive rate-limit pacing.
//!
//! The branch poller spends code-host requests on every cycle, against a
//! hard hourly quota shared with nothing else we control. Instead of a fixed
//! timer, each cycle computes how long to wait so that the *safe* remainder
//! of the quota is spread evenly across the rest of the window.

use drydock_github::RateLimit;
use std::time::Duration;

/// Never spend the last fifth of the quota.
const BUFFER_RATIO: f64 = 0.2;

/// Computes the delay before the next poll cycle.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Floor for the computed interval. Larger in production (no point
    /// hammering the host when the quota is plentiful), smaller in
    /// interactive and test environments.
    pub min_interval: Duration,
}

impl Pacing {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    /// Interval until the next cycle, given the current window and `now` as
    /// a unix timestamp.
    ///
    /// `max(min_interval, time_left / (remaining - 20% of limit))`, clamped
    /// to the floor whenever the buffer is exhausted or the window has
    /// already reset. Never divides by zero, never returns a negative
    /// duration.
    pub fn interval(&self, window: &RateLimit, now: u64) -> Duration {
        let buffer = f64::from(window.limit) * BUFFER_RATIO;
        let safe_remaining = f64::from(window.remaining) - buffer;
        if safe_remaining <= 0.0 {
            return self.min_interval;
        }
        let time_left = window.resets_at.saturating_sub(now) as f64;
        Duration::from_secs_f64(time_left / safe_remaining).max(self.min_interval)
    }
}
