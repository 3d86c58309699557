//! Fixed counting window for a single client key.

use std::time::{Duration, Instant};
use tracing::debug;

/// The current counting interval for one client key.
///
/// A window is not synchronized on its own; the limiter holds it behind the
/// map shard lock so that reset, increment and compare happen as one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// When the current window started
    window_start: Instant,
    /// Requests observed since `window_start`
    count: u64,
}

impl RateWindow {
    /// Open an empty window starting at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    /// Record one request and return the count including it.
    ///
    /// An expired window is reset before counting.
    pub fn increment(&mut self, now: Instant, length: Duration) -> u64 {
        self.maybe_reset(now, length);
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Requests counted in the window that is live at `now`.
    pub fn current_count(&self, now: Instant, length: Duration) -> u64 {
        if self.is_expired(now, length) {
            0
        } else {
            self.count
        }
    }

    /// When the current window started.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Whether the window has run its course at `now`.
    ///
    /// A clock reading earlier than the window start counts as expired, so the
    /// window is rebuilt rather than trusted.
    pub fn is_expired(&self, now: Instant, length: Duration) -> bool {
        match now.checked_duration_since(self.window_start) {
            Some(elapsed) => elapsed >= length,
            None => true,
        }
    }

    /// Time left until the window resets.
    pub fn duration_until_reset(&self, now: Instant, length: Duration) -> Duration {
        match now.checked_duration_since(self.window_start) {
            Some(elapsed) => length.saturating_sub(elapsed),
            None => length,
        }
    }

    fn maybe_reset(&mut self, now: Instant, length: Duration) {
        if now < self.window_start {
            debug!("Clock moved behind window start, resetting window");
        }
        if self.is_expired(now, length) {
            self.window_start = now;
            self.count = 0;
        }
    }
}
