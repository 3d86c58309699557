//! Core rate limiter implementation.

use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::key::ClientKey;
use super::window::RateWindow;
use crate::config::RateLimitingConfig;

/// Outcome of accounting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is within the client's quota
    Allow,
    /// The request exceeded the client's quota and must not be served
    Reject,
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// A decision together with the quota state it was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub decision: Decision,
    /// Requests admitted per window
    pub limit: u64,
    /// Requests left in the current window
    pub remaining: u64,
    /// Time until the current window resets
    pub reset_after: Duration,
}

/// Configuration for a fixed-window limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests allowed in one window; 0 disables limiting
    pub max_requests: u64,
    /// Length of one window
    pub window: Duration,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self::from(&RateLimitingConfig::default())
    }
}

impl From<&RateLimitingConfig> for LimitConfig {
    fn from(config: &RateLimitingConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window(),
        }
    }
}

/// Fixed-window rate limiter keyed by client identity.
///
/// Windows live in a sharded map. Every accounting step runs while holding
/// the key's entry lock, so concurrent requests from one client are counted
/// exactly once each.
pub struct RateLimiter<C: Clock = SystemClock> {
    /// Windows indexed by client key
    windows: DashMap<ClientKey, RateWindow>,
    limit: LimitConfig,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Create a new rate limiter on the system clock.
    pub fn new(limit: LimitConfig) -> Self {
        Self::with_clock(limit, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a new rate limiter reading time from `clock`.
    pub fn with_clock(limit: LimitConfig, clock: C) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            clock,
        }
    }

    /// The limit this limiter enforces.
    pub fn limit(&self) -> LimitConfig {
        self.limit
    }

    /// Whether requests are being limited at all.
    pub fn is_enabled(&self) -> bool {
        self.limit.max_requests > 0
    }

    /// Count one request for `key` and decide whether it may proceed.
    pub fn check_and_record(&self, key: &ClientKey) -> Decision {
        self.check_and_record_status(key).decision
    }

    /// Count one request for `key` and report the resulting quota state.
    pub fn check_and_record_status(&self, key: &ClientKey) -> RateLimitStatus {
        let LimitConfig {
            max_requests,
            window,
        } = self.limit;

        if !self.is_enabled() {
            return RateLimitStatus {
                decision: Decision::Allow,
                limit: 0,
                remaining: 0,
                reset_after: Duration::ZERO,
            };
        }

        let now = self.clock.now();

        let (count, reset_after) = {
            let mut entry = self.windows.entry(key.clone()).or_insert_with(|| {
                debug!(key = %key, "Opening rate limit window");
                RateWindow::new(now)
            });
            let count = entry.increment(now, window);
            (count, entry.duration_until_reset(now, window))
        };

        trace!(key = %key, count, limit = max_requests, "Recorded request");

        let decision = if count > max_requests {
            debug!(key = %key, count, "Rate limit exceeded");
            Decision::Reject
        } else {
            Decision::Allow
        };

        RateLimitStatus {
            decision,
            limit: max_requests,
            remaining: max_requests.saturating_sub(count),
            reset_after,
        }
    }

    /// Requests counted for `key` in its live window, without recording one.
    ///
    /// Returns `None` if no window exists for the key.
    pub fn current_count(&self, key: &ClientKey) -> Option<u64> {
        let now = self.clock.now();
        self.windows
            .get(key)
            .map(|w| w.current_count(now, self.limit.window))
    }

    /// Drop every window whose period has elapsed.
    ///
    /// Returns how many windows were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let window = self.limit.window;
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_expired(now, window));
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!(removed, remaining = self.windows.len(), "Swept expired windows");
        }
        removed
    }

    /// Clear all windows.
    pub fn clear(&self) {
        self.windows.clear();
    }

    /// Get the number of tracked windows.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter<SystemClock> {
    fn default() -> Self {
        Self::new(LimitConfig::default())
    }
}

impl<C: Clock> RateLimiterBackend for RateLimiter<C> {
    fn record(&self, key: &ClientKey) -> RateLimitStatus {
        self.check_and_record_status(key)
    }

    fn sweep(&self) -> usize {
        self.sweep_expired()
    }
}
