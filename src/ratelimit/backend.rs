//! Rate limiter trait used by the HTTP layer.

use super::key::ClientKey;
use super::limiter::RateLimitStatus;

/// Trait for rate limiter implementations.
///
/// The HTTP middleware and the sweeper only see this trait, so the limiter's
/// clock type does not leak into application state.
pub trait RateLimiterBackend: Send + Sync {
    /// Count one request for `key` and report the decision.
    fn record(&self, key: &ClientKey) -> RateLimitStatus;

    /// Drop expired accounting state, returning how many entries went away.
    fn sweep(&self) -> usize;
}
