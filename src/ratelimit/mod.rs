//! Rate limiting logic and state management.

mod backend;
mod clock;
mod key;
mod limiter;
mod sweeper;
mod window;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{ClientKey, FALLBACK_KEY};
pub use limiter::{Decision, LimitConfig, RateLimitStatus, RateLimiter};
pub use sweeper::Sweeper;
pub use window::RateWindow;
