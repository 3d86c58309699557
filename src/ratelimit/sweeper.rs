//! Background eviction of expired windows.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::RateLimiterBackend;

/// Handle to a running sweeper task.
pub struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a task that sweeps `limiter` every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(limiter: Arc<dyn RateLimiterBackend>, interval: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        debug!(removed, "Rate limit sweep finished");
                    }
                    _ = stop.changed() => break,
                }
            }

            info!("Rate limit sweeper stopped");
        });

        info!(interval_secs = interval.as_secs(), "Rate limit sweeper started");
        Self { shutdown, handle }
    }

    /// Stop the sweeper and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ClientKey, LimitConfig, ManualClock, RateLimiter};

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_expired_windows() {
        let clock = ManualClock::new();
        let limiter = Arc::new(RateLimiter::with_clock(
            LimitConfig {
                max_requests: 10,
                window: Duration::from_secs(60),
            },
            clock.clone(),
        ));
        limiter.check_and_record(&ClientKey::from("client"));
        assert_eq!(limiter.window_count(), 1);

        let sweeper = Sweeper::spawn(limiter.clone(), Duration::from_secs(30));

        clock.advance(Duration::from_secs(61));
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        assert_eq!(limiter.window_count(), 0);
        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_request() {
        let limiter: Arc<RateLimiter> = Arc::new(RateLimiter::default());
        let sweeper = Sweeper::spawn(limiter, Duration::from_secs(3600));
        tokio::time::timeout(Duration::from_secs(1), sweeper.stop())
            .await
            .expect("sweeper did not stop");
    }
}
