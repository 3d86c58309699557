//! Shared application state.

use std::sync::Arc;

use super::accounts::AccountService;
use super::auth::Authenticator;
use super::rate_limit::KeyExtractor;
use crate::ratelimit::RateLimiterBackend;

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<dyn RateLimiterBackend>,
    pub authenticator: Arc<dyn Authenticator>,
    pub accounts: Arc<dyn AccountService>,
    pub key_extractor: KeyExtractor,
}

impl AppState {
    /// State with the default key extractor, which keys clients by peer address.
    pub fn new(
        limiter: Arc<dyn RateLimiterBackend>,
        authenticator: Arc<dyn Authenticator>,
        accounts: Arc<dyn AccountService>,
    ) -> Self {
        Self {
            limiter,
            authenticator,
            accounts,
            key_extractor: KeyExtractor::default(),
        }
    }

    /// Replace how client keys are derived.
    pub fn with_key_extractor(mut self, key_extractor: KeyExtractor) -> Self {
        self.key_extractor = key_extractor;
        self
    }
}
