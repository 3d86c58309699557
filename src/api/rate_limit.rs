//! Per-client rate limiting middleware.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use super::state::AppState;
use crate::ratelimit::{ClientKey, Decision, RateLimitStatus};

/// Message sent with every 429 response.
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Derives the client key for a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyExtractor {
    /// Use the left-most `X-Forwarded-For` address when present
    pub trust_forwarded_for: bool,
}

impl KeyExtractor {
    /// Create an extractor, trusting `X-Forwarded-For` only when asked to.
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            trust_forwarded_for,
        }
    }

    /// Resolve the key from the headers and peer address, falling back to the
    /// catch-all key when neither identifies the client.
    pub fn extract(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientKey {
        if self.trust_forwarded_for {
            if let Some(ip) = forwarded_for(headers) {
                return ClientKey::from(ip);
            }
        }

        peer.map(|addr| ClientKey::from(addr.ip()))
            .unwrap_or_else(ClientKey::fallback)
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(X_FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Account every request against the limiter before it reaches a handler.
pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = state.key_extractor.extract(request.headers(), peer);
    let status = state.limiter.record(&key);

    match status.decision {
        Decision::Allow => {
            let mut response = next.run(request).await;
            apply_headers(response.headers_mut(), &status);
            response
        }
        Decision::Reject => {
            warn!(key = %key, path = %request.uri().path(), "Request rejected by rate limiter");
            too_many_requests(&status)
        }
    }
}

/// The 429 response for a rejected request.
pub fn too_many_requests(status: &RateLimitStatus) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "message": RATE_LIMIT_MESSAGE })),
    )
        .into_response();
    let headers = response.headers_mut();
    apply_headers(headers, status);
    headers.insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from(reset_secs(status)),
    );
    response
}

fn apply_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    // Disabled limiter
    if status.limit == 0 {
        return;
    }
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(status.limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(status.remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset_secs(status)));
}

/// Seconds until reset, rounded up.
fn reset_secs(status: &RateLimitStatus) -> u64 {
    let reset = status.reset_after;
    reset.as_secs() + u64::from(reset.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status(decision: Decision, reset_after: Duration) -> RateLimitStatus {
        RateLimitStatus {
            decision,
            limit: 100,
            remaining: 0,
            reset_after,
        }
    }

    #[test]
    fn test_peer_address_is_default_key() {
        let extractor = KeyExtractor::default();
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("9.9.9.9"));

        let key = extractor.extract(&headers, Some("1.2.3.4:5555".parse().unwrap()));
        assert_eq!(key.as_str(), "1.2.3.4");
    }

    #[test]
    fn test_forwarded_for_when_trusted() {
        let extractor = KeyExtractor::new(true);
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static(" 9.9.9.9 , 10.0.0.1"));

        let key = extractor.extract(&headers, Some("1.2.3.4:5555".parse().unwrap()));
        assert_eq!(key.as_str(), "9.9.9.9");

        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("garbage"));
        let key = extractor.extract(&headers, Some("1.2.3.4:5555".parse().unwrap()));
        assert_eq!(key.as_str(), "1.2.3.4");
    }

    #[test]
    fn test_unknown_client_uses_fallback() {
        let key = KeyExtractor::new(true).extract(&HeaderMap::new(), None);
        assert!(key.is_fallback());
    }

    #[test]
    fn test_too_many_requests_response() {
        let response = too_many_requests(&status(Decision::Reject, Duration::from_millis(1500)));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "2");
        assert_eq!(response.headers()["ratelimit-limit"], "100");
        assert_eq!(response.headers()["ratelimit-remaining"], "0");
    }

    #[test]
    fn test_disabled_limiter_sends_no_headers() {
        let mut headers = HeaderMap::new();
        let disabled = RateLimitStatus {
            decision: Decision::Allow,
            limit: 0,
            remaining: 0,
            reset_after: Duration::ZERO,
        };
        apply_headers(&mut headers, &disabled);
        assert!(headers.is_empty());
    }
}
