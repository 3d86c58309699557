//! Authentication gate for the protected routes.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use thiserror::Error;
use tracing::debug;

use super::error::ApiError;
use super::state::AppState;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "jwt";

/// The authenticated caller of a protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    /// The credential the caller presented
    pub token: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization required")]
    MissingCredentials,
    #[error("Invalid or expired token")]
    InvalidToken,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

/// Decides who, if anyone, is making a request.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError>;
}

/// Accepts a fixed set of tokens, presented either as a bearer token or in
/// the session cookie.
pub struct StaticTokenAuthenticator {
    tokens: HashSet<String>,
}

impl StaticTokenAuthenticator {
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let token = presented_token(headers).ok_or(AuthError::MissingCredentials)?;
        if !self.tokens.contains(token) {
            return Err(AuthError::InvalidToken);
        }
        Ok(Principal {
            subject: "static-token".to_string(),
            token: token.to_string(),
        })
    }
}

/// The token from `Authorization: Bearer ...`, or failing that the session
/// cookie.
pub fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}

/// Middleware that rejects unauthenticated requests and stores the
/// [`Principal`] for downstream handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = match state.authenticator.authenticate(request.headers()).await {
        Ok(principal) => principal,
        Err(err) => {
            debug!(path = %request.uri().path(), error = %err, "Rejected unauthenticated request");
            return Err(err.into());
        }
    };

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AuthError::MissingCredentials.into())
    }
}

/// An authenticator that admits nobody. Useful when no tokens are configured.
pub struct DenyAll;

#[async_trait]
impl Authenticator for DenyAll {
    async fn authenticate(&self, _headers: &HeaderMap) -> Result<Principal, AuthError> {
        Err(AuthError::MissingCredentials)
    }
}

/// Build the authenticator for a set of configured tokens.
pub fn from_tokens(tokens: &[String]) -> Arc<dyn Authenticator> {
    if tokens.iter().all(|t| t.is_empty()) {
        Arc::new(DenyAll)
    } else {
        Arc::new(StaticTokenAuthenticator::new(tokens.iter().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_bearer_token_preferred() {
        let h = headers(&[("authorization", "Bearer abc"), ("cookie", "jwt=def")]);
        assert_eq!(presented_token(&h), Some("abc"));
    }

    #[test]
    fn test_cookie_token() {
        let h = headers(&[("cookie", "theme=dark; jwt=def; lang=en")]);
        assert_eq!(presented_token(&h), Some("def"));

        let h = headers(&[("cookie", "jwt=")]);
        assert_eq!(presented_token(&h), None);
    }

    #[tokio::test]
    async fn test_static_token_authenticator() {
        let auth = StaticTokenAuthenticator::new(["secret"]);

        let principal = auth
            .authenticate(&headers(&[("authorization", "Bearer secret")]))
            .await
            .unwrap();
        assert_eq!(principal.token, "secret");

        let err = auth
            .authenticate(&headers(&[("authorization", "Bearer wrong")]))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidToken);

        let err = auth.authenticate(&HeaderMap::new()).await.unwrap_err();
        assert_eq!(err, AuthError::MissingCredentials);
    }

    #[tokio::test]
    async fn test_no_tokens_denies_everyone() {
        let auth = from_tokens(&[]);
        let result = auth
            .authenticate(&headers(&[("authorization", "Bearer anything")]))
            .await;
        assert!(result.is_err());
    }
}
