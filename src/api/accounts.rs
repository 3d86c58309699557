//! Sign-in, sign-up and sign-out routes.
//!
//! Account rules live behind [`AccountService`]; these handlers only move
//! validated bodies in and map outcomes to HTTP.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::auth::{Principal, SESSION_COOKIE};
use super::error::ApiError;
use super::schema::{Credentials, Registration, SignInBody, SignUpBody, ValidatedJson};
use super::state::AppState;

/// A session issued on sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    /// Cookie lifetime in seconds, if the session should persist
    pub max_age_secs: Option<u64>,
}

/// The public view of a newly created account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("A user with this email already exists")]
    AlreadyExists,
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidCredentials => ApiError::Unauthorized(err.to_string()),
            AccountError::AlreadyExists => ApiError::Conflict(err.to_string()),
            AccountError::Unavailable(msg) => ApiError::Unavailable(msg),
            AccountError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

/// The account controllers: `login`, `create_user`, `logout`.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn login(&self, credentials: Credentials) -> Result<Session, AccountError>;

    async fn create_user(&self, registration: Registration) -> Result<UserProfile, AccountError>;

    async fn logout(&self, principal: &Principal) -> Result<(), AccountError>;
}

/// Stand-in used until a real account backend is wired in.
pub struct UnconfiguredAccounts;

#[async_trait]
impl AccountService for UnconfiguredAccounts {
    async fn login(&self, _credentials: Credentials) -> Result<Session, AccountError> {
        Err(not_configured())
    }

    async fn create_user(&self, _registration: Registration) -> Result<UserProfile, AccountError> {
        Err(not_configured())
    }

    async fn logout(&self, _principal: &Principal) -> Result<(), AccountError> {
        Err(not_configured())
    }
}

fn not_configured() -> AccountError {
    AccountError::Unavailable("Account service is not configured".to_string())
}

pub async fn signin(
    State(state): State<AppState>,
    ValidatedJson(credentials): ValidatedJson<SignInBody>,
) -> Result<Response, ApiError> {
    let email = credentials.email.clone();
    let session = state.accounts.login(credentials).await.map_err(|err| {
        if err == AccountError::InvalidCredentials {
            warn!(email = %email, "Failed sign-in attempt");
        }
        ApiError::from(err)
    })?;

    info!(email = %email, "User signed in");

    let cookie = session_cookie(&session.token, session.max_age_secs)?;
    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "token": session.token })),
    )
        .into_response())
}

pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(registration): ValidatedJson<SignUpBody>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let profile = state.accounts.create_user(registration).await?;
    info!(email = %profile.email, "User created");
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn signout(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Response, ApiError> {
    state.accounts.logout(&principal).await?;
    info!(subject = %principal.subject, "User signed out");

    let cookie = clear_cookie();
    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "message": "Signed out" })),
    )
        .into_response())
}

fn session_cookie(token: &str, max_age_secs: Option<u64>) -> Result<HeaderValue, ApiError> {
    let mut cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict");
    if let Some(max_age) = max_age_secs {
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    HeaderValue::from_str(&cookie)
        .map_err(|_| ApiError::Internal("session token is not a valid cookie value".to_string()))
}

fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("jwt=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_format() {
        let cookie = session_cookie("abc", Some(3600)).unwrap();
        assert_eq!(
            cookie.to_str().unwrap(),
            "jwt=abc; Path=/; HttpOnly; SameSite=Strict; Max-Age=3600"
        );

        let cookie = session_cookie("abc", None).unwrap();
        assert!(!cookie.to_str().unwrap().contains("Max-Age"));
    }

    #[test]
    fn test_session_cookie_rejects_control_characters() {
        assert!(session_cookie("bad\ntoken", None).is_err());
    }

    #[test]
    fn test_account_error_mapping() {
        assert_eq!(
            ApiError::from(AccountError::AlreadyExists).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AccountError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
