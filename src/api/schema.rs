//! Request body schemas for the public routes.
//!
//! Bodies are deserialized loosely (as a plain JSON object)
//! and then checked by [`Validate`], so clients get a per-key message rather
//! than a serde error. Checking stops at the first failing key.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ApiError;

/// The first key that failed validation and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub key: String,
    pub message: String,
}

impl ValidationError {
    fn new(key: &str, message: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation {
            message: err.message,
            keys: vec![err.key],
        }
    }
}

/// A raw request body that can be checked into its validated form.
pub trait Validate: DeserializeOwned + Send {
    type Valid: Send;

    fn validate(self) -> Result<Self::Valid, ValidationError>;
}

/// Extractor that parses a JSON body and runs its schema.
pub struct ValidatedJson<B: Validate>(pub B::Valid);

impl<S, B> FromRequest<S> for ValidatedJson<B>
where
    S: Send + Sync,
    B: Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = match Json::<B>::from_request(req, state).await {
            Ok(Json(body)) => body,
            // No JSON body at all is checked as an empty object, so the
            // client hears about the first missing key.
            Err(JsonRejection::MissingJsonContentType(_)) => {
                serde_json::from_value(Value::Object(Map::new()))
                    .map_err(|e| ApiError::MalformedBody(e.to_string()))?
            }
            Err(JsonRejection::JsonDataError(_)) => {
                return Err(ApiError::Validation {
                    message: "\"value\" must be of type object".to_string(),
                    keys: Vec::new(),
                });
            }
            Err(rejection) => return Err(ApiError::MalformedBody(rejection.body_text())),
        };
        Ok(ValidatedJson(body.validate()?))
    }
}

/// Credentials accepted by `POST /signin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Registration accepted by `POST /signup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Raw `POST /signin` body. Kept as a JSON object so that `null` and
/// non-string values reach validation with their key.
#[derive(Debug, Deserialize)]
pub struct SignInBody(Map<String, Value>);

impl Validate for SignInBody {
    type Valid = Credentials;

    fn validate(self) -> Result<Credentials, ValidationError> {
        let mut fields = self.0;
        let email = email("email", fields.remove("email"))?;
        let password = min_len("password", required("password", fields.remove("password"))?, 2)?;
        no_unknown_keys(&fields)?;
        Ok(Credentials { email, password })
    }
}

/// Raw `POST /signup` body.
#[derive(Debug, Deserialize)]
pub struct SignUpBody(Map<String, Value>);

impl Validate for SignUpBody {
    type Valid = Registration;

    fn validate(self) -> Result<Registration, ValidationError> {
        let mut fields = self.0;
        let email = email("email", fields.remove("email"))?;
        let password = min_len("password", required("password", fields.remove("password"))?, 2)?;
        let name = max_len("name", min_len("name", required("name", fields.remove("name"))?, 2)?, 30)?;
        no_unknown_keys(&fields)?;
        Ok(Registration {
            email,
            password,
            name,
        })
    }
}

fn required(key: &str, value: Option<Value>) -> Result<String, ValidationError> {
    match value {
        None => Err(ValidationError::new(key, format!("\"{key}\" is required"))),
        Some(value) => string(key, value),
    }
}

fn string(key: &str, value: Value) -> Result<String, ValidationError> {
    match value {
        Value::String(s) if s.is_empty() => Err(ValidationError::new(
            key,
            format!("\"{key}\" is not allowed to be empty"),
        )),
        Value::String(s) => Ok(s),
        _ => Err(ValidationError::new(
            key,
            format!("\"{key}\" must be a string"),
        )),
    }
}

fn min_len(key: &str, value: String, min: usize) -> Result<String, ValidationError> {
    if value.chars().count() < min {
        return Err(ValidationError::new(
            key,
            format!("\"{key}\" length must be at least {min} characters long"),
        ));
    }
    Ok(value)
}

fn max_len(key: &str, value: String, max: usize) -> Result<String, ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(
            key,
            format!("\"{key}\" length must be less than or equal to {max} characters long"),
        ));
    }
    Ok(value)
}

fn email(key: &str, value: Option<Value>) -> Result<String, ValidationError> {
    let value = required(key, value)?;
    if !is_email(&value) {
        return Err(ValidationError::new(
            key,
            format!("\"{key}\" must be a valid email"),
        ));
    }
    Ok(value)
}

fn no_unknown_keys(extra: &Map<String, Value>) -> Result<(), ValidationError> {
    match extra.keys().next() {
        Some(key) => Err(ValidationError::new(key, format!("\"{key}\" is not allowed"))),
        None => Ok(()),
    }
}

/// Pragmatic address check: one `@`, a sane local part, and a dotted domain
/// whose top-level label is alphabetic.
pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };

    if local.is_empty() || local.len() > 64 || domain.len() > 253 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if !local
        .chars()
        .all(|c| c.is_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(c))
    {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.chars().count() >= 2 && tld.chars().all(char::is_alphabetic));

    labels_ok && tld_ok
}
