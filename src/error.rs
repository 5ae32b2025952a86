use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::infra::users::StoreError;
use crate::security::{jwt::JwtError, password::PasswordError};

pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Everything a caller can be told about a failed request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("password does not meet the policy")]
    WeakPassword(Vec<String>),
    #[error("username is already taken")]
    DuplicateUsername,
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("current password is incorrect")]
    WrongCurrentPassword,
    #[error("authentication required")]
    Unauthenticated,
    #[error("insufficient role")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("too many requests")]
    RateLimited,
    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(fields)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "ValidationError",
            ApiError::WeakPassword(_) => "WeakPassword",
            ApiError::DuplicateUsername => "DuplicateUsername",
            ApiError::DuplicateEmail => "DuplicateEmail",
            ApiError::InvalidCredentials => "InvalidCredentials",
            ApiError::WrongCurrentPassword => "WrongCurrentPassword",
            ApiError::Unauthenticated => "Unauthenticated",
            ApiError::Forbidden => "Forbidden",
            ApiError::NotFound(_) => "NotFound",
            ApiError::RateLimited => "RateLimited",
            ApiError::Internal => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::WeakPassword(_)
            | ApiError::DuplicateUsername
            | ApiError::DuplicateEmail
            | ApiError::WrongCurrentPassword => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Logs the underlying cause and hides it from the caller.
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        error!("internal error: {err}");
        ApiError::Internal
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let error = self.kind();
        let fields = match self {
            ApiError::Validation(fields) => Some(fields),
            ApiError::WeakPassword(reasons) => {
                let mut fields = FieldErrors::new();
                fields.insert("password".into(), reasons);
                Some(fields)
            }
            _ => None,
        };
        (status, Json(ErrorBody { error, message, fields })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername => ApiError::DuplicateUsername,
            StoreError::DuplicateEmail => ApiError::DuplicateEmail,
            StoreError::NotFound(entity) => ApiError::NotFound(entity),
            StoreError::Database(e) => ApiError::internal(e),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Weak(reasons) => ApiError::WeakPassword(reasons),
            other => ApiError::internal(other),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Sign(e) => ApiError::internal(e),
            JwtError::Invalid(_) | JwtError::Expired => ApiError::Unauthenticated,
        }
    }
}
