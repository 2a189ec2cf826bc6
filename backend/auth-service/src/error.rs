use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure kinds surfaced by account and token operations
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Email already registered")]
    Conflict,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email not verified")]
    NotVerified,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Token already used")]
    AlreadyUsed,

    #[error("Email already verified")]
    AlreadyVerified,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token revoked")]
    Revoked,

    #[error("Invalid federated profile: {0}")]
    InvalidProfile(String),

    #[error("OAuth provider error: {0}")]
    OAuth(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status for the wire protocol
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::InvalidProfile(_) => StatusCode::BAD_REQUEST,
            AuthError::Conflict | AuthError::AlreadyVerified => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::Expired
            | AuthError::Revoked => StatusCode::UNAUTHORIZED,
            AuthError::NotVerified | AuthError::AccountInactive => StatusCode::FORBIDDEN,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::AlreadyUsed => StatusCode::GONE,
            AuthError::OAuth(_) => StatusCode::BAD_GATEWAY,
            AuthError::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller
    ///
    /// Token failures collapse into one message; internal details never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::InvalidToken | AuthError::Expired | AuthError::Revoked => {
                "Invalid, expired, or revoked token".to_string()
            }
            AuthError::OAuth(_) => "OAuth provider error".to_string(),
            AuthError::Infrastructure(_) => "Service temporarily unavailable".to_string(),
            AuthError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the same request may succeed if retried later
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Infrastructure(_))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}

/// Failures reported by a credential store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate record: {0}")]
    Conflict(String),

    #[error("record not found: {0}")]
    NotFound(&'static str),

    #[error("invalid record: {0}")]
    Invalid(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => AuthError::Conflict,
            StoreError::NotFound(what) => AuthError::NotFound(what),
            StoreError::Invalid(msg) => AuthError::Internal(msg),
            StoreError::Backend(msg) => AuthError::Infrastructure(msg),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(db_err.message().to_string());
            }
            if db_err.is_check_violation() {
                return StoreError::Invalid(db_err.message().to_string());
            }
        }
        if matches!(err, sqlx::Error::RowNotFound) {
            return StoreError::NotFound("row");
        }
        tracing::error!("Database error: {}", err);
        StoreError::Backend(err.to_string())
    }
}

impl From<crypto_core::JwtError> for AuthError {
    fn from(err: crypto_core::JwtError) -> Self {
        match err {
            crypto_core::JwtError::Expired => AuthError::Expired,
            crypto_core::JwtError::Invalid(_) => AuthError::InvalidToken,
            crypto_core::JwtError::Key(msg) | crypto_core::JwtError::Signing(msg) => {
                tracing::error!("JWT error: {}", msg);
                AuthError::Internal(msg)
            }
        }
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthError::Validation(err.to_string())
    }
}
