/// Unified error types for the Reprompt backend
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors (missing/invalid/expired credential)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors (authenticated but lacking required tier)
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Authorization errors outside the tier gate (admin endpoints)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Validation errors (missing/malformed request fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Balance below the cost of the requested operation
    #[error("Insufficient credits: {available} remaining")]
    InsufficientCredits { available: i64 },

    /// Completion provider failures. Credits already spent at this point
    /// are not refunded; the reason is passed through to aid debugging.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Present on insufficient-credit denials so the caller can explain
    /// the shortfall to the end user.
    #[serde(rename = "creditsRemaining", skip_serializing_if = "Option::is_none")]
    pub credits_remaining: Option<i64>,
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut credits_remaining = None;

        let (status, error_code, message) = match self {
            ApiError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            ApiError::Authorization(_) => (
                StatusCode::FORBIDDEN,
                "ProRequired",
                self.to_string(),
            ),
            ApiError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                "Forbidden",
                self.to_string(),
            ),
            ApiError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            ApiError::InsufficientCredits { available } => {
                credits_remaining = Some(available);
                (
                    StatusCode::PAYMENT_REQUIRED,
                    "InsufficientCredits",
                    self.to_string(),
                )
            }
            ApiError::Generation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "GenerationFailed",
                self.to_string(),
            ),
            ApiError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            ApiError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            ApiError::Database(_) | ApiError::Internal(_) | ApiError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            credits_remaining,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type ApiResult<T> = Result<T, ApiError>;
