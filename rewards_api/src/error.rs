//! Structured error responses for the rewards API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{
    config::ConfigError,
    signature::{FreshnessError, SignatureError},
    store::StoreError,
};

/// API error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    pub retryable: bool,
    pub request_id: String,
    pub timestamp: i64,
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    // Client errors (4xx)
    BadRequest(String),
    ValidationError { field: String, message: String },
    Unauthorized(String),
    InvalidSignature,
    SignatureExpired,
    SignatureFromFuture,
    ClaimNotOpen { claim_opens_at: i64 },
    NotFound(String),
    NothingClaimable { claim_state: serde_json::Value },
    ClaimInProgress,
    Conflict(String),
    RateLimitExceeded { retry_after: u64 },

    // Server errors (5xx)
    NotConfigured(String),
    LockUnavailable,
    ServiceUnavailable(String),
    StoreFailure(String),
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::SignatureExpired => StatusCode::UNAUTHORIZED,
            AppError::SignatureFromFuture => StatusCode::UNAUTHORIZED,
            AppError::ClaimNotOpen { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NothingClaimable { .. } => StatusCode::CONFLICT,
            AppError::ClaimInProgress => StatusCode::CONFLICT,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,

            AppError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::LockUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::StoreFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::SignatureExpired => "SIGNATURE_EXPIRED",
            AppError::SignatureFromFuture => "SIGNATURE_FROM_FUTURE",
            AppError::ClaimNotOpen { .. } => "CLAIM_NOT_OPEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NothingClaimable { .. } => "NOTHING_CLAIMABLE",
            AppError::ClaimInProgress => "CLAIM_IN_PROGRESS",
            AppError::Conflict(_) => "CONFLICT",
            AppError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",

            AppError::NotConfigured(_) => "NOT_CONFIGURED",
            AppError::LockUnavailable => "LOCK_UNAVAILABLE",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::StoreFailure(_) => "STORE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get user-facing message
    pub fn message(&self) -> String {
        match self {
            AppError::BadRequest(msg) => msg.clone(),
            AppError::ValidationError { field, message } => {
                format!("Validation error on field '{}': {}", field, message)
            }
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::InvalidSignature => "Invalid signature".to_string(),
            AppError::SignatureExpired => "Signature expired".to_string(),
            AppError::SignatureFromFuture => "Signature issued in the future".to_string(),
            AppError::ClaimNotOpen { .. } => "Claim is not open yet".to_string(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::NothingClaimable { .. } => "Nothing claimable".to_string(),
            AppError::ClaimInProgress => "Claim in progress, retry shortly".to_string(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::RateLimitExceeded { retry_after } => {
                format!("Rate limit exceeded. Retry after {} seconds", retry_after)
            }

            AppError::NotConfigured(msg) => format!("Rewards not configured: {}", msg),
            AppError::LockUnavailable => "Claim service temporarily unavailable".to_string(),
            AppError::ServiceUnavailable(msg) => msg.clone(),
            AppError::StoreFailure(_) => "Storage operation failed".to_string(),
            AppError::Internal(_) => "Internal server error occurred".to_string(),
        }
    }

    /// Extra JSON attached to the response
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::ValidationError { field, .. } => Some(serde_json::json!({
                "field": field
            })),
            AppError::ClaimNotOpen { claim_opens_at } => Some(serde_json::json!({
                "claimOpensAt": claim_opens_at
            })),
            AppError::NothingClaimable { claim_state } => Some(serde_json::json!({
                "claimState": claim_state
            })),
            AppError::RateLimitExceeded { retry_after } => Some(serde_json::json!({
                "retry_after": retry_after
            })),
            _ => None,
        }
    }

    /// Get help text for error
    fn help(&self) -> Option<String> {
        match self {
            AppError::SignatureExpired | AppError::SignatureFromFuture => {
                Some("Sign a fresh claim message with the current time".to_string())
            }
            AppError::ClaimInProgress => {
                Some("Another claim for this wallet is being processed".to_string())
            }
            AppError::RateLimitExceeded { .. } => {
                Some("Please wait before making more requests".to_string())
            }
            _ => None,
        }
    }

    /// Transient failures the caller should simply retry
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            AppError::ClaimInProgress
                | AppError::LockUnavailable
                | AppError::RateLimitExceeded { .. }
                | AppError::ServiceUnavailable(_)
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = ErrorResponse {
            error: self.message(),
            code: self.error_code().to_string(),
            details: self.details(),
            help: self.help(),
            retryable: self.retryable(),
            request_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        match &self {
            AppError::StoreFailure(cause) | AppError::Internal(cause) => tracing::error!(
                request_id = %error_response.request_id,
                error_code = %error_response.code,
                status = %status,
                cause = %cause,
                "API error occurred"
            ),
            _ => tracing::debug!(
                request_id = %error_response.request_id,
                error_code = %error_response.code,
                status = %status,
                "Request rejected"
            ),
        }

        (status, Json(error_response)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(cause) => {
                tracing::warn!("Store unavailable: {}", cause);
                AppError::ServiceUnavailable("Storage temporarily unavailable".to_string())
            }
            other => AppError::StoreFailure(other.to_string()),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotConfigured(msg) => AppError::NotConfigured(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<SignatureError> for AppError {
    fn from(_: SignatureError) -> Self {
        AppError::InvalidSignature
    }
}

impl From<FreshnessError> for AppError {
    fn from(err: FreshnessError) -> Self {
        match err {
            FreshnessError::Expired { .. } => AppError::SignatureExpired,
            FreshnessError::FromFuture { .. } => AppError::SignatureFromFuture,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization failed: {}", err))
    }
}
