//! Error taxonomy for the substrate.
//!
//! `CoreError` is the single error type returned from domain and service
//! code; its `IntoResponse` impl turns each variant into the HTTP status and
//! JSON body documented for the REST surface. Every response body carries
//! `{code, message, retry_after_ms?, trace_id}` so a caller can distinguish
//! retryable failures (`RateLimited`, `Unavailable`) from terminal ones
//! without inspecting the HTTP status alone.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for substrate operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A request argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No credentials were presented, or the credentials did not parse.
    #[error("unauthenticated")]
    Unauthenticated,

    /// The caller is known but lacks the capability for this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A tenant policy (DLP/RBAC/ABAC) denied the request.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// The referenced nutrient, route, or token has expired.
    #[error("expired: {0}")]
    Expired(String),

    /// An idempotent write (e.g. `record_outcome`) was already applied.
    #[error("already recorded: {0}")]
    AlreadyRecorded(String),

    /// The tenant's rate limit was exceeded; retry after `retry_after_ms`.
    #[error("rate limited")]
    RateLimited {
        /// Milliseconds the caller should wait before retrying.
        retry_after_ms: u64,
    },

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A dependency (store, scheduler) is transiently unavailable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal failure; details are logged, not exposed.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl CoreError {
    /// Stable machine-readable error code, used in the response body and in
    /// audit/log correlation.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied(_) => "permission_denied",
            Self::PolicyDenied(_) => "policy_denied",
            Self::Expired(_) => "expired",
            Self::AlreadyRecorded(_) => "already_recorded",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound(_) => "not_found",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied(_) | Self::PolicyDenied(_) => StatusCode::FORBIDDEN,
            Self::Expired(_) => StatusCode::GONE,
            Self::AlreadyRecorded(_) => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            Self::Unavailable(_) => Some(50),
            _ => None,
        }
    }

    /// Whether a background task encountering this error should retry on its
    /// next scheduled tick. Auth, policy, and validation failures are
    /// terminal; transient store/dependency failures are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited { .. })
    }
}

/// Wire body for every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable error code.
    pub code: &'static str,
    /// Human-readable message; safe to display to a caller.
    pub message: String,
    /// Present when the caller should back off before retrying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Correlates this error with server-side logs and audit events.
    pub trace_id: Uuid,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            retry_after_ms: self.retry_after_ms(),
            trace_id: Uuid::new_v4(),
        };
        (status, Json(body)).into_response()
    }
}

/// Convenience alias used throughout domain and service code.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = CoreError::RateLimited {
            retry_after_ms: 450,
        };
        assert_eq!(err.retry_after_ms(), Some(450));
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_failures_are_not_retryable() {
        assert!(!CoreError::InvalidArgument("bad".into()).is_retryable());
        assert!(!CoreError::Unauthenticated.is_retryable());
        assert!(!CoreError::PolicyDenied("dlp".into()).is_retryable());
    }

    #[test]
    fn codes_are_stable_identifiers() {
        assert_eq!(CoreError::NotFound("x".into()).code(), "not_found");
        assert_eq!(CoreError::Expired("x".into()).code(), "expired");
    }
}
