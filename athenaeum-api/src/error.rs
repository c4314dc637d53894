//! Error Types for the Athenaeum API
//!
//! Structured error responses for the HTTP/SSE surface, including:
//! - `ApiError` for a consistent JSON error body
//! - `ErrorCode` categorizing errors by kind
//! - `IntoResponse` so handlers can return `ApiResult<T>` directly
//!
//! `ErrorCode` variants and status mappings follow §7 Error Handling Design:
//! quota denial surfaces as HTTP 402, bad filters/queries as 400, a
//! struggling index as 503/504. Cache/memory failures never reach this
//! layer — they're swallowed as soft errors at the pipeline boundary
//! (`AthenaeumError::is_soft`).

use athenaeum_core::{AthenaeumError, IndexError, LlmError, QuotaError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request lacks valid authentication for a route that requires it.
    Unauthorized,

    /// Request is malformed: bad field value, missing field, out-of-range limit.
    ValidationFailed,

    /// Required field is missing from the request body.
    MissingField,

    /// Field value is out of its valid range.
    InvalidRange,

    /// Field has the wrong shape or format.
    InvalidFormat,

    /// Caller's daily query quota is exhausted (§7 `QuotaDenied`). HTTP 402.
    QuotaExceeded,

    /// Retrieval index rejected the request outright (§7 `IndexBadRequest`).
    IndexBadRequest,

    /// Retrieval index is unreachable after the fan-out executor's retry (§7 `IndexUnavailable`).
    IndexUnavailable,

    /// Upstream LLM provider is unavailable or misconfigured.
    LlmUnavailable,

    /// An operation exceeded its deadline.
    Timeout,

    /// Unexpected internal failure.
    InternalError,

    /// Service is shedding load or shutting down.
    ServiceUnavailable,

    /// Caller exceeded the HTTP-layer rate limit (distinct from the query quota).
    TooManyRequests,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::ValidationFailed
            | ErrorCode::MissingField
            | ErrorCode::InvalidRange
            | ErrorCode::InvalidFormat
            | ErrorCode::IndexBadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
            ErrorCode::IndexUnavailable | ErrorCode::LlmUnavailable | ErrorCode::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidRange => "Value is out of valid range",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::QuotaExceeded => "Daily query limit exceeded",
            ErrorCode::IndexBadRequest => "Invalid retrieval request",
            ErrorCode::IndexUnavailable => "Search index temporarily unavailable",
            ErrorCode::LlmUnavailable => "Language model provider unavailable",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::TooManyRequests => "Rate limit exceeded",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn invalid_range(field: &str, min: impl fmt::Display, max: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidRange,
            format!("Field '{}' must be between {} and {}", field, min, max),
        )
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    /// The one error the quota gate ever surfaces to a caller: HTTP 402
    /// on the initial response line, `"query_limit_exceeded"` as the SSE
    /// `error` event payload downstream (§7).
    pub fn quota_exceeded(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::QuotaExceeded, reason)
    }

    pub fn index_bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IndexBadRequest, message)
    }

    pub fn index_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IndexUnavailable, message)
    }

    pub fn llm_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LlmUnavailable, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn timeout(operation: &str) -> Self {
        Self::new(ErrorCode::Timeout, format!("Operation '{}' timed out", operation))
    }

    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Rate limit exceeded. Retry after {} seconds", secs),
            None => "Rate limit exceeded".to_string(),
        };
        Self::new(ErrorCode::TooManyRequests, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

/// Maps a pipeline-level failure onto the HTTP error surface (§7). Soft
/// errors (cache/memory) should never reach a handler in the first place —
/// the pipeline swallows them at the source — so they fall through to
/// `InternalError` here only as a defensive default.
impl From<AthenaeumError> for ApiError {
    fn from(err: AthenaeumError) -> Self {
        match err {
            AthenaeumError::Index(IndexError::BadRequest { reason }) => {
                ApiError::index_bad_request(reason)
            }
            AthenaeumError::Index(IndexError::Unavailable { reason }) => {
                ApiError::index_unavailable(reason)
            }
            AthenaeumError::Quota(QuotaError::LimitExceeded { .. }) => {
                ApiError::quota_exceeded("query_limit_exceeded")
            }
            AthenaeumError::Quota(QuotaError::Suspended) => ApiError::quota_exceeded("suspended"),
            AthenaeumError::Llm(LlmError::Timeout { .. }) => {
                ApiError::new(ErrorCode::Timeout, "Language model call timed out")
            }
            AthenaeumError::Llm(_) => ApiError::llm_unavailable(err.to_string()),
            other => {
                tracing::error!(error = %other, "unhandled pipeline error");
                ApiError::internal_error(other.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::validation_failed(format!("Invalid JSON: {}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::QuotaExceeded.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::IndexUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn quota_exceeded_maps_from_pipeline_error() {
        let err: ApiError = AthenaeumError::Quota(QuotaError::LimitExceeded {
            remaining: 0,
            limit: 10,
        })
        .into();
        assert_eq!(err.code, ErrorCode::QuotaExceeded);
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(err.message, "query_limit_exceeded");
    }

    #[test]
    fn serializes_with_screaming_snake_case_code() {
        let err = ApiError::quota_exceeded("query_limit_exceeded");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("QUOTA_EXCEEDED"));
    }
}
