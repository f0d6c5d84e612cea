//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::FinderError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resolution or fetch failed
    #[error(transparent)]
    Finder(#[from] FinderError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable (dependency down)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Finder(e) => match e {
                FinderError::MalformedPattern(_) => (StatusCode::BAD_REQUEST, "MALFORMED_PATTERN"),
                FinderError::InvalidAggregation(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_AGGREGATION")
                }
                FinderError::InvalidTimeRange { .. } => {
                    (StatusCode::BAD_REQUEST, "INVALID_TIME_RANGE")
                }
                FinderError::BackendTransport(_) | FinderError::MissingResponse(_) => {
                    (StatusCode::BAD_GATEWAY, "BACKEND_ERROR")
                }
                FinderError::HandleConsumed(_) | FinderError::Config(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            request_id = %request_id,
            error_code = %code,
            error_message = %self,
            "API error occurred"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let malformed = ApiError::from(FinderError::MalformedPattern("x".into()));
        assert_eq!(malformed.into_response().status(), StatusCode::BAD_REQUEST);

        let transport = ApiError::from(FinderError::BackendTransport("down".into()));
        assert_eq!(transport.into_response().status(), StatusCode::BAD_GATEWAY);

        let unavailable = ApiError::ServiceUnavailable("atsd".into());
        assert_eq!(
            unavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
