//! Finder error types
//!
//! Defines the error conditions surfaced by the resolver, the batching
//! engine and the readers built on top of them.

use thiserror::Error;

use crate::batch::RequestId;

/// Errors that can occur while resolving paths or fetching series
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FinderError {
    /// Namespace path could not be decoded or does not fit the schema
    #[error("Malformed pattern: {0}")]
    MalformedPattern(String),

    /// HTTP/network failure talking to ATSD
    #[error("Backend transport error: {0}")]
    BackendTransport(String),

    /// The batch response carried no entry for this correlation id
    #[error("No response for request {0}")]
    MissingResponse(RequestId),

    /// The result for this correlation id was already claimed
    #[error("Request {0} was already consumed")]
    HandleConsumed(RequestId),

    /// Aggregation descriptor with a bad step or unit
    #[error("Invalid aggregation: {0}")]
    InvalidAggregation(String),

    /// Configuration section could not be interpreted
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested time window is empty or inverted
    #[error("Invalid time range: start {start} must be less than end {end}")]
    InvalidTimeRange { start: i64, end: i64 },
}

impl From<crate::backend::BackendError> for FinderError {
    fn from(err: crate::backend::BackendError) -> Self {
        FinderError::BackendTransport(err.to_string())
    }
}

/// Result type alias for finder operations
pub type FinderResult<T> = Result<T, FinderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FinderError::MissingResponse(RequestId::new(7));
        assert_eq!(err.to_string(), "No response for request q7");

        let err = FinderError::InvalidTimeRange { start: 10, end: 5 };
        assert_eq!(
            err.to_string(),
            "Invalid time range: start 10 must be less than end 5"
        );
    }

    #[test]
    fn test_backend_error_conversion() {
        let backend = crate::backend::BackendError::Api {
            status: 503,
            message: "down".to_string(),
        };
        let err: FinderError = backend.into();
        assert!(matches!(err, FinderError::BackendTransport(_)));
        assert!(err.to_string().contains("503"));
    }
}
