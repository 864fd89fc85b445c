//! Error types for the GST query assistant.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From` conversions.

use crate::security::RejectionReason;
use std::borrow::Cow;
use thiserror::Error;

/// Main error type for the assistant.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("No active database connection")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Query timeout after {0}ms")]
    Timeout(u64),
}

/// Admission-control errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("Query rejected: {0}")]
    QueryRejected(RejectionReason),

    #[error("Rate limit permit not acquired within {0}ms")]
    AcquireTimeout(u64),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(Cow<'static, str>),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: Cow<'static, str>,
        message: Cow<'static, str>,
    },
}

/// Errors raised by the hosted language model.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Model call throttled: no permit within {0}ms")]
    Throttled(u64),

    #[error("Model call failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl ModelError {
    /// Whether the failure is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::EmptyResponse)
    }
}

/// Vector store and retrieval errors.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] ModelError),
}

/// Result type alias for AssistantError.
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Result type alias for DatabaseError.
pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// Result type alias for SecurityError.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

/// Result type alias for ModelError.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Result type alias for RetrievalError.
pub type RetrievalResult<T> = std::result::Result<T, RetrievalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let db_error = DatabaseError::ConnectionFailed("test".into());
        let error: AssistantError = db_error.into();
        assert!(matches!(error, AssistantError::Database(_)));

        let rejected = SecurityError::QueryRejected(RejectionReason::EmptyQuery);
        let error: AssistantError = rejected.into();
        assert!(matches!(error, AssistantError::Security(_)));
    }

    #[test]
    fn test_rejection_message() {
        let error = SecurityError::QueryRejected(RejectionReason::MultipleStatements(2));
        assert_eq!(
            error.to_string(),
            "Query rejected: multiple statements not allowed"
        );
    }

    #[test]
    fn test_model_error_retryable() {
        assert!(ModelError::Request("503".into()).is_retryable());
        assert!(ModelError::EmptyResponse.is_retryable());
        assert!(!ModelError::Throttled(100).is_retryable());
        assert!(
            !ModelError::RetriesExhausted {
                attempts: 3,
                last: "boom".into()
            }
            .is_retryable()
        );
    }
}
