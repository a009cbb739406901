//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// The storage call did not complete in time and was cancelled.
    #[error("storage operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Returns true for errors that indicate the backend itself is unhealthy
    /// rather than a problem with the request. Retrying the same records may
    /// succeed only for these.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            StorageError::ConnectionError { .. }
                | StorageError::QueryError { .. }
                | StorageError::Timeout { .. }
                | StorageError::InternalError { .. }
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_include_context() {
        let err = StorageError::InvalidInput {
            message: "user at index 3: email must contain '@'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid input: user at index 3: email must contain '@'"
        );

        let err = StorageError::Timeout { duration_ms: 250 };
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_backend_failure_classification() {
        assert!(StorageError::ConnectionError {
            message: "refused".to_string()
        }
        .is_backend_failure());
        assert!(StorageError::Timeout { duration_ms: 1 }.is_backend_failure());
        assert!(!StorageError::InvalidInput {
            message: "bad".to_string()
        }
        .is_backend_failure());
    }
}
