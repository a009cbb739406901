//! Domain error types for the buffering pipeline and batch resolver.

use thiserror::Error;
use usersink_storage::{StorageError, UserId};

/// Domain-specific errors.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A size, capacity or interval was non-positive or out of range.
    ///
    /// Raised at construction time, never from a running pipeline.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A required argument was absent (as opposed to empty).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The operation is not allowed in the component's current state.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// A requested user does not exist.
    #[error("user not found: {id}")]
    NotFound { id: UserId },

    /// The storage collaborator reported an error.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl DomainError {
    pub(crate) fn invalid_configuration(message: impl Into<String>) -> Self {
        DomainError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
