//! Error types for treestore
//!
//! Every fallible operation in the store reports one of five conditions.
//! Only [`StoreError::Conflict`] is retryable: the caller re-derives the
//! transaction from a fresh snapshot and replays its writes.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::path::{PathParseError, TreePath};
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error taxonomy for the store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic lock failure: shared state diverged from the
    /// transaction's base snapshot on an overlapping path
    #[error("Conflict at {path}: {message}")]
    Conflict {
        /// Path where the conflict was detected
        path: TreePath,
        /// What the other transaction did
        message: String,
    },

    /// Schema or semantic rejection of written data
    #[error("Validation failed at {path}: {message}")]
    ValidationFailed {
        /// Path of the rejected data
        path: TreePath,
        /// Reason given by the validator
        message: String,
    },

    /// Operation not legal in the current lifecycle state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Malformed path or data
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// Anything else
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl StoreError {
    /// Create a conflict error
    pub fn conflict(path: TreePath, message: impl Into<String>) -> Self {
        StoreError::Conflict {
            path,
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(path: TreePath, message: impl Into<String>) -> Self {
        StoreError::ValidationFailed {
            path,
            message: message.into(),
        }
    }

    /// Create an illegal state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        StoreError::IllegalState(message.into())
    }

    /// Create an illegal argument error
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        StoreError::IllegalArgument(message.into())
    }

    /// Create an unexpected failure
    pub fn unexpected(message: impl Into<String>) -> Self {
        StoreError::Unexpected(message.into())
    }

    /// Whether this is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Whether this is a validation failure
    pub fn is_validation_failed(&self) -> bool {
        matches!(self, StoreError::ValidationFailed { .. })
    }

    /// Whether this is an illegal state error
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, StoreError::IllegalState(_))
    }

    /// Whether this is an illegal argument error
    pub fn is_illegal_argument(&self) -> bool {
        matches!(self, StoreError::IllegalArgument(_))
    }

    /// Whether the operation can succeed if retried from a fresh snapshot
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }

    /// The path the error refers to, if any
    pub fn path(&self) -> Option<&TreePath> {
        match self {
            StoreError::Conflict { path, .. } | StoreError::ValidationFailed { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

impl From<PathParseError> for StoreError {
    fn from(e: PathParseError) -> Self {
        StoreError::IllegalArgument(e.to_string())
    }
}
