//! Error types for the entity store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row read by the transaction was changed by a concurrent commit.
    #[error("transaction conflict on {row}")]
    Conflict {
        /// The row that changed.
        row: String,
    },

    /// A write would break a monotonicity or ownership invariant.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },

    /// The puzzle content reader failed.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a conflict error.
    pub fn conflict(row: impl Into<String>) -> Self {
        Self::Conflict { row: row.into() }
    }

    /// Creates an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Returns true if re-running the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Backend(_))
    }
}
