//! Error types for the sync server.

use tessera_protocol::{ClientId, ProtocolError};
use tessera_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling push and pull requests.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The user does not own the client group (or client) addressed.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Credentials could not be resolved to a user.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Mutation arguments or business rules rejected the mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A mutation arrived ahead of the client's ledger.
    #[error("causal gap for client {client}: expected mutation {expected}, got {actual}")]
    CausalGap {
        /// Client that submitted the mutation.
        client: ClientId,
        /// Next mutation ID the server would accept.
        expected: u64,
        /// Mutation ID that was submitted.
        actual: u64,
    },

    /// A referenced puzzle does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request shape or limits.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// CVR snapshot cache failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Wire decoding or encoding failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ServerError {
    /// Creates a validation error.
    pub fn validation(message: impl ToString) -> Self {
        Self::Validation(message.to_string())
    }

    /// Returns true if the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Authorization(_)
                | ServerError::AuthenticationFailed(_)
                | ServerError::Validation(_)
                | ServerError::CausalGap { .. }
                | ServerError::NotFound(_)
                | ServerError::InvalidRequest(_)
                | ServerError::Protocol(_)
        )
    }

    /// Returns true if retrying the whole request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServerError::Storage(e) => e.is_retryable(),
            ServerError::Cache(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::Authorization("group g".into()).is_client_error());
        assert!(ServerError::validation("bad args").is_client_error());
        assert!(!ServerError::Cache("down".into()).is_client_error());
        assert!(ServerError::Cache("down".into()).is_retryable());
        assert!(ServerError::from(StoreError::conflict("group:g")).is_retryable());
        assert!(!ServerError::from(StoreError::invariant("regression")).is_retryable());
        assert!(!ServerError::NotFound("puzzle p".into()).is_retryable());
    }

    #[test]
    fn causal_gap_display() {
        let err = ServerError::CausalGap {
            client: "x".into(),
            expected: 3,
            actual: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("client x"));
        assert!(msg.contains('3'));
        assert!(msg.contains('7'));
    }
}
