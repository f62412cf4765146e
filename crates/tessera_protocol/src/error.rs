//! Error types for protocol decoding and argument validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding messages or validating mutation payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Mutation arguments do not match the mutation kind's schema.
    #[error("invalid arguments for {mutation}: {message}")]
    InvalidArgs {
        /// Wire name of the mutation.
        mutation: &'static str,
        /// What was wrong with the arguments.
        message: String,
    },

    /// A message could not be decoded.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Creates an invalid-arguments error.
    pub fn invalid_args(mutation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgs {
            mutation,
            message: message.into(),
        }
    }

    /// Creates a malformed-message error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}
