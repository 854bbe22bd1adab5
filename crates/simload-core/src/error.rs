use thiserror::Error;

/// Canonical error type for harness and backend operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller violated an operation's contract (mutation count, corpus size).
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Human-readable explanation of the violated precondition.
        message: String,
    },

    /// The request never produced an HTTP response (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status code.
    #[error("backend returned HTTP {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated by the caller if needed.
        body: String,
    },

    /// The backend answered with a payload we could not interpret.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Query text could not be embedded.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },
}

impl CoreError {
    /// Creates an `InvalidArgument` variant.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true for contract violations that must reach the caller.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
