//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The checkpoint was not issued by this server.
    #[error("invalid checkpoint: {0:?}")]
    InvalidCheckpoint(String),

    /// Push batch exceeds the configured limit.
    #[error("batch too large: {count} changes, limit is {max}")]
    BatchTooLarge {
        /// Changes in the batch.
        count: usize,
        /// Configured limit.
        max: u32,
    },

    /// Unknown endpoint.
    #[error("no such endpoint: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::InvalidCheckpoint(_) => 400,
            ServerError::NotFound(_) => 404,
            ServerError::BatchTooLarge { .. } => 413,
            ServerError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }
}
