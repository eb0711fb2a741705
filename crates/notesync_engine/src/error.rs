//! Error types for the sync engine.

use notesync_protocol::ProtocolError;
use notesync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The request never produced a response (connection refused, DNS, etc).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered with a non-success status code.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Failure reported only by message.
    #[error("{0}")]
    Remote(String),

    /// Message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Key-value persistence failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The local store failed to read or acknowledge pending deltas.
    #[error("local store error: {0}")]
    LocalStore(String),

    /// A pulled batch could not be applied locally.
    #[error("failed to apply remote changes: {0}")]
    Apply(String),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Returns the status code, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Shorthand for [`crate::is_retryable`].
    pub fn is_retryable(&self) -> bool {
        crate::classify::is_retryable(self)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(ProtocolError::Codec(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(SyncError::NotConnected.to_string(), "not connected to server");
        assert_eq!(SyncError::http(503, "unavailable").to_string(), "HTTP 503: unavailable");
        assert_eq!(SyncError::Remote("boom".into()).to_string(), "boom");
    }

    #[test]
    fn status_only_for_http() {
        assert_eq!(SyncError::http(404, "missing").status(), Some(404));
        assert_eq!(SyncError::Transport("refused".into()).status(), None);
    }

    #[test]
    fn storage_errors_convert() {
        let err: SyncError = StorageError::Unavailable("keychain locked".into()).into();
        assert!(matches!(err, SyncError::Storage(_)));
    }
}
