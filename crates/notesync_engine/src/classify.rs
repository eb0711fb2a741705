//! Transient vs permanent error classification.
//!
//! Rules, first match wins:
//! 1. transport failures are retryable
//! 2. status codes: 5xx, 429 and 408 are retryable, any other 4xx is not
//! 3. messages mentioning a timeout, network or connection are retryable
//! 4. everything else is not

use crate::error::SyncError;

const TRANSIENT_MARKERS: [&str; 3] = ["timeout", "network", "connection"];

/// Decides whether a failed operation is worth another attempt.
pub trait ErrorClassifier<E>: Send + Sync {
    /// Returns true if `error` is transient.
    fn is_retryable(&self, error: &E) -> bool;
}

impl<E, F> ErrorClassifier<E> for F
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_retryable(&self, error: &E) -> bool {
        self(error)
    }
}

/// The standard classifier for [`SyncError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl ErrorClassifier<SyncError> for DefaultClassifier {
    fn is_retryable(&self, error: &SyncError) -> bool {
        is_retryable(error)
    }
}

/// Classifies a [`SyncError`].
pub fn is_retryable(error: &SyncError) -> bool {
    match error {
        SyncError::Transport(_) | SyncError::NotConnected => true,
        SyncError::Http { status, message } => match status_retryable(*status) {
            Some(retryable) => retryable,
            None => message_retryable(message),
        },
        other => message_retryable(&other.to_string()),
    }
}

fn status_retryable(status: u16) -> Option<bool> {
    match status {
        408 | 429 => Some(true),
        400..=499 => Some(false),
        500..=599 => Some(true),
        _ => None,
    }
}

fn message_retryable(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_storage::StorageError;

    #[test]
    fn retryable_statuses() {
        for status in [500, 502, 503, 504, 429, 408] {
            assert!(is_retryable(&SyncError::http(status, "")), "status {status}");
        }
    }

    #[test]
    fn permanent_statuses() {
        for status in [400, 401, 403, 404, 409, 413, 422] {
            assert!(!is_retryable(&SyncError::http(status, "")), "status {status}");
        }
    }

    #[test]
    fn status_wins_over_message() {
        assert!(!is_retryable(&SyncError::http(400, "connection header invalid")));
    }

    #[test]
    fn unusual_status_falls_back_to_message() {
        assert!(is_retryable(&SyncError::http(302, "network redirect loop")));
        assert!(!is_retryable(&SyncError::http(302, "moved")));
    }

    #[test]
    fn transport_failures_are_retryable() {
        assert!(is_retryable(&SyncError::Transport("invalid request".into())));
        assert!(is_retryable(&SyncError::NotConnected));
    }

    #[test]
    fn message_markers_are_case_insensitive() {
        assert!(is_retryable(&SyncError::Remote("Request TIMEOUT".into())));
        assert!(is_retryable(&SyncError::Remote("Network unreachable".into())));
        assert!(is_retryable(&SyncError::Remote("connection reset by peer".into())));
    }

    #[test]
    fn unknown_errors_fail_closed() {
        assert!(!is_retryable(&SyncError::Remote("something odd".into())));
        assert!(!is_retryable(&SyncError::Remote(String::new())));
        assert!(!is_retryable(&SyncError::Apply("constraint violated".into())));
    }

    #[test]
    fn storage_errors_use_message_rule() {
        let err = SyncError::from(StorageError::Unavailable("network volume offline".into()));
        assert!(is_retryable(&err));
        let err = SyncError::from(StorageError::Corrupted("bad cbor".into()));
        assert!(!is_retryable(&err));
    }

    #[test]
    fn closures_are_classifiers() {
        let never = |_: &SyncError| false;
        assert!(!never.is_retryable(&SyncError::NotConnected));
        assert!(DefaultClassifier.is_retryable(&SyncError::NotConnected));
    }
}
