//! Pull checkpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, server-defined cursor marking "everything pulled up to here".
///
/// The client never interprets a checkpoint; it only stores the value the
/// server returned for the last fully applied batch and echoes it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(String);

impl Checkpoint {
    /// Creates a checkpoint from a server-provided token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The cursor used before anything has been pulled.
    pub fn initial() -> Self {
        Self(String::new())
    }

    /// Returns true if this is the initial cursor.
    pub fn is_initial(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_initial() {
            f.write_str("<initial>")
        } else {
            f.write_str(&self.0)
        }
    }
}
