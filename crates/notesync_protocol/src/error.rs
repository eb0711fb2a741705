//! Error types for protocol validation and encoding.

use crate::delta::Operation;
use crate::entity::EntityType;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while building or decoding protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The payload variant does not match the delta's entity type.
    #[error("payload mismatch: delta is for {expected} but payload is a {found}")]
    PayloadMismatch {
        /// Entity type declared on the delta.
        expected: EntityType,
        /// Entity type of the payload.
        found: EntityType,
    },

    /// A create or update delta was built without a payload.
    #[error("{operation} delta requires a payload")]
    MissingPayload {
        /// The offending operation.
        operation: Operation,
    },

    /// A delete delta carried a payload.
    #[error("delete delta must not carry a payload")]
    UnexpectedPayload,

    /// JSON encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
