//! Last-writer-wins conflict resolution.

use chrono::{DateTime, Utc};
use notesync_protocol::{Delta, EntityId, EntityType, Operation};

/// How an incoming remote change was resolved against local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// The local copy is newer; the remote change is discarded.
    KeepLocal,
    /// The remote change overwrites local state.
    AcceptRemote,
}

/// Resolves a remote change against the local last-modified time.
///
/// Local wins only when it is strictly newer; on equal timestamps the
/// remote change is applied. An entity with no local history always
/// accepts the remote change.
pub fn resolve_lww(
    local_modified: Option<DateTime<Utc>>,
    remote_timestamp: DateTime<Utc>,
) -> ConflictResolution {
    match local_modified {
        Some(local) if local > remote_timestamp => ConflictResolution::KeepLocal,
        _ => ConflictResolution::AcceptRemote,
    }
}

/// A remote change that lost to a newer local edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Entity type.
    pub entity_type: EntityType,
    /// Entity identifier.
    pub entity_id: EntityId,
    /// Operation of the discarded remote change.
    pub remote_operation: Operation,
    /// Timestamp of the discarded remote change.
    pub remote_timestamp: DateTime<Utc>,
    /// Local last-modified time that won.
    pub local_modified: DateTime<Utc>,
}

impl Conflict {
    /// Records that `remote` lost to a local edit made at `local_modified`.
    pub fn discarded(remote: &Delta, local_modified: DateTime<Utc>) -> Self {
        Self {
            entity_type: remote.entity_type(),
            entity_id: remote.entity_id(),
            remote_operation: remote.operation(),
            remote_timestamp: remote.client_timestamp(),
            local_modified,
        }
    }
}
