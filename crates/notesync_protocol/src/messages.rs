//! Protocol messages for push and pull.

use crate::checkpoint::Checkpoint;
use crate::delta::Delta;
use crate::entity::EntityType;
use crate::error::ProtocolResult;
use crate::id::{DeviceId, EntityId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// JSON encoding shared by every wire message.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Encodes to JSON bytes.
    fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Batch of local deltas submitted by one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Submitting device.
    pub device_id: DeviceId,
    /// The client's current pull checkpoint.
    pub checkpoint: Checkpoint,
    /// Deltas in creation order.
    pub changes: Vec<Delta>,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(device_id: DeviceId, checkpoint: Checkpoint, changes: Vec<Delta>) -> Self {
        Self {
            device_id,
            checkpoint,
            changes,
        }
    }
}

/// A change the server permanently refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedChange {
    /// Entity type.
    pub entity_type: EntityType,
    /// Entity identifier.
    pub entity_id: EntityId,
    /// Timestamp of the rejected delta.
    pub client_timestamp: DateTime<Utc>,
    /// Human readable reason.
    pub reason: String,
}

/// Server acknowledgment of a push batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Number of changes accepted (duplicates count as accepted).
    pub accepted: u32,
    /// Changes refused by server-side validation.
    #[serde(default)]
    pub rejected: Vec<RejectedChange>,
    /// Server checkpoint after the push.
    pub checkpoint: Checkpoint,
}

impl PushResponse {
    /// Creates a response accepting every change.
    pub fn accepted(count: u32, checkpoint: Checkpoint) -> Self {
        Self {
            accepted: count,
            rejected: Vec::new(),
            checkpoint,
        }
    }
}

/// Request for remote changes after a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Last fully applied checkpoint.
    pub checkpoint: Checkpoint,
    /// Optional batch size hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl PullRequest {
    /// Creates a new pull request.
    pub fn new(checkpoint: Checkpoint, limit: Option<u32>) -> Self {
        Self { checkpoint, limit }
    }
}

/// One batch of remote changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Changes in server order.
    pub changes: Vec<Delta>,
    /// Checkpoint to store once every change in this batch is applied.
    pub next_checkpoint: Checkpoint,
    /// Whether more changes are available after this batch.
    #[serde(default)]
    pub has_more: bool,
}

impl PullResponse {
    /// Creates a new pull response.
    pub fn new(changes: Vec<Delta>, next_checkpoint: Checkpoint, has_more: bool) -> Self {
        Self {
            changes,
            next_checkpoint,
            has_more,
        }
    }

    /// An empty, final batch that keeps the given checkpoint.
    pub fn empty(checkpoint: Checkpoint) -> Self {
        Self::new(Vec::new(), checkpoint, false)
    }
}

impl WireMessage for PushRequest {}
impl WireMessage for PushResponse {}
impl WireMessage for PullRequest {}
impl WireMessage for PullResponse {}
