//! Recorded local mutations.

use crate::entity::{EntityPayload, EntityType};
use crate::error::{ProtocolError, ProtocolResult};
use crate::id::{DeviceId, EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation recorded by a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Entity was created.
    Create,
    /// Entity was updated.
    Update,
    /// Entity was deleted.
    Delete,
}

impl Operation {
    /// Returns true for operations that carry entity state.
    pub fn carries_payload(&self) -> bool {
        !matches!(self, Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// Server-side idempotency key of a delta.
///
/// Two submissions with the same key describe the same mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeKey {
    /// Originating device.
    pub device_id: DeviceId,
    /// Entity touched.
    pub entity_id: EntityId,
    /// Device wall-clock at mutation time.
    pub client_timestamp: DateTime<Utc>,
}

/// A single recorded mutation pending transmission.
///
/// `Delta` values are immutable once built. The constructors enforce that
/// create and update deltas carry a payload of the matching entity type and
/// that delete deltas carry none; deserialization applies the same checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDelta")]
pub struct Delta {
    entity_type: EntityType,
    entity_id: EntityId,
    operation: Operation,
    payload: Option<EntityPayload>,
    client_timestamp: DateTime<Utc>,
    device_id: DeviceId,
}

impl Delta {
    /// Builds a delta, validating the payload against the operation.
    ///
    /// # Errors
    ///
    /// Returns an error if a create/update has no payload, if a delete has
    /// one, or if the payload variant does not match `entity_type`.
    pub fn new(
        entity_type: EntityType,
        entity_id: EntityId,
        operation: Operation,
        payload: Option<EntityPayload>,
        client_timestamp: DateTime<Utc>,
        device_id: DeviceId,
    ) -> ProtocolResult<Self> {
        match (&payload, operation.carries_payload()) {
            (None, true) => return Err(ProtocolError::MissingPayload { operation }),
            (Some(_), false) => return Err(ProtocolError::UnexpectedPayload),
            (Some(p), true) if p.entity_type() != entity_type => {
                return Err(ProtocolError::PayloadMismatch {
                    expected: entity_type,
                    found: p.entity_type(),
                })
            }
            _ => {}
        }

        Ok(Self {
            entity_type,
            entity_id,
            operation,
            payload,
            client_timestamp,
            device_id,
        })
    }

    /// Creates a delta recording a new entity.
    pub fn create(
        entity_id: EntityId,
        payload: EntityPayload,
        client_timestamp: DateTime<Utc>,
        device_id: DeviceId,
    ) -> Self {
        Self {
            entity_type: payload.entity_type(),
            entity_id,
            operation: Operation::Create,
            payload: Some(payload),
            client_timestamp,
            device_id,
        }
    }

    /// Creates a delta recording an update of an existing entity.
    pub fn update(
        entity_id: EntityId,
        payload: EntityPayload,
        client_timestamp: DateTime<Utc>,
        device_id: DeviceId,
    ) -> Self {
        Self {
            operation: Operation::Update,
            ..Self::create(entity_id, payload, client_timestamp, device_id)
        }
    }

    /// Creates a delta recording a deletion.
    pub fn delete(
        entity_type: EntityType,
        entity_id: EntityId,
        client_timestamp: DateTime<Utc>,
        device_id: DeviceId,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            operation: Operation::Delete,
            payload: None,
            client_timestamp,
            device_id,
        }
    }

    /// Entity type.
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Entity identifier.
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Operation.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Entity state after the mutation; `None` for deletes.
    pub fn payload(&self) -> Option<&EntityPayload> {
        self.payload.as_ref()
    }

    /// Device wall-clock at mutation time.
    pub fn client_timestamp(&self) -> DateTime<Utc> {
        self.client_timestamp
    }

    /// Originating device.
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Returns the idempotency key for this delta.
    pub fn key(&self) -> ChangeKey {
        ChangeKey {
            device_id: self.device_id,
            entity_id: self.entity_id,
            client_timestamp: self.client_timestamp,
        }
    }
}

#[derive(Deserialize)]
struct RawDelta {
    entity_type: EntityType,
    entity_id: EntityId,
    operation: Operation,
    #[serde(default)]
    payload: Option<EntityPayload>,
    client_timestamp: DateTime<Utc>,
    device_id: DeviceId,
}

impl TryFrom<RawDelta> for Delta {
    type Error = ProtocolError;

    fn try_from(raw: RawDelta) -> Result<Self, Self::Error> {
        Delta::new(
            raw.entity_type,
            raw.entity_id,
            raw.operation,
            raw.payload,
            raw.client_timestamp,
            raw.device_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Relation, RelationKind};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn create_infers_entity_type() {
        let delta = Delta::create(
            EntityId::new(),
            EntityPayload::note("a", "b"),
            ts(10),
            DeviceId::generate(),
        );
        assert_eq!(delta.entity_type(), EntityType::Note);
        assert_eq!(delta.operation(), Operation::Create);
    }

    #[test]
    fn new_rejects_mismatched_payload() {
        let payload = EntityPayload::Relation(Relation {
            source_id: EntityId::new(),
            target_id: EntityId::new(),
            kind: RelationKind::Supports,
        });
        let err = Delta::new(
            EntityType::Note,
            EntityId::new(),
            Operation::Update,
            Some(payload),
            ts(1),
            DeviceId::generate(),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadMismatch { .. }));
    }

    #[test]
    fn new_rejects_missing_or_unexpected_payload() {
        let device = DeviceId::generate();
        let missing = Delta::new(
            EntityType::Note,
            EntityId::new(),
            Operation::Create,
            None,
            ts(1),
            device,
        );
        assert!(matches!(missing, Err(ProtocolError::MissingPayload { .. })));

        let unexpected = Delta::new(
            EntityType::Note,
            EntityId::new(),
            Operation::Delete,
            Some(EntityPayload::note("x", "y")),
            ts(1),
            device,
        );
        assert!(matches!(unexpected, Err(ProtocolError::UnexpectedPayload)));
    }

    #[test]
    fn deserialization_validates() {
        let device = DeviceId::generate();
        let json = serde_json::json!({
            "entity_type": "reflection",
            "entity_id": EntityId::new(),
            "operation": "update",
            "payload": { "type": "note", "title": "t", "body": "b" },
            "client_timestamp": "2024-05-01T10:00:00Z",
            "device_id": device,
        });
        let result: Result<Delta, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn delete_decodes_without_payload_field() {
        let device = DeviceId::generate();
        let json = serde_json::json!({
            "entity_type": "note",
            "entity_id": EntityId::new(),
            "operation": "delete",
            "client_timestamp": "2024-05-01T10:00:00Z",
            "device_id": device,
        });
        let delta: Delta = serde_json::from_value(json).unwrap();
        assert_eq!(delta.operation(), Operation::Delete);
        assert!(delta.payload().is_none());
    }

    #[test]
    fn key_ignores_payload() {
        let device = DeviceId::generate();
        let id = EntityId::new();
        let a = Delta::update(id, EntityPayload::note("a", "1"), ts(5), device);
        let b = Delta::update(id, EntityPayload::note("b", "2"), ts(5), device);
        assert_eq!(a.key(), b.key());
    }
}
