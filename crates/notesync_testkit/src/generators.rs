//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use crate::simulation::{Edit, EditAction};
use chrono::{DateTime, TimeZone, Utc};
use notesync_protocol::{
    Delta, DeviceId, EntityId, EntityPayload, EntityType, Note, Reflection, Relation,
    RelationKind,
};
use proptest::prelude::*;
use uuid::Uuid;

/// Strategy for generating entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    any::<u128>().prop_map(|bits| EntityId::from_uuid(Uuid::from_u128(bits)))
}

/// Strategy for generating device IDs.
pub fn device_id_strategy() -> impl Strategy<Value = DeviceId> {
    any::<u128>().prop_map(|bits| DeviceId::from_uuid(Uuid::from_u128(bits)))
}

/// Strategy for generating timestamps within 2024, second precision.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (1_704_067_200i64..1_735_689_600).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    })
}

/// Strategy for generating titles the server accepts (never blank).
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,23}").expect("Invalid regex")
}

/// Strategy for generating free text.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z ]{0,64}").expect("Invalid regex")
}

/// Strategy for generating note payloads.
pub fn note_strategy() -> impl Strategy<Value = EntityPayload> {
    (
        title_strategy(),
        text_strategy(),
        prop::collection::vec("[a-z]{1,8}", 0..3),
    )
        .prop_map(|(title, body, tags)| EntityPayload::Note(Note { title, body, tags }))
}

/// Strategy for generating relation kinds.
pub fn relation_kind_strategy() -> impl Strategy<Value = RelationKind> {
    prop_oneof![
        Just(RelationKind::References),
        Just(RelationKind::Supports),
        Just(RelationKind::Contradicts),
        Just(RelationKind::Related),
    ]
}

/// Strategy for generating payloads of any entity type.
pub fn entity_payload_strategy() -> impl Strategy<Value = EntityPayload> {
    prop_oneof![
        3 => note_strategy(),
        1 => (entity_id_strategy(), text_strategy())
            .prop_map(|(note_id, content)| EntityPayload::Reflection(Reflection { note_id, content })),
        1 => (entity_id_strategy(), entity_id_strategy(), relation_kind_strategy()).prop_map(
            |(source_id, target_id, kind)| EntityPayload::Relation(Relation {
                source_id,
                target_id,
                kind,
            })
        ),
    ]
}

/// Strategy for generating entity types.
pub fn entity_type_strategy() -> impl Strategy<Value = EntityType> {
    prop::sample::select(EntityType::ALL.to_vec())
}

/// Strategy for generating valid deltas of every operation.
pub fn delta_strategy() -> impl Strategy<Value = Delta> {
    (
        0u8..3,
        entity_id_strategy(),
        entity_payload_strategy(),
        entity_type_strategy(),
        timestamp_strategy(),
        device_id_strategy(),
    )
        .prop_map(|(op, id, payload, ty, at, device)| match op {
            0 => Delta::create(id, payload, at, device),
            1 => Delta::update(id, payload, at, device),
            _ => Delta::delete(ty, id, at, device),
        })
}

/// Strategy for generating one edit on one of `devices` devices.
pub fn edit_strategy(devices: usize) -> impl Strategy<Value = Edit> {
    let devices = devices.max(1);
    let action = prop_oneof![
        4 => entity_payload_strategy().prop_map(EditAction::Create),
        4 => (any::<usize>(), text_strategy())
            .prop_map(|(target, text)| EditAction::Update { target, text }),
        1 => any::<usize>().prop_map(|target| EditAction::Delete { target }),
        1 => Just(EditAction::Sync),
    ];
    (0..devices, action).prop_map(|(device, action)| Edit { device, action })
}

/// Strategy for generating an edit script of up to `max_edits` edits.
pub fn edit_script_strategy(devices: usize, max_edits: usize) -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(edit_strategy(devices), 0..=max_edits)
}
