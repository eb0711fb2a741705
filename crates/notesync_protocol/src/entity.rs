//! Typed entity payloads.
//!
//! Each synchronized entity type carries its own payload struct, so a
//! delta can never pair a note ID with a relation body.

use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of entity a delta refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A note.
    Note,
    /// A reflection attached to a note.
    Reflection,
    /// A directed relation between two notes.
    Relation,
}

impl EntityType {
    /// All entity types, in a stable order.
    pub const ALL: [EntityType; 3] = [EntityType::Note, EntityType::Reflection, EntityType::Relation];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Note => "note",
            EntityType::Reflection => "reflection",
            EntityType::Relation => "relation",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Note state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Title.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Reflection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    /// The note this reflection belongs to.
    pub note_id: EntityId,
    /// Reflection text.
    pub content: String,
}

/// How two notes are related.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Source cites target.
    References,
    /// Source supports target.
    Supports,
    /// Source contradicts target.
    Contradicts,
    /// Generic association.
    Related,
}

/// Relation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Origin note.
    pub source_id: EntityId,
    /// Destination note.
    pub target_id: EntityId,
    /// Relation kind.
    pub kind: RelationKind,
}

/// Serialized entity state, tagged by entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityPayload {
    /// Note payload.
    Note(Note),
    /// Reflection payload.
    Reflection(Reflection),
    /// Relation payload.
    Relation(Relation),
}

impl EntityPayload {
    /// Returns the entity type this payload describes.
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityPayload::Note(_) => EntityType::Note,
            EntityPayload::Reflection(_) => EntityType::Reflection,
            EntityPayload::Relation(_) => EntityType::Relation,
        }
    }

    /// Convenience constructor for a note payload.
    pub fn note(title: impl Into<String>, body: impl Into<String>) -> Self {
        EntityPayload::Note(Note {
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_reports_its_type() {
        assert_eq!(EntityPayload::note("t", "b").entity_type(), EntityType::Note);

        let reflection = EntityPayload::Reflection(Reflection {
            note_id: EntityId::new(),
            content: "later".into(),
        });
        assert_eq!(reflection.entity_type(), EntityType::Reflection);
    }

    #[test]
    fn payload_json_is_tagged() {
        let json = serde_json::to_value(EntityPayload::note("Groceries", "milk")).unwrap();
        assert_eq!(json["type"], "note");
        assert_eq!(json["title"], "Groceries");
        assert_eq!(json["tags"], serde_json::json!([]));
    }

    #[test]
    fn relation_kind_wire_names() {
        let json = serde_json::to_string(&RelationKind::Contradicts).unwrap();
        assert_eq!(json, "\"contradicts\"");
    }

    #[test]
    fn entity_type_display_matches_wire_name() {
        for ty in EntityType::ALL {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{ty}\""));
        }
    }
}
