//! Server-side change log.

use chrono::{DateTime, Utc};
use notesync_protocol::{
    ChangeKey, Delta, DeviceId, EntityId, EntityPayload, EntityType, Operation, RejectedChange,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Latest accepted state of one entity.
#[derive(Debug, Clone)]
struct EntityVersion {
    payload: Option<EntityPayload>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct OplogInner {
    /// Changes in commit order; entry `i` has sequence `i + 1`.
    entries: Vec<Delta>,
    /// Keys of every change ever appended.
    seen: HashSet<ChangeKey>,
    /// Last-writer-wins view of every entity.
    entities: HashMap<(EntityType, EntityId), EntityVersion>,
}

/// Result of appending one push batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Changes newly appended to the log.
    pub appended: u32,
    /// Changes already present, acknowledged without appending.
    pub duplicates: u32,
    /// Changes refused by validation.
    pub rejected: Vec<RejectedChange>,
}

impl AppendOutcome {
    /// Number of changes the client may consider delivered.
    pub fn accepted(&self) -> u32 {
        self.appended + self.duplicates
    }
}

/// Server-side operation log.
///
/// The log maintains:
/// - All accepted changes in commit order
/// - The set of change keys seen, for idempotent pushes
/// - A last-writer-wins view of every entity
///
/// Sequences start at 1; sequence 0 means "nothing pulled yet".
#[derive(Debug, Default)]
pub struct ServerOplog {
    inner: RwLock<OplogInner>,
}

impl ServerOplog {
    /// Creates a new empty oplog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sequence of the newest change, 0 if empty.
    pub fn sequence(&self) -> u64 {
        self.inner.read().entries.len() as u64
    }

    /// Returns up to `limit` changes with a sequence greater than `after`,
    /// the sequence of the last returned change, and whether more remain.
    pub fn changes_since(&self, after: u64, limit: u32) -> (Vec<Delta>, u64, bool) {
        let inner = self.inner.read();
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(inner.entries.len());
        let end = start.saturating_add(limit as usize).min(inner.entries.len());
        let changes = inner.entries[start..end].to_vec();
        let last = if changes.is_empty() { after } else { end as u64 };
        (changes, last, end < inner.entries.len())
    }

    /// Appends a push batch atomically.
    ///
    /// The whole batch is validated and appended under one lock, so a pull
    /// never observes half of it. Changes whose key was already seen are
    /// acknowledged as duplicates.
    pub fn append(&self, changes: &[Delta]) -> AppendOutcome {
        let mut inner = self.inner.write();
        let mut outcome = AppendOutcome::default();

        for delta in changes {
            if let Some(reason) = validate(delta) {
                outcome.rejected.push(RejectedChange {
                    entity_type: delta.entity_type(),
                    entity_id: delta.entity_id(),
                    client_timestamp: delta.client_timestamp(),
                    reason,
                });
                continue;
            }
            if !inner.seen.insert(delta.key()) {
                outcome.duplicates += 1;
                continue;
            }

            let key = (delta.entity_type(), delta.entity_id());
            let newer = inner
                .entities
                .get(&key)
                .map_or(true, |current| delta.client_timestamp() >= current.timestamp);
            if newer {
                inner.entities.insert(
                    key,
                    EntityVersion {
                        payload: delta.payload().cloned(),
                        timestamp: delta.client_timestamp(),
                    },
                );
            }
            inner.entries.push(delta.clone());
            outcome.appended += 1;
        }

        outcome
    }

    /// Returns the winning state of an entity; `None` if unknown or deleted.
    pub fn entity(&self, entity_type: EntityType, entity_id: EntityId) -> Option<EntityPayload> {
        self.inner
            .read()
            .entities
            .get(&(entity_type, entity_id))
            .and_then(|v| v.payload.clone())
    }

    /// Returns every live entity, ordered by type and id.
    pub fn live_entities(&self) -> BTreeMap<(EntityType, EntityId), EntityPayload> {
        self.inner
            .read()
            .entities
            .iter()
            .filter_map(|(key, v)| v.payload.clone().map(|p| (*key, p)))
            .collect()
    }

    /// Returns the distinct devices that have pushed changes.
    pub fn devices(&self) -> HashSet<DeviceId> {
        self.inner.read().entries.iter().map(Delta::device_id).collect()
    }

    /// Returns the number of changes.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if the oplog is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

fn validate(delta: &Delta) -> Option<String> {
    match (delta.operation(), delta.payload()) {
        (Operation::Create, Some(EntityPayload::Note(note))) if note.title.trim().is_empty() => {
            Some("note title must not be empty".to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn note(id: EntityId, title: &str, at: i64, device: DeviceId) -> Delta {
        Delta::update(id, EntityPayload::note(title, "body"), ts(at), device)
    }

    #[test]
    fn new_oplog_is_empty() {
        let oplog = ServerOplog::new();
        assert!(oplog.is_empty());
        assert_eq!(oplog.sequence(), 0);
        let (changes, last, more) = oplog.changes_since(0, 10);
        assert!(changes.is_empty());
        assert_eq!(last, 0);
        assert!(!more);
    }

    #[test]
    fn append_assigns_sequences() {
        let oplog = ServerOplog::new();
        let device = DeviceId::generate();
        let outcome = oplog.append(&[
            note(EntityId::new(), "a", 1, device),
            note(EntityId::new(), "b", 2, device),
        ]);

        assert_eq!(outcome.appended, 2);
        assert_eq!(oplog.sequence(), 2);
        assert_eq!(oplog.devices().len(), 1);
    }

    #[test]
    fn duplicate_push_is_idempotent() {
        let oplog = ServerOplog::new();
        let device = DeviceId::generate();
        let batch = vec![note(EntityId::new(), "a", 1, device)];

        oplog.append(&batch);
        let outcome = oplog.append(&batch);

        assert_eq!(outcome.appended, 0);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.accepted(), 1);
        assert_eq!(oplog.len(), 1);
    }

    #[test]
    fn changes_since_pages() {
        let oplog = ServerOplog::new();
        let device = DeviceId::generate();
        let batch: Vec<_> = (0..5)
            .map(|i| note(EntityId::new(), "n", i, device))
            .collect();
        oplog.append(&batch);

        let (first, last, more) = oplog.changes_since(0, 2);
        assert_eq!(first.len(), 2);
        assert_eq!(last, 2);
        assert!(more);

        let (rest, last, more) = oplog.changes_since(last, 10);
        assert_eq!(rest.len(), 3);
        assert_eq!(last, 5);
        assert!(!more);

        let (beyond, last, more) = oplog.changes_since(99, 10);
        assert!(beyond.is_empty());
        assert_eq!(last, 99);
        assert!(!more);
    }

    #[test]
    fn entity_view_is_last_writer_wins() {
        let oplog = ServerOplog::new();
        let (a, b) = (DeviceId::generate(), DeviceId::generate());
        let id = EntityId::new();

        // Newer edit arrives first; the older one must not overwrite it
        oplog.append(&[note(id, "from b", 5, b)]);
        oplog.append(&[note(id, "from a", 0, a)]);

        assert_eq!(oplog.len(), 2);
        assert_eq!(
            oplog.entity(EntityType::Note, id),
            Some(EntityPayload::note("from b", "body"))
        );
    }

    #[test]
    fn delete_hides_entity() {
        let oplog = ServerOplog::new();
        let device = DeviceId::generate();
        let id = EntityId::new();
        oplog.append(&[
            note(id, "n", 1, device),
            Delta::delete(EntityType::Note, id, ts(2), device),
        ]);

        assert!(oplog.entity(EntityType::Note, id).is_none());
        assert!(oplog.live_entities().is_empty());
    }

    #[test]
    fn empty_title_create_is_rejected() {
        let oplog = ServerOplog::new();
        let device = DeviceId::generate();
        let bad = Delta::create(EntityId::new(), EntityPayload::note("  ", "x"), ts(1), device);
        let good = Delta::create(EntityId::new(), EntityPayload::note("ok", "x"), ts(2), device);

        let outcome = oplog.append(&[bad.clone(), good]);

        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].entity_id, bad.entity_id());
        assert!(outcome.rejected[0].reason.contains("title"));
    }
}
