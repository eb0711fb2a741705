//! Local store collaborator.
//!
//! The sync engine never touches the on-device schema directly. It reads
//! pending deltas, acknowledges them, asks for last-modified times and
//! applies pulled batches through [`LocalStore`].

use crate::conflict::{resolve_lww, Conflict, ConflictResolution};
use crate::error::{SyncError, SyncResult};
use crate::outbox::Outbox;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notesync_protocol::{Delta, DeviceId, EntityId, EntityPayload, EntityType};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A recorded delta together with its local sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelta {
    /// Local sequence number, increasing in creation order.
    pub seq: u64,
    /// The delta.
    pub delta: Delta,
}

/// Access to the on-device store.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Every unacknowledged delta, in creation order.
    async fn pending_deltas(&self) -> SyncResult<Vec<PendingDelta>>;

    /// Marks every delta with `seq <= up_to` as acknowledged.
    async fn acknowledge(&self, up_to: u64) -> SyncResult<()>;

    /// Time of the last local or applied change to an entity, deletions
    /// included. `None` if the entity was never seen.
    async fn last_modified(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> SyncResult<Option<DateTime<Utc>>>;

    /// Applies remote changes as one unit: either all of them or none.
    ///
    /// The caller has already resolved `changes` against [`last_modified`],
    /// but a local edit can land between that read and this call. Stores
    /// must repeat the last-writer-wins check under the same lock that
    /// guards the write, skip any change that is now strictly older than
    /// the local copy, and return those as conflicts.
    ///
    /// Applying a change that is already applied must be harmless.
    ///
    /// [`last_modified`]: LocalStore::last_modified
    async fn apply_remote(&self, changes: &[Delta]) -> SyncResult<Vec<Conflict>>;
}

#[async_trait]
impl<L: LocalStore + ?Sized> LocalStore for std::sync::Arc<L> {
    async fn pending_deltas(&self) -> SyncResult<Vec<PendingDelta>> {
        (**self).pending_deltas().await
    }

    async fn acknowledge(&self, up_to: u64) -> SyncResult<()> {
        (**self).acknowledge(up_to).await
    }

    async fn last_modified(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> SyncResult<Option<DateTime<Utc>>> {
        (**self).last_modified(entity_type, entity_id).await
    }

    async fn apply_remote(&self, changes: &[Delta]) -> SyncResult<Vec<Conflict>> {
        (**self).apply_remote(changes).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EntityRecord {
    /// `None` once deleted.
    payload: Option<EntityPayload>,
    modified: DateTime<Utc>,
}

type EntityKey = (EntityType, EntityId);

#[derive(Debug, Default)]
struct Inner {
    entities: HashMap<EntityKey, EntityRecord>,
    outbox: Outbox,
}

/// In-memory [`LocalStore`] with a small CRUD surface.
///
/// Local edits take an explicit timestamp and are recorded as deltas
/// attributed to the store's device. Deleted entities keep a tombstone so
/// their deletion time still takes part in conflict resolution.
#[derive(Debug)]
pub struct MemoryLocalStore {
    device_id: DeviceId,
    inner: RwLock<Inner>,
    /// Index within the next applied batch at which to fail, once.
    fail_apply_at: Mutex<Option<usize>>,
}

impl MemoryLocalStore {
    /// Creates an empty store whose edits are attributed to `device_id`.
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            inner: RwLock::new(Inner::default()),
            fail_apply_at: Mutex::new(None),
        }
    }

    /// Device that local edits are attributed to.
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Creates an entity and records the delta.
    pub fn create(&self, payload: EntityPayload, at: DateTime<Utc>) -> EntityId {
        let id = EntityId::new();
        self.record(Delta::create(id, payload, at, self.device_id));
        id
    }

    /// Overwrites an entity and records the delta.
    pub fn update(&self, entity_id: EntityId, payload: EntityPayload, at: DateTime<Utc>) {
        self.record(Delta::update(entity_id, payload, at, self.device_id));
    }

    /// Deletes an entity and records the delta.
    pub fn delete(&self, entity_type: EntityType, entity_id: EntityId, at: DateTime<Utc>) {
        self.record(Delta::delete(entity_type, entity_id, at, self.device_id));
    }

    fn record(&self, delta: Delta) {
        let mut inner = self.inner.write();
        inner.entities.insert(
            (delta.entity_type(), delta.entity_id()),
            EntityRecord {
                payload: delta.payload().cloned(),
                modified: delta.client_timestamp(),
            },
        );
        let seq = inner.outbox.append(delta);
        debug!(seq, "recorded local delta");
    }

    /// Returns the live state of an entity.
    pub fn get(&self, entity_type: EntityType, entity_id: EntityId) -> Option<EntityPayload> {
        self.inner
            .read()
            .entities
            .get(&(entity_type, entity_id))
            .and_then(|r| r.payload.clone())
    }

    /// Every live entity, ordered by type and id.
    pub fn entities(&self) -> BTreeMap<EntityKey, EntityPayload> {
        self.inner
            .read()
            .entities
            .iter()
            .filter_map(|(k, r)| r.payload.clone().map(|p| (*k, p)))
            .collect()
    }

    /// Number of unacknowledged deltas.
    pub fn pending_count(&self) -> usize {
        self.inner.read().outbox.pending_count()
    }

    /// Makes the next `apply_remote` fail at change `index`, leaving the
    /// store unchanged.
    pub fn fail_next_apply_at(&self, index: usize) {
        *self.fail_apply_at.lock() = Some(index);
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn pending_deltas(&self) -> SyncResult<Vec<PendingDelta>> {
        Ok(self.inner.read().outbox.pending().cloned().collect())
    }

    async fn acknowledge(&self, up_to: u64) -> SyncResult<()> {
        self.inner.write().outbox.acknowledge_up_to(up_to);
        Ok(())
    }

    async fn last_modified(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> SyncResult<Option<DateTime<Utc>>> {
        Ok(self
            .inner
            .read()
            .entities
            .get(&(entity_type, entity_id))
            .map(|r| r.modified))
    }

    async fn apply_remote(&self, changes: &[Delta]) -> SyncResult<Vec<Conflict>> {
        let fail_at = self.fail_apply_at.lock().take();
        let mut inner = self.inner.write();

        let mut staged: HashMap<EntityKey, EntityRecord> = HashMap::new();
        let mut lost = Vec::new();
        for (index, change) in changes.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(SyncError::Apply(format!(
                    "injected failure at change {index} ({} {})",
                    change.entity_type(),
                    change.entity_id()
                )));
            }
            let key = (change.entity_type(), change.entity_id());
            let current = staged
                .get(&key)
                .or_else(|| inner.entities.get(&key))
                .map(|r| r.modified);
            if let (ConflictResolution::KeepLocal, Some(local)) =
                (resolve_lww(current, change.client_timestamp()), current)
            {
                debug!(entity_id = %key.1, local = %local, "local edit landed first, skipping");
                lost.push(Conflict::discarded(change, local));
                continue;
            }
            staged.insert(
                key,
                EntityRecord {
                    payload: change.payload().cloned(),
                    modified: change.client_timestamp(),
                },
            );
        }

        inner.entities.extend(staged);
        Ok(lost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn edits_are_recorded_in_order() {
        let store = MemoryLocalStore::new(DeviceId::generate());
        let id = store.create(EntityPayload::note("a", ""), at(1));
        store.update(id, EntityPayload::note("b", ""), at(2));
        store.delete(EntityType::Note, id, at(3));

        let pending = store.pending_deltas().await.unwrap();
        let seqs: Vec<u64> = pending.iter().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(pending.iter().all(|p| p.delta.device_id() == store.device_id()));

        assert!(store.get(EntityType::Note, id).is_none());
        assert_eq!(
            store.last_modified(EntityType::Note, id).await.unwrap(),
            Some(at(3))
        );
    }

    #[tokio::test]
    async fn acknowledge_clears_pending() {
        let store = MemoryLocalStore::new(DeviceId::generate());
        store.create(EntityPayload::note("a", ""), at(1));
        store.create(EntityPayload::note("b", ""), at(2));

        store.acknowledge(1).await.unwrap();
        assert_eq!(store.pending_count(), 1);
        store.acknowledge(2).await.unwrap();
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn apply_remote_is_all_or_nothing() {
        let store = MemoryLocalStore::new(DeviceId::generate());
        let remote = DeviceId::generate();
        let changes = vec![
            Delta::create(EntityId::new(), EntityPayload::note("x", ""), at(5), remote),
            Delta::create(EntityId::new(), EntityPayload::note("y", ""), at(6), remote),
        ];

        store.fail_next_apply_at(1);
        let err = store.apply_remote(&changes).await.unwrap_err();
        assert!(matches!(err, SyncError::Apply(_)));
        assert!(store.entities().is_empty());

        assert!(store.apply_remote(&changes).await.unwrap().is_empty());
        assert_eq!(store.entities().len(), 2);
        // Re-applying is harmless.
        assert!(store.apply_remote(&changes).await.unwrap().is_empty());
        assert_eq!(store.entities().len(), 2);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn apply_remote_keeps_newer_local_edit() {
        let store = MemoryLocalStore::new(DeviceId::generate());
        let id = store.create(EntityPayload::note("local", ""), at(10));
        let other = EntityId::new();
        let remote = DeviceId::generate();
        let changes = vec![
            Delta::update(id, EntityPayload::note("remote", ""), at(5), remote),
            Delta::create(other, EntityPayload::note("fresh", ""), at(5), remote),
        ];

        let lost = store.apply_remote(&changes).await.unwrap();

        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].entity_id, id);
        assert_eq!(lost[0].local_modified, at(10));
        assert_eq!(
            store.get(EntityType::Note, id),
            Some(EntityPayload::note("local", ""))
        );
        assert!(store.get(EntityType::Note, other).is_some());
    }

    #[tokio::test]
    async fn unknown_entity_has_no_last_modified() {
        let store = MemoryLocalStore::new(DeviceId::generate());
        let modified = store
            .last_modified(EntityType::Relation, EntityId::new())
            .await
            .unwrap();
        assert!(modified.is_none());
    }
}
