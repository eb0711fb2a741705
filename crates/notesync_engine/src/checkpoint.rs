//! Persisted pull checkpoint.

use crate::error::SyncResult;
use notesync_protocol::Checkpoint;
use notesync_storage::KeyValueStore;
use std::sync::Arc;
use tracing::debug;

/// Key under which the pull checkpoint is persisted.
pub const CHECKPOINT_KEY: &str = "notesync.checkpoint";

/// Reads and writes the pull checkpoint.
#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn KeyValueStore>,
}

impl CheckpointStore {
    /// Creates a checkpoint store backed by `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads the checkpoint; the initial checkpoint if none was stored.
    pub async fn load(&self) -> SyncResult<Checkpoint> {
        let raw = self.store.get(CHECKPOINT_KEY).await?;
        Ok(raw.map(Checkpoint::new).unwrap_or_default())
    }

    /// Stores `checkpoint`.
    pub async fn save(&self, checkpoint: &Checkpoint) -> SyncResult<()> {
        self.store.set(CHECKPOINT_KEY, checkpoint.as_str()).await?;
        debug!(checkpoint = %checkpoint, "checkpoint advanced");
        Ok(())
    }

    /// Forgets the checkpoint so the next pull starts from the beginning.
    pub async fn reset(&self) -> SyncResult<()> {
        self.store.delete(CHECKPOINT_KEY).await?;
        Ok(())
    }
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore").finish_non_exhaustive()
    }
}
