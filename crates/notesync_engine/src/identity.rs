//! Device identity.

use notesync_protocol::DeviceId;
use notesync_storage::KeyValueStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key under which the device identity is persisted.
pub const DEVICE_ID_KEY: &str = "notesync.device_id";

/// A device identifier and whether it survived a round trip to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// The identifier.
    pub id: DeviceId,
    /// False when persistence failed and the id is ephemeral.
    pub persisted: bool,
}

/// Supplies the stable per-install device identifier.
///
/// The first successful lookup is cached. Persistence failures are logged
/// and degrade to a fresh, unpersisted identifier on every call; they are
/// never returned to the caller.
pub struct DeviceIdentityProvider {
    store: Arc<dyn KeyValueStore>,
    cached: RwLock<Option<DeviceId>>,
}

impl DeviceIdentityProvider {
    /// Creates a provider backed by `store`.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cached: RwLock::new(None),
        }
    }

    /// Returns the device identifier, creating and persisting one if needed.
    pub async fn get_device_id(&self) -> DeviceId {
        self.identity().await.id
    }

    /// Like [`get_device_id`](Self::get_device_id) but reports whether the
    /// identifier is persisted.
    pub async fn identity(&self) -> DeviceIdentity {
        if let Some(id) = *self.cached.read() {
            return DeviceIdentity {
                id,
                persisted: true,
            };
        }

        match self.load_or_create().await {
            Ok(id) => {
                *self.cached.write() = Some(id);
                DeviceIdentity {
                    id,
                    persisted: true,
                }
            }
            Err(e) => {
                let id = DeviceId::generate();
                warn!(error = %e, device_id = %id, "device identity unavailable, using ephemeral id");
                DeviceIdentity {
                    id,
                    persisted: false,
                }
            }
        }
    }

    async fn load_or_create(&self) -> notesync_storage::StorageResult<DeviceId> {
        if let Some(raw) = self.store.get(DEVICE_ID_KEY).await? {
            match raw.parse::<DeviceId>() {
                Ok(id) => {
                    debug!(device_id = %id, "loaded device identity");
                    return Ok(id);
                }
                Err(e) => warn!(error = %e, "stored device identity is invalid, replacing it"),
            }
        }

        let id = DeviceId::generate();
        self.store.set(DEVICE_ID_KEY, &id.to_string()).await?;
        info!(device_id = %id, "created device identity");
        Ok(id)
    }
}

impl std::fmt::Debug for DeviceIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentityProvider")
            .field("cached", &*self.cached.read())
            .finish_non_exhaustive()
    }
}
