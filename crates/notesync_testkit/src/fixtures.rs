//! Device and cluster fixtures.
//!
//! A [`TestDevice`] is a complete client: local store, secure store, HTTP
//! transport over a [`FlakyClient`] and a coordinator. A [`TestCluster`]
//! is a set of devices sharing one in-process server.

use crate::endpoint::ServerEndpoint;
use crate::faults::FlakyClient;
use notesync_engine::{
    DeviceIdentityProvider, HttpTransport, LoopbackClient, MemoryLocalStore, RetryConfig,
    SyncConfig, SyncCoordinator, SyncCycleResult, SyncOrchestrator,
};
use notesync_protocol::{DeviceId, EntityId, EntityPayload, EntityType};
use notesync_server::{ServerConfig, SyncServer};
use notesync_storage::{FileStore, KeyValueStore, MemoryStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// HTTP client used by test devices.
pub type DeviceClient = FlakyClient<LoopbackClient<ServerEndpoint>>;
/// Transport used by test devices.
pub type DeviceTransport = HttpTransport<DeviceClient>;
/// Coordinator used by test devices.
pub type DeviceCoordinator = SyncCoordinator<DeviceTransport, Arc<MemoryLocalStore>>;

/// Base URL test devices believe they talk to.
pub const TEST_BASE_URL: &str = "http://sync.test";

/// Retry settings that keep tests fast while still backing off.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new(3)
        .with_initial_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(20))
}

/// Sync settings for tests: fast retries, no status reset delay.
pub fn test_sync_config() -> SyncConfig {
    SyncConfig::new()
        .with_retry(fast_retry())
        .with_success_reset_delay(Duration::ZERO)
}

/// A simulated client device.
pub struct TestDevice {
    /// Identity of the device.
    pub device_id: DeviceId,
    /// On-device entity store.
    pub local: Arc<MemoryLocalStore>,
    /// Store holding the identity and checkpoint.
    pub secure: Arc<dyn KeyValueStore>,
    /// Coordinator driving sync for this device.
    pub coordinator: Arc<DeviceCoordinator>,
    /// Kept alive so a file-backed secure store is not removed.
    _temp_dir: Option<TempDir>,
}

impl TestDevice {
    /// Creates a device with an in-memory secure store.
    pub async fn new(server: &Arc<SyncServer>, config: SyncConfig) -> Self {
        Self::build(server, config, Arc::new(MemoryStore::new()), None).await
    }

    /// Creates a device whose secure store is a file in a temp directory.
    ///
    /// # Panics
    ///
    /// Panics if the temp directory or store cannot be created.
    pub async fn persistent(server: &Arc<SyncServer>, config: SyncConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(temp_dir.path()).expect("Failed to open file store");
        Self::build(server, config, Arc::new(store), Some(temp_dir)).await
    }

    async fn build(
        server: &Arc<SyncServer>,
        config: SyncConfig,
        secure: Arc<dyn KeyValueStore>,
        temp_dir: Option<TempDir>,
    ) -> Self {
        // Resolve the identity up front so local edits carry the same id
        // the orchestrator will push under.
        let device_id = DeviceIdentityProvider::new(Arc::clone(&secure))
            .get_device_id()
            .await;
        let local = Arc::new(MemoryLocalStore::new(device_id));
        let client = FlakyClient::new(LoopbackClient::new(ServerEndpoint::new(Arc::clone(
            server,
        ))));
        let orchestrator = SyncOrchestrator::new(
            config,
            HttpTransport::new(TEST_BASE_URL, client),
            Arc::clone(&local),
            Arc::clone(&secure),
        );

        Self {
            device_id,
            local,
            secure,
            coordinator: Arc::new(SyncCoordinator::new(orchestrator)),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the device's transport.
    pub fn transport(&self) -> &DeviceTransport {
        self.coordinator.orchestrator().transport()
    }

    /// Returns the fault-injecting HTTP client.
    pub fn client(&self) -> &DeviceClient {
        self.transport().client()
    }

    /// Runs one sync through the coordinator.
    pub async fn sync(&self) -> SyncCycleResult {
        self.coordinator.sync_now().await
    }

    /// Live entities on this device.
    pub fn entities(&self) -> BTreeMap<(EntityType, EntityId), EntityPayload> {
        self.local.entities()
    }
}

impl std::fmt::Debug for TestDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDevice")
            .field("device_id", &self.device_id)
            .field("pending", &self.local.pending_count())
            .finish_non_exhaustive()
    }
}

/// Several devices sharing one server.
#[derive(Debug)]
pub struct TestCluster {
    /// The shared server.
    pub server: Arc<SyncServer>,
    devices: Vec<TestDevice>,
}

impl TestCluster {
    /// Creates `count` devices with test defaults.
    pub async fn new(count: usize) -> Self {
        Self::with_config(count, ServerConfig::default(), test_sync_config()).await
    }

    /// Creates `count` devices with explicit configuration.
    pub async fn with_config(count: usize, server: ServerConfig, sync: SyncConfig) -> Self {
        let server = Arc::new(SyncServer::new(server));
        let mut devices = Vec::with_capacity(count);
        for _ in 0..count {
            devices.push(TestDevice::new(&server, sync.clone()).await);
        }
        Self { server, devices }
    }

    /// Returns device `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn device(&self, index: usize) -> &TestDevice {
        &self.devices[index]
    }

    /// Returns every device.
    pub fn devices(&self) -> &[TestDevice] {
        &self.devices
    }

    /// Syncs every device twice in turn so each one sees every push.
    pub async fn settle(&self) -> Vec<SyncCycleResult> {
        let mut results = Vec::with_capacity(self.devices.len() * 2);
        for _ in 0..2 {
            for device in &self.devices {
                results.push(device.sync().await);
            }
        }
        results
    }

    /// Returns true if every device and the server hold the same entities.
    pub fn converged(&self) -> bool {
        let expected = self.server.live_entities();
        self.devices.iter().all(|d| d.entities() == expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use notesync_engine::SyncStatus;

    #[tokio::test]
    async fn devices_get_distinct_identities() {
        let cluster = TestCluster::new(3).await;
        let ids: std::collections::HashSet<_> =
            cluster.devices().iter().map(|d| d.device_id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn cluster_settles() {
        let cluster = TestCluster::new(2).await;
        cluster
            .device(0)
            .local
            .create(EntityPayload::note("t", "b"), Utc::now());

        let results = cluster.settle().await;

        assert!(results.iter().all(|r| r.success));
        assert!(cluster.converged());
        assert_eq!(cluster.device(1).entities().len(), 1);
        let state = cluster.device(1).coordinator.status().snapshot();
        assert!(state.last_sync_success);
        assert_ne!(state.status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn persistent_device_keeps_checkpoint_on_disk() {
        let server = Arc::new(SyncServer::new(ServerConfig::default()));
        let device = TestDevice::persistent(&server, test_sync_config()).await;
        device.local.create(EntityPayload::note("t", ""), Utc::now());

        assert!(device.sync().await.success);

        let stored = device.secure.get(notesync_engine::CHECKPOINT_KEY).await.unwrap();
        assert_eq!(stored.as_deref(), Some("1"));
    }
}
