//! End-to-end sync between devices through the reference server.

use chrono::{DateTime, TimeZone, Utc};
use notesync_engine::{
    HttpTransport, LoopbackClient, MemoryLocalStore, RetryConfig, SkipReason, SyncConfig,
    SyncOrchestrator, DEVICE_ID_KEY,
};
use notesync_protocol::{Checkpoint, DeviceId, EntityId, EntityPayload, EntityType};
use notesync_server::{ServerConfig, SyncServer};
use notesync_storage::MemoryStore;
use notesync_testkit::ServerEndpoint;
use std::sync::Arc;

type Transport = HttpTransport<LoopbackClient<ServerEndpoint>>;

struct Device {
    local: Arc<MemoryLocalStore>,
    orchestrator: SyncOrchestrator<Transport, Arc<MemoryLocalStore>>,
}

impl Device {
    fn new(server: &Arc<SyncServer>, config: SyncConfig) -> Self {
        let device_id = DeviceId::generate();
        let secure = Arc::new(MemoryStore::new());
        secure.insert(DEVICE_ID_KEY, device_id.to_string());

        let local = Arc::new(MemoryLocalStore::new(device_id));
        let transport = HttpTransport::new(
            "http://sync.local",
            LoopbackClient::new(ServerEndpoint::new(Arc::clone(server))),
        );
        let orchestrator = SyncOrchestrator::new(
            config.with_retry(RetryConfig::no_retry()),
            transport,
            Arc::clone(&local),
            secure,
        );
        Self {
            local,
            orchestrator,
        }
    }

    async fn sync(&self) {
        let result = self.orchestrator.manual_sync().await;
        assert!(result.success, "sync failed: {:?}", result.error);
    }
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
}

/// Creates note N on device A and gets it onto device B.
async fn shared_note(server: &Arc<SyncServer>) -> (Device, Device, EntityId) {
    let a = Device::new(server, SyncConfig::new());
    let b = Device::new(server, SyncConfig::new());
    let id = a.local.create(EntityPayload::note("N", "original"), at(9, 0, 0));
    a.sync().await;
    b.sync().await;
    assert_eq!(
        b.local.get(EntityType::Note, id),
        Some(EntityPayload::note("N", "original"))
    );
    (a, b, id)
}

async fn converge_offline_edits(a_first: bool) {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let (a, b, id) = shared_note(&server).await;

    a.local.update(id, EntityPayload::note("N", "from A"), at(10, 0, 0));
    b.local.update(id, EntityPayload::note("N", "from B"), at(10, 0, 5));

    let (first, second) = if a_first { (&a, &b) } else { (&b, &a) };
    first.sync().await;
    second.sync().await;
    first.sync().await;

    let expected = Some(EntityPayload::note("N", "from B"));
    assert_eq!(a.local.get(EntityType::Note, id), expected);
    assert_eq!(b.local.get(EntityType::Note, id), expected);
    assert_eq!(server.entity(EntityType::Note, id), expected);
    assert_eq!(a.local.entities(), b.local.entities());
}

#[tokio::test]
async fn offline_edits_converge_when_a_pushes_first() {
    converge_offline_edits(true).await;
}

#[tokio::test]
async fn offline_edits_converge_when_b_pushes_first() {
    converge_offline_edits(false).await;
}

#[tokio::test]
async fn losing_edit_is_reported_as_conflict() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let (a, b, id) = shared_note(&server).await;

    a.local.update(id, EntityPayload::note("N", "from A"), at(10, 0, 0));
    b.local.update(id, EntityPayload::note("N", "from B"), at(10, 0, 5));
    a.sync().await;

    let result = b.orchestrator.manual_sync().await;
    assert!(result.success);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].entity_id, id);
    assert_eq!(result.conflicts[0].local_modified, at(10, 0, 5));
}

#[tokio::test]
async fn failed_apply_keeps_checkpoint() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let a = Device::new(&server, SyncConfig::new());
    let b = Device::new(&server, SyncConfig::new());
    for i in 0..3 {
        a.local
            .create(EntityPayload::note(format!("n{i}"), ""), at(9, 0, i));
    }
    a.sync().await;

    b.local.fail_next_apply_at(1);
    let result = b.orchestrator.manual_sync().await;
    assert!(!result.success);
    assert!(b.local.entities().is_empty());
    assert!(b.orchestrator.checkpoints().load().await.unwrap().is_initial());

    b.sync().await;
    assert_eq!(b.local.entities().len(), 3);
    assert_eq!(
        b.orchestrator.checkpoints().load().await.unwrap(),
        Checkpoint::new("3")
    );
}

#[tokio::test]
async fn pull_pages_through_small_batches() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let a = Device::new(&server, SyncConfig::new());
    let b = Device::new(&server, SyncConfig::new().with_pull_batch_size(2));
    for i in 0..5 {
        a.local
            .create(EntityPayload::note(format!("n{i}"), ""), at(9, 0, i));
    }
    a.sync().await;

    let result = b.orchestrator.manual_sync().await;
    assert!(result.success);
    assert_eq!(result.pull.total_processed, 5);
    assert_eq!(b.local.entities(), a.local.entities());
}

#[tokio::test]
async fn repeated_sync_is_idempotent() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let a = Device::new(&server, SyncConfig::new());
    a.local.create(EntityPayload::note("n", ""), at(9, 0, 0));

    a.sync().await;
    a.sync().await;

    assert_eq!(server.operation_count(), 1);
    assert_eq!(a.local.pending_count(), 0);
}

#[tokio::test]
async fn rejected_change_is_reported_and_not_retried() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let a = Device::new(&server, SyncConfig::new());
    a.local.create(EntityPayload::note("", "untitled"), at(9, 0, 0));
    a.local.create(EntityPayload::note("titled", ""), at(9, 0, 1));

    let result = a.orchestrator.manual_sync().await;
    assert!(result.success);
    assert_eq!(result.push.total_processed, 2);
    assert_eq!(result.push.failures.len(), 1);
    assert_eq!(a.local.pending_count(), 0);
    assert_eq!(server.live_entities().len(), 1);
}

#[tokio::test]
async fn offline_device_skips() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let a = Device::new(&server, SyncConfig::new());
    a.orchestrator.transport().set_online(false);

    let result = a.orchestrator.manual_sync().await;
    assert!(result.skipped);
    assert_eq!(result.skip_reason, Some(SkipReason::Offline));
    assert_eq!(server.sequence(), 0);
}

#[tokio::test]
async fn deletion_propagates() {
    let server = Arc::new(SyncServer::new(ServerConfig::default()));
    let (a, b, id) = shared_note(&server).await;

    a.local.delete(EntityType::Note, id, at(11, 0, 0));
    a.sync().await;
    b.sync().await;

    assert!(b.local.get(EntityType::Note, id).is_none());
    assert!(server.live_entities().is_empty());
}
