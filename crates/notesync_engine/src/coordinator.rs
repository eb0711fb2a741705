//! Wiring between sync triggers, the orchestrator and the status store.

use crate::lifecycle::{LifecycleHandlers, LifecycleMonitor};
use crate::local::LocalStore;
use crate::orchestrator::SyncOrchestrator;
use crate::result::{SkipReason, SyncCycleResult};
use crate::status::SyncStatusStore;
use crate::transport::SyncTransport;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Owns an orchestrator and the status store its results feed.
///
/// Every trigger (manual, foreground, periodic) goes through here so the
/// status store has a single writer.
pub struct SyncCoordinator<T: SyncTransport, L: LocalStore> {
    orchestrator: SyncOrchestrator<T, L>,
    status: SyncStatusStore,
}

impl<T, L> SyncCoordinator<T, L>
where
    T: SyncTransport + 'static,
    L: LocalStore + 'static,
{
    /// Creates a coordinator with a status store built from the
    /// orchestrator's configuration.
    pub fn new(orchestrator: SyncOrchestrator<T, L>) -> Self {
        let status = SyncStatusStore::from_config(orchestrator.config());
        Self::with_status(orchestrator, status)
    }

    /// Creates a coordinator feeding an existing status store.
    pub fn with_status(orchestrator: SyncOrchestrator<T, L>, status: SyncStatusStore) -> Self {
        Self {
            orchestrator,
            status,
        }
    }

    /// Returns the orchestrator.
    pub fn orchestrator(&self) -> &SyncOrchestrator<T, L> {
        &self.orchestrator
    }

    /// Returns the status store.
    pub fn status(&self) -> &SyncStatusStore {
        &self.status
    }

    /// Runs a sync now, regardless of the auto-sync toggle.
    pub async fn sync_now(&self) -> SyncCycleResult {
        let result = self.orchestrator.manual_sync_with(&self.status).await;
        self.status.handle_sync_result(&result);
        result
    }

    /// Handles the app entering the foreground.
    pub async fn on_foreground(&self) -> SyncCycleResult {
        self.auto_sync("foreground").await
    }

    async fn auto_sync(&self, trigger: &'static str) -> SyncCycleResult {
        if !self.status.snapshot().auto_sync_enabled {
            debug!(trigger, "auto-sync disabled");
            let result = SyncCycleResult::skipped(SkipReason::AutoSyncDisabled);
            self.status.handle_sync_result(&result);
            return result;
        }
        debug!(trigger, "auto-sync triggered");
        self.sync_now().await
    }

    /// Starts syncing every `interval`, first tick after one interval.
    ///
    /// The timer stops when the returned handle is dropped or stopped, or
    /// when the coordinator itself is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_periodic(self: &Arc<Self>, interval: Duration) -> PeriodicSync {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator.auto_sync("periodic").await;
            }
        });
        info!(interval_ms = interval.as_millis() as u64, "periodic sync started");
        PeriodicSync {
            handle: Some(handle),
        }
    }

    /// Starts the periodic timer at the configured `sync_interval`.
    ///
    /// Returns `None` when no interval is configured.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_scheduled(self: &Arc<Self>) -> Option<PeriodicSync> {
        match self.orchestrator.config().sync_interval {
            Some(interval) if !interval.is_zero() => Some(self.start_periodic(interval)),
            Some(_) => {
                debug!("zero sync interval, periodic sync not started");
                None
            }
            None => None,
        }
    }

    /// Syncs whenever `monitor` reports a foreground edge.
    ///
    /// Replaces any handlers previously registered on `monitor`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn attach_lifecycle(self: &Arc<Self>, monitor: &LifecycleMonitor) {
        let runtime = tokio::runtime::Handle::current();
        let weak: Weak<Self> = Arc::downgrade(self);
        monitor.init(LifecycleHandlers::new().on_foreground(move || {
            if let Some(coordinator) = weak.upgrade() {
                runtime.spawn(async move {
                    coordinator.on_foreground().await;
                });
            }
        }));
    }
}

impl<T: SyncTransport, L: LocalStore> std::fmt::Debug for SyncCoordinator<T, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("orchestrator", &self.orchestrator)
            .field("status", &self.status)
            .finish()
    }
}

/// Handle to a periodic sync timer.
#[derive(Debug)]
pub struct PeriodicSync {
    handle: Option<JoinHandle<()>>,
}

impl PeriodicSync {
    /// Stops the timer. A run already in progress is not interrupted.
    pub fn stop(mut self) {
        self.abort();
    }

    /// Returns true while the timer task is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("periodic sync stopped");
        }
    }
}

impl Drop for PeriodicSync {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, SyncConfig};
    use crate::lifecycle::{AppState, ManualAppStateSource};
    use crate::local::MemoryLocalStore;
    use crate::status::SyncStatus;
    use crate::transport::MockTransport;
    use crate::SyncError;
    use notesync_protocol::DeviceId;
    use notesync_storage::MemoryStore;

    type TestCoordinator = SyncCoordinator<Arc<MockTransport>, MemoryLocalStore>;

    fn coordinator(config: SyncConfig) -> (Arc<TestCoordinator>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let orchestrator = SyncOrchestrator::new(
            config.with_retry(RetryConfig::no_retry()),
            Arc::clone(&transport),
            MemoryLocalStore::new(DeviceId::generate()),
            Arc::new(MemoryStore::new()),
        );
        (Arc::new(SyncCoordinator::new(orchestrator)), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn sync_now_updates_status() {
        let (coordinator, _) = coordinator(SyncConfig::new());

        let result = coordinator.sync_now().await;

        assert!(result.success);
        assert_eq!(coordinator.status().status(), SyncStatus::Success);
        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(coordinator.status().status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn failure_reaches_status() {
        let (coordinator, transport) = coordinator(SyncConfig::new());
        transport.queue_pull(Err(SyncError::http(500, "boom")));

        coordinator.sync_now().await;

        let state = coordinator.status().snapshot();
        assert_eq!(state.status, SyncStatus::Error);
        assert_eq!(state.error.unwrap().message, "HTTP 500: boom");
    }

    #[tokio::test]
    async fn foreground_respects_toggle() {
        let (coordinator, transport) = coordinator(SyncConfig::new().with_auto_sync(false));

        let result = coordinator.on_foreground().await;

        assert_eq!(result.skip_reason, Some(SkipReason::AutoSyncDisabled));
        assert!(transport.pull_requests().is_empty());
        let state = coordinator.status().snapshot();
        assert_eq!(state.status, SyncStatus::Idle);
        assert!(state.error.unwrap().is_skip());

        coordinator.status().set_auto_sync_enabled(true);
        assert!(coordinator.on_foreground().await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_runs_until_stopped() {
        let (coordinator, transport) = coordinator(SyncConfig::new());

        let periodic = coordinator.start_periodic(Duration::from_secs(60));
        assert!(periodic.is_running());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(transport.pull_requests().len(), 0);

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(transport.pull_requests().len(), 2);

        periodic.stop();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(transport.pull_requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_sync_uses_configured_interval() {
        let (coordinator, transport) =
            coordinator(SyncConfig::new().with_sync_interval(Duration::from_secs(30)));

        let periodic = coordinator
            .start_scheduled()
            .expect("interval is configured");

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(transport.pull_requests().len(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.pull_requests().len(), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.pull_requests().len(), 2);

        drop(periodic);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(transport.pull_requests().len(), 2);
    }

    #[tokio::test]
    async fn no_interval_means_no_schedule() {
        let (unscheduled, _) = coordinator(SyncConfig::new());
        assert!(unscheduled.start_scheduled().is_none());

        let (zero, _) = coordinator(SyncConfig::new().with_sync_interval(Duration::ZERO));
        assert!(zero.start_scheduled().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_edge_triggers_sync() {
        let (coordinator, transport) = coordinator(SyncConfig::new());
        let source = ManualAppStateSource::new(AppState::Background);
        let monitor = LifecycleMonitor::new(Arc::new(source.clone()));

        coordinator.attach_lifecycle(&monitor);
        source.set_state(AppState::Active);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.pull_requests().len(), 1);

        source.set_state(AppState::Active);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.pull_requests().len(), 1);

        monitor.cleanup();
    }
}
