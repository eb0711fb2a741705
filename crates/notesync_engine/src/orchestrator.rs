//! Sync orchestrator state machine.
//!
//! One run moves through
//!
//! ```text
//! Idle -> Pushing -> Pulling -> Done
//!           |           |
//!           +-----------+----> Failed
//! Idle -> Skipped
//! ```
//!
//! `Done`, `Failed` and `Skipped` are terminal for that run; the next run
//! starts from any of them.

use crate::checkpoint::CheckpointStore;
use crate::classify::{DefaultClassifier, ErrorClassifier};
use crate::config::SyncConfig;
use crate::conflict::{resolve_lww, Conflict, ConflictResolution};
use crate::error::{SyncError, SyncResult};
use crate::identity::DeviceIdentityProvider;
use crate::local::LocalStore;
use crate::result::{PhaseResult, SkipReason, SyncCycleResult};
use crate::retry::RetryExecutor;
use crate::status::SyncPhase;
use crate::transport::SyncTransport;
use chrono::{DateTime, Utc};
use notesync_protocol::{Delta, DeviceId, EntityId, EntityType, PullRequest, PushRequest};
use notesync_storage::KeyValueStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No run has started yet.
    #[default]
    Idle,
    /// Sending local deltas.
    Pushing,
    /// Receiving and applying remote changes.
    Pulling,
    /// The last run completed.
    Done,
    /// The last run failed.
    Failed,
    /// The last run was skipped.
    Skipped,
}

impl EngineState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::Pushing | EngineState::Pulling)
    }

    /// Returns true for the end states of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineState::Done | EngineState::Failed | EngineState::Skipped
        )
    }
}

/// Statistics about sync runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    /// Runs that completed.
    pub cycles_completed: u64,
    /// Runs that failed.
    pub cycles_failed: u64,
    /// Runs that were skipped.
    pub cycles_skipped: u64,
    /// Deltas acknowledged by the server.
    pub deltas_pushed: u64,
    /// Remote changes processed.
    pub changes_pulled: u64,
    /// Remote changes discarded in favor of newer local edits.
    pub conflicts_resolved: u64,
    /// When the last run completed.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Error of the last failed run, cleared on success.
    pub last_error: Option<String>,
}

/// Receives phase transitions of a run.
///
/// The orchestrator never touches UI-facing state itself; callers pass an
/// observer (usually the [`SyncStatusStore`](crate::SyncStatusStore)) to
/// follow a run.
pub trait SyncObserver: Send + Sync {
    /// A run passed its guards and is about to push.
    fn on_started(&self) {}

    /// Progress within a phase.
    fn on_progress(&self, _phase: SyncPhase, _processed: u64, _total: u64) {}
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// Claims the busy flag; releases it when dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs push-then-pull sync against a remote server.
///
/// Runs never overlap: a call made while another is in flight returns a
/// skipped result immediately.
pub struct SyncOrchestrator<T: SyncTransport, L: LocalStore> {
    config: SyncConfig,
    transport: Arc<T>,
    local: Arc<L>,
    identity: DeviceIdentityProvider,
    checkpoints: CheckpointStore,
    executor: RetryExecutor,
    classifier: Arc<dyn ErrorClassifier<SyncError>>,
    state: RwLock<EngineState>,
    stats: RwLock<SyncStats>,
    busy: AtomicBool,
}

impl<T: SyncTransport, L: LocalStore> SyncOrchestrator<T, L> {
    /// Creates an orchestrator.
    ///
    /// `secure_store` holds the device identity and the pull checkpoint.
    pub fn new(
        config: SyncConfig,
        transport: T,
        local: L,
        secure_store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            executor: RetryExecutor::new(config.retry.clone()),
            config,
            transport: Arc::new(transport),
            local: Arc::new(local),
            identity: DeviceIdentityProvider::new(Arc::clone(&secure_store)),
            checkpoints: CheckpointStore::new(secure_store),
            classifier: Arc::new(DefaultClassifier),
            state: RwLock::new(EngineState::Idle),
            stats: RwLock::new(SyncStats::default()),
            busy: AtomicBool::new(false),
        }
    }

    /// Replaces the error classifier used for push and pull retries.
    pub fn with_classifier(mut self, classifier: impl ErrorClassifier<SyncError> + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a run is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the local store.
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Returns the device identity provider.
    pub fn identity(&self) -> &DeviceIdentityProvider {
        &self.identity
    }

    /// Returns the checkpoint store.
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
    }

    /// Runs one sync.
    pub async fn manual_sync(&self) -> SyncCycleResult {
        self.manual_sync_with(&NoopObserver).await
    }

    /// Runs one sync, reporting phase transitions to `observer`.
    ///
    /// Never fails: errors are folded into the returned result.
    pub async fn manual_sync_with(&self, observer: &dyn SyncObserver) -> SyncCycleResult {
        // Claimed before the first await so concurrent callers cannot both pass.
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            debug!("sync already in progress, skipping");
            self.stats.write().cycles_skipped += 1;
            return SyncCycleResult::skipped(SkipReason::AlreadyInProgress);
        };

        let mut result = SyncCycleResult::begin(Utc::now());

        if !self.transport.is_connected() {
            return self.skip(result, SkipReason::Offline);
        }

        let identity = self.identity.identity().await;
        if !identity.persisted {
            return self.skip(result, SkipReason::NoDeviceIdentity);
        }

        info!(device_id = %identity.id, "sync started");
        observer.on_started();

        let outcome = self.run(identity.id, &mut result, observer).await;
        result.finished_at = Utc::now();

        let mut stats = self.stats.write();
        stats.deltas_pushed += result.push.total_processed;
        stats.changes_pulled += result.pull.total_processed;
        stats.conflicts_resolved += result.conflicts.len() as u64;

        match outcome {
            Ok(()) => {
                result.success = true;
                stats.cycles_completed += 1;
                stats.last_sync_time = Some(result.finished_at);
                stats.last_error = None;
                self.set_state(EngineState::Done);
                info!(
                    pushed = result.push.total_processed,
                    pulled = result.pull.total_processed,
                    conflicts = result.conflicts.len(),
                    "sync finished"
                );
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "sync failed");
                stats.cycles_failed += 1;
                stats.last_error = Some(message.clone());
                result.error = Some(message);
                self.set_state(EngineState::Failed);
            }
        }

        result
    }

    fn skip(&self, mut result: SyncCycleResult, reason: SkipReason) -> SyncCycleResult {
        info!(reason = %reason, "sync skipped");
        self.stats.write().cycles_skipped += 1;
        self.set_state(EngineState::Skipped);
        result.skipped = true;
        result.skip_reason = Some(reason);
        result.finished_at = Utc::now();
        result
    }

    async fn run(
        &self,
        device_id: DeviceId,
        result: &mut SyncCycleResult,
        observer: &dyn SyncObserver,
    ) -> SyncResult<()> {
        self.set_state(EngineState::Pushing);
        self.push_phase(device_id, &mut result.push, observer).await?;

        self.set_state(EngineState::Pulling);
        self.pull_phase(&mut result.pull, &mut result.conflicts, observer)
            .await
    }

    /// Sends every pending delta as one batch, then acknowledges them.
    async fn push_phase(
        &self,
        device_id: DeviceId,
        phase: &mut PhaseResult,
        observer: &dyn SyncObserver,
    ) -> SyncResult<()> {
        observer.on_progress(SyncPhase::Push, 0, 0);
        let pending = self.local.pending_deltas().await?;
        let Some(up_to) = pending.last().map(|p| p.seq) else {
            debug!("nothing to push");
            return Ok(());
        };
        let total = pending.len() as u64;
        observer.on_progress(SyncPhase::Push, 0, total);

        let checkpoint = self.checkpoints.load().await?;
        let changes: Vec<Delta> = pending.into_iter().map(|p| p.delta).collect();
        let request = PushRequest::new(device_id, checkpoint, changes);

        let request = &request;
        let response = self
            .executor
            .execute_if(move || self.transport.push(request), &*self.classifier)
            .await?;

        self.local.acknowledge(up_to).await?;

        if !response.rejected.is_empty() {
            warn!(
                rejected = response.rejected.len(),
                "server permanently rejected changes"
            );
        }
        phase.total_processed = total;
        phase.failures = response.rejected;
        observer.on_progress(SyncPhase::Push, total, total);
        info!(pushed = total, up_to, "push complete");
        Ok(())
    }

    /// Pulls batches until the server reports no more, applying each one
    /// before advancing the checkpoint.
    async fn pull_phase(
        &self,
        phase: &mut PhaseResult,
        conflicts: &mut Vec<Conflict>,
        observer: &dyn SyncObserver,
    ) -> SyncResult<()> {
        let batch_size = self.config.pull_batch_size;
        // Reported before the first request so retries show the pull phase.
        observer.on_progress(SyncPhase::Pull, 0, 0);

        loop {
            let checkpoint = self.checkpoints.load().await?;
            let request = PullRequest::new(checkpoint.clone(), Some(batch_size));

            let request_ref = &request;
            let response = self
                .executor
                .execute_if(move || self.transport.pull(request_ref), &*self.classifier)
                .await?;

            let received = response.changes.len() as u64;
            let (accepted, mut discarded) = self.resolve_batch(&response.changes).await?;

            if !accepted.is_empty() {
                // A failure here leaves the checkpoint where it was.
                let lost = self.local.apply_remote(&accepted).await?;
                discarded.extend(lost);
            }
            if response.next_checkpoint != checkpoint {
                self.checkpoints.save(&response.next_checkpoint).await?;
            }

            phase.total_processed += received;
            conflicts.extend(discarded);

            let expected = if response.has_more {
                phase.total_processed + u64::from(batch_size)
            } else {
                phase.total_processed
            };
            observer.on_progress(SyncPhase::Pull, phase.total_processed, expected);
            debug!(
                received,
                applied = accepted.len(),
                checkpoint = %response.next_checkpoint,
                has_more = response.has_more,
                "pulled batch"
            );

            if !response.has_more {
                break;
            }
            if received == 0 && response.next_checkpoint == checkpoint {
                warn!(checkpoint = %checkpoint, "server reported more changes without progress");
                break;
            }
        }

        info!(pulled = phase.total_processed, "pull complete");
        Ok(())
    }

    /// Splits a batch into changes to apply and changes that lose to a
    /// newer local edit.
    async fn resolve_batch(&self, changes: &[Delta]) -> SyncResult<(Vec<Delta>, Vec<Conflict>)> {
        // Later changes in the same batch compare against earlier accepted ones.
        let mut latest: HashMap<(EntityType, EntityId), DateTime<Utc>> = HashMap::new();
        let mut accepted = Vec::with_capacity(changes.len());
        let mut discarded = Vec::new();

        for change in changes {
            let key = (change.entity_type(), change.entity_id());
            let local_modified = match latest.get(&key) {
                Some(ts) => Some(*ts),
                None => self.local.last_modified(key.0, key.1).await?,
            };

            match (resolve_lww(local_modified, change.client_timestamp()), local_modified) {
                (ConflictResolution::KeepLocal, Some(local)) => {
                    debug!(
                        entity_type = %key.0,
                        entity_id = %key.1,
                        local = %local,
                        remote = %change.client_timestamp(),
                        "local copy is newer, discarding remote change"
                    );
                    discarded.push(Conflict::discarded(change, local));
                }
                _ => {
                    latest.insert(key, change.client_timestamp());
                    accepted.push(change.clone());
                }
            }
        }

        Ok((accepted, discarded))
    }
}

impl<T: SyncTransport, L: LocalStore> std::fmt::Debug for SyncOrchestrator<T, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("state", &self.state())
            .field("busy", &self.is_busy())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
