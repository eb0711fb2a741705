//! Observable sync status.
//!
//! [`SyncStatusStore`] holds the UI-facing [`SyncState`]. Observers read
//! snapshots or subscribe to a `watch` channel that receives every change.
//! Writes come from one place: the coordinator feeding it run results and
//! phase progress.

use crate::orchestrator::SyncObserver;
use crate::result::{SkipReason, SyncCycleResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Coarse sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Nothing is happening.
    #[default]
    Idle,
    /// A run is in progress.
    Syncing,
    /// The last run succeeded; reverts to idle after a short delay.
    Success,
    /// The last run failed.
    Error,
}

/// Phase of an in-progress run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Sending local deltas.
    Push,
    /// Receiving remote changes.
    Pull,
}

/// Progress of the current or last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncProgress {
    /// Changes processed so far.
    pub processed: u64,
    /// Changes expected.
    pub total: u64,
    /// Active phase, if syncing.
    pub current_phase: Option<SyncPhase>,
}

/// Error or skip information shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncErrorInfo {
    /// Message.
    pub message: String,
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
    /// Set when this is an informational skip rather than a failure.
    pub skip_reason: Option<SkipReason>,
}

impl SyncErrorInfo {
    /// Returns true if this records a skipped run rather than a failure.
    pub fn is_skip(&self) -> bool {
        self.skip_reason.is_some()
    }
}

/// Snapshot of the sync status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Coarse status.
    pub status: SyncStatus,
    /// Progress.
    pub progress: SyncProgress,
    /// Last error or skip, cleared when a run starts or succeeds.
    pub error: Option<SyncErrorInfo>,
    /// When the last run finished (successfully or not).
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Whether the last finished run succeeded.
    pub last_sync_success: bool,
    /// User-facing auto-sync toggle.
    pub auto_sync_enabled: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            progress: SyncProgress::default(),
            error: None,
            last_sync_time: None,
            last_sync_success: false,
            auto_sync_enabled: true,
        }
    }
}

struct StoreInner {
    state: RwLock<SyncState>,
    /// Bumped whenever a run starts or succeeds; guards the success revert.
    generation: AtomicU64,
    tx: watch::Sender<SyncState>,
    success_reset_delay: Duration,
}

impl StoreInner {
    fn update(&self, mutate: impl FnOnce(&mut SyncState)) {
        let mut state = self.state.write();
        mutate(&mut state);
        self.tx.send_replace(state.clone());
    }
}

/// Process-wide observable sync state.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct SyncStatusStore {
    inner: Arc<StoreInner>,
}

impl SyncStatusStore {
    /// Creates a store that shows success for `success_reset_delay`.
    pub fn new(success_reset_delay: Duration) -> Self {
        Self::with_state(SyncState::default(), success_reset_delay)
    }

    /// Creates a store from the sync configuration.
    pub fn from_config(config: &crate::SyncConfig) -> Self {
        let state = SyncState {
            auto_sync_enabled: config.auto_sync_enabled,
            ..SyncState::default()
        };
        Self::with_state(state, config.success_reset_delay)
    }

    fn with_state(state: SyncState, success_reset_delay: Duration) -> Self {
        let (tx, _) = watch::channel(state.clone());
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(state),
                generation: AtomicU64::new(0),
                tx,
                success_reset_delay,
            }),
        }
    }

    /// Returns the current state.
    pub fn snapshot(&self) -> SyncState {
        self.inner.state.read().clone()
    }

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        self.inner.state.read().status
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.tx.subscribe()
    }

    /// Sets the status.
    ///
    /// Entering [`SyncStatus::Syncing`] also resets progress and clears any
    /// error in the same update.
    pub fn set_status(&self, status: SyncStatus) {
        if matches!(status, SyncStatus::Syncing | SyncStatus::Success) {
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.update(|state| {
            state.status = status;
            if status == SyncStatus::Syncing {
                state.progress = SyncProgress::default();
                state.error = None;
            }
        });
    }

    /// Records progress of the active phase. Ignored unless syncing.
    pub fn update_progress(&self, phase: SyncPhase, processed: u64, total: u64) {
        self.inner.update(|state| {
            if state.status != SyncStatus::Syncing {
                return;
            }
            state.progress = SyncProgress {
                processed,
                total,
                current_phase: Some(phase),
            };
        });
    }

    /// Sets the auto-sync toggle.
    pub fn set_auto_sync_enabled(&self, enabled: bool) {
        self.inner.update(|state| state.auto_sync_enabled = enabled);
    }

    /// Clears the recorded error without changing the status.
    pub fn clear_error(&self) {
        self.inner.update(|state| state.error = None);
    }

    /// Folds the result of a run into the state.
    pub fn handle_sync_result(&self, result: &SyncCycleResult) {
        if result.skipped {
            self.handle_skip(result);
        } else if result.success {
            self.handle_success(result);
        } else {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "sync failed".to_string());
            self.inner.update(|state| {
                state.status = SyncStatus::Error;
                state.progress.current_phase = None;
                state.error = Some(SyncErrorInfo {
                    message,
                    timestamp: result.finished_at,
                    skip_reason: None,
                });
                state.last_sync_time = Some(result.finished_at);
                state.last_sync_success = false;
            });
        }
    }

    fn handle_skip(&self, result: &SyncCycleResult) {
        let reason = result.skip_reason;
        self.inner.update(|state| {
            if state.status == SyncStatus::Syncing {
                debug!(?reason, "ignoring skip while a run is in progress");
                return;
            }
            state.status = SyncStatus::Idle;
            state.error = Some(SyncErrorInfo {
                message: reason.map_or("sync skipped", |r| r.as_str()).to_string(),
                timestamp: result.finished_at,
                skip_reason: reason,
            });
        });
    }

    fn handle_success(&self, result: &SyncCycleResult) {
        let total = result.total_processed();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.update(|state| {
            state.status = SyncStatus::Success;
            state.progress = SyncProgress {
                processed: total,
                total,
                current_phase: None,
            };
            state.error = None;
            state.last_sync_time = Some(result.finished_at);
            state.last_sync_success = true;
        });
        self.schedule_revert(generation);
    }

    fn schedule_revert(&self, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, success status will not auto-revert");
            return;
        };
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let delay = self.inner.success_reset_delay;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.update(|state| {
                if state.status == SyncStatus::Success
                    && inner.generation.load(Ordering::SeqCst) == generation
                {
                    state.status = SyncStatus::Idle;
                }
            });
        });
    }
}

impl Default for SyncStatusStore {
    fn default() -> Self {
        Self::from_config(&crate::SyncConfig::default())
    }
}

impl SyncObserver for SyncStatusStore {
    fn on_started(&self) {
        self.set_status(SyncStatus::Syncing);
    }

    fn on_progress(&self, phase: SyncPhase, processed: u64, total: u64) {
        self.update_progress(phase, processed, total);
    }
}

impl std::fmt::Debug for SyncStatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStatusStore")
            .field("state", &*self.inner.state.read())
            .finish()
    }
}
