//! # notesync sync engine
//!
//! Keeps a local on-device note store eventually consistent with a remote
//! server across intermittent connectivity and concurrent edits.
//!
//! This crate provides:
//! - Backoff policy and a conditional retry executor
//! - Error classification (transient vs permanent)
//! - Device identity provider with ephemeral fallback
//! - Lifecycle monitor for foreground/background edges
//! - Sync orchestrator (push then pull, last-writer-wins)
//! - Observable sync status store
//! - Coordinator wiring triggers to the status store
//!
//! ## Architecture
//!
//! One sync run is a **push-then-pull** sequence:
//! 1. Push every unacknowledged local delta as one batch
//! 2. Pull remote changes since the stored checkpoint, batch by batch
//! 3. Resolve conflicts per entity by last-writer-wins
//! 4. Apply each batch atomically, then advance the checkpoint
//!
//! ## Key Invariants
//!
//! - Runs never overlap; a second trigger is skipped, not queued
//! - Deltas are acknowledged only after the server accepted the batch
//! - The checkpoint advances only after a whole batch is applied
//! - Pushes and pulls are safe to repeat

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod checkpoint;
mod classify;
mod config;
mod conflict;
mod coordinator;
mod error;
mod http;
mod identity;
mod lifecycle;
mod local;
mod orchestrator;
mod outbox;
mod result;
mod retry;
mod status;
mod transport;

pub use backoff::{backoff_delay, can_retry};
pub use checkpoint::{CheckpointStore, CHECKPOINT_KEY};
pub use classify::{is_retryable, DefaultClassifier, ErrorClassifier};
pub use config::{RetryConfig, SyncConfig};
pub use conflict::{resolve_lww, Conflict, ConflictResolution};
pub use coordinator::{PeriodicSync, SyncCoordinator};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer, PULL_PATH, PUSH_PATH,
};
pub use identity::{DeviceIdentity, DeviceIdentityProvider, DEVICE_ID_KEY};
pub use lifecycle::{
    AppState, AppStateSource, LifecycleHandlers, LifecycleMonitor, ManualAppStateSource,
    StateListener, Subscription,
};
pub use local::{LocalStore, MemoryLocalStore, PendingDelta};
pub use orchestrator::{EngineState, NoopObserver, SyncObserver, SyncOrchestrator, SyncStats};
pub use outbox::Outbox;
pub use result::{PhaseResult, SkipReason, SyncCycleResult};
pub use retry::{RetryExecutor, RetryState};
pub use status::{SyncErrorInfo, SyncPhase, SyncProgress, SyncState, SyncStatus, SyncStatusStore};
pub use transport::{MockTransport, SyncTransport};
