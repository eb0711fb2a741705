//! Outcome of one sync run.

use crate::conflict::Conflict;
use chrono::{DateTime, Utc};
use notesync_protocol::RejectedChange;
use std::fmt;

/// Why a run did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// A previous run is still in flight.
    AlreadyInProgress,
    /// The transport reports no connectivity.
    Offline,
    /// Only an ephemeral device identity is available.
    NoDeviceIdentity,
    /// Automatic sync is switched off.
    AutoSyncDisabled,
}

impl SkipReason {
    /// Human readable description.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyInProgress => "sync already in progress",
            SkipReason::Offline => "no network connection",
            SkipReason::NoDeviceIdentity => "device identity unavailable",
            SkipReason::AutoSyncDisabled => "automatic sync is disabled",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one phase of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseResult {
    /// Changes handled in this phase.
    pub total_processed: u64,
    /// Changes the server permanently refused.
    pub failures: Vec<RejectedChange>,
}

impl PhaseResult {
    /// Creates a phase result with `total_processed` and no failures.
    pub fn processed(total_processed: u64) -> Self {
        Self {
            total_processed,
            failures: Vec::new(),
        }
    }
}

/// Result of a sync run. Produced exactly once per call to
/// [`manual_sync`](crate::SyncOrchestrator::manual_sync).
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCycleResult {
    /// Whether both phases completed.
    pub success: bool,
    /// Whether the run was skipped before any network activity.
    pub skipped: bool,
    /// Why the run was skipped.
    pub skip_reason: Option<SkipReason>,
    /// Message of the error that failed the run.
    pub error: Option<String>,
    /// Push phase counters.
    pub push: PhaseResult,
    /// Pull phase counters.
    pub pull: PhaseResult,
    /// Remote changes discarded because the local copy was newer.
    pub conflicts: Vec<Conflict>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl SyncCycleResult {
    pub(crate) fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            skipped: false,
            skip_reason: None,
            error: None,
            push: PhaseResult::default(),
            pull: PhaseResult::default(),
            conflicts: Vec::new(),
            started_at,
            finished_at: started_at,
        }
    }

    /// A skipped run.
    pub fn skipped(reason: SkipReason) -> Self {
        let now = Utc::now();
        Self {
            skipped: true,
            skip_reason: Some(reason),
            ..Self::begin(now)
        }
    }

    /// A successful run with the given phase results.
    pub fn succeeded(push: PhaseResult, pull: PhaseResult) -> Self {
        let now = Utc::now();
        Self {
            success: true,
            push,
            pull,
            ..Self::begin(now)
        }
    }

    /// A failed run.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::begin(Utc::now())
        }
    }

    /// Changes processed across both phases.
    pub fn total_processed(&self) -> u64 {
        self.push.total_processed + self.pull.total_processed
    }
}
