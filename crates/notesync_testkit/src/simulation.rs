//! Multi-device simulation.
//!
//! Replays an edit script across a [`TestCluster`], letting devices sync
//! at arbitrary points, then settles the cluster and checks that every
//! device and the server agree.

use crate::faults::Fault;
use crate::fixtures::TestCluster;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use notesync_engine::{SyncConfig, PUSH_PATH};
use notesync_protocol::{EntityPayload, Note, Reflection, Relation, RelationKind};
use notesync_server::ServerConfig;
use rand::Rng;
use tracing::{debug, info};

/// Settle rounds attempted before giving up on convergence.
const MAX_SETTLE_ROUNDS: usize = 5;

/// What a device does at one step of a script.
#[derive(Debug, Clone, PartialEq)]
pub enum EditAction {
    /// Create an entity.
    Create(EntityPayload),
    /// Edit the `target`-th live entity (modulo the count); creates a note
    /// if the device has none.
    Update {
        /// Index into the device's live entities.
        target: usize,
        /// New text for the entity.
        text: String,
    },
    /// Delete the `target`-th live entity; a no-op if there is none.
    Delete {
        /// Index into the device's live entities.
        target: usize,
    },
    /// Sync now.
    Sync,
}

/// One step of a script.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    /// Device index (modulo the cluster size).
    pub device: usize,
    /// Action to take.
    pub action: EditAction,
}

/// Summary of a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationReport {
    /// Devices in the cluster.
    pub devices: usize,
    /// Local edits applied.
    pub edits: usize,
    /// Sync runs attempted.
    pub syncs: usize,
    /// Sync runs that failed.
    pub failed_syncs: usize,
    /// Remote changes discarded in favour of newer local edits.
    pub conflicts: usize,
    /// Deltas pushed across all devices.
    pub pushed: u64,
    /// Changes pulled across all devices.
    pub pulled: u64,
    /// Changes rejected by the server.
    pub rejected: usize,
    /// Injected faults delivered.
    pub faults_injected: u64,
    /// Changes in the server log.
    pub server_changes: usize,
    /// Live entities on the server.
    pub live_entities: usize,
    /// Whether every device matches the server.
    pub converged: bool,
}

/// A cluster plus a logical clock for local edits.
#[derive(Debug)]
pub struct Simulation {
    cluster: TestCluster,
    epoch: DateTime<Utc>,
    tick: i64,
}

impl Simulation {
    /// Creates a simulation with `devices` devices and test defaults.
    pub async fn new(devices: usize) -> Self {
        Self::with_cluster(TestCluster::new(devices.max(1)).await)
    }

    /// Creates a simulation with explicit configuration.
    pub async fn with_config(devices: usize, server: ServerConfig, sync: SyncConfig) -> Self {
        Self::with_cluster(TestCluster::with_config(devices.max(1), server, sync).await)
    }

    fn with_cluster(cluster: TestCluster) -> Self {
        Self {
            cluster,
            epoch: Utc
                .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
                .single()
                .unwrap_or_default(),
            tick: 0,
        }
    }

    /// Returns the cluster.
    pub fn cluster(&self) -> &TestCluster {
        &self.cluster
    }

    /// Makes the first `count` push requests of device 0 fail at the
    /// network layer.
    pub fn fail_pushes(&self, count: usize) {
        self.cluster
            .device(0)
            .client()
            .fail_next(PUSH_PATH, count, Fault::network());
    }

    /// Each local edit is one second after the previous one, so edits are
    /// totally ordered and no two share a timestamp.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        self.tick += 1;
        self.epoch + ChronoDuration::seconds(self.tick)
    }

    /// Replays `script`, settles the cluster and reports.
    pub async fn run(&mut self, script: &[Edit]) -> SimulationReport {
        let mut report = SimulationReport {
            devices: self.cluster.devices().len(),
            ..SimulationReport::default()
        };

        for edit in script {
            let index = edit.device % report.devices;
            if edit.action == EditAction::Sync {
                self.sync_device(index, &mut report).await;
            } else if self.apply(index, &edit.action) {
                report.edits += 1;
            }
        }

        for round in 0..MAX_SETTLE_ROUNDS {
            for index in 0..report.devices {
                self.sync_device(index, &mut report).await;
            }
            if round > 0 && self.cluster.converged() {
                break;
            }
        }

        report.faults_injected = self
            .cluster
            .devices()
            .iter()
            .map(|d| d.client().injected_count())
            .sum();
        report.server_changes = self.cluster.server.operation_count();
        report.live_entities = self.cluster.server.live_entities().len();
        report.converged = self.cluster.converged();
        info!(
            devices = report.devices,
            edits = report.edits,
            syncs = report.syncs,
            failed = report.failed_syncs,
            converged = report.converged,
            "simulation finished"
        );
        report
    }

    async fn sync_device(&self, index: usize, report: &mut SimulationReport) {
        let result = self.cluster.device(index).sync().await;
        report.syncs += 1;
        if !result.success && !result.skipped {
            report.failed_syncs += 1;
        }
        report.conflicts += result.conflicts.len();
        report.pushed += result.push.total_processed;
        report.pulled += result.pull.total_processed;
        report.rejected += result.push.failures.len();
    }

    fn apply(&mut self, index: usize, action: &EditAction) -> bool {
        let at = self.next_timestamp();
        let local = &self.cluster.device(index).local;
        let live: Vec<_> = local.entities().into_iter().collect();

        match action {
            EditAction::Create(payload) => {
                let id = local.create(payload.clone(), at);
                debug!(device = index, entity_id = %id, "create");
            }
            EditAction::Update { target, text } => {
                if live.is_empty() {
                    local.create(EntityPayload::note("Untitled", text.clone()), at);
                } else {
                    let ((_, id), payload) = &live[target % live.len()];
                    local.update(*id, edited(payload, text), at);
                    debug!(device = index, entity_id = %id, "update");
                }
            }
            EditAction::Delete { target } => {
                if live.is_empty() {
                    return false;
                }
                let ((ty, id), _) = &live[target % live.len()];
                local.delete(*ty, *id, at);
                debug!(device = index, entity_id = %id, "delete");
            }
            EditAction::Sync => return false,
        }
        true
    }
}

/// Returns `payload` with its text replaced by `text`.
fn edited(payload: &EntityPayload, text: &str) -> EntityPayload {
    match payload {
        EntityPayload::Note(note) => EntityPayload::Note(Note {
            body: text.to_string(),
            ..note.clone()
        }),
        EntityPayload::Reflection(reflection) => EntityPayload::Reflection(Reflection {
            content: text.to_string(),
            ..reflection.clone()
        }),
        EntityPayload::Relation(relation) => EntityPayload::Relation(Relation {
            kind: match relation.kind {
                RelationKind::References => RelationKind::Supports,
                RelationKind::Supports => RelationKind::Contradicts,
                RelationKind::Contradicts => RelationKind::Related,
                RelationKind::Related => RelationKind::References,
            },
            ..relation.clone()
        }),
    }
}

/// Builds a random script of `edits` edits over `devices` devices.
///
/// Roughly one step in eight is a sync; the rest are creates, updates and
/// deletes of notes.
pub fn random_script<R: Rng + ?Sized>(rng: &mut R, devices: usize, edits: usize) -> Vec<Edit> {
    let devices = devices.max(1);
    (0..edits)
        .map(|i| {
            let device = rng.gen_range(0..devices);
            let action = match rng.gen_range(0..8) {
                0 => EditAction::Sync,
                1..=3 => EditAction::Create(EntityPayload::note(
                    format!("Note {i}"),
                    format!("written on device {device}"),
                )),
                4..=6 => EditAction::Update {
                    target: rng.gen(),
                    text: format!("edit {i} from device {device}"),
                },
                _ => EditAction::Delete { target: rng.gen() },
            };
            Edit { device, action }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[tokio::test]
    async fn empty_script_converges() {
        let mut sim = Simulation::new(2).await;
        let report = sim.run(&[]).await;
        assert!(report.converged);
        assert_eq!(report.edits, 0);
        assert_eq!(report.failed_syncs, 0);
    }

    #[tokio::test]
    async fn concurrent_updates_converge_to_latest() {
        let mut sim = Simulation::new(2).await;
        let script = vec![
            Edit {
                device: 0,
                action: EditAction::Create(EntityPayload::note("N", "v0")),
            },
            Edit {
                device: 0,
                action: EditAction::Sync,
            },
            Edit {
                device: 1,
                action: EditAction::Sync,
            },
            Edit {
                device: 0,
                action: EditAction::Update {
                    target: 0,
                    text: "older".into(),
                },
            },
            Edit {
                device: 1,
                action: EditAction::Update {
                    target: 0,
                    text: "newer".into(),
                },
            },
        ];

        let report = sim.run(&script).await;

        assert!(report.converged);
        let entities = sim.cluster().server.live_entities();
        assert_eq!(entities.len(), 1);
        let payload = entities.values().next().unwrap();
        assert_eq!(payload, &EntityPayload::note("N", "newer"));
        assert!(report.conflicts >= 1);
    }

    #[tokio::test]
    async fn random_script_with_push_faults_converges() {
        let mut rng = StdRng::seed_from_u64(7);
        let script = random_script(&mut rng, 3, 40);
        let mut sim = Simulation::new(3).await;
        sim.fail_pushes(2);

        let report = sim.run(&script).await;

        assert!(report.converged, "{report:?}");
        assert_eq!(report.faults_injected, 2);
        assert_eq!(report.rejected, 0);
    }

    #[test]
    fn edited_keeps_identity_fields() {
        let note = EntityPayload::note("Title", "old");
        assert_eq!(edited(&note, "new"), EntityPayload::note("Title", "new"));
    }
}
