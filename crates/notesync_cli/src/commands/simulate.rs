//! Simulate command implementation.

use notesync_testkit::{random_script, Simulation, SimulationReport};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

/// Parameters of a simulation run.
#[derive(Debug, Clone, Copy)]
pub struct SimulateOptions {
    /// Number of devices.
    pub devices: usize,
    /// Number of script steps.
    pub edits: usize,
    /// Network failures injected into device 0's first pushes.
    pub fail_pushes: usize,
    /// Random seed.
    pub seed: Option<u64>,
}

/// Simulation outcome as printed.
#[derive(Debug, Serialize)]
pub struct SimulateResult {
    /// Seed used, for reproducing the run.
    pub seed: u64,
    /// Devices simulated.
    pub devices: usize,
    /// Local edits applied.
    pub edits: usize,
    /// Sync runs attempted.
    pub syncs: usize,
    /// Sync runs that failed.
    pub failed_syncs: usize,
    /// Remote changes discarded by last-writer-wins.
    pub conflicts: usize,
    /// Deltas pushed.
    pub pushed: u64,
    /// Changes pulled.
    pub pulled: u64,
    /// Injected faults delivered.
    pub faults_injected: u64,
    /// Changes in the server log.
    pub server_changes: usize,
    /// Live entities after settling.
    pub live_entities: usize,
    /// Whether every device matches the server.
    pub converged: bool,
}

impl SimulateResult {
    fn new(seed: u64, report: SimulationReport) -> Self {
        Self {
            seed,
            devices: report.devices,
            edits: report.edits,
            syncs: report.syncs,
            failed_syncs: report.failed_syncs,
            conflicts: report.conflicts,
            pushed: report.pushed,
            pulled: report.pulled,
            faults_injected: report.faults_injected,
            server_changes: report.server_changes,
            live_entities: report.live_entities,
            converged: report.converged,
        }
    }
}

/// Runs a simulation and returns its outcome.
pub async fn simulate(options: SimulateOptions) -> SimulateResult {
    let seed = options.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let script = random_script(&mut rng, options.devices, options.edits);
    info!(seed, devices = options.devices, steps = script.len(), "starting simulation");

    let mut simulation = Simulation::new(options.devices).await;
    simulation.fail_pushes(options.fail_pushes);
    let report = simulation.run(&script).await;
    SimulateResult::new(seed, report)
}

/// Runs the simulate command.
pub async fn run(options: SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = simulate(options).await;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Seed:            {}", result.seed);
        println!("Devices:         {}", result.devices);
        println!("Local edits:     {}", result.edits);
        println!("Sync runs:       {} ({} failed)", result.syncs, result.failed_syncs);
        println!("Pushed/pulled:   {}/{}", result.pushed, result.pulled);
        println!("Conflicts:       {}", result.conflicts);
        println!("Faults injected: {}", result.faults_injected);
        println!("Server changes:  {}", result.server_changes);
        println!("Live entities:   {}", result.live_entities);
        println!("Converged:       {}", if result.converged { "yes" } else { "NO" });
    }

    if result.converged {
        Ok(())
    } else {
        Err(format!("devices did not converge (seed {})", result.seed).into())
    }
}
