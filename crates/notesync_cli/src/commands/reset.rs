//! Reset-checkpoint command implementation.

use super::open_store;
use notesync_engine::CheckpointStore;
use std::path::Path;
use tracing::info;

/// Runs the reset-checkpoint command.
pub async fn run(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let checkpoints = CheckpointStore::new(open_store(dir)?);
    let previous = checkpoints.load().await?;
    checkpoints.reset().await?;
    info!(previous = %previous, "checkpoint reset");
    println!("Checkpoint reset (was {previous})");
    Ok(())
}
