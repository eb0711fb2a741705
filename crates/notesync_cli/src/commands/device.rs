//! Device-id command implementation.

use super::open_store;
use notesync_engine::DeviceIdentityProvider;
use std::path::Path;

/// Runs the device-id command.
pub async fn run(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let provider = DeviceIdentityProvider::new(open_store(dir)?);
    let identity = provider.identity().await;
    if identity.persisted {
        println!("{}", identity.id);
        Ok(())
    } else {
        Err(format!("could not persist device id in {}", dir.display()).into())
    }
}
