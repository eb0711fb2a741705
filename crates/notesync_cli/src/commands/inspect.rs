//! Inspect command implementation.

use super::open_store;
use notesync_engine::{CheckpointStore, CHECKPOINT_KEY, DEVICE_ID_KEY};
use notesync_protocol::DeviceId;
use serde::Serialize;
use std::path::Path;

/// Stored sync state of one device.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store directory.
    pub path: String,
    /// Stored device id, if any.
    pub device_id: Option<String>,
    /// Whether the stored device id parses.
    pub device_id_valid: bool,
    /// Stored checkpoint; `None` before the first pull.
    pub checkpoint: Option<String>,
}

/// Reads the stored identity and checkpoint.
pub async fn collect(dir: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = open_store(dir)?;
    let device_id = store.get(DEVICE_ID_KEY).await?;
    let device_id_valid = device_id
        .as_deref()
        .is_some_and(|raw| raw.parse::<DeviceId>().is_ok());
    let checkpoint = CheckpointStore::new(store).load().await?;

    Ok(InspectResult {
        path: dir.display().to_string(),
        device_id,
        device_id_valid,
        checkpoint: (!checkpoint.is_initial()).then(|| checkpoint.as_str().to_string()),
    })
}

/// Runs the inspect command.
pub async fn run(dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(dir).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Store: {}", result.path);
    match (&result.device_id, result.device_id_valid) {
        (Some(id), true) => println!("Device ID: {id}"),
        (Some(id), false) => println!("Device ID: {id} (invalid, will be replaced)"),
        (None, _) => println!("Device ID: <none>"),
    }
    println!(
        "{}: {}",
        CHECKPOINT_KEY,
        result.checkpoint.as_deref().unwrap_or("<initial>")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_protocol::Checkpoint;
    use notesync_storage::{FileStore, KeyValueStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let result = collect(dir.path()).await.unwrap();
        assert!(result.device_id.is_none());
        assert!(!result.device_id_valid);
        assert!(result.checkpoint.is_none());
    }

    #[tokio::test]
    async fn reports_stored_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Arc::new(FileStore::open(dir.path()).unwrap());
            store.set(DEVICE_ID_KEY, "garbage").await.unwrap();
            CheckpointStore::new(store).save(&Checkpoint::new("12")).await.unwrap();
        }

        let result = collect(dir.path()).await.unwrap();
        assert_eq!(result.device_id.as_deref(), Some("garbage"));
        assert!(!result.device_id_valid);
        assert_eq!(result.checkpoint.as_deref(), Some("12"));
    }
}
