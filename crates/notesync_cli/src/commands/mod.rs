//! CLI command implementations.

pub mod device;
pub mod inspect;
pub mod reset;
pub mod simulate;

use notesync_storage::{FileStore, KeyValueStore};
use std::path::Path;
use std::sync::Arc;

/// Opens the secure store in `dir`, creating the directory if needed.
pub(crate) fn open_store(dir: &Path) -> Result<Arc<dyn KeyValueStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(FileStore::open(dir)?))
}
