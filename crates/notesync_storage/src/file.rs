//! File-backed key-value store.

use crate::error::{StorageError, StorageResult};
use crate::store::KeyValueStore;
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const DATA_FILE: &str = "store.cbor";
const TEMP_FILE: &str = "store.cbor.tmp";
const LOCK_FILE: &str = "LOCK";

/// A durable key-value store kept in a single CBOR file.
///
/// # Durability
///
/// Every write serializes the whole map to a temporary file, syncs it and
/// renames it over the data file, so a crash leaves either the old or the
/// new contents. Values are expected to be small (identifiers, cursors).
///
/// # Locking
///
/// The directory is guarded by an exclusive `fs2` lock held for the
/// lifetime of the store; a second `open` on the same directory fails with
/// [`StorageError::Locked`].
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the lock is held
    /// by another process, or the existing data file is unreadable.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_path = dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(dir.to_path_buf()));
        }

        let entries = Self::load(&dir.join(DATA_FILE))?;
        debug!(path = %dir.display(), keys = entries.len(), "opened file store");

        Ok(Self {
            dir: dir.to_path_buf(),
            entries: Mutex::new(entries),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn load(path: &Path) -> StorageResult<BTreeMap<String, String>> {
        match File::open(path) {
            Ok(file) => ciborium::from_reader(BufReader::new(file))
                .map_err(|e| StorageError::Corrupted(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let temp_path = self.dir.join(TEMP_FILE);
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            ciborium::into_writer(entries, &mut writer)
                .map_err(|e| StorageError::Corrupted(e.to_string()))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&temp_path, self.dir.join(DATA_FILE))?;
        Ok(())
    }

    fn update<F>(&self, mutate: F) -> StorageResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        mutate(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}
