//! # notesync storage
//!
//! Key-value persistence used by the sync engine for small, durable values
//! such as the device identity and the pull checkpoint.
//!
//! ## Design Principles
//!
//! - Stores are simple string maps (get, set, delete)
//! - No knowledge of what the keys mean; the engine owns key naming
//! - Must be `Send + Sync` so one store can be shared by several components
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing, with failure injection
//! - [`FileStore`] - Durable CBOR file guarded by an exclusive lock

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::KeyValueStore;
