//! Key-value store trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use std::sync::Arc;

/// An asynchronous string key-value store.
///
/// # Invariants
///
/// - `get` after a successful `set` returns the written value
/// - `delete` of a missing key succeeds
/// - Implementations must be `Send + Sync` for shared access
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key).await
    }
}
