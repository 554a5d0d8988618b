//! Backend traits for the storage layer.
//!
//! Defines the raw capability set every medium provides. The cache, TTL
//! policy and namespacing are written once against [`Backend`]; the
//! asynchronous variant exposes the same four operations behind a
//! suspension point.

use super::shared::ChangeFeed;
use anyhow::Result;
use async_trait::async_trait;

/// Synchronous raw storage.
///
/// Keys and values are opaque strings. All operations may fail (quota,
/// unavailable medium); callers in the cache layer catch and log those
/// failures.
///
/// # Example
///
/// ```ignore
/// use crux::storage::{Backend, MemoryBackend};
///
/// let backend = MemoryBackend::new();
/// backend.set_raw("crux:key", "{\"value\":1,\"timestamp\":0}".into())?;
/// let raw = backend.get_raw("crux:key")?;
/// ```
pub trait Backend: Send + Sync + 'static {
    /// Retrieves the raw string stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium fails.
    fn get_raw(&self, key: &str) -> Result<Option<String>>;

    /// Stores a raw string, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium fails.
    fn set_raw(&self, key: &str, value: String) -> Result<()>;

    /// Removes a key. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium fails.
    fn remove_raw(&self, key: &str) -> Result<()>;

    /// Lists every key currently stored, unfiltered.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium fails.
    fn enumerate_raw(&self) -> Result<Vec<String>>;

    /// Whether other execution contexts can observe writes to this medium.
    fn is_externally_observable(&self) -> bool {
        false
    }

    /// Subscribes to changes made by other contexts, if the medium is
    /// externally observable.
    fn changes(&self) -> Option<ChangeFeed> {
        None
    }
}

/// Asynchronous raw storage.
///
/// Same semantics as [`Backend`]; each call is a suspension point. Failures
/// propagate to the caller of the operation.
#[async_trait]
pub trait AsyncBackend: Send + Sync + 'static {
    /// Retrieves the raw string stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium fails.
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    /// Stores a raw string, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium fails.
    async fn set_raw(&self, key: &str, value: String) -> Result<()>;

    /// Removes a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium fails.
    async fn remove_raw(&self, key: &str) -> Result<()>;

    /// Lists every key currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium fails.
    async fn enumerate_raw(&self) -> Result<Vec<String>>;

    /// Removes every key.
    ///
    /// Default implementation enumerates and removes one key at a time;
    /// backends may override with a single bulk operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium fails.
    async fn clear_raw(&self) -> Result<()> {
        for key in self.enumerate_raw().await? {
            self.remove_raw(&key).await?;
        }
        Ok(())
    }
}
