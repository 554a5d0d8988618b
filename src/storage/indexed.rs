//! Asynchronous indexed storage.
//!
//! [`IndexedStorage`] is a database/object-store pair addressed by name:
//! each database is one redb file under a directory, each object store is
//! one table inside it. Values are stored as JSON text without an envelope,
//! prefix or ttl. Unlike [`ExpiringCache`](super::ExpiringCache), faults are
//! returned to the caller of each operation.

use super::backend::AsyncBackend;
use super::redb::RedbBackend;
use crate::constants::{DEFAULT_DB_NAME, DEFAULT_STORE_NAME};
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Async key/value storage over named databases and object stores.
///
/// # Example
///
/// ```ignore
/// use crux::storage::IndexedStorage;
///
/// let idb = IndexedStorage::open(data_dir, "app-db", "settings").await?;
/// idb.set("volume", &0.8).await?;
/// let volume: Option<f64> = idb.get("volume").await?;
/// ```
#[derive(Clone)]
pub struct IndexedStorage {
    backend: Arc<dyn AsyncBackend>,
    db_name: String,
    store_name: String,
    database: Option<RedbBackend>,
}

impl IndexedStorage {
    /// Opens (creating if needed) `<dir>/<db_name>.redb` and its
    /// `store_name` object store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, for example when
    /// it is already open elsewhere in this process. Use
    /// [`IndexedStorage::store`] for a second store in an open database.
    pub async fn open<P: AsRef<Path>>(dir: P, db_name: &str, store_name: &str) -> Result<Self> {
        let path = dir.as_ref().join(format!("{db_name}.redb"));
        let table = store_name.to_string();
        let backend = tokio::task::spawn_blocking(move || RedbBackend::open_table(&path, &table))
            .await
            .context("Task join error")??;

        Ok(Self {
            backend: Arc::new(backend.clone()),
            db_name: db_name.to_string(),
            store_name: store_name.to_string(),
            database: Some(backend),
        })
    }

    /// Opens the default database (`crux-db`) and store (`store`).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub async fn open_default<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open(dir, DEFAULT_DB_NAME, DEFAULT_STORE_NAME).await
    }

    /// Wraps a custom async backend.
    pub fn with_backend(backend: impl AsyncBackend, db_name: &str, store_name: &str) -> Self {
        Self {
            backend: Arc::new(backend),
            db_name: db_name.to_string(),
            store_name: store_name.to_string(),
            database: None,
        }
    }

    /// Opens another object store in the same database.
    ///
    /// # Errors
    ///
    /// Returns an error if this storage wraps a custom backend, or the
    /// store cannot be created.
    pub async fn store(&self, store_name: &str) -> Result<Self> {
        let database = self
            .database
            .clone()
            .with_context(|| format!("'{}' is not a redb database", self.db_name))?;
        let table = store_name.to_string();
        let backend = tokio::task::spawn_blocking(move || database.table(&table))
            .await
            .context("Task join error")??;

        Ok(Self {
            backend: Arc::new(backend.clone()),
            db_name: self.db_name.clone(),
            store_name: store_name.to_string(),
            database: Some(backend),
        })
    }

    /// Database name.
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Object store name.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Reads and deserializes a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored JSON does not match
    /// `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get_raw(key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to deserialize value for key '{key}'"))?;
                Ok(Some(value))
            },
            None => Ok(None),
        }
    }

    /// Serializes and stores a value, overwriting any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize value for key '{key}'"))?;
        self.backend.set_raw(key, raw).await
    }

    /// Removes a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.backend.remove_raw(key).await
    }

    /// Removes every key in this object store.
    ///
    /// # Errors
    ///
    /// Returns an error if the clear fails.
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear_raw().await
    }

    /// Lists every key in this object store.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.backend.enumerate_raw().await
    }
}

impl fmt::Debug for IndexedStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedStorage")
            .field("db_name", &self.db_name)
            .field("store_name", &self.store_name)
            .finish_non_exhaustive()
    }
}
