//! Redb-backed storage backend.
//!
//! Provides durable raw storage using redb with ACID guarantees. The
//! synchronous [`Backend`] impl runs transactions on the caller's thread;
//! the [`AsyncBackend`] impl moves the same work to `spawn_blocking`.

use super::backend::{AsyncBackend, Backend};
use crate::constants::LOCAL_TABLE;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Redb-backed raw storage.
///
/// One database file may hold several tables; handles created with
/// [`RedbBackend::table`] share the open database.
///
/// # Thread Safety
///
/// `RedbBackend` is `Clone` and can be shared across threads. The underlying
/// database handles concurrent access safely.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    table: Arc<str>,
}

impl RedbBackend {
    /// Opens or creates a redb database at the given path using the default
    /// table.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or database cannot be
    /// created, or the table cannot be initialized.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_table(path, LOCAL_TABLE)
    }

    /// Opens or creates a redb database at the given path using `table`.
    ///
    /// Creates parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directory cannot be created
    /// - Database file cannot be opened or created (permissions, already
    ///   open in this process, disk full)
    /// - Initialization transaction fails to begin or commit
    pub fn open_table<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create storage directory: {}", parent.display())
            })?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let backend = Self {
            db: Arc::new(db),
            table: Arc::from(table),
        };
        backend.init_table()?;
        Ok(backend)
    }

    /// Returns a handle on another table of the same database.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be initialized.
    pub fn table(&self, table: &str) -> Result<Self> {
        let backend = Self {
            db: Arc::clone(&self.db),
            table: Arc::from(table),
        };
        backend.init_table()?;
        Ok(backend)
    }

    /// Name of the table this handle reads and writes.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    fn definition(&self) -> TableDefinition<'_, &'static str, &'static str> {
        TableDefinition::new(&self.table)
    }

    /// Creates the table on first open so reads never hit a missing table.
    fn init_table(&self) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            let _table = write_txn
                .open_table(self.definition())
                .with_context(|| format!("Failed to initialize table '{}'", self.table))?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;
        Ok(())
    }

    fn get_sync(&self, key: &str) -> Result<Option<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;

        let table = read_txn
            .open_table(self.definition())
            .with_context(|| format!("Failed to open table '{}'", self.table))?;

        let result = table
            .get(key)
            .with_context(|| format!("Failed to read key '{key}'"))?;

        Ok(result.map(|guard| guard.value().to_string()))
    }

    fn set_sync(&self, key: &str, value: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;

        {
            let mut table = write_txn
                .open_table(self.definition())
                .with_context(|| format!("Failed to open table '{}'", self.table))?;

            table
                .insert(key, value)
                .with_context(|| format!("Failed to insert key '{key}'"))?;
        }

        write_txn
            .commit()
            .context("Failed to commit set transaction")?;

        Ok(())
    }

    fn remove_sync(&self, key: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;

        {
            let mut table = write_txn
                .open_table(self.definition())
                .with_context(|| format!("Failed to open table '{}'", self.table))?;

            table
                .remove(key)
                .with_context(|| format!("Failed to remove key '{key}'"))?;
        }

        write_txn
            .commit()
            .context("Failed to commit remove transaction")?;

        Ok(())
    }

    fn list_sync(&self) -> Result<Vec<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;

        let table = read_txn
            .open_table(self.definition())
            .with_context(|| format!("Failed to open table '{}'", self.table))?;

        let mut keys = Vec::new();
        for item in table.iter().context("Failed to iterate table")? {
            let (key, _) = item.context("Failed to read entry")?;
            keys.push(key.value().to_string());
        }

        Ok(keys)
    }

    fn clear_sync(&self) -> Result<()> {
        let keys = self.list_sync()?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;

        {
            let mut table = write_txn
                .open_table(self.definition())
                .with_context(|| format!("Failed to open table '{}'", self.table))?;

            for key in &keys {
                table
                    .remove(key.as_str())
                    .with_context(|| format!("Failed to remove key '{key}'"))?;
            }
        }

        write_txn
            .commit()
            .context("Failed to commit clear transaction")?;

        Ok(())
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl Backend for RedbBackend {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.get_sync(key)
    }

    fn set_raw(&self, key: &str, value: String) -> Result<()> {
        self.set_sync(key, &value)
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        self.remove_sync(key)
    }

    fn enumerate_raw(&self) -> Result<Vec<String>> {
        self.list_sync()
    }
}

#[async_trait]
impl AsyncBackend for RedbBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.get_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<()> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.set_sync(&key, &value))
            .await
            .context("Task join error")?
    }

    async fn remove_raw(&self, key: &str) -> Result<()> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.remove_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn enumerate_raw(&self) -> Result<Vec<String>> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.list_sync())
            .await
            .context("Task join error")?
    }

    async fn clear_raw(&self) -> Result<()> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.clear_sync())
            .await
            .context("Task join error")?
    }
}
