//! In-memory storage backend.
//!
//! Provides a fast, process-local medium using DashMap for concurrent
//! access. Nothing outside the owning handle can observe it, so it never
//! produces change events.

use super::backend::{AsyncBackend, Backend};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory raw storage using DashMap.
///
/// All data is lost when the last clone is dropped. Clones share the same
/// map. Ideal for:
/// - Testing and development
/// - State that must not outlive the process
/// - The volatile half of a session medium
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<DashMap<String, String>>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries (expired ones included).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entries", &self.data.len())
            .finish()
    }
}

impl Backend for MemoryBackend {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    fn set_raw(&self, key: &str, value: String) -> Result<()> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    fn enumerate_raw(&self) -> Result<Vec<String>> {
        Ok(self.data.iter().map(|entry| entry.key().clone()).collect())
    }
}

#[async_trait]
impl AsyncBackend for MemoryBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Backend::get_raw(self, key)
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<()> {
        Backend::set_raw(self, key, value)
    }

    async fn remove_raw(&self, key: &str) -> Result<()> {
        Backend::remove_raw(self, key)
    }

    async fn enumerate_raw(&self) -> Result<Vec<String>> {
        Backend::enumerate_raw(self)
    }

    async fn clear_raw(&self) -> Result<()> {
        self.data.clear();
        Ok(())
    }
}
