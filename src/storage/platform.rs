//! Execution context wiring.
//!
//! A [`Platform`] is one execution context's view of the shared media. It
//! owns handles on the durable local medium and the volatile session medium
//! and hands out caches bound to them. Contexts created with
//! [`Platform::new_context`] share the same media but have their own
//! identity, so each sees the others' writes as external changes.

use super::backend::Backend;
use super::cache::{ExpiringCache, StorageKind, StorageOptions};
use super::memory::MemoryBackend;
use super::shared::SharedMedium;
use super::types::ContextId;
use crate::config::CruxConfig;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Shared media plus the identity of one execution context.
#[derive(Clone, Debug)]
pub struct Platform {
    local: SharedMedium,
    session: SharedMedium,
    origin: ContextId,
}

impl Platform {
    /// Opens a platform whose local medium is the redb file at `local_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(local_path: P) -> Result<Self> {
        let local_path = local_path.as_ref();
        let local = SharedMedium::local(local_path)?;
        debug!(path = %local_path.display(), "Opened local medium");
        Ok(Self::with_media(local, SharedMedium::session()))
    }

    /// Opens a platform from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured local path cannot be resolved or
    /// opened.
    pub fn from_config(config: &CruxConfig) -> Result<Self> {
        Self::open(config.local_path()?)
    }

    /// Creates a platform whose media all live in memory.
    pub fn in_memory() -> Self {
        Self::with_media(SharedMedium::volatile_local(), SharedMedium::session())
    }

    /// Creates a platform over existing media.
    pub fn with_media(local: SharedMedium, session: SharedMedium) -> Self {
        Self {
            local,
            session,
            origin: ContextId::next(),
        }
    }

    /// Creates another execution context over the same media.
    #[must_use]
    pub fn new_context(&self) -> Self {
        Self {
            local: self.local.clone(),
            session: self.session.clone(),
            origin: ContextId::next(),
        }
    }

    /// This context's id.
    pub fn origin(&self) -> ContextId {
        self.origin
    }

    /// Builds a cache for the given options.
    ///
    /// `Memory` gets a fresh private map; `Local` and `Session` attach to
    /// the shared medium as this context.
    pub fn storage(&self, options: StorageOptions) -> ExpiringCache {
        let backend: Arc<dyn Backend> = match options.kind {
            StorageKind::Memory => Arc::new(MemoryBackend::new()),
            StorageKind::Local => Arc::new(self.local.attach_as(self.origin)),
            StorageKind::Session => Arc::new(self.session.attach_as(self.origin)),
        };
        ExpiringCache::from_arc(backend, options.codec()).with_default_ttl(options.ttl)
    }

    /// Cache over the local medium with default options.
    pub fn local_storage(&self) -> ExpiringCache {
        self.storage(StorageOptions::new(StorageKind::Local))
    }

    /// Cache over the session medium with default options.
    pub fn session_storage(&self) -> ExpiringCache {
        self.storage(StorageOptions::new(StorageKind::Session))
    }

    /// Private in-memory cache with default options.
    pub fn memory_storage(&self) -> ExpiringCache {
        self.storage(StorageOptions::new(StorageKind::Memory))
    }
}
