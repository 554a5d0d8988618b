//! Shared, externally observable media.
//!
//! A [`SharedMedium`] is a store that several execution contexts attach to.
//! Every mutation made through one context's [`SharedBackend`] is broadcast
//! as a [`StorageEvent`]; the other contexts receive it through a
//! [`ChangeFeed`]. The originating context never sees its own events.
//!
//! Two kinds exist:
//!
//! - **Local**: durable, backed by redb (or memory in tests), survives
//!   restarts.
//! - **Session**: volatile, lives as long as the medium handle.

use super::backend::Backend;
use super::memory::MemoryBackend;
use super::redb::RedbBackend;
use super::types::{ContextId, StorageEvent};
use crate::constants::CHANGE_FEED_CAPACITY;
use anyhow::Result;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Which shared medium a backend is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumKind {
    /// Durable medium shared by every context.
    Local,
    /// Volatile medium shared by every context.
    Session,
}

struct Medium {
    kind: MediumKind,
    store: Box<dyn Backend>,
    events: broadcast::Sender<StorageEvent>,
}

/// A store shared between execution contexts.
///
/// Cloning yields another handle to the same medium.
#[derive(Clone)]
pub struct SharedMedium {
    inner: Arc<Medium>,
}

impl SharedMedium {
    /// Creates a medium over any raw store.
    pub fn with_store(kind: MediumKind, store: impl Backend) -> Self {
        let (events, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(Medium {
                kind,
                store: Box::new(store),
                events,
            }),
        }
    }

    /// Creates a volatile session medium.
    pub fn session() -> Self {
        Self::with_store(MediumKind::Session, MemoryBackend::new())
    }

    /// Opens a durable local medium stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn local<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::with_store(MediumKind::Local, RedbBackend::open(path)?))
    }

    /// Creates a local medium that keeps its entries in memory.
    pub fn volatile_local() -> Self {
        Self::with_store(MediumKind::Local, MemoryBackend::new())
    }

    /// The medium's kind.
    pub fn kind(&self) -> MediumKind {
        self.inner.kind
    }

    /// Attaches a new execution context.
    pub fn attach(&self) -> SharedBackend {
        self.attach_as(ContextId::next())
    }

    /// Attaches using an existing context id.
    pub fn attach_as(&self, origin: ContextId) -> SharedBackend {
        SharedBackend {
            medium: self.clone(),
            origin,
        }
    }

    fn emit(&self, key: &str, new_value: Option<String>, origin: ContextId) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            origin,
        });
    }
}

impl fmt::Debug for SharedMedium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMedium")
            .field("kind", &self.inner.kind)
            .field("listeners", &self.inner.events.receiver_count())
            .finish()
    }
}

/// One context's view of a [`SharedMedium`].
#[derive(Clone, Debug)]
pub struct SharedBackend {
    medium: SharedMedium,
    origin: ContextId,
}

impl SharedBackend {
    /// The context this handle writes as.
    pub fn origin(&self) -> ContextId {
        self.origin
    }

    /// The underlying medium.
    pub fn medium(&self) -> &SharedMedium {
        &self.medium
    }
}

impl Backend for SharedBackend {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.medium.inner.store.get_raw(key)
    }

    fn set_raw(&self, key: &str, value: String) -> Result<()> {
        self.medium.inner.store.set_raw(key, value.clone())?;
        self.medium.emit(key, Some(value), self.origin);
        Ok(())
    }

    fn remove_raw(&self, key: &str) -> Result<()> {
        let existed = self.medium.inner.store.get_raw(key)?.is_some();
        self.medium.inner.store.remove_raw(key)?;
        if existed {
            self.medium.emit(key, None, self.origin);
        }
        Ok(())
    }

    fn enumerate_raw(&self) -> Result<Vec<String>> {
        self.medium.inner.store.enumerate_raw()
    }

    fn is_externally_observable(&self) -> bool {
        true
    }

    fn changes(&self) -> Option<ChangeFeed> {
        Some(ChangeFeed {
            origin: self.origin,
            receiver: self.medium.inner.events.subscribe(),
        })
    }
}

/// Stream of changes made to a medium by other contexts.
#[derive(Debug)]
pub struct ChangeFeed {
    origin: ContextId,
    receiver: broadcast::Receiver<StorageEvent>,
}

impl ChangeFeed {
    /// Waits for the next change made by another context.
    ///
    /// Returns `None` once the medium is gone. Events missed because this
    /// feed fell behind are skipped with a warning.
    pub async fn next(&mut self) -> Option<StorageEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.origin == self.origin => continue,
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Change feed lagged, skipping events");
                },
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next pending change without waiting.
    pub fn try_next(&mut self) -> Option<StorageEvent> {
        use broadcast::error::TryRecvError;
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.origin == self.origin => continue,
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Change feed lagged, skipping events");
                },
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_share_entries() {
        let medium = SharedMedium::session();
        let tab_a = medium.attach();
        let tab_b = medium.attach();

        tab_a.set_raw("crux:k", "v".into()).unwrap();
        assert_eq!(tab_b.get_raw("crux:k").unwrap().as_deref(), Some("v"));
        assert_ne!(tab_a.origin(), tab_b.origin());
    }

    #[test]
    fn test_events_skip_own_writes() {
        let medium = SharedMedium::session();
        let tab_a = medium.attach();
        let tab_b = medium.attach();

        let mut feed_a = tab_a.changes().unwrap();
        let mut feed_b = tab_b.changes().unwrap();

        tab_a.set_raw("crux:k", "v".into()).unwrap();

        assert_eq!(feed_a.try_next(), None);
        let event = feed_b.try_next().unwrap();
        assert_eq!(event.key, "crux:k");
        assert_eq!(event.new_value.as_deref(), Some("v"));
        assert_eq!(event.origin, tab_a.origin());
    }

    #[test]
    fn test_remove_emits_only_when_present() {
        let medium = SharedMedium::session();
        let tab_a = medium.attach();
        let tab_b = medium.attach();
        let mut feed_b = tab_b.changes().unwrap();

        tab_a.remove_raw("crux:missing").unwrap();
        assert_eq!(feed_b.try_next(), None);

        tab_a.set_raw("crux:k", "v".into()).unwrap();
        tab_a.remove_raw("crux:k").unwrap();

        assert_eq!(feed_b.try_next().unwrap().new_value.as_deref(), Some("v"));
        let removal = feed_b.try_next().unwrap();
        assert_eq!(removal.key, "crux:k");
        assert_eq!(removal.new_value, None);
    }

    #[test]
    fn test_shared_backend_is_observable() {
        let medium = SharedMedium::volatile_local();
        assert_eq!(medium.kind(), MediumKind::Local);
        assert!(medium.attach().is_externally_observable());
    }

    #[tokio::test]
    async fn test_feed_ends_when_medium_dropped() {
        let medium = SharedMedium::session();
        let tab = medium.attach();
        let mut feed = tab.changes().unwrap();

        drop(tab);
        drop(medium);

        assert_eq!(feed.next().await, None);
    }
}
