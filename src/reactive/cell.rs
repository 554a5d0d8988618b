//! Observable value cells with optional persistence.
//!
//! A [`ReactiveCell`] holds one value in memory. A persistent cell is bound
//! to one key of an [`ExpiringCache`]: it hydrates from the cache when
//! created and writes through on every [`set`](ReactiveCell::set). If the
//! cache's medium is observable by other contexts, a [`ChangeBridge`] pushes
//! their writes back into the cell.

use super::batch::schedule;
use super::bridge::ChangeBridge;
use crate::storage::ExpiringCache;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Persist<T> = fn(&ExpiringCache, &str, &T, Option<Duration>);

/// Decides whether a stored or delivered value may enter a cell.
pub(crate) type Accept<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct Binding<T> {
    cache: ExpiringCache,
    key: String,
    ttl: Option<Duration>,
    persist: Persist<T>,
}

struct CellInner<T> {
    value: RwLock<T>,
    version: AtomicU64,
    default: T,
    binding: Option<Binding<T>>,
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_subscriber: AtomicU64,
    bridge: Mutex<Option<ChangeBridge>>,
}

/// A single observable value, optionally persisted.
///
/// Clones share the same value.
pub struct ReactiveCell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ReactiveCell<T> {
    /// Creates an in-memory cell.
    pub fn new(value: T) -> Self {
        Self::build(value.clone(), value, None)
    }

    fn build(value: T, default: T, binding: Option<Binding<T>>) -> Self {
        Self {
            inner: Arc::new(CellInner {
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                default,
                binding,
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(0),
                bridge: Mutex::new(None),
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrows the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Number of changes since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// The value the cell was seeded with when nothing was persisted.
    pub fn default_value(&self) -> &T {
        &self.inner.default
    }

    /// Logical key in the bound cache, if persistent.
    pub fn key(&self) -> Option<&str> {
        self.inner.binding.as_ref().map(|binding| binding.key.as_str())
    }

    /// Whether the cell writes through to a cache.
    pub fn is_persistent(&self) -> bool {
        self.inner.binding.is_some()
    }

    /// Whether a bridge is delivering changes from other contexts.
    pub fn is_bridged(&self) -> bool {
        self.inner
            .bridge
            .lock()
            .as_ref()
            .is_some_and(ChangeBridge::is_active)
    }

    /// Replaces the value, persists it, then notifies subscribers.
    pub fn set(&self, value: T) {
        if let Some(binding) = &self.inner.binding {
            (binding.persist)(&binding.cache, &binding.key, &value, binding.ttl);
        }
        self.replace(value);
    }

    /// Applies `f` to the current value and sets the result.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.read());
        self.set(next);
    }

    /// Registers a callback run with the new value after every change.
    ///
    /// The registration lasts until the returned [`Subscription`] is
    /// dropped.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .push((id, Arc::new(callback)));

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.lock().retain(|(other, _)| *other != id);
            }
        })
    }

    /// Removes the persisted entry. The in-memory value is kept.
    pub fn clear_persisted(&self) {
        if let Some(binding) = &self.inner.binding {
            binding.cache.remove(&binding.key);
        }
    }

    /// Sets the in-memory value and notifies, without persisting.
    pub(crate) fn replace(&self, value: T) {
        *self.inner.value.write() = value;
        self.inner.version.fetch_add(1, Ordering::AcqRel);
        self.notify();
    }

    fn notify(&self) {
        let id = Arc::as_ptr(&self.inner) as usize;
        let cell = self.clone();
        schedule(id, move || cell.emit());
    }

    fn emit(&self) {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        if callbacks.is_empty() {
            return;
        }

        let value = self.get();
        for callback in callbacks {
            callback(&value);
        }
    }

    pub(crate) fn downgrade(&self) -> WeakCell<T> {
        WeakCell {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T> ReactiveCell<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a cell bound to `key` in `cache`.
    ///
    /// The cell starts with the stored value, or `default` if nothing live
    /// is stored. The default is not written back. When the cache's medium
    /// is externally observable and a tokio runtime is running, changes
    /// made by other contexts flow into the cell.
    pub fn persistent(key: &str, default: T, cache: &ExpiringCache) -> Self {
        Self::persistent_with_ttl(key, default, cache, None)
    }

    /// Like [`persistent`](Self::persistent), with a ttl for every write.
    ///
    /// `None` falls back to the cache's default ttl.
    pub fn persistent_with_ttl(
        key: &str,
        default: T,
        cache: &ExpiringCache,
        ttl: Option<Duration>,
    ) -> Self {
        Self::bind(key, default, cache, ttl, None)
    }

    /// Persistent cell that only takes values passing `accept`.
    ///
    /// A stored value that fails the check hydrates as `default`; a
    /// delivered one is dropped like an undecodable payload.
    pub(crate) fn persistent_checked(
        key: &str,
        default: T,
        cache: &ExpiringCache,
        accept: Accept<T>,
    ) -> Self {
        Self::bind(key, default, cache, None, Some(accept))
    }

    fn bind(
        key: &str,
        default: T,
        cache: &ExpiringCache,
        ttl: Option<Duration>,
        accept: Option<Accept<T>>,
    ) -> Self {
        let initial = match cache.read::<T>(key) {
            Some(stored) if accept.as_ref().is_none_or(|check| check(&stored)) => stored,
            Some(_) => {
                warn!(key, "Stored value rejected, using default");
                default.clone()
            },
            None => {
                debug!(key, "No stored value, using default");
                default.clone()
            },
        };

        let binding = Binding {
            cache: cache.clone(),
            key: key.to_string(),
            ttl,
            persist: write_through::<T>,
        };
        let cell = Self::build(initial, default, Some(binding));

        let bridge = ChangeBridge::attach(&cell, cache, key, accept);
        *cell.inner.bridge.lock() = bridge;
        cell
    }
}

fn write_through<T: Serialize>(
    cache: &ExpiringCache,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) {
    cache.write(key, value, ttl);
}

impl<T: fmt::Debug> fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("value", &*self.inner.value.read())
            .field("version", &self.inner.version.load(Ordering::Relaxed))
            .field(
                "key",
                &self.inner.binding.as_ref().map(|binding| &binding.key),
            )
            .finish_non_exhaustive()
    }
}

/// Non-owning handle to a cell, held by bridge tasks.
pub(crate) struct WeakCell<T> {
    inner: Weak<CellInner<T>>,
}

impl<T> WeakCell<T> {
    pub(crate) fn upgrade(&self) -> Option<ReactiveCell<T>> {
        self.inner.upgrade().map(|inner| ReactiveCell { inner })
    }
}

/// Keeps a cell subscription alive. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribes now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keeps the callback registered for the cell's lifetime.
    pub fn forget(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
