//! Multi-field reactive store.
//!
//! A [`ReactiveStore`] splits an aggregate state `T` into one
//! [`ReactiveCell`] per top-level field. Cells may be persisted under
//! `"{storage_key}:{field}"`. [`ReactiveStore::set_state`] applies a partial
//! update as one batch and then notifies every store subscriber once.

use super::batch::batch;
use super::cell::{Accept, ReactiveCell};
use crate::constants::DEFAULT_STORE_KEY;
use crate::error::{Error, Result};
use crate::storage::ExpiringCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Construction options for a [`ReactiveStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig<T> {
    /// State the store starts from and [`reset`](ReactiveStore::reset)
    /// returns to.
    pub initial_state: T,
    /// Whether cells write through to `storage`.
    pub persist: bool,
    /// Cache used when `persist` is set.
    pub storage: Option<ExpiringCache>,
    /// Key namespace for the fields, `"store"` when unset.
    pub storage_key: Option<String>,
}

impl<T> StoreConfig<T> {
    /// In-memory store starting from `initial_state`.
    pub fn new(initial_state: T) -> Self {
        Self {
            initial_state,
            persist: false,
            storage: None,
            storage_key: None,
        }
    }

    /// Persists every field to `cache`.
    #[must_use]
    pub fn persist(mut self, cache: ExpiringCache) -> Self {
        self.persist = true;
        self.storage = Some(cache);
        self
    }

    /// Sets the key namespace for the fields.
    #[must_use]
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

/// Token returned by [`ReactiveStore::subscribe`].
///
/// Unlike a cell [`Subscription`](super::Subscription), dropping the token
/// keeps the registration.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    subscribers: Weak<Subscribers>,
    id: u64,
}

impl Unsubscribe {
    /// Removes exactly the registration this token was returned for.
    /// Calling it again does nothing.
    pub fn unsubscribe(&self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.entries.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.entries.lock().len())
            .finish()
    }
}

/// Reactive aggregate state, one cell per top-level field.
///
/// # Example
///
/// ```
/// use crux::reactive::{ReactiveStore, StoreConfig};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Counter {
///     count: i64,
///     label: String,
/// }
///
/// let store = ReactiveStore::new(StoreConfig::new(Counter {
///     count: 0,
///     label: "clicks".into(),
/// }))?;
///
/// store.set_state(serde_json::json!({ "count": 3 }))?;
/// assert_eq!(store.get_snapshot()?.count, 3);
/// # Ok::<(), crux::Error>(())
/// ```
pub struct ReactiveStore<T> {
    cells: BTreeMap<String, ReactiveCell<Value>>,
    initial: Map<String, Value>,
    storage: Option<ExpiringCache>,
    storage_key: String,
    subscribers: Arc<Subscribers>,
    _state: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> ReactiveStore<T> {
    /// Builds the store, hydrating persisted fields.
    ///
    /// A persisted field whose stored value no longer fits `T` starts from
    /// its initial value instead. Values from other contexts that do not fit
    /// are dropped, so the fields always form a valid `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if `initial_state` does not serialize to an object,
    /// or `persist` is set without a cache.
    pub fn new(config: StoreConfig<T>) -> Result<Self> {
        let storage_key = config
            .storage_key
            .unwrap_or_else(|| DEFAULT_STORE_KEY.to_string());

        let initial = match serde_json::to_value(&config.initial_state) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(Error::invalid_state(format!(
                    "store state must be an object with named fields, got {}",
                    kind_of(&other)
                )));
            },
            Err(err) => return Err(Error::encode(&storage_key, err)),
        };

        let storage = match (config.persist, config.storage) {
            (true, Some(cache)) => Some(cache),
            (true, None) => {
                return Err(Error::Config(
                    "persist is set but no storage cache was given".to_string(),
                ));
            },
            (false, _) => None,
        };

        let mut cells = BTreeMap::new();
        for (field, default) in &initial {
            let cell = match &storage {
                Some(cache) => {
                    let key = field_key(&storage_key, field);
                    let accept = field_check(fits::<T>, &initial, field);
                    ReactiveCell::persistent_checked(&key, default.clone(), cache, accept)
                },
                None => ReactiveCell::new(default.clone()),
            };
            cells.insert(field.clone(), cell);
        }

        debug!(
            storage_key = %storage_key,
            fields = cells.len(),
            persisted = storage.is_some(),
            "Store created"
        );

        Ok(Self {
            cells,
            initial,
            storage,
            storage_key,
            subscribers: Arc::new(Subscribers::default()),
            _state: PhantomData,
        })
    }

    /// The live cells, keyed by field.
    ///
    /// Setting a cell directly persists it but does not notify store
    /// subscribers.
    pub fn state(&self) -> &BTreeMap<String, ReactiveCell<Value>> {
        &self.cells
    }

    /// The cell for one field.
    pub fn cell(&self, field: &str) -> Option<&ReactiveCell<Value>> {
        self.cells.get(field)
    }

    /// Key namespace of the persisted fields.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Whether fields are written through to a cache.
    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    /// Reads every field into a plain `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if a cell was set directly to a value that does not
    /// fit `T`.
    pub fn get_snapshot(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.current()))
            .map_err(|err| Error::decode(&self.storage_key, err))
    }

    /// Applies a partial update, then notifies subscribers once.
    ///
    /// Fields in `partial` that the store does not have are ignored. The
    /// update is checked against `T` first; if it does not fit, nothing is
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns an error if `partial` is not an object or the merged state
    /// does not fit `T`.
    pub fn set_state<P: Serialize>(&self, partial: P) -> Result<()> {
        let partial = match serde_json::to_value(partial) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(Error::invalid_state(format!(
                    "partial state must be an object, got {}",
                    kind_of(&other)
                )));
            },
            Err(err) => return Err(Error::encode(&self.storage_key, err)),
        };

        let updates: Vec<(String, Value)> = partial
            .into_iter()
            .filter(|(field, _)| self.cells.contains_key(field))
            .collect();

        let mut merged = self.current();
        for (field, value) in &updates {
            merged.insert(field.clone(), value.clone());
        }
        serde_json::from_value::<T>(Value::Object(merged))
            .map_err(|err| Error::invalid_state(format!("state update rejected: {err}")))?;

        batch(|| {
            for (field, value) in updates {
                if let Some(cell) = self.cells.get(&field) {
                    cell.set(value);
                }
            }
        });
        self.notify();
        Ok(())
    }

    /// Restores the construction state, with one notification.
    ///
    /// # Errors
    ///
    /// Never fails for a store built from a valid `T`; the signature
    /// matches [`set_state`](Self::set_state).
    pub fn reset(&self) -> Result<()> {
        self.set_state(Value::Object(self.initial.clone()))
    }

    /// Registers a callback run once after every `set_state` or `reset`.
    ///
    /// Callbacks run in registration order; registering the same callback
    /// twice runs it twice.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Unsubscribe {
        let id = self.subscribers.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entries
            .lock()
            .push((id, Arc::new(callback)));
        Unsubscribe {
            subscribers: Arc::downgrade(&self.subscribers),
            id,
        }
    }

    /// Removes every field's persisted entry. In-memory values are kept.
    pub fn clear_persisted(&self) {
        if self.storage.is_none() {
            return;
        }
        for cell in self.cells.values() {
            cell.clear_persisted();
        }
    }

    fn current(&self) -> Map<String, Value> {
        self.cells
            .iter()
            .map(|(field, cell)| (field.clone(), cell.get()))
            .collect()
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = self
            .subscribers
            .entries
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl<T> fmt::Debug for ReactiveStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveStore")
            .field("storage_key", &self.storage_key)
            .field("fields", &self.cells.keys().collect::<Vec<_>>())
            .field("persisted", &self.storage.is_some())
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

fn field_key(storage_key: &str, field: &str) -> String {
    format!("{storage_key}:{field}")
}

/// Per-field check for persisted cells, built on `fits` for the store's `T`.
fn field_check(
    fits: fn(&Map<String, Value>, &str, &Value) -> bool,
    initial: &Map<String, Value>,
    field: &str,
) -> Accept<Value> {
    let initial = initial.clone();
    let field = field.to_string();
    Arc::new(move |value: &Value| fits(&initial, &field, value))
}

/// Checks that `value` in place of `field` still deserializes as `T`.
fn fits<T: DeserializeOwned>(initial: &Map<String, Value>, field: &str, value: &Value) -> bool {
    let mut candidate = initial.clone();
    candidate.insert(field.to_string(), value.clone());
    serde_json::from_value::<T>(Value::Object(candidate)).is_ok()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
