//! Cross-context change delivery.
//!
//! A [`ChangeBridge`] is a tokio task that follows a cache's change feed
//! and pushes values written by other contexts into one cell. It only
//! exists for externally observable media. Delivered values go straight
//! into the cell's memory slot: they are neither written back nor echoed
//! to other contexts.

use super::cell::{Accept, ReactiveCell, WeakCell};
use crate::storage::{ChangeFeed, ExpiringCache, KeyCodec, StorageEvent};
use serde::de::DeserializeOwned;
use std::fmt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Background listener feeding one cell. Stops when dropped.
pub struct ChangeBridge {
    key: String,
    task: JoinHandle<()>,
}

impl ChangeBridge {
    /// Starts a bridge for `cell`, bound to logical `key` in `cache`.
    ///
    /// Values failing `accept` are dropped. Returns `None` when the medium
    /// is not externally observable, or no tokio runtime is available to
    /// run the listener.
    pub(crate) fn attach<T>(
        cell: &ReactiveCell<T>,
        cache: &ExpiringCache,
        key: &str,
        accept: Option<Accept<T>>,
    ) -> Option<Self>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        if !cache.is_externally_observable() {
            return None;
        }

        let full_key = cache.codec().namespaced(key);
        let Ok(handle) = Handle::try_current() else {
            debug!(key = %full_key, "No runtime, cross-context updates disabled");
            return None;
        };
        let feed = cache.changes()?;

        let task = handle.spawn(run(
            cell.downgrade(),
            feed,
            cache.codec().clone(),
            full_key.clone(),
            accept,
        ));
        debug!(key = %full_key, "Change bridge attached");

        Some(Self {
            key: full_key,
            task,
        })
    }

    /// Namespaced key this bridge follows.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the listener task is still running.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ChangeBridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl fmt::Debug for ChangeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBridge")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

async fn run<T>(
    cell: WeakCell<T>,
    mut feed: ChangeFeed,
    codec: KeyCodec,
    full_key: String,
    accept: Option<Accept<T>>,
) where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    while let Some(event) = feed.next().await {
        let Some(cell) = cell.upgrade() else {
            break;
        };
        let Some(value) = extract::<T>(&codec, &full_key, &event) else {
            continue;
        };
        if accept.as_ref().is_none_or(|check| check(&value)) {
            cell.replace(value);
        } else {
            debug!(key = %full_key, "Dropping change rejected by the cell");
        }
    }
    debug!(key = %full_key, "Change bridge stopped");
}

/// Extracts the value an event carries for `full_key`, if any.
///
/// Removals and other keys yield `None`; so does a payload that fails to
/// decode, which is dropped without touching the cell.
fn extract<T: DeserializeOwned>(
    codec: &KeyCodec,
    full_key: &str,
    event: &StorageEvent,
) -> Option<T> {
    if event.key != full_key {
        return None;
    }
    let raw = event.new_value.as_deref()?;

    match codec.decode::<T>(full_key, raw) {
        Ok(envelope) => Some(envelope.value),
        Err(err) => {
            debug!(key = %full_key, "Dropping change: {err}");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ContextId, Envelope};

    fn event(key: &str, new_value: Option<String>) -> StorageEvent {
        StorageEvent {
            key: key.to_string(),
            new_value,
            origin: ContextId::next(),
        }
    }

    fn encoded(codec: &KeyCodec, value: i32) -> String {
        codec
            .encode("crux:count", &Envelope::new(value, None))
            .unwrap()
    }

    #[test]
    fn test_accepts_matching_key() {
        let codec = KeyCodec::default();
        let raw = encoded(&codec, 5);

        assert_eq!(
            extract::<i32>(&codec, "crux:count", &event("crux:count", Some(raw))),
            Some(5)
        );
    }

    #[test]
    fn test_ignores_other_keys() {
        let codec = KeyCodec::default();
        let raw = encoded(&codec, 5);

        assert_eq!(
            extract::<i32>(&codec, "crux:count", &event("crux:other", Some(raw))),
            None
        );
    }

    #[test]
    fn test_ignores_removals() {
        let codec = KeyCodec::default();
        assert_eq!(
            extract::<i32>(&codec, "crux:count", &event("crux:count", None)),
            None
        );
    }

    #[test]
    fn test_drops_malformed_payload() {
        let codec = KeyCodec::default();
        let bad = event("crux:count", Some("{not json".to_string()));
        let wrong_type = event(
            "crux:count",
            Some(r#"{"value":"x","timestamp":0}"#.to_string()),
        );

        assert_eq!(extract::<i32>(&codec, "crux:count", &bad), None);
        assert_eq!(extract::<i32>(&codec, "crux:count", &wrong_type), None);
    }
}
