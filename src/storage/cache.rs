//! TTL-aware typed cache over a raw backend.
//!
//! [`ExpiringCache`] is the only layer that knows about envelopes, prefixes
//! and expiry. Reads check the envelope's age and delete expired entries on
//! access. Every backend, codec or encoding fault is logged and absorbed
//! here: a broken medium behaves like an empty one, it never panics or
//! surfaces an error to the caller.

use super::backend::Backend;
use super::codec::{EnvelopeFormat, JsonFormat, KeyCodec};
use super::memory::MemoryBackend;
use super::shared::ChangeFeed;
use super::types::Envelope;
use crate::constants::DEFAULT_PREFIX;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Storage medium selected by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Private to one cache, never observable.
    Memory,
    /// Durable medium shared across contexts.
    #[default]
    Local,
    /// Volatile medium shared across contexts.
    Session,
}

/// Options for building a cache through `Platform::storage`.
#[derive(Clone)]
pub struct StorageOptions {
    /// Medium to use.
    pub kind: StorageKind,
    /// Namespace prefix for every key.
    pub prefix: String,
    /// Expiry applied to writes that don't pass their own ttl.
    pub ttl: Option<Duration>,
    /// Envelope serializer pair.
    pub format: Arc<dyn EnvelopeFormat>,
}

impl StorageOptions {
    /// Default options for the given medium.
    pub fn new(kind: StorageKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the default ttl.
    #[must_use]
    pub fn ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets a custom envelope format.
    #[must_use]
    pub fn format(mut self, format: impl EnvelopeFormat) -> Self {
        self.format = Arc::new(format);
        self
    }

    pub(crate) fn codec(&self) -> KeyCodec {
        KeyCodec::from_parts(self.prefix.clone(), Arc::clone(&self.format))
    }
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            prefix: DEFAULT_PREFIX.to_string(),
            ttl: None,
            format: Arc::new(JsonFormat),
        }
    }
}

impl fmt::Debug for StorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageOptions")
            .field("kind", &self.kind)
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Typed key/value cache with lazy TTL expiry.
///
/// `ExpiringCache` is `Clone`; clones share the backend.
///
/// # Example
///
/// ```
/// use crux::storage::ExpiringCache;
/// use std::time::Duration;
///
/// let cache = ExpiringCache::memory();
/// cache.write("session", &"token", Some(Duration::from_secs(3600)));
/// assert_eq!(cache.read::<String>("session").as_deref(), Some("token"));
/// assert_eq!(cache.keys(), vec!["session"]);
/// ```
#[derive(Clone)]
pub struct ExpiringCache {
    backend: Arc<dyn Backend>,
    codec: KeyCodec,
    default_ttl: Option<Duration>,
}

impl ExpiringCache {
    /// Creates a cache over `backend`.
    pub fn new(backend: impl Backend, codec: KeyCodec) -> Self {
        Self::from_arc(Arc::new(backend), codec)
    }

    /// Creates a cache over a shared backend handle.
    pub fn from_arc(backend: Arc<dyn Backend>, codec: KeyCodec) -> Self {
        Self {
            backend,
            codec,
            default_ttl: None,
        }
    }

    /// Creates a cache over a fresh process-local memory backend with the
    /// default prefix.
    pub fn memory() -> Self {
        Self::new(MemoryBackend::new(), KeyCodec::default())
    }

    /// Sets the ttl applied to writes that don't pass their own.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// The key codec (prefix and format).
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// The raw backend.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// The ttl applied to writes without an explicit one.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Whether other contexts can observe this cache's medium.
    pub fn is_externally_observable(&self) -> bool {
        self.backend.is_externally_observable()
    }

    /// Subscribes to changes made to the medium by other contexts.
    pub fn changes(&self) -> Option<ChangeFeed> {
        self.backend.changes()
    }

    /// Reads a value, or `None` if absent, expired or unreadable.
    ///
    /// An expired entry is removed from the backend as a side effect.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.codec.namespaced(key);

        let raw = match self.backend.get_raw(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = %full_key, "Storage get error: {err:#}");
                return None;
            },
        };

        let envelope: Envelope<T> = match self.codec.decode(&full_key, &raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(key = %full_key, "Storage get error: {err}");
                return None;
            },
        };

        if envelope.is_expired() {
            debug!(key = %full_key, "Entry expired, removing");
            self.remove_namespaced(&full_key);
            return None;
        }

        Some(envelope.value)
    }

    /// Reads a value, falling back to `default` when absent.
    pub fn read_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.read(key).unwrap_or(default)
    }

    /// Writes a value stamped with the current time.
    ///
    /// `ttl` overrides the cache's default ttl for this write. Any previous
    /// entry is overwritten regardless of its own expiry.
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let full_key = self.codec.namespaced(key);
        let envelope = Envelope::new(value, ttl.or(self.default_ttl));

        let raw = match self.codec.encode(&full_key, &envelope) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key = %full_key, "Storage set error: {err}");
                return;
            },
        };

        if let Err(err) = self.backend.set_raw(&full_key, raw) {
            warn!(key = %full_key, "Storage set error: {err:#}");
        }
    }

    /// Removes a key.
    pub fn remove(&self, key: &str) {
        self.remove_namespaced(&self.codec.namespaced(key));
    }

    fn remove_namespaced(&self, full_key: &str) {
        if let Err(err) = self.backend.remove_raw(full_key) {
            warn!(key = %full_key, "Storage remove error: {err:#}");
        }
    }

    /// Removes every key in this cache's namespace.
    ///
    /// Entries under other prefixes on the same medium are left alone.
    pub fn clear(&self) {
        for full_key in self.namespaced_keys() {
            self.remove_namespaced(&full_key);
        }
    }

    /// Lists logical keys (prefix stripped) in this cache's namespace.
    ///
    /// Does not check expiry.
    pub fn keys(&self) -> Vec<String> {
        self.namespaced_keys()
            .iter()
            .filter_map(|full_key| self.codec.logical(full_key))
            .map(str::to_string)
            .collect()
    }

    /// Checks whether a key holds a live value.
    ///
    /// Defined as `read(key).is_some()`, so it also removes an expired entry.
    pub fn has(&self, key: &str) -> bool {
        self.read::<Value>(key).is_some()
    }

    /// Removes every expired entry in this namespace and returns how many
    /// were removed.
    ///
    /// Expiry normally happens lazily on read; call this to reclaim space
    /// for keys that are never read again. Undecodable entries are skipped.
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0;
        for full_key in self.namespaced_keys() {
            let raw = match self.backend.get_raw(&full_key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(key = %full_key, "Storage get error: {err:#}");
                    continue;
                },
            };

            let Ok(envelope) = self.codec.decode::<Value>(&full_key, &raw) else {
                continue;
            };

            if envelope.is_expired() {
                self.remove_namespaced(&full_key);
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, prefix = self.codec.prefix(), "Purged expired entries");
        }
        removed
    }

    fn namespaced_keys(&self) -> Vec<String> {
        match self.backend.enumerate_raw() {
            Ok(keys) => keys
                .into_iter()
                .filter(|key| self.codec.logical(key).is_some())
                .collect(),
            Err(err) => {
                warn!(prefix = self.codec.prefix(), "Storage keys error: {err:#}");
                Vec::new()
            },
        }
    }
}

impl fmt::Debug for ExpiringCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("prefix", &self.codec.prefix())
            .field("default_ttl", &self.default_ttl)
            .field("observable", &self.is_externally_observable())
            .finish()
    }
}
