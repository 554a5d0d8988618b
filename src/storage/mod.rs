//! Typed key/value storage with TTL expiry and pluggable backends.
//!
//! Values are wrapped in an [`Envelope`] (`{value, timestamp, ttl}`), encoded
//! by a [`KeyCodec`] under a namespaced key and handed to a raw [`Backend`].
//! Supported media:
//!
//! - **MemoryBackend**: process-local, never observable (tests, scratch state)
//! - **Local**: durable redb file shared by every execution context
//! - **Session**: volatile medium shared by every execution context
//! - **IndexedStorage**: async database/object-store pairs, faults propagate
//!
//! # Example
//!
//! ```ignore
//! use crux::storage::{Platform, StorageKind, StorageOptions};
//! use std::time::Duration;
//!
//! let platform = Platform::open("~/.local/share/crux/local.redb")?;
//! let cache = platform.storage(StorageOptions::new(StorageKind::Local).prefix("app:"));
//! cache.write("token", "abc", Some(Duration::from_secs(3600)));
//! let token: Option<String> = cache.read("token");
//! ```
//!
//! # Custom Backends
//!
//! Implement [`Backend`] and wrap it with [`ExpiringCache::new`]:
//!
//! ```ignore
//! use crux::storage::{Backend, ExpiringCache, KeyCodec};
//!
//! struct RemoteBackend { /* ... */ }
//! impl Backend for RemoteBackend { /* ... */ }
//!
//! let cache = ExpiringCache::new(RemoteBackend::new(), KeyCodec::new("remote:"));
//! ```

mod backend;
mod cache;
mod codec;
mod indexed;
mod memory;
mod platform;
mod redb;
mod shared;
mod types;


pub use backend::{AsyncBackend, Backend};
pub use cache::{ExpiringCache, StorageKind, StorageOptions};
pub use codec::{EnvelopeFormat, FnFormat, JsonFormat, KeyCodec};
pub use indexed::IndexedStorage;
pub use memory::MemoryBackend;
pub use platform::Platform;
pub use redb::RedbBackend;
pub use shared::{ChangeFeed, MediumKind, SharedBackend, SharedMedium};
pub use types::{ContextId, Envelope, StorageEvent, now_millis};
