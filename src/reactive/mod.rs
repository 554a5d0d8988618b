//! Reactive state bound to storage.
//!
//! - [`ReactiveCell`]: one observable value, optionally persisted to a key
//! - [`ChangeBridge`]: pushes other contexts' writes into a persisted cell
//! - [`ReactiveStore`]: an aggregate state split into one cell per field
//!
//! # Example
//!
//! ```ignore
//! use crux::reactive::{ReactiveStore, StoreConfig, storage_cell};
//! use crux::storage::Platform;
//!
//! let platform = Platform::open(path)?;
//! let theme = storage_cell("theme", "light".to_string(), &platform.local_storage());
//! theme.set("dark".to_string());
//!
//! let store = ReactiveStore::new(
//!     StoreConfig::new(AppState::default())
//!         .persist(platform.local_storage())
//!         .storage_key("app"),
//! )?;
//! let token = store.subscribe(|| println!("state changed"));
//! store.set_state(serde_json::json!({ "count": 1 }))?;
//! token.unsubscribe();
//! ```

mod batch;
mod bridge;
mod cell;
mod store;


pub use batch::{batch, is_batching};
pub use bridge::ChangeBridge;
pub use cell::{ReactiveCell, Subscription};
pub use store::{ReactiveStore, StoreConfig, Unsubscribe};

use crate::storage::ExpiringCache;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Creates a cell persisted under `key` in `cache`.
///
/// Shorthand for [`ReactiveCell::persistent`].
pub fn storage_cell<T>(key: &str, default: T, cache: &ExpiringCache) -> ReactiveCell<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    ReactiveCell::persistent(key, default, cache)
}
