//! Defaults shared by the storage layer, the reactive store and the CLI.

/// Namespace prepended to every logical key unless configured otherwise.
pub const DEFAULT_PREFIX: &str = "crux:";

/// Storage key used by a `ReactiveStore` when none is configured.
pub const DEFAULT_STORE_KEY: &str = "store";

/// Database name used by `IndexedStorage::open_default`.
pub const DEFAULT_DB_NAME: &str = "crux-db";

/// Object store (table) name used by `IndexedStorage::open_default`.
pub const DEFAULT_STORE_NAME: &str = "store";

/// redb table holding the entries of a durable shared medium.
pub const LOCAL_TABLE: &str = "local";

/// File name of the durable local medium inside the data directory.
pub const LOCAL_DB_FILE: &str = "local.redb";

/// Directory under the platform data dir used when no path is configured.
pub const DATA_DIR_NAME: &str = "crux";

/// Configuration file looked up by the CLI.
pub const CONFIG_FILE: &str = "crux.toml";

/// Buffered change events per shared medium before slow listeners lag.
pub const CHANGE_FEED_CAPACITY: usize = 256;
