//! CLI command implementations for crux.
//!
//! - [`storage`] - get/set/rm/keys/clear/purge against the durable local medium

pub mod storage;

use anyhow::Result;
use std::path::Path;
use tracing::{debug, warn};

use crux::config::CruxConfig;
use crux::storage::{ExpiringCache, Platform, StorageKind};

/// Loaded configuration plus the cache commands operate on.
pub struct Context {
    pub config: CruxConfig,
    pub cache: ExpiringCache,
}

impl Context {
    /// Loads `config_path` (defaults if missing), validates it and opens
    /// the local medium.
    pub fn load(config_path: &Path, prefix: Option<String>) -> Result<Self> {
        let mut config = CruxConfig::load_or_default(config_path)?;
        if let Some(prefix) = prefix {
            config.storage.prefix = prefix;
        }

        let validation = config.validate()?;
        for warning in &validation.warnings {
            warn!("{warning}");
        }

        let path = config.local_path()?;
        debug!(path = %path.display(), "Opening local medium");
        let platform = Platform::open(&path)?;

        // The CLI always inspects the durable medium.
        let mut options = config.storage_options();
        options.kind = StorageKind::Local;
        let cache = platform.storage(options);

        Ok(Self { config, cache })
    }
}
