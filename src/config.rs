//! Configuration for crux.
//!
//! Settings are loaded from a `crux.toml` file:
//!
//! - [`CruxConfig`] - Root configuration struct
//! - [`StorageSection`] - Medium, key prefix and default ttl
//! - [`LocalSection`] - Location of the durable local medium
//! - [`StoreSection`] - Defaults for reactive stores
//!
//! Every section is optional and falls back to the defaults in
//! [`crate::constants`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::error::Error;
use crate::reactive::StoreConfig;
use crate::storage::{ExpiringCache, StorageKind, StorageOptions};

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// crux.toml configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CruxConfig {
    pub storage: StorageSection,
    pub local: LocalSection,
    pub store: StoreSection,
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Namespace prepended to every key.
    pub prefix: String,
    /// Medium used by default.
    pub kind: StorageKind,
    /// Expiry applied to writes without their own ttl. `0` never expires.
    pub default_ttl_ms: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            prefix: constants::DEFAULT_PREFIX.to_string(),
            kind: StorageKind::default(),
            default_ttl_ms: 0,
        }
    }
}

/// `[local]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LocalSection {
    /// redb file of the durable medium. `~` expands to the home directory.
    pub path: Option<String>,
}

/// `[store]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Key namespace of persisted store fields.
    pub storage_key: String,
    /// Whether stores write their fields through to storage.
    pub persist: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            storage_key: constants::DEFAULT_STORE_KEY.to_string(),
            persist: true,
        }
    }
}

impl CruxConfig {
    /// Load configuration from crux.toml in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if crux.toml cannot be read or contains invalid TOML.
    pub fn load() -> Result<Self> {
        Self::load_from(constants::CONFIG_FILE)
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A field has an invalid type or an unknown storage kind
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: CruxConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration from `path` if it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every problem found:
    /// - Empty or whitespace-containing prefix
    /// - Empty store storage key
    pub fn validate(&self) -> crate::Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let prefix = &self.storage.prefix;
        if prefix.is_empty() {
            errors.push(
                "storage.prefix cannot be empty\n  \
                 An empty prefix makes clear() remove every key on the medium"
                    .to_string(),
            );
        } else if prefix.chars().any(char::is_whitespace) {
            errors.push(format!("storage.prefix cannot contain whitespace (got: '{prefix}')"));
        } else if !prefix.ends_with([':', '/', '.', '-', '_']) {
            warnings.push(format!(
                "storage.prefix '{prefix}' does not end with a separator\n  \
                 Recommendation: use something like '{prefix}:' so keys stay readable"
            ));
        }

        if self.storage.default_ttl_ms > 0 && self.storage.default_ttl_ms < 1000 {
            warnings.push(format!(
                "storage.default_ttl_ms {} is under one second\n  \
                 Entries will expire almost immediately after being written",
                self.storage.default_ttl_ms
            ));
        }

        if self.store.storage_key.is_empty() {
            errors.push("store.storage_key cannot be empty".to_string());
        }

        if let Some(path) = &self.local.path
            && path.trim().is_empty()
        {
            errors.push("local.path cannot be blank (omit it to use the default)".to_string());
        }

        if !errors.is_empty() {
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )));
        }

        Ok(ValidationResult { warnings })
    }

    /// The default ttl, `None` when it is zero.
    pub fn default_ttl(&self) -> Option<Duration> {
        match self.storage.default_ttl_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Cache options derived from the `[storage]` section.
    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions::new(self.storage.kind)
            .prefix(self.storage.prefix.clone())
            .ttl(self.default_ttl())
    }

    /// Store options from the `[store]` section.
    ///
    /// `cache` is only attached when `store.persist` is set.
    pub fn store_config<T>(&self, initial_state: T, cache: ExpiringCache) -> StoreConfig<T> {
        let config =
            StoreConfig::new(initial_state).storage_key(self.store.storage_key.clone());
        if self.store.persist {
            config.persist(cache)
        } else {
            config
        }
    }

    /// Resolved path of the durable local medium.
    ///
    /// Resolution order:
    /// 1. `local.path` (with `~` expanded)
    /// 2. `CRUX_HOME/local.redb` (if set)
    /// 3. `<data dir>/crux/local.redb`
    ///
    /// # Errors
    ///
    /// Returns an error if the home or data directory cannot be determined.
    pub fn local_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.local.path {
            return expand_home(path);
        }

        if let Ok(home) = std::env::var("CRUX_HOME")
            && !home.is_empty()
        {
            return Ok(PathBuf::from(home).join(constants::LOCAL_DB_FILE));
        }

        let data = dirs::data_dir().context("Failed to get data directory")?;
        Ok(data
            .join(constants::DATA_DIR_NAME)
            .join(constants::LOCAL_DB_FILE))
    }
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
            let home = dirs::home_dir().context("Failed to get home directory")?;
            Ok(home.join(rest.trim_start_matches(['/', '\\'])))
        },
        _ => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config: CruxConfig = toml::from_str("").unwrap();
        assert_eq!(config.storage.prefix, "crux:");
        assert_eq!(config.storage.kind, StorageKind::Local);
        assert_eq!(config.store.storage_key, "store");
        assert!(config.store.persist);
        assert!(config.default_ttl().is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[storage]
prefix = "app:"
kind = "session"
default_ttl_ms = 60000

[local]
path = "/tmp/crux/local.redb"

[store]
storage_key = "app-state"
persist = false
"#;
        let config: CruxConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage.prefix, "app:");
        assert_eq!(config.storage.kind, StorageKind::Session);
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(
            config.local_path().unwrap(),
            PathBuf::from("/tmp/crux/local.redb")
        );
        assert_eq!(config.store.storage_key, "app-state");
        assert!(!config.store.persist);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result: std::result::Result<CruxConfig, _> = toml::from_str(
            r#"
[storage]
kind = "cookies"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_storage_options_follow_config() {
        let config: CruxConfig = toml::from_str(
            r#"
[storage]
prefix = "x:"
kind = "memory"
default_ttl_ms = 5000
"#,
        )
        .unwrap();

        let options = config.storage_options();
        assert_eq!(options.kind, StorageKind::Memory);
        assert_eq!(options.prefix, "x:");
        assert_eq!(options.ttl, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_store_config_follows_store_section() {
        let config: CruxConfig = toml::from_str("[store]\nstorage_key = \"prefs\"\n").unwrap();

        let store = config.store_config(0_u8, ExpiringCache::memory());
        assert_eq!(store.storage_key.as_deref(), Some("prefs"));
        assert!(store.persist);
        assert!(store.storage.is_some());
    }

    #[test]
    fn test_store_config_without_persist() {
        let mut config = CruxConfig::default();
        config.store.persist = false;

        let store = config.store_config(0_u8, ExpiringCache::memory());
        assert!(!store.persist);
        assert!(store.storage.is_none());
        assert_eq!(store.storage_key.as_deref(), Some("store"));
    }

    #[test]
    fn test_validate_default_config() {
        let result = CruxConfig::default().validate().unwrap();
        assert!(!result.has_warnings());
    }

    #[test]
    fn test_validate_empty_prefix() {
        let mut config = CruxConfig::default();
        config.storage.prefix = String::new();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("storage.prefix cannot be empty"));
    }

    #[test]
    fn test_validate_whitespace_prefix() {
        let mut config = CruxConfig::default();
        config.storage.prefix = "my app:".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("whitespace"));
    }

    #[test]
    fn test_validate_collects_every_error() {
        let mut config = CruxConfig::default();
        config.storage.prefix = String::new();
        config.store.storage_key = String::new();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("storage.prefix"));
        assert!(err.contains("store.storage_key"));
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = CruxConfig::default();
        config.storage.prefix = "app".to_string();
        config.storage.default_ttl_ms = 10;

        let result = config.validate().unwrap();
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            expand_home("~/data/local.redb").unwrap(),
            home.join("data/local.redb")
        );
        assert_eq!(
            expand_home("/abs/local.redb").unwrap(),
            PathBuf::from("/abs/local.redb")
        );
        assert_eq!(
            expand_home("~other/x").unwrap(),
            PathBuf::from("~other/x")
        );
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = CruxConfig::load_or_default(tmp.path().join("crux.toml")).unwrap();
        assert_eq!(config.storage.prefix, "crux:");
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("crux.toml");
        fs::write(&path, "[store]\nstorage_key = \"from-file\"\n").unwrap();

        let config = CruxConfig::load_from(&path).unwrap();
        assert_eq!(config.store.storage_key, "from-file");
    }

    #[test]
    fn test_load_from_invalid_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("crux.toml");
        fs::write(&path, "[storage\nprefix = ").unwrap();

        let err = CruxConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }
}
