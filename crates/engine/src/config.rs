//! Store configuration via `treestore.toml`
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working store.

use serde::{Deserialize, Serialize};
use std::path::Path;
use treestore_core::{StoreError, StoreResult};
use treestore_listener::NotificationConfig;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "treestore.toml";

/// Upper bound on notification workers.
const MAX_NOTIFICATION_WORKERS: usize = 256;

/// Store configuration loaded from `treestore.toml`.
///
/// # Example
///
/// ```toml
/// name = "config"
/// notification_workers = 2
/// max_listener_queue_depth = 1000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store name; prefixes every transaction identifier.
    #[serde(default = "default_name")]
    pub name: String,
    /// Threads delivering change events.
    #[serde(default = "default_notification_workers")]
    pub notification_workers: usize,
    /// Events queued per listener before commits block.
    #[serde(default = "default_max_listener_queue_depth")]
    pub max_listener_queue_depth: usize,
}

fn default_name() -> String {
    "store".to_string()
}

fn default_notification_workers() -> usize {
    2
}

fn default_max_listener_queue_depth() -> usize {
    1000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            notification_workers: default_notification_workers(),
            max_listener_queue_depth: default_max_listener_queue_depth(),
        }
    }
}

impl StoreConfig {
    /// Default config with the given store name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Check field ranges.
    ///
    /// # Errors
    ///
    /// IllegalArgument when the name is empty or contains whitespace, or a
    /// worker/queue setting is out of range.
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(StoreError::illegal_argument(format!(
                "Invalid store name '{}': must be non-empty without whitespace",
                self.name
            )));
        }
        if self.notification_workers == 0 || self.notification_workers > MAX_NOTIFICATION_WORKERS {
            return Err(StoreError::illegal_argument(format!(
                "notification_workers must be between 1 and {}, got {}",
                MAX_NOTIFICATION_WORKERS, self.notification_workers
            )));
        }
        if self.max_listener_queue_depth == 0 {
            return Err(StoreError::illegal_argument(
                "max_listener_queue_depth must be at least 1",
            ));
        }
        Ok(())
    }

    /// Dispatcher settings derived from this config.
    pub fn notification_config(&self) -> NotificationConfig {
        NotificationConfig {
            workers: self.notification_workers,
            max_queue_depth: self.max_listener_queue_depth,
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# treestore configuration
#
# Store name; transaction identifiers are "<name>-<counter>"
name = "store"

# Threads delivering change events to listeners (default: 2)
notification_workers = 2

# Events queued per listener before committing transactions block (default: 1000)
max_listener_queue_depth = 1000
"#
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        let config: StoreConfig = toml::from_str(content).map_err(|e| {
            StoreError::illegal_argument(format!("Failed to parse config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::unexpected(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            StoreError::illegal_argument(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> StoreResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                StoreError::unexpected(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> StoreResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StoreError::unexpected(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            StoreError::unexpected(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
