//! DackBox configuration via `dackbox.toml`
//!
//! The file lives next to the data it configures. On first open a commented
//! default is written; edit it and restart to change settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dackbox_core::{Error, Result, SEPARATOR};
use dackbox_index::LazyConfig;
use dackbox_storage::DurabilityMode;

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "dackbox.toml";

/// Indexing pipeline settings, the `[indexing]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Longest time an indexed key waits before it is acknowledged
    #[serde(default = "default_ack_interval_ms")]
    pub ack_interval_ms: u64,
    /// Acknowledge as soon as this many keys are waiting
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_ack_interval_ms() -> u64 {
    500
}

fn default_max_batch_size() -> usize {
    500
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            ack_interval_ms: default_ack_interval_ms(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// DackBox configuration loaded from `dackbox.toml`.
///
/// # Example
///
/// ```toml
/// graph_bucket = "dackbox_graph"
/// durability = "always"
///
/// [indexing]
/// ack_interval_ms = 500
/// max_batch_size = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DackBoxConfig {
    /// Reserved bucket holding persisted edge rows
    #[serde(default = "default_graph_bucket")]
    pub graph_bucket: String,
    /// Reserved bucket holding "dirty since last index" markers
    #[serde(default = "default_dirty_bucket")]
    pub dirty_bucket: String,
    /// Reserved bucket holding per-bucket "index is valid" sentinels
    #[serde(default = "default_valid_bucket")]
    pub valid_bucket: String,
    /// Value written to a valid sentinel
    #[serde(default = "default_reindex_value")]
    pub reindex_value: String,
    /// Durability mode: `"cache"`, `"buffered"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Indexing pipeline settings
    #[serde(default)]
    pub indexing: IndexingConfig,
}

fn default_graph_bucket() -> String {
    "dackbox_graph".to_string()
}

fn default_dirty_bucket() -> String {
    "dackbox_dirty".to_string()
}

fn default_valid_bucket() -> String {
    "dackbox_valid".to_string()
}

fn default_reindex_value() -> String {
    "1".to_string()
}

fn default_durability_str() -> String {
    "always".to_string()
}

impl Default for DackBoxConfig {
    fn default() -> Self {
        Self {
            graph_bucket: default_graph_bucket(),
            dirty_bucket: default_dirty_bucket(),
            valid_bucket: default_valid_bucket(),
            reindex_value: default_reindex_value(),
            durability: default_durability_str(),
            indexing: IndexingConfig::default(),
        }
    }
}

impl DackBoxConfig {
    /// Parse the durability string.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the string names no known mode.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        self.durability.parse()
    }

    /// Pipeline settings derived from the `[indexing]` table.
    pub fn lazy_config(&self) -> LazyConfig {
        LazyConfig {
            ack_interval: Duration::from_millis(self.indexing.ack_interval_ms),
            max_batch_size: self.indexing.max_batch_size,
        }
    }

    /// The reserved bucket names, in a fixed order.
    pub fn reserved_buckets(&self) -> [&str; 3] {
        [&self.graph_bucket, &self.dirty_bucket, &self.valid_bucket]
    }

    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an unknown durability mode, a zero batch size,
    /// an empty or malformed reserved bucket, or two reserved buckets
    /// sharing a name.
    pub fn validate(&self) -> Result<()> {
        self.durability_mode()?;
        if self.indexing.max_batch_size == 0 {
            return Err(Error::Config(
                "indexing.max_batch_size must be at least 1".to_string(),
            ));
        }
        let reserved = self.reserved_buckets();
        for (i, name) in reserved.iter().enumerate() {
            if name.is_empty() || name.as_bytes().contains(&SEPARATOR) {
                return Err(Error::Config(format!(
                    "Reserved bucket name '{}' must be non-empty and free of NUL bytes",
                    name.escape_debug()
                )));
            }
            if reserved[..i].contains(name) {
                return Err(Error::Config(format!(
                    "Reserved bucket name '{}' is used twice",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# DackBox configuration
#
# Reserved buckets. Record buckets must not reuse these names.
graph_bucket = "dackbox_graph"
dirty_bucket = "dackbox_dirty"
valid_bucket = "dackbox_valid"
reindex_value = "1"

# Durability mode: "cache", "buffered" or "always" (default)
#   "cache"    = nothing written to disk
#   "buffered" = commit log flushed per commit, fsync left to the OS
#   "always"   = fsync every commit
durability = "always"

[indexing]
# Longest time an indexed key waits before it is acknowledged
ack_interval_ms = 500
# Acknowledge as soon as this many keys are waiting
max_batch_size = 500
"#
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: DackBoxConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_always() {
        let config = DackBoxConfig::default();
        assert_eq!(config.durability_mode().unwrap(), DurabilityMode::Always);
        assert_eq!(config.graph_bucket, "dackbox_graph");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_toml_matches_default() {
        let parsed: DackBoxConfig = toml::from_str(DackBoxConfig::default_toml()).unwrap();
        assert_eq!(parsed, DackBoxConfig::default());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: DackBoxConfig = toml::from_str("durability = \"buffered\"").unwrap();
        assert_eq!(config.durability_mode().unwrap(), DurabilityMode::Buffered);
        assert_eq!(config.indexing, IndexingConfig::default());
        assert_eq!(config.dirty_bucket, "dackbox_dirty");
    }

    #[test]
    fn parse_invalid_mode_returns_error() {
        let config: DackBoxConfig = toml::from_str("durability = \"turbo\"").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let config: DackBoxConfig =
            toml::from_str("[indexing]\nmax_batch_size = 0").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn duplicate_reserved_bucket_rejected() {
        let config = DackBoxConfig {
            dirty_bucket: "dackbox_graph".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn lazy_config_from_indexing_table() {
        let config: DackBoxConfig =
            toml::from_str("[indexing]\nack_interval_ms = 20\nmax_batch_size = 7").unwrap();
        let lazy = config.lazy_config();
        assert_eq!(lazy.ack_interval, Duration::from_millis(20));
        assert_eq!(lazy.max_batch_size, 7);
    }

    #[test]
    fn write_default_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        DackBoxConfig::write_default_if_missing(&path).unwrap();
        let config = DackBoxConfig::from_file(&path).unwrap();
        assert_eq!(config, DackBoxConfig::default());
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "durability = \"cache\"\n").unwrap();
        DackBoxConfig::write_default_if_missing(&path).unwrap();
        let config = DackBoxConfig::from_file(&path).unwrap();
        assert_eq!(config.durability, "cache");
    }

    #[test]
    fn write_to_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = DackBoxConfig {
            durability: "buffered".to_string(),
            indexing: IndexingConfig {
                ack_interval_ms: 10,
                max_batch_size: 3,
            },
            ..Default::default()
        };
        config.write_to_file(&path).unwrap();
        assert_eq!(DackBoxConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn from_file_missing_is_config_error() {
        let dir = TempDir::new().unwrap();
        let result = DackBoxConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
