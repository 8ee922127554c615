//! Store Configuration
//!
//! Tuning for the RocksDB handle shared by the peer registry and the block
//! reader, plus registry defaults. Loaded from TOML; CLI flags override.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::peers::DEFAULT_LRU_LIMIT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the RocksDB files
    pub data_dir: PathBuf,

    /// RocksDB open file limit (-1 keeps every file open)
    pub max_open_files: i32,

    /// Number of RocksDB info logs kept on disk
    pub keep_log_file_num: usize,

    /// Create the peer indexes when the store opens
    pub ensure_indexes: bool,

    /// Page size of getLRU when the caller sets no limit
    pub default_lru_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger-node"),
            max_open_files: 256,
            keep_log_file_num: 5,
            ensure_indexes: true,
            default_lru_limit: DEFAULT_LRU_LIMIT,
        }
    }
}

impl StoreConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = data_dir;
        self
    }

    pub fn with_max_open_files(mut self, max_open_files: i32) -> Self {
        self.max_open_files = max_open_files;
        self
    }

    pub fn with_ensure_indexes(mut self, ensure_indexes: bool) -> Self {
        self.ensure_indexes = ensure_indexes;
        self
    }

    pub fn with_default_lru_limit(mut self, limit: usize) -> Self {
        self.default_lru_limit = limit;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            anyhow::bail!("data_dir must not be empty");
        }

        if self.max_open_files == 0 || self.max_open_files < -1 {
            anyhow::bail!(
                "max_open_files ({}) must be positive or -1 for unlimited",
                self.max_open_files
            );
        }

        if self.default_lru_limit == 0 {
            anyhow::bail!("default_lru_limit must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.default_lru_limit, 10);
        assert!(config.ensure_indexes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = StoreConfig::default();
        config.default_lru_limit = 0;
        assert!(config.validate().is_err());

        let config = StoreConfig::default().with_max_open_files(-1);
        assert!(config.validate().is_ok());
        let config = StoreConfig::default().with_max_open_files(-7);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.toml");

        let config = StoreConfig::default()
            .with_data_dir(dir.path().join("db"))
            .with_default_lru_limit(25);
        config.save(&path).unwrap();

        assert_eq!(StoreConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: StoreConfig = toml::from_str("default_lru_limit = 3").unwrap();
        assert_eq!(config.default_lru_limit, 3);
        assert_eq!(config.keep_log_file_num, 5);
    }
}
