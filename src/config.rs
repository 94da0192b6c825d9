//! Store configuration
//!
//! Stored as JSON, either next to the caller's choosing or in
//! `~/.config/csmt/config.json`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options for the durable [`FileTreeDb`](crate::store::FileTreeDb)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// fsync the log after every commit
    #[serde(default = "default_sync_on_commit")]
    pub sync_on_commit: bool,
    /// zstd level used for log records
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

fn default_sync_on_commit() -> bool {
    true
}

fn default_compression_level() -> i32 {
    3
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            sync_on_commit: default_sync_on_commit(),
            compression_level: default_compression_level(),
        }
    }
}

impl StoreConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: StoreConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults if absent
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Save config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `~/.config/csmt/config.json` (platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("csmt").join("config.json"))
    }

    fn validate(&self) -> Result<()> {
        let range = zstd::compression_level_range();
        if !range.contains(&self.compression_level) {
            return Err(Error::Config(format!(
                "compression_level {} outside {:?}",
                self.compression_level, range
            )));
        }
        Ok(())
    }
}
