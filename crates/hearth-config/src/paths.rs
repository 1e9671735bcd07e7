//! Filesystem locations derived from config.
//!
//! # Environment Variables
//!
//! - `HEARTH_DATA_DIR` - Override the data directory (vault, backups, logs)

use std::path::{Path, PathBuf};

use crate::discovery::APP_NAME;
use crate::{ConfigError, HearthConfig, Result};

/// Environment variable to override the data directory.
pub const DATA_DIR_ENV: &str = "HEARTH_DATA_DIR";

/// Directory name of the pre-vault flat-file store under the home directory.
const LEGACY_DIR_NAME: &str = ".hearth";

/// Resolved on-disk layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HearthPaths {
    pub data_dir: PathBuf,
    pub vault: PathBuf,
    pub backups: PathBuf,
    pub logs: PathBuf,
    pub legacy: PathBuf,
}

impl HearthPaths {
    /// Resolve every path, applying config values over defaults.
    ///
    /// The data directory comes from `HEARTH_DATA_DIR`, then the platform data
    /// directory (`~/.local/share/hearth` on Linux).
    pub fn resolve(config: &HearthConfig) -> Result<Self> {
        let data_dir = data_dir()?;
        Ok(Self::with_data_dir(config, &data_dir))
    }

    /// Resolve against an explicit data directory.
    pub fn with_data_dir(config: &HearthConfig, data_dir: &Path) -> Self {
        let migration = config.migration();
        let legacy = migration.legacy_dir.unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(LEGACY_DIR_NAME)
        });

        Self {
            data_dir: data_dir.to_path_buf(),
            vault: config
                .vault()
                .path
                .unwrap_or_else(|| data_dir.join("vault.db")),
            backups: migration
                .backup_dir
                .unwrap_or_else(|| data_dir.join("backups")),
            logs: config.logging().dir.unwrap_or_else(|| data_dir.join("logs")),
            legacy,
        }
    }
}

/// The data directory, honoring `HEARTH_DATA_DIR`.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .ok_or(ConfigError::NoDataDir)
}
