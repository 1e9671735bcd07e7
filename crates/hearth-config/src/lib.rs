//! Configuration system for Hearth.
//!
//! Provides TOML-based configuration with:
//! - Selector weights, PII ceiling and candidate limits (`[selector]`)
//! - Relevance decay and reinforcement (`[decay]`)
//! - Vault location and credential source (`[vault]`)
//! - Config file layering (user config + project-local overrides)
//! - Data directory resolution with `HEARTH_DATA_DIR` override

pub mod discovery;
pub mod error;
pub mod paths;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, Layer, LoadedConfig, load_config, read_config, save_config,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use paths::{DATA_DIR_ENV, HearthPaths, data_dir};
pub use types::*;
