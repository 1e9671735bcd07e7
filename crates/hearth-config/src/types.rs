//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [vault]        # store location and key custody
//! [selector]     # context selection weights and limits
//! [decay]        # relevance half-life and reinforcement step
//! [embedding]    # embedder choice
//! [migration]    # legacy import locations
//! [logging]      # log file settings
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged. A section present in a later layer
/// replaces the earlier one as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HearthConfig {
    pub vault: Option<VaultConfig>,
    pub selector: Option<SelectorConfig>,
    pub decay: Option<DecayConfig>,
    pub embedding: Option<EmbeddingConfig>,
    pub migration: Option<MigrationConfig>,
    pub logging: Option<LoggingConfig>,
}

impl HearthConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: HearthConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: HearthConfig) {
        if other.vault.is_some() {
            self.vault = other.vault;
        }
        if other.selector.is_some() {
            self.selector = other.selector;
        }
        if other.decay.is_some() {
            self.decay = other.decay;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.migration.is_some() {
            self.migration = other.migration;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Effective `[vault]` section.
    pub fn vault(&self) -> VaultConfig {
        self.vault.clone().unwrap_or_default()
    }

    /// Effective `[selector]` section.
    pub fn selector(&self) -> SelectorConfig {
        self.selector.clone().unwrap_or_default()
    }

    /// Effective `[decay]` section.
    pub fn decay(&self) -> DecayConfig {
        self.decay.clone().unwrap_or_default()
    }

    /// Effective `[embedding]` section.
    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    /// Effective `[migration]` section.
    pub fn migration(&self) -> MigrationConfig {
        self.migration.clone().unwrap_or_default()
    }

    /// Effective `[logging]` section.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        let selector = self.selector();
        unit_range("selector.alpha", selector.alpha)?;
        unit_range(
            "selector.always_include_threshold",
            selector.always_include_threshold,
        )?;
        unit_range("selector.min_similarity", selector.min_similarity)?;
        if selector.max_pii > 3 {
            return Err(invalid("selector.max_pii", "must be between 0 and 3"));
        }

        let decay = self.decay();
        if !(decay.halflife_days.is_finite() && decay.halflife_days > 0.0) {
            return Err(invalid("decay.halflife_days", "must be a positive number"));
        }
        unit_range("decay.reinforce_step", decay.reinforce_step)?;

        if self.embedding().dimensions == 0 {
            return Err(invalid("embedding.dimensions", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn unit_range(field: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, "must be between 0.0 and 1.0"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vault
// ─────────────────────────────────────────────────────────────────────────────

/// Where the vault key and identity id are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// OS keyring (Keychain, secret-service, Credential Manager).
    #[default]
    Keyring,
    /// `HEARTH_VAULT_KEY` / `HEARTH_IDENTITY_ID`, read-only.
    Env,
}

/// Vault store configuration.
///
/// ```toml
/// [vault]
/// path = "/home/me/.local/share/hearth/vault.db"
/// credentials = "keyring"
/// keyring_service = "hearth"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault file. Defaults to `<data dir>/vault.db`.
    pub path: Option<PathBuf>,
    pub credentials: CredentialSource,
    pub keyring_service: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: None,
            credentials: CredentialSource::Keyring,
            keyring_service: "hearth".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Selector
// ─────────────────────────────────────────────────────────────────────────────

/// Context selection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Weight of the semantic score in the composite (keyword gets the rest).
    pub alpha: f32,
    /// Facts at or above this priority or composite score are always included.
    pub always_include_threshold: f32,
    /// Highest PII level allowed into a payload.
    pub max_pii: u8,
    /// Fixed token cost added to every packed item.
    pub per_item_overhead: usize,
    /// Newest messages considered per request.
    pub recent_messages: usize,
    /// Cap on hits per retrieval channel.
    pub candidate_limit: usize,
    /// Semantic hits below this similarity are ignored.
    pub min_similarity: f32,
    /// Optional selection deadline in milliseconds.
    pub deadline_ms: Option<u64>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            always_include_threshold: 0.95,
            max_pii: 2,
            per_item_overhead: 4,
            recent_messages: 50,
            candidate_limit: 50,
            min_similarity: 0.2,
            deadline_ms: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decay
// ─────────────────────────────────────────────────────────────────────────────

/// Decay and reinforcement configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub halflife_days: f64,
    pub reinforce_step: f32,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            halflife_days: 90.0,
            reinforce_step: 0.1,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding
// ─────────────────────────────────────────────────────────────────────────────

/// Embedder implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic feature hashing; no model files or network.
    #[default]
    Hashing,
    /// Store nothing; selection runs on keyword scores alone.
    None,
}

/// Embedding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            dimensions: 256,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration
// ─────────────────────────────────────────────────────────────────────────────

/// Legacy import configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory holding legacy flat files. Defaults to `~/.hearth`.
    pub legacy_dir: Option<PathBuf>,
    /// Where backups go. Defaults to `<data dir>/backups`.
    pub backup_dir: Option<PathBuf>,
    /// Give up (and roll back) after this many seconds.
    pub timeout_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            legacy_dir: None,
            backup_dir: None,
            timeout_secs: 300,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log file configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write daily-rotated JSON logs in addition to the console.
    pub file: bool,
    /// Log directory. Defaults to `<data dir>/logs`.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: true,
            dir: None,
        }
    }
}
