//! CLI command handlers.

pub mod config;
pub mod context;
pub mod export;
pub mod facts;
pub mod health;
pub mod migrate;
pub mod notes;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use console::Style;
use hearth_config::{
    ConfigSource, CredentialSource, EmbeddingProvider, HearthConfig, HearthPaths,
};
use hearth_context::{
    HashingEmbedder, MemoryService, SelectorSettings, ServiceSettings, SharedEmbedder,
};
use hearth_migrate::{MigrationDriver, MigrationOutcome};
use hearth_vault::{
    CredentialBacking, DecayParams, EnvBacking, KeyringBacking, PiiLevel, VaultCredentials,
    load_or_create,
};
use tracing::{debug, info};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Merged configuration.
    pub config: HearthConfig,
    /// Config layers that were checked.
    pub config_sources: Vec<ConfigSource>,
    /// Where `config init` writes.
    pub user_config: Option<PathBuf>,
    /// Resolved on-disk layout.
    pub paths: HearthPaths,
}

impl Context {
    /// The configured credential backing.
    pub fn credential_backing(&self) -> Box<dyn CredentialBacking> {
        let vault = self.config.vault();
        match vault.credentials {
            CredentialSource::Keyring => Box::new(KeyringBacking::with_service(vault.keyring_service)),
            CredentialSource::Env => Box::new(EnvBacking::new()),
        }
    }

    /// Load credentials, creating them on first run where the backing allows.
    pub fn credentials(&self) -> Result<VaultCredentials> {
        let backing = self.credential_backing();
        load_or_create(backing.as_ref())
            .with_context(|| format!("Failed to load vault credentials from {}", backing.name()))
    }

    /// Migration driver over the resolved paths.
    pub fn migration_driver(&self) -> MigrationDriver {
        MigrationDriver::new(
            &self.paths.vault,
            &self.paths.legacy,
            &self.paths.backups,
        )
        .with_timeout(Duration::from_secs(self.config.migration().timeout_secs))
    }

    /// Open the vault (migrating legacy data on first open) and wrap it in a
    /// memory service.
    pub fn open_service(&self) -> Result<MemoryService> {
        let (service, _) = self.open_service_with_outcome()?;
        Ok(service)
    }

    pub fn open_service_with_outcome(&self) -> Result<(MemoryService, MigrationOutcome)> {
        if let Some(parent) = self.paths.vault.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let credentials = self.credentials()?;
        let (vault, outcome) = self
            .migration_driver()
            .run(&credentials.key, credentials.identity_id)
            .with_context(|| format!("Failed to open vault at {}", self.paths.vault.display()))?;
        match &outcome {
            MigrationOutcome::Migrated(report) => info!(
                "Imported legacy data from {} (backup in {})",
                report.source.display(),
                report.backup_dir.display()
            ),
            other => debug!("Vault open: {:?}", other),
        }

        let decay = self.config.decay();
        let vault = vault.with_decay(
            DecayParams::default()
                .with_halflife_days(decay.halflife_days)
                .with_reinforce_step(decay.reinforce_step),
        );

        let service = MemoryService::new(Arc::new(vault), self.embedder(), self.service_settings())?;
        Ok((service, outcome))
    }

    fn embedder(&self) -> Option<SharedEmbedder> {
        let embedding = self.config.embedding();
        match embedding.provider {
            EmbeddingProvider::Hashing => {
                Some(Arc::new(HashingEmbedder::new(embedding.dimensions)) as SharedEmbedder)
            }
            EmbeddingProvider::None => None,
        }
    }

    fn service_settings(&self) -> ServiceSettings {
        let selector = self.config.selector();
        ServiceSettings {
            selector: SelectorSettings {
                alpha: selector.alpha,
                always_include_threshold: selector.always_include_threshold,
                per_item_overhead: selector.per_item_overhead,
                recent_messages: selector.recent_messages,
                candidate_limit: selector.candidate_limit,
                min_similarity: selector.min_similarity,
            },
            max_pii: PiiLevel::new(selector.max_pii),
            deadline: selector.deadline_ms.map(Duration::from_millis),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Print a value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Bold title followed by a dim rule.
pub fn print_header(title: &str) {
    let dim = Style::new().dim();
    println!("{}", console::style(title).bold());
    println!("{}", dim.apply_to("─".repeat(50)));
}

pub fn print_success(message: &str) {
    let green = Style::new().green();
    println!("{} {}", green.apply_to("✓"), message);
}

/// Short id prefix for tables.
pub fn short_id(id: &impl ToString) -> String {
    id.to_string().chars().take(8).collect()
}

pub fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_len {
        s
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Use the passphrase given on the command line (or its environment
/// variable), else prompt on the terminal.
pub fn read_passphrase(flag: Option<String>, confirm: bool) -> Result<String> {
    if let Some(passphrase) = flag.filter(|p| !p.is_empty()) {
        return Ok(passphrase);
    }

    let passphrase = rpassword::prompt_password("Export passphrase: ")
        .context("Failed to read passphrase")?;
    if passphrase.is_empty() {
        bail!("Passphrase must not be empty");
    }
    if confirm {
        let again = rpassword::prompt_password("Confirm passphrase: ")
            .context("Failed to read passphrase")?;
        if again != passphrase {
            bail!("Passphrases do not match");
        }
    }
    Ok(passphrase)
}
