//! Export and restore commands - password-protected vault copies.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use hearth_vault::{ExportSnapshot, Vault};
use tracing::warn;

use super::{Context, print_json, print_success, read_passphrase};

/// Environment variable holding the export passphrase.
pub const PASSPHRASE_ENV: &str = "HEARTH_EXPORT_PASSPHRASE";

/// Arguments for the export command.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// File to write
    pub output: PathBuf,

    /// Passphrase protecting the export (prompted when absent)
    #[arg(long, env = PASSPHRASE_ENV, hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Replace an existing file
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the restore command.
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Export file to read
    pub input: PathBuf,

    /// Passphrase the export was written with (prompted when absent)
    #[arg(long, env = PASSPHRASE_ENV, hide_env_values = true)]
    pub passphrase: Option<String>,
}

/// Run the export command.
pub fn run(args: ExportArgs, ctx: &Context) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to replace it",
            args.output.display()
        );
    }

    let passphrase = read_passphrase(args.passphrase, true)?;
    let service = ctx.open_service()?;
    let blob = service.vault().export_vault(&passphrase)?;
    std::fs::write(&args.output, &blob)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    if ctx.json_output {
        return print_json(&serde_json::json!({
            "path": args.output,
            "bytes": blob.len(),
        }));
    }
    print_success(&format!("Exported vault to {}", args.output.display()));
    Ok(())
}

/// Run the restore command.
///
/// Restores only into a vault that does not exist yet, keyed with this
/// host's credentials.
pub fn restore(args: RestoreArgs, ctx: &Context) -> Result<()> {
    let vault_path = &ctx.paths.vault;
    if vault_path.exists() {
        bail!(
            "A vault already exists at {}; move it aside before restoring",
            vault_path.display()
        );
    }

    let blob = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let passphrase = read_passphrase(args.passphrase, false)?;
    let snapshot = ExportSnapshot::open(&blob, &passphrase)?;

    let credentials = ctx.credentials()?;
    if let Some(identity) = &snapshot.identity
        && identity.id != credentials.identity_id
    {
        warn!(
            "Export belongs to identity {}, credentials name {}",
            identity.id, credentials.identity_id
        );
    }

    if let Some(parent) = vault_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let restored = Vault::open(vault_path, &credentials.key).and_then(|vault| vault.restore(&snapshot));
    let stats = match restored {
        Ok(stats) => stats,
        Err(e) => {
            if let Err(remove_err) = std::fs::remove_file(vault_path) {
                warn!("Failed to remove partial vault: {}", remove_err);
            }
            return Err(e).context("Restore failed");
        }
    };

    if ctx.json_output {
        return print_json(&stats);
    }
    print_success(&format!(
        "Restored {} facts, {} sessions, {} notes into {}",
        stats.fact_count,
        stats.session_count,
        stats.note_count,
        vault_path.display()
    ));
    Ok(())
}
