//! Migrate command - import of the legacy flat-file store.
//!
//! Every command migrates on first open; this command exists to inspect the
//! situation beforehand and to run the import explicitly.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;
use hearth_migrate::{LegacyData, MigrationOutcome};
use serde::Serialize;

use super::{Context, print_header, print_json, print_success};

/// Arguments for the migrate command.
#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommand,
}

#[derive(Subcommand, Debug)]
pub enum MigrateCommand {
    /// Show what a first open would do
    Status,

    /// Open the vault, importing legacy data if there is no vault yet
    Run,
}

#[derive(Debug, Serialize)]
struct MigrationStatus {
    vault: String,
    vault_exists: bool,
    legacy_dir: String,
    legacy_files: Vec<String>,
    needs_migration: bool,
}

/// Run the migrate command.
pub fn run(args: MigrateArgs, ctx: &Context) -> Result<()> {
    match args.command {
        MigrateCommand::Status => status(ctx),
        MigrateCommand::Run => run_migration(ctx),
    }
}

fn status(ctx: &Context) -> Result<()> {
    let driver = ctx.migration_driver();
    let status = MigrationStatus {
        vault: ctx.paths.vault.display().to_string(),
        vault_exists: ctx.paths.vault.exists(),
        legacy_dir: ctx.paths.legacy.display().to_string(),
        legacy_files: LegacyData::detect(&ctx.paths.legacy)
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        needs_migration: driver.needs_migration(),
    };

    if ctx.json_output {
        return print_json(&status);
    }

    let dim = Style::new().dim();
    print_header("Migration");
    println!("{} {}", dim.apply_to("Vault:  "), status.vault);
    println!("{} {}", dim.apply_to("Legacy: "), status.legacy_dir);
    println!();
    if status.vault_exists {
        println!("Vault already exists; legacy data will not be imported");
    } else if status.needs_migration {
        println!("Legacy data found; the next open will import:");
        for file in &status.legacy_files {
            println!("  {}", file);
        }
    } else {
        println!("No legacy data; the next open creates an empty vault");
    }
    Ok(())
}

fn run_migration(ctx: &Context) -> Result<()> {
    let (_service, outcome) = ctx.open_service_with_outcome()?;

    match outcome {
        MigrationOutcome::Migrated(report) => {
            if ctx.json_output {
                return print_json(&report);
            }
            let dim = Style::new().dim();
            print_success(&format!(
                "Imported {} sessions, {} messages, {} facts and {} preferences",
                report.sessions, report.messages, report.facts, report.preferences
            ));
            println!(
                "{}",
                dim.apply_to(format!("Backup: {}", report.backup_dir.display()))
            );
        }
        MigrationOutcome::FreshVault => {
            if ctx.json_output {
                return print_json(&serde_json::json!({ "outcome": "fresh_vault" }));
            }
            print_success("No legacy data found; created an empty vault");
        }
        MigrationOutcome::ExistingVault => {
            if ctx.json_output {
                return print_json(&serde_json::json!({ "outcome": "existing_vault" }));
            }
            println!("Vault already exists; nothing to migrate");
        }
    }
    Ok(())
}
