//! Hearth - local-first personal memory for assistant conversations
//!
//! Main entry point for the Hearth CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use hearth_config::{CONFIG_DIR_ENV, DATA_DIR_ENV, HearthPaths, load_config, user_config_path};

mod commands;

use commands::{config, context, export, facts, health, migrate, notes, session};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Hearth - local-first personal memory for assistant conversations
#[derive(Parser)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding config.toml
    #[arg(long, global = true, env = CONFIG_DIR_ENV)]
    pub config_dir: Option<PathBuf>,

    /// Directory holding the vault, backups and logs
    #[arg(long, global = true, env = DATA_DIR_ENV)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Select memory context for a goal
    Context(context::ContextArgs),

    /// Reinforce facts that a model turn used
    Reinforce(context::ReinforceArgs),

    /// Fact management
    Facts(facts::FactsArgs),

    /// Note management
    Notes(notes::NotesArgs),

    /// Conversation sessions and messages
    Session(session::SessionArgs),

    /// Show vault statistics and versions
    Health(health::HealthArgs),

    /// Write a password-protected export of the vault
    Export(export::ExportArgs),

    /// Load an export into a new vault
    Restore(export::RestoreArgs),

    /// Legacy data migration
    Migrate(migrate::MigrateArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = load_config(None, cli.config_dir.as_deref());
    let paths = match &cli.data_dir {
        Some(dir) => HearthPaths::with_data_dir(&loaded.config, dir),
        None => HearthPaths::resolve(&loaded.config).context("Failed to resolve data paths")?,
    };

    // Initialize tracing: console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "hearth=debug,hearth_vault=debug,hearth_context=debug,hearth_migrate=debug,hearth_config=debug,info"
    } else {
        "hearth=warn,hearth_vault=warn,hearth_context=warn,hearth_migrate=info,warn"
    };

    use tracing_subscriber::prelude::*;
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(tracing_subscriber::EnvFilter::new(filter));

    let logging = loaded.config.logging();
    let (file_layer, _guard) = if logging.file {
        let file_appender = tracing_appender::rolling::daily(&paths.logs, "hearth.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(tracing_subscriber::EnvFilter::new(
                "hearth=trace,hearth_vault=debug,hearth_context=debug,hearth_migrate=trace,hearth_config=debug,info",
            ));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config: loaded.config,
        config_sources: loaded.sources,
        user_config: cli
            .config_dir
            .map(|dir| dir.join("config.toml"))
            .or_else(user_config_path),
        paths,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Context(args) => context::run(args, &ctx),
        Commands::Reinforce(args) => context::reinforce(args, &ctx),
        Commands::Facts(args) => facts::run(args, &ctx),
        Commands::Notes(args) => notes::run(args, &ctx),
        Commands::Session(args) => session::run(args, &ctx),
        Commands::Health(args) => health::run(args, &ctx),
        Commands::Export(args) => export::run(args, &ctx),
        Commands::Restore(args) => export::restore(args, &ctx),
        Commands::Migrate(args) => migrate::run(args, &ctx),
        Commands::Config(args) => config::run(args, &ctx),
    }
}
