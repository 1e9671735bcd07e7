//! Config command - configuration management.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use console::Style;
use hearth_config::{HearthConfig, save_config};

use super::{Context, print_json, print_success};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration, defaults filled in
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Show the resolved data paths
    Path,

    /// Write a config file with every default spelled out
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Init { force } => cmd_init(ctx, force),
    }
}

/// The merged config with every section present.
fn effective(config: &HearthConfig) -> HearthConfig {
    HearthConfig {
        vault: Some(config.vault()),
        selector: Some(config.selector()),
        decay: Some(config.decay()),
        embedding: Some(config.embedding()),
        migration: Some(config.migration()),
        logging: Some(config.logging()),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let config = effective(&ctx.config);
    if ctx.json_output {
        return print_json(&config);
    }
    println!("# Hearth Configuration\n");
    print!("{}", config.to_toml()?);
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    if ctx.json_output {
        return print_json(&ctx.config_sources);
    }

    let dim = Style::new().dim();
    let green = Style::new().green();
    println!("Config files (lowest precedence first):");
    for source in &ctx.config_sources {
        let state = if source.loaded {
            green.apply_to("loaded").to_string()
        } else {
            dim.apply_to("not found").to_string()
        };
        println!(
            "  {:<8} {}  {}",
            source.layer.to_string(),
            source.path.display(),
            state
        );
    }
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let paths = &ctx.paths;
    if ctx.json_output {
        return print_json(&serde_json::json!({
            "data_dir": paths.data_dir,
            "vault": paths.vault,
            "backups": paths.backups,
            "logs": paths.logs,
            "legacy": paths.legacy,
        }));
    }

    let dim = Style::new().dim();
    println!("{} {}", dim.apply_to("Data:    "), paths.data_dir.display());
    println!("{} {}", dim.apply_to("Vault:   "), paths.vault.display());
    println!("{} {}", dim.apply_to("Backups: "), paths.backups.display());
    println!("{} {}", dim.apply_to("Logs:    "), paths.logs.display());
    println!("{} {}", dim.apply_to("Legacy:  "), paths.legacy.display());
    Ok(())
}

fn cmd_init(ctx: &Context, force: bool) -> Result<()> {
    let Some(path) = &ctx.user_config else {
        bail!("Could not determine the user config directory");
    };
    if path.exists() && !force {
        bail!("{} already exists; pass --force to replace it", path.display());
    }

    save_config(&effective(&HearthConfig::new()), path)?;
    print_success(&format!("Wrote {}", path.display()));
    Ok(())
}
