//! Health command - vault statistics and versions.

use anyhow::Result;
use clap::Args;
use console::Style;

use super::{Context, print_header, print_json};

/// Arguments for the health command.
#[derive(Args, Debug)]
pub struct HealthArgs {}

/// Run the health command.
pub fn run(_args: HealthArgs, ctx: &Context) -> Result<()> {
    let service = ctx.open_service()?;
    let health = service.health()?;

    if ctx.json_output {
        return print_json(&health);
    }

    let dim = Style::new().dim();
    let green = Style::new().green();
    let stats = &health.stats;
    let meta = &health.meta;

    print_header("Hearth Health");
    println!("{} {}", dim.apply_to("Vault:    "), ctx.paths.vault.display());
    println!("{} open", green.apply_to("Status:   "));
    println!(
        "{} schema {}, selector {}",
        dim.apply_to("Versions: "),
        meta.schema_version,
        health.selector_version
    );
    println!(
        "{} {}",
        dim.apply_to("Embedder: "),
        health.embedder.as_deref().unwrap_or("none (keyword only)")
    );
    println!();
    println!("{} {}", dim.apply_to("Sessions:  "), stats.session_count);
    println!("{} {}", dim.apply_to("Messages:  "), stats.message_count);
    println!("{} {}", dim.apply_to("Facts:     "), stats.fact_count);
    println!("{} {}", dim.apply_to("Notes:     "), stats.note_count);
    println!("{} {}", dim.apply_to("Embeddings:"), stats.embedding_count);

    if meta.migration_complete {
        println!();
        println!(
            "{} from {} at {}",
            dim.apply_to("Migrated:  "),
            meta.migration_source.as_deref().unwrap_or("?"),
            meta.migration_completed_at.as_deref().unwrap_or("?")
        );
    }
    Ok(())
}
