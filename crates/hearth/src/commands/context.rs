//! Context command - select memory for a goal, and reinforce what was used.

use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use clap::Args;
use console::Style;
use hearth_context::{ContextPayload, SelectOptions};
use hearth_vault::{FactId, PiiLevel, now};

use super::{Context, print_header, print_json, print_success, short_id, truncate};

/// Arguments for the context command.
#[derive(Args, Debug)]
pub struct ContextArgs {
    /// What the next model turn is about
    pub goal: String,

    /// Token budget for the payload
    #[arg(short, long, default_value = "1024")]
    pub budget: usize,

    /// Highest PII level allowed (0-3); defaults to the configured ceiling
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub max_pii: Option<u8>,

    /// Print the prompt rendering instead of the summary
    #[arg(long)]
    pub prompt: bool,
}

/// Arguments for the reinforce command.
#[derive(Args, Debug)]
pub struct ReinforceArgs {
    /// Fact IDs the model turn used
    #[arg(required = true)]
    pub ids: Vec<String>,
}

/// Run the context command.
pub fn run(args: ContextArgs, ctx: &Context) -> Result<()> {
    let service = ctx.open_service()?;

    let payload = match args.max_pii {
        Some(level) => {
            let mut opts = SelectOptions::new(now()).with_max_pii(PiiLevel::new(level));
            if let Some(ms) = ctx.config.selector().deadline_ms {
                opts = opts.with_deadline(Instant::now() + Duration::from_millis(ms));
            }
            service.build_context_with(&args.goal, args.budget, &opts)?
        }
        None => service.build_context(&args.goal, args.budget)?,
    };

    if ctx.json_output {
        println!("{}", payload.to_json()?);
    } else if args.prompt {
        print!("{}", payload.to_prompt());
    } else {
        print_payload(&payload, ctx.verbose);
    }
    Ok(())
}

/// Run the reinforce command.
pub fn reinforce(args: ReinforceArgs, ctx: &Context) -> Result<()> {
    let ids = parse_fact_ids(&args.ids)?;
    let service = ctx.open_service()?;
    let facts = service.reinforce(&ids)?;

    if ctx.json_output {
        return print_json(&facts);
    }
    for fact in &facts {
        print_success(&format!(
            "Reinforced {}.{} (confidence {:.2}, count {})",
            fact.category, fact.predicate, fact.confidence, fact.reinforcement_count
        ));
    }
    Ok(())
}

pub(crate) fn parse_fact_id(raw: &str) -> Result<FactId> {
    match FactId::parse(raw.trim()) {
        Ok(id) => Ok(id),
        Err(_) => bail!("Invalid fact ID: {}", raw),
    }
}

fn parse_fact_ids(raw: &[String]) -> Result<Vec<FactId>> {
    raw.iter().map(|id| parse_fact_id(id)).collect()
}

fn print_payload(payload: &ContextPayload, verbose: bool) {
    let dim = Style::new().dim();
    let yellow = Style::new().yellow();

    print_header("Context");
    if let Some(profile) = &payload.profile {
        println!("User: {}", profile.display_name);
    }

    if !payload.facts.is_empty() {
        println!();
        for fact in &payload.facts {
            let marker = if fact.forced { "*" } else { " " };
            println!(
                "{}{} {} {}",
                yellow.apply_to(marker),
                dim.apply_to(format!("[{}]", short_id(&fact.id))),
                truncate(&fact.text(), 60),
                dim.apply_to(format!("({:.2})", fact.score))
            );
        }
    }

    if !payload.messages.is_empty() {
        println!();
        for message in &payload.messages {
            println!(
                " {} {}",
                dim.apply_to(format!("{}:", message.role)),
                truncate(&message.content, 60)
            );
        }
    }

    if !payload.notes.is_empty() {
        println!();
        for note in &payload.notes {
            let text = match &note.title {
                Some(title) => format!("{}: {}", title, note.content),
                None => note.content.clone(),
            };
            println!(" {} {}", dim.apply_to("note"), truncate(&text, 60));
        }
    }

    if payload.is_empty() {
        println!("{}", dim.apply_to("Nothing relevant in memory"));
    }

    println!();
    println!(
        "{}",
        dim.apply_to(format!(
            "{} / {} tokens ({} forced)",
            payload.budgeted_tokens(),
            payload.token_budget,
            payload.stats.forced_tokens
        ))
    );
    if payload.truncated {
        println!("{}", yellow.apply_to("Selection stopped at the deadline"));
    }

    if verbose {
        let stats = &payload.stats;
        println!(
            "{}",
            dim.apply_to(format!(
                "candidates {} (keyword {}, semantic {}), excluded {} pii / {} consent, {} over budget",
                stats.candidates,
                stats.keyword_hits,
                stats.semantic_hits,
                stats.excluded_pii,
                stats.excluded_consent,
                stats.over_budget
            ))
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fact_ids() {
        let id = FactId::new();
        let parsed = parse_fact_ids(&[id.to_string()]).unwrap();
        assert_eq!(parsed, vec![id]);

        let err = parse_fact_ids(&["not-a-uuid".to_string()]).unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));
    }
}
