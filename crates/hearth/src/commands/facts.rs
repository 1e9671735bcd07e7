//! Facts command - inspect and edit what Hearth remembers.

use anyhow::{Result, bail};
use clap::{Args, Subcommand, ValueEnum};
use console::Style;
use hearth_vault::{ConsentScope, Fact, FactPatch, NewFact, PiiLevel, SetFactOutcome};

use super::context::parse_fact_id;
use super::{Context, print_header, print_json, print_success, short_id, truncate};

/// Arguments for the facts command.
#[derive(Args, Debug)]
pub struct FactsArgs {
    #[command(subcommand)]
    pub command: FactsCommand,
}

#[derive(Subcommand, Debug)]
pub enum FactsCommand {
    /// List remembered facts
    List {
        /// Only facts in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Include facts above PII level 0
        #[arg(long)]
        include_pii: bool,
    },

    /// Show a single fact
    Show {
        /// Fact ID
        id: String,
    },

    /// Remember a fact, replacing any fact with the same category and predicate
    Set {
        /// Category (e.g. "location")
        category: String,

        /// Predicate (e.g. "city")
        predicate: String,

        /// Value (e.g. "Philadelphia")
        object: String,

        #[command(flatten)]
        fields: FactFields,
    },

    /// Change fields of an existing fact
    Update {
        /// Fact ID
        id: String,

        /// New value
        #[arg(long)]
        object: Option<String>,

        #[command(flatten)]
        fields: FactFields,
    },

    /// Forget a fact
    Delete {
        /// Fact ID
        id: String,
    },
}

/// Optional fact attributes shared by `set` and `update`.
#[derive(Args, Debug, Default)]
pub struct FactFields {
    /// Confidence in [0, 1]
    #[arg(long)]
    pub confidence: Option<f32>,

    /// Priority in [0, 1]; high-priority facts are always included
    #[arg(long)]
    pub priority: Option<f32>,

    /// PII level 0 (public) to 3 (highly sensitive)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub pii: Option<u8>,

    /// Whether the fact may leave the device
    #[arg(long, value_enum)]
    pub consent: Option<ConsentArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConsentArg {
    /// May be sent as context
    #[value(name = "default")]
    Default,
    /// Never leaves the device
    #[value(name = "never_upload")]
    NeverUpload,
}

impl From<ConsentArg> for ConsentScope {
    fn from(arg: ConsentArg) -> Self {
        match arg {
            ConsentArg::Default => ConsentScope::Default,
            ConsentArg::NeverUpload => ConsentScope::NeverUpload,
        }
    }
}

impl FactFields {
    fn apply(&self, mut fact: NewFact) -> NewFact {
        if let Some(confidence) = self.confidence {
            fact = fact.with_confidence(confidence);
        }
        if let Some(priority) = self.priority {
            fact = fact.with_priority(priority);
        }
        if let Some(level) = self.pii {
            fact = fact.with_pii_level(PiiLevel::new(level));
        }
        if let Some(consent) = self.consent {
            fact = fact.with_consent(consent.into());
        }
        fact
    }

    fn patch(&self, object: Option<String>) -> FactPatch {
        FactPatch {
            object,
            confidence: self.confidence,
            priority: self.priority,
            pii_level: self.pii.map(PiiLevel::new),
            consent_scope: self.consent.map(Into::into),
        }
    }
}

/// Run the facts command.
pub fn run(args: FactsArgs, ctx: &Context) -> Result<()> {
    let service = ctx.open_service()?;

    match args.command {
        FactsCommand::List {
            category,
            include_pii,
        } => {
            let facts = service.get_all_facts(category.as_deref(), include_pii)?;
            if ctx.json_output {
                return print_json(&facts);
            }
            print_header("Facts");
            println!();
            if facts.is_empty() {
                let dim = Style::new().dim();
                println!("{}", dim.apply_to("No facts found"));
            }
            for fact in &facts {
                print_fact_line(fact);
            }
        }
        FactsCommand::Show { id } => {
            let id = parse_fact_id(&id)?;
            let Some(fact) = service.vault().get_fact(id)? else {
                bail!("Fact not found: {}", id);
            };
            if ctx.json_output {
                return print_json(&fact);
            }
            print_fact_details(&fact);
        }
        FactsCommand::Set {
            category,
            predicate,
            object,
            fields,
        } => {
            let fact = fields.apply(NewFact::new(category, predicate, object));
            let outcome = service.set_fact(fact)?;
            if ctx.json_output {
                let fact = service.vault().get_fact(outcome.id())?;
                return print_json(&fact);
            }
            let verb = match outcome {
                SetFactOutcome::Inserted(_) => "Remembered",
                SetFactOutcome::Updated(_) => "Updated",
                SetFactOutcome::Unchanged(_) => "Already known",
            };
            print_success(&format!("{} fact {}", verb, outcome.id()));
        }
        FactsCommand::Update { id, object, fields } => {
            let id = parse_fact_id(&id)?;
            let patch = fields.patch(object);
            if patch.is_empty() {
                bail!("Nothing to update; pass --object, --confidence, --priority, --pii or --consent");
            }
            let fact = service.update_fact(id, &patch)?;
            if ctx.json_output {
                return print_json(&fact);
            }
            print_success(&format!("Updated fact {}", fact.id));
        }
        FactsCommand::Delete { id } => {
            let id = parse_fact_id(&id)?;
            if !service.delete_fact(id)? {
                bail!("Fact not found: {}", id);
            }
            if ctx.json_output {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            print_success(&format!("Forgot fact {}", id));
        }
    }

    Ok(())
}

fn print_fact_line(fact: &Fact) {
    let dim = Style::new().dim();
    println!(
        "{} {} {}",
        dim.apply_to(format!("[{}]", short_id(&fact.id))),
        truncate(&format!("{}.{}: {}", fact.category, fact.predicate, fact.object), 60),
        dim.apply_to(format!("pii {} {}", fact.pii_level, fact.consent_scope))
    );
}

fn print_fact_details(fact: &Fact) {
    let dim = Style::new().dim();
    print_header("Fact");
    println!("{} {}", dim.apply_to("ID:        "), fact.id);
    println!("{} {}", dim.apply_to("Category:  "), fact.category);
    println!("{} {}", dim.apply_to("Predicate: "), fact.predicate);
    println!("{} {}", dim.apply_to("Value:     "), fact.object);
    println!("{} {:.2}", dim.apply_to("Confidence:"), fact.confidence);
    println!("{} {:.2}", dim.apply_to("Priority:  "), fact.priority);
    println!("{} {}", dim.apply_to("PII level: "), fact.pii_level);
    println!("{} {}", dim.apply_to("Consent:   "), fact.consent_scope);
    println!(
        "{} {}",
        dim.apply_to("Created:   "),
        fact.created_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(at) = fact.last_reinforced_at {
        println!(
            "{} {} ({} times)",
            dim.apply_to("Reinforced:"),
            at.format("%Y-%m-%d %H:%M"),
            fact.reinforcement_count
        );
    }
}
