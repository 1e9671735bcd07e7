//! Notes command - note management.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use console::Style;
use hearth_vault::{Note, NoteId};

use super::{Context, print_header, print_json, print_success, short_id, truncate};

/// Arguments for the notes command.
#[derive(Args, Debug)]
pub struct NotesArgs {
    #[command(subcommand)]
    pub command: NotesCommand,
}

#[derive(Subcommand, Debug)]
pub enum NotesCommand {
    /// Add a quick note
    Add {
        /// Note content
        content: String,

        /// Note title
        #[arg(long)]
        title: Option<String>,

        /// Tags for the note
        #[arg(short, long)]
        tags: Vec<String>,
    },

    /// List notes, newest first
    List {
        /// Maximum notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a specific note
    Show {
        /// Note ID
        id: String,
    },

    /// Delete a note
    Delete {
        /// Note ID
        id: String,
    },
}

/// Run the notes command.
pub fn run(args: NotesArgs, ctx: &Context) -> Result<()> {
    let service = ctx.open_service()?;
    let dim = Style::new().dim();

    match args.command {
        NotesCommand::Add {
            content,
            title,
            tags,
        } => {
            if ctx.verbose && !tags.is_empty() {
                println!("{}", dim.apply_to(format!("Tags: {:?}", tags)));
            }

            let mut note = Note::new(content);
            if let Some(title) = title {
                note = note.with_title(title);
            }
            for tag in tags {
                note = note.with_tag(tag);
            }
            let note = service.add_note(note)?;

            if ctx.json_output {
                print_json(&note)?;
            } else {
                print_success(&format!("Note created: {}", dim.apply_to(note.id)));
            }
        }
        NotesCommand::List { limit } => {
            let notes = service.vault().list_notes(limit)?;
            if ctx.json_output {
                return print_json(&notes);
            }

            print_header("Notes");
            println!();
            if notes.is_empty() {
                println!("{}", dim.apply_to("No notes found"));
            }
            for note in &notes {
                let text = match &note.title {
                    Some(title) => format!("{}: {}", title, note.content),
                    None => note.content.clone(),
                };
                println!(
                    "{} {}",
                    dim.apply_to(format!("[{}]", short_id(&note.id))),
                    truncate(&text, 60)
                );
            }
        }
        NotesCommand::Show { id } => {
            let id = parse_note_id(&id)?;
            let Some(note) = service.vault().get_note(id)? else {
                bail!("Note not found: {}", id);
            };
            if ctx.json_output {
                return print_json(&note);
            }

            print_header(note.title.as_deref().unwrap_or("Note"));
            println!("{}", note.content);
            println!();
            if !note.tags.is_empty() {
                println!("{}", dim.apply_to(format!("Tags: {}", note.tags.join(", "))));
            }
            println!(
                "{}",
                dim.apply_to(format!(
                    "{} · updated {}",
                    note.id,
                    note.updated_at.format("%Y-%m-%d %H:%M")
                ))
            );
        }
        NotesCommand::Delete { id } => {
            let id = parse_note_id(&id)?;
            if !service.vault().delete_note(id)? {
                bail!("Note not found: {}", id);
            }
            if ctx.json_output {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            print_success(&format!("Deleted note {}", id));
        }
    }

    Ok(())
}

fn parse_note_id(raw: &str) -> Result<NoteId> {
    match NoteId::parse(raw.trim()) {
        Ok(id) => Ok(id),
        Err(_) => bail!("Invalid note ID: {}", raw),
    }
}
