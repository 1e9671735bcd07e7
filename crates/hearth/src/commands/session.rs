//! Session command - record conversations into memory.

use anyhow::{Result, bail};
use clap::{Args, Subcommand, ValueEnum};
use console::Style;
use hearth_vault::{Role, SessionId};

use super::{Context, print_header, print_json, print_success, short_id, truncate};

/// Arguments for the session command.
#[derive(Args, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Start a conversation session
    Start {
        /// What the conversation is about
        #[arg(short, long)]
        goal: Option<String>,
    },

    /// Append a message to a session
    Add {
        /// Session ID
        session: String,

        /// Message content
        content: String,

        /// Who said it
        #[arg(short, long, value_enum, default_value = "user")]
        role: RoleArg,
    },

    /// Mark a session as ended
    End {
        /// Session ID
        session: String,
    },

    /// List sessions, most recently active first
    List {
        /// Maximum sessions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a session's messages
    Show {
        /// Session ID
        session: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    User,
    Assistant,
    System,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::User => Role::User,
            RoleArg::Assistant => Role::Assistant,
            RoleArg::System => Role::System,
        }
    }
}

/// Run the session command.
pub fn run(args: SessionArgs, ctx: &Context) -> Result<()> {
    let service = ctx.open_service()?;
    let dim = Style::new().dim();

    match args.command {
        SessionCommand::Start { goal } => {
            let session = service.start_session(goal.as_deref())?;
            if ctx.json_output {
                return print_json(&session);
            }
            print_success(&format!("Session started: {}", session.id));
        }
        SessionCommand::Add {
            session,
            content,
            role,
        } => {
            let session_id = parse_session_id(&session)?;
            let message = service.add_message(session_id, role.into(), &content)?;
            if ctx.json_output {
                return print_json(&message);
            }
            print_success(&format!("Message added: {}", dim.apply_to(message.id)));
        }
        SessionCommand::End { session } => {
            let session = service.end_session(parse_session_id(&session)?)?;
            if ctx.json_output {
                return print_json(&session);
            }
            print_success(&format!(
                "Session ended after {} messages",
                session.message_count
            ));
        }
        SessionCommand::List { limit } => {
            let sessions = service.vault().list_sessions(limit)?;
            if ctx.json_output {
                return print_json(&sessions);
            }

            print_header("Sessions");
            println!();
            if sessions.is_empty() {
                println!("{}", dim.apply_to("No sessions found"));
            }
            for session in &sessions {
                let state = if session.is_ended() { "ended" } else { "open" };
                println!(
                    "{} {} {}",
                    dim.apply_to(format!("[{}]", short_id(&session.id))),
                    truncate(session.goal.as_deref().unwrap_or("(no goal)"), 40),
                    dim.apply_to(format!(
                        "{} messages, {}, {}",
                        session.message_count,
                        state,
                        session.updated_at.format("%Y-%m-%d %H:%M")
                    ))
                );
            }
        }
        SessionCommand::Show { session } => {
            let id = parse_session_id(&session)?;
            let Some(session) = service.vault().get_session(id)? else {
                bail!("Session not found: {}", id);
            };
            let messages = service.vault().list_messages(id)?;
            if ctx.json_output {
                return print_json(&serde_json::json!({
                    "session": session,
                    "messages": messages,
                }));
            }

            print_header(session.goal.as_deref().unwrap_or("Session"));
            for message in &messages {
                println!(
                    "{} {}",
                    dim.apply_to(format!("{}:", message.role)),
                    message.content
                );
            }
        }
    }

    Ok(())
}

fn parse_session_id(raw: &str) -> Result<SessionId> {
    match SessionId::parse(raw.trim()) {
        Ok(id) => Ok(id),
        Err(_) => bail!("Invalid session ID: {}", raw),
    }
}
