//! The context payload handed to the prompt builder.
//!
//! A payload is plain data: it serializes to the same bytes for the same
//! inputs, carries fact ids so the caller can reinforce what it used, and
//! marks which facts were forced in over the budget.

use chrono::{DateTime, Utc};
use hearth_vault::{Fact, FactId, IdentityId, Message, MessageId, Note, NoteId, Role, SessionId};
use serde::Serialize;

/// Who the memory belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub identity_id: IdentityId,
    pub display_name: String,
    pub tokens: usize,
}

impl ProfileSummary {
    pub(crate) fn text_for(display_name: &str) -> String {
        format!("User: {}", display_name)
    }
}

/// A selected fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextFact {
    pub id: FactId,
    pub category: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f32,
    pub pii_level: u8,
    pub score: f32,
    pub tokens: usize,
    /// Included regardless of budget because of its priority or score.
    pub forced: bool,
}

impl ContextFact {
    pub(crate) fn text_for(fact: &Fact) -> String {
        format!("{}.{}: {}", fact.category, fact.predicate, fact.object)
    }

    pub(crate) fn new(fact: Fact, score: f32, tokens: usize, forced: bool) -> Self {
        Self {
            id: fact.id,
            pii_level: fact.pii_level.value(),
            confidence: fact.confidence,
            category: fact.category,
            predicate: fact.predicate,
            object: fact.object,
            score,
            tokens,
            forced,
        }
    }

    pub fn text(&self) -> String {
        format!("{}.{}: {}", self.category, self.predicate, self.object)
    }
}

/// A selected conversation message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub score: f32,
    pub tokens: usize,
}

impl ContextMessage {
    pub(crate) fn text_for(message: &Message) -> String {
        format!("{}: {}", message.role, message.content)
    }

    pub(crate) fn new(message: Message, score: f32, tokens: usize) -> Self {
        Self {
            id: message.id,
            session_id: message.session_id,
            role: message.role,
            content: message.content,
            created_at: message.created_at,
            score,
            tokens,
        }
    }
}

/// A selected note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextNote {
    pub id: NoteId,
    pub title: Option<String>,
    pub content: String,
    pub score: f32,
    pub tokens: usize,
}

impl ContextNote {
    pub(crate) fn text_for(note: &Note) -> String {
        match &note.title {
            Some(title) => format!("{}\n{}", title, note.content),
            None => note.content.clone(),
        }
    }

    pub(crate) fn new(note: Note, score: f32, tokens: usize) -> Self {
        Self {
            id: note.id,
            title: note.title,
            content: note.content,
            score,
            tokens,
        }
    }
}

/// Aggregate numbers describing one selection. Never contains content.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelectionStats {
    /// Distinct rows after the keyword/semantic union.
    pub candidates: usize,
    pub keyword_hits: usize,
    pub semantic_hits: usize,
    /// Candidates scored before the deadline (all of them without one).
    pub scored: usize,
    pub excluded_pii: usize,
    pub excluded_consent: usize,
    /// Allowed candidates that did not fit the budget.
    pub over_budget: usize,
    pub forced: usize,
    pub forced_tokens: usize,
}

/// The bounded, filtered slice of memory for one model turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPayload {
    pub selector_version: String,
    pub generated_at: DateTime<Utc>,
    pub token_budget: usize,
    /// Estimated tokens of everything in the payload, forced facts included.
    pub tokens_used: usize,
    pub profile: Option<ProfileSummary>,
    pub facts: Vec<ContextFact>,
    pub messages: Vec<ContextMessage>,
    pub notes: Vec<ContextNote>,
    /// The deadline expired before every candidate was retrieved or scored.
    pub truncated: bool,
    pub stats: SelectionStats,
}

impl ContextPayload {
    /// Ids of the included facts, in payload order.
    pub fn fact_ids(&self) -> Vec<FactId> {
        self.facts.iter().map(|f| f.id).collect()
    }

    /// Tokens charged against the budget (forced facts excluded).
    pub fn budgeted_tokens(&self) -> usize {
        self.tokens_used - self.stats.forced_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.profile.is_none()
            && self.facts.is_empty()
            && self.messages.is_empty()
            && self.notes.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Plain-text rendering for prompt injection.
    pub fn to_prompt(&self) -> String {
        let mut out = String::new();
        if let Some(profile) = &self.profile {
            out.push_str(&ProfileSummary::text_for(&profile.display_name));
            out.push('\n');
        }
        if !self.facts.is_empty() {
            out.push_str("\n## Known facts\n");
            for fact in &self.facts {
                out.push_str("- ");
                out.push_str(&fact.text());
                out.push('\n');
            }
        }
        if !self.messages.is_empty() {
            out.push_str("\n## Related conversation\n");
            for message in &self.messages {
                out.push_str(&format!("- {}: {}\n", message.role, message.content));
            }
        }
        if !self.notes.is_empty() {
            out.push_str("\n## Notes\n");
            for note in &self.notes {
                match &note.title {
                    Some(title) => out.push_str(&format!("- {}: {}\n", title, note.content)),
                    None => out.push_str(&format!("- {}\n", note.content)),
                }
            }
        }
        out
    }
}
