//! Core data types stored in the vault.
//!
//! Sensitive fields (`Message::content`, `Fact::object`) are plaintext in
//! these types; encryption happens only at the storage boundary.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an ID from its string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of the single installation identity.
    IdentityId
);
uuid_id!(
    /// Identifier of a conversation session.
    SessionId
);
uuid_id!(
    /// Identifier of a message.
    MessageId
);
uuid_id!(
    /// Identifier of a fact.
    FactId
);
uuid_id!(
    /// Identifier of a note.
    NoteId
);

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// The owner of everything in a vault. Exactly one per vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions and messages
// ─────────────────────────────────────────────────────────────────────────────

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub identity_id: IdentityId,
    /// Optional goal or title of the conversation.
    pub goal: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the user finishes the conversation.
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: u32,
}

impl Session {
    /// Whether the session has been ended.
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conversational turn. Never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Facts
// ─────────────────────────────────────────────────────────────────────────────

/// Ordinal sensitivity of a fact: 0 is public, [`PiiLevel::MAX`] is highly sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PiiLevel(u8);

impl PiiLevel {
    pub const PUBLIC: PiiLevel = PiiLevel(0);
    pub const MAX: PiiLevel = PiiLevel(3);

    /// Build a level, saturating at [`PiiLevel::MAX`].
    pub fn new(level: u8) -> Self {
        Self(level.min(Self::MAX.0))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for PiiLevel {
    fn default() -> Self {
        Self::MAX
    }
}

impl fmt::Display for PiiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a fact may ever leave the local vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentScope {
    /// May be included in outgoing context.
    Default,
    /// Must never be uploaded.
    #[default]
    NeverUpload,
}

impl ConsentScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentScope::Default => "default",
            ConsentScope::NeverUpload => "never_upload",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(ConsentScope::Default),
            "never_upload" => Some(ConsentScope::NeverUpload),
            _ => None,
        }
    }
}

impl fmt::Display for ConsentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a score into `[0.0, 1.0]`, mapping NaN to 0.
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// An atomic piece of extracted knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub identity_id: IdentityId,
    pub category: String,
    pub predicate: String,
    /// The value of the fact. Encrypted at rest.
    pub object: String,
    /// Belief in the fact, always within `[0.0, 1.0]`.
    pub confidence: f32,
    /// Importance independent of the query, within `[0.0, 1.0]`.
    pub priority: f32,
    pub pii_level: PiiLevel,
    pub consent_scope: ConsentScope,
    pub created_at: DateTime<Utc>,
    pub last_reinforced_at: Option<DateTime<Utc>>,
    pub reinforcement_count: u32,
    /// Message the fact was extracted from.
    pub source_message_id: Option<MessageId>,
}

impl Fact {
    /// Timestamp the decay clock runs from.
    pub fn decay_anchor(&self) -> DateTime<Utc> {
        self.last_reinforced_at.unwrap_or(self.created_at)
    }

    /// Text used for keyword matching, embedding, and token estimation.
    pub fn search_text(&self) -> String {
        format!("{} {}: {}", self.category, self.predicate, self.object)
    }
}

/// Input to [`crate::Vault::set_fact`].
///
/// Unspecified `pii_level` and `consent_scope` fall back to the most
/// restrictive values on insert and leave the stored value alone on update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    pub category: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f32,
    pub priority: Option<f32>,
    pub pii_level: Option<PiiLevel>,
    pub consent_scope: Option<ConsentScope>,
    pub source_message_id: Option<MessageId>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewFact {
    pub fn new(
        category: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            predicate: predicate.into(),
            object: object.into(),
            confidence: 0.5,
            priority: None,
            pii_level: None,
            consent_scope: None,
            source_message_id: None,
            created_at: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_priority(mut self, priority: f32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_pii_level(mut self, level: PiiLevel) -> Self {
        self.pii_level = Some(level);
        self
    }

    pub fn with_consent(mut self, scope: ConsentScope) -> Self {
        self.consent_scope = Some(scope);
        self
    }

    pub fn with_source(mut self, message_id: MessageId) -> Self {
        self.source_message_id = Some(message_id);
        self
    }

    /// Backdate the fact (used by imports).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Which branch an upsert took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetFactOutcome {
    /// No fact existed for (identity, category, predicate).
    Inserted(FactId),
    /// An existing fact was refreshed.
    Updated(FactId),
    /// The existing fact already held identical values.
    Unchanged(FactId),
}

impl SetFactOutcome {
    pub fn id(&self) -> FactId {
        match self {
            SetFactOutcome::Inserted(id)
            | SetFactOutcome::Updated(id)
            | SetFactOutcome::Unchanged(id) => *id,
        }
    }
}

/// Partial update for [`crate::Vault::update_fact`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactPatch {
    pub object: Option<String>,
    pub confidence: Option<f32>,
    pub priority: Option<f32>,
    pub pii_level: Option<PiiLevel>,
    pub consent_scope: Option<ConsentScope>,
}

impl FactPatch {
    pub fn is_empty(&self) -> bool {
        self.object.is_none()
            && self.confidence.is_none()
            && self.priority.is_none()
            && self.pii_level.is_none()
            && self.consent_scope.is_none()
    }
}

/// Filter for [`crate::Vault::get_facts`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactFilter {
    pub category: Option<String>,
    /// Only facts at or below this level.
    pub max_pii: Option<PiiLevel>,
    /// Drop `never_upload` facts.
    pub exclude_never_upload: bool,
    /// Only facts with `priority` at or above this value.
    pub min_priority: Option<f32>,
}

impl FactFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn max_pii(mut self, level: PiiLevel) -> Self {
        self.max_pii = Some(level);
        self
    }

    pub fn uploadable(mut self) -> Self {
        self.exclude_never_upload = true;
        self
    }

    pub fn min_priority(mut self, priority: f32) -> Self {
        self.min_priority = Some(priority);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notes
// ─────────────────────────────────────────────────────────────────────────────

/// Free-form user-authored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(content: impl Into<String>) -> Self {
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id: NoteId::new(),
            title: None,
            content: content.into(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embeddings
// ─────────────────────────────────────────────────────────────────────────────

/// Reference to a searchable row: the owner of an embedding and the
/// de-duplication key during retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum RowRef {
    Message(MessageId),
    Fact(FactId),
    Note(NoteId),
}

impl RowRef {
    pub fn kind(&self) -> &'static str {
        match self {
            RowRef::Message(_) => "message",
            RowRef::Fact(_) => "fact",
            RowRef::Note(_) => "note",
        }
    }

    pub fn id_string(&self) -> String {
        match self {
            RowRef::Message(id) => id.to_string(),
            RowRef::Fact(id) => id.to_string(),
            RowRef::Note(id) => id.to_string(),
        }
    }

    pub fn parse(kind: &str, id: &str) -> Option<Self> {
        match kind {
            "message" => MessageId::parse(id).ok().map(RowRef::Message),
            "fact" => FactId::parse(id).ok().map(RowRef::Fact),
            "note" => NoteId::parse(id).ok().map(RowRef::Note),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pii_level_saturates() {
        assert_eq!(PiiLevel::new(9), PiiLevel::MAX);
        assert_eq!(PiiLevel::new(1).value(), 1);
        assert!(PiiLevel::new(1) < PiiLevel::new(2));
    }

    #[test]
    fn test_restrictive_defaults() {
        assert_eq!(PiiLevel::default(), PiiLevel::MAX);
        assert_eq!(ConsentScope::default(), ConsentScope::NeverUpload);
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f32::NAN), 0.0);
        assert_eq!(clamp_unit(0.42), 0.42);
    }

    #[test]
    fn test_role_roundtrip_strings() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("tool"), None);
    }

    #[test]
    fn test_row_ref_parse() {
        let id = FactId::new();
        let owner = RowRef::Fact(id);
        assert_eq!(
            RowRef::parse(owner.kind(), &owner.id_string()),
            Some(owner)
        );
        assert_eq!(RowRef::parse("memory", &id.to_string()), None);
    }

    #[test]
    fn test_set_fact_outcome_id() {
        let id = FactId::new();
        assert_eq!(SetFactOutcome::Updated(id).id(), id);
    }
}
