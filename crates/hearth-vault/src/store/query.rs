//! Query and result types for search, stats and metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Fact, Message, Note, RowRef};

// ─────────────────────────────────────────────────────────────────────────────
// Search Scopes
// ─────────────────────────────────────────────────────────────────────────────

/// Default number of recent messages considered by search.
pub const DEFAULT_RECENT_MESSAGES: usize = 200;

/// Default result cap per search call.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Which rows a keyword search looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordScope {
    pub messages: bool,
    pub facts: bool,
    pub notes: bool,
    /// Only the newest N messages are decrypted and scanned.
    pub recent_messages: usize,
    /// Maximum number of hits returned.
    pub limit: usize,
}

impl Default for KeywordScope {
    fn default() -> Self {
        Self {
            messages: true,
            facts: true,
            notes: true,
            recent_messages: DEFAULT_RECENT_MESSAGES,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl KeywordScope {
    pub fn facts_only() -> Self {
        Self {
            messages: false,
            notes: false,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Which embeddings a semantic search compares against.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticScope {
    pub messages: bool,
    pub facts: bool,
    pub notes: bool,
    /// Only embeddings of the newest N messages are compared.
    pub recent_messages: usize,
    /// Hits below this similarity are dropped.
    pub min_similarity: f32,
    /// Maximum number of hits returned.
    pub limit: usize,
}

impl Default for SemanticScope {
    fn default() -> Self {
        Self {
            messages: true,
            facts: true,
            notes: true,
            recent_messages: DEFAULT_RECENT_MESSAGES,
            min_similarity: 0.0,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl SemanticScope {
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Search Results
// ─────────────────────────────────────────────────────────────────────────────

/// A decrypted row returned by search.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchedRow {
    Message(Message),
    Fact(Fact),
    Note(Note),
}

impl MatchedRow {
    pub fn row_ref(&self) -> RowRef {
        match self {
            MatchedRow::Message(m) => RowRef::Message(m.id),
            MatchedRow::Fact(f) => RowRef::Fact(f.id),
            MatchedRow::Note(n) => RowRef::Note(n.id),
        }
    }

    /// Timestamp used for recency tie-breaks.
    pub fn recency(&self) -> DateTime<Utc> {
        match self {
            MatchedRow::Message(m) => m.created_at,
            MatchedRow::Fact(f) => f.decay_anchor(),
            MatchedRow::Note(n) => n.updated_at,
        }
    }

    /// Text that keyword matching and embedding run over.
    pub fn text(&self) -> String {
        match self {
            MatchedRow::Message(m) => m.content.clone(),
            MatchedRow::Fact(f) => f.search_text(),
            MatchedRow::Note(n) => match &n.title {
                Some(title) => format!("{}\n{}", title, n.content),
                None => n.content.clone(),
            },
        }
    }
}

/// A keyword search hit. `score` is the fraction of query terms matched.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub row: MatchedRow,
    pub score: f32,
}

/// A semantic search hit. `score` is the similarity to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticHit {
    pub row: MatchedRow,
    pub score: f32,
}

/// An embedding as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub owner: RowRef,
    pub model: String,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Stats and Meta
// ─────────────────────────────────────────────────────────────────────────────

/// Statistics about the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub identity_count: usize,
    pub session_count: usize,
    pub message_count: usize,
    pub fact_count: usize,
    pub note_count: usize,
    pub embedding_count: usize,
    pub schema_version: i32,
}

/// Versions and migration status read from the `meta` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMeta {
    pub schema_version: i32,
    pub selector_version: Option<String>,
    pub created_at: Option<String>,
    pub migration_complete: bool,
    pub migration_completed_at: Option<String>,
    pub migration_source: Option<String>,
}
