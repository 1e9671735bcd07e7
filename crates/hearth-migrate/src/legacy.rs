//! The legacy flat-file memory layout.
//!
//! A legacy store is a directory holding any of:
//!
//! ```text
//! profile.json      { "name": "Alex", "created_at": "..." }
//! sessions.json     [ { "title": "...", "created_at": "...", "messages": [ { "role", "content", "timestamp" } ] } ]
//! facts.json        [ { "category", "key", "value", "confidence", "pii_level", "consent", "priority" } ]
//! preferences.json  { "units": "metric", "tone": "casual" }
//! ```
//!
//! Every file is optional; the directory counts as legacy data when at least
//! one of them exists.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hearth_vault::{ConsentScope, NewFact, PiiLevel, Role};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{MigrationError, Result};

pub const PROFILE_FILE: &str = "profile.json";
pub const SESSIONS_FILE: &str = "sessions.json";
pub const FACTS_FILE: &str = "facts.json";
pub const PREFERENCES_FILE: &str = "preferences.json";

/// Every file name the importer understands.
pub const LEGACY_FILES: [&str; 4] = [PROFILE_FILE, SESSIONS_FILE, FACTS_FILE, PREFERENCES_FILE];

/// Category that preferences are stored under.
pub const PREFERENCE_CATEGORY: &str = "preference";

// ─────────────────────────────────────────────────────────────────────────────
// File formats
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LegacyProfile {
    #[serde(default, alias = "display_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyMessage {
    pub role: String,
    pub content: String,
    #[serde(default, alias = "created_at")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LegacyMessage {
    /// Role names used by older releases map onto the current three.
    pub fn role(&self) -> Option<Role> {
        match self.role.to_lowercase().as_str() {
            "bot" | "ai" | "assistant" => Some(Role::Assistant),
            "human" | "user" => Some(Role::User),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacySession {
    #[serde(default, alias = "goal")]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<LegacyMessage>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyFact {
    pub category: String,
    #[serde(alias = "predicate")]
    pub key: String,
    #[serde(alias = "object")]
    pub value: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub priority: Option<f32>,
    #[serde(default)]
    pub pii_level: Option<u8>,
    #[serde(default)]
    pub consent: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl LegacyFact {
    /// Unknown consent strings fall back to the restrictive default.
    pub fn to_new_fact(&self) -> NewFact {
        let mut fact = NewFact::new(&self.category, &self.key, &self.value);
        if let Some(confidence) = self.confidence {
            fact = fact.with_confidence(confidence);
        }
        if let Some(priority) = self.priority {
            fact = fact.with_priority(priority);
        }
        if let Some(level) = self.pii_level {
            fact = fact.with_pii_level(PiiLevel::new(level));
        }
        if let Some(scope) = self.consent.as_deref().and_then(ConsentScope::parse) {
            fact = fact.with_consent(scope);
        }
        if let Some(created_at) = self.created_at {
            fact = fact.with_created_at(created_at);
        }
        fact
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loaded data
// ─────────────────────────────────────────────────────────────────────────────

/// Row counts the vault must hold after import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpectedCounts {
    pub sessions: usize,
    pub messages: usize,
    pub facts: usize,
}

/// Everything parsed from a legacy directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyData {
    pub profile: Option<LegacyProfile>,
    pub sessions: Vec<LegacySession>,
    pub facts: Vec<LegacyFact>,
    /// Sorted by key, so import order is stable.
    pub preferences: BTreeMap<String, serde_json::Value>,
}

impl LegacyData {
    /// Paths of the legacy files present in `dir`.
    pub fn detect(dir: &Path) -> Vec<PathBuf> {
        LEGACY_FILES
            .iter()
            .map(|name| dir.join(name))
            .filter(|path| path.is_file())
            .collect()
    }

    /// Parse every present file.
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            profile: read_optional(&dir.join(PROFILE_FILE))?,
            sessions: read_optional(&dir.join(SESSIONS_FILE))?.unwrap_or_default(),
            facts: read_optional(&dir.join(FACTS_FILE))?.unwrap_or_default(),
            preferences: read_optional(&dir.join(PREFERENCES_FILE))?.unwrap_or_default(),
        })
    }

    /// Preferences as facts in the reserved category.
    pub fn preference_facts(&self) -> Vec<NewFact> {
        self.preferences
            .iter()
            .map(|(key, value)| {
                let object = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                NewFact::new(PREFERENCE_CATEGORY, key, object)
            })
            .collect()
    }

    /// Facts then preferences, one per (category, predicate), last entry wins.
    ///
    /// The vault keeps a single row per key, so this is exactly what the
    /// import writes. Each key keeps the position of its first occurrence.
    pub fn vault_facts(&self) -> Vec<NewFact> {
        let mut positions: HashMap<(String, String), usize> = HashMap::new();
        let mut facts: Vec<NewFact> = Vec::new();
        let entries = self
            .facts
            .iter()
            .map(LegacyFact::to_new_fact)
            .chain(self.preference_facts());
        for fact in entries {
            let key = (fact.category.clone(), fact.predicate.clone());
            match positions.get(&key) {
                Some(&index) => facts[index] = fact,
                None => {
                    positions.insert(key, facts.len());
                    facts.push(fact);
                }
            }
        }
        facts
    }

    pub fn expected_counts(&self) -> ExpectedCounts {
        ExpectedCounts {
            sessions: self.sessions.len(),
            messages: self.sessions.iter().map(|s| s.messages.len()).sum(),
            facts: self.vault_facts().len(),
        }
    }
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| MigrationError::Legacy {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| MigrationError::Legacy {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
