//! Collaborator-facing memory service.
//!
//! One `MemoryService` per process wraps the vault handle, the selector and
//! the embedder. Writes that create searchable text also store its embedding;
//! an embedding failure is logged and the write still stands, since vectors
//! are derived data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hearth_vault::store::META_SELECTOR_VERSION;
use hearth_vault::{
    Fact, FactFilter, FactId, FactPatch, Message, NewFact, Note, PiiLevel, Role, RowRef, Session,
    SessionId, SetFactOutcome, StoreStats, Vault, VaultMeta, now,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::embedder::SharedEmbedder;
use crate::error::Result;
use crate::payload::ContextPayload;
use crate::policy::DEFAULT_MAX_PII;
use crate::selector::{ContextSelector, SELECTOR_VERSION, SelectOptions, SelectorSettings};

/// Service-wide defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub selector: SelectorSettings,
    /// PII ceiling applied by [`MemoryService::build_context`].
    pub max_pii: PiiLevel,
    /// Time allowed for one selection.
    pub deadline: Option<Duration>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            selector: SelectorSettings::default(),
            max_pii: PiiLevel::new(DEFAULT_MAX_PII),
            deadline: None,
        }
    }
}

/// Diagnostic snapshot for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub stats: StoreStats,
    pub meta: VaultMeta,
    pub selector_version: String,
    pub embedder: Option<String>,
}

/// The memory API consumed by the UI layer.
pub struct MemoryService {
    vault: Arc<Vault>,
    selector: ContextSelector,
    embedder: Option<SharedEmbedder>,
    settings: ServiceSettings,
}

impl MemoryService {
    /// Wrap an open vault and record the selector version in its meta table.
    pub fn new(
        vault: Arc<Vault>,
        embedder: Option<SharedEmbedder>,
        settings: ServiceSettings,
    ) -> Result<Self> {
        if vault.get_meta(META_SELECTOR_VERSION)?.as_deref() != Some(SELECTOR_VERSION) {
            vault.set_meta(META_SELECTOR_VERSION, SELECTOR_VERSION)?;
            info!("Recorded selector version {}", SELECTOR_VERSION);
        }

        let mut selector = ContextSelector::new(vault.clone()).with_settings(settings.selector.clone());
        if let Some(embedder) = &embedder {
            selector = selector.with_embedder(embedder.clone());
        }

        Ok(Self {
            vault,
            selector,
            embedder,
            settings,
        })
    }

    pub fn vault(&self) -> &Arc<Vault> {
        &self.vault
    }

    pub fn selector(&self) -> &ContextSelector {
        &self.selector
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Turn hooks
    // ─────────────────────────────────────────────────────────────────────────

    /// Pre-request hook: select context for this turn at the current time.
    pub fn build_context(&self, goal: &str, token_budget: usize) -> Result<ContextPayload> {
        let mut opts = SelectOptions::new(now()).with_max_pii(self.settings.max_pii);
        if let Some(deadline) = self.settings.deadline {
            opts = opts.with_deadline(Instant::now() + deadline);
        }
        self.selector.select_context(goal, token_budget, &opts)
    }

    /// Select with caller-supplied options (fixed `now`, custom ceiling).
    pub fn build_context_with(
        &self,
        goal: &str,
        token_budget: usize,
        opts: &SelectOptions,
    ) -> Result<ContextPayload> {
        self.selector.select_context(goal, token_budget, opts)
    }

    /// Post-response hook: reinforce the facts the model turn used.
    pub fn reinforce(&self, fact_ids: &[FactId]) -> Result<Vec<Fact>> {
        self.selector.reinforce(fact_ids, now())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memory management
    // ─────────────────────────────────────────────────────────────────────────

    /// All facts, optionally narrowed to a category. Without `include_pii`
    /// only public (level 0) facts are returned.
    pub fn get_all_facts(&self, category: Option<&str>, include_pii: bool) -> Result<Vec<Fact>> {
        let mut filter = FactFilter::all();
        if let Some(category) = category {
            filter = filter.category(category);
        }
        if !include_pii {
            filter = filter.max_pii(PiiLevel::PUBLIC);
        }
        Ok(self.vault.get_facts(&filter)?)
    }

    pub fn set_fact(&self, fact: NewFact) -> Result<SetFactOutcome> {
        let outcome = self.vault.set_fact(fact)?;
        let stale = !matches!(outcome, SetFactOutcome::Unchanged(_))
            || self.vault.embedding(RowRef::Fact(outcome.id()))?.is_none();
        if stale && let Some(fact) = self.vault.get_fact(outcome.id())? {
            self.embed_row(RowRef::Fact(fact.id), &fact.search_text());
        }
        Ok(outcome)
    }

    pub fn update_fact(&self, id: FactId, patch: &FactPatch) -> Result<Fact> {
        let fact = self.vault.update_fact(id, patch)?;
        if patch.object.is_some() {
            self.embed_row(RowRef::Fact(fact.id), &fact.search_text());
        }
        Ok(fact)
    }

    /// Forget a fact. Its embedding goes with it.
    pub fn delete_fact(&self, id: FactId) -> Result<bool> {
        Ok(self.vault.delete_fact(id)?)
    }

    pub fn start_session(&self, goal: Option<&str>) -> Result<Session> {
        Ok(self.vault.create_session(goal)?)
    }

    pub fn end_session(&self, id: SessionId) -> Result<Session> {
        Ok(self.vault.end_session(id)?)
    }

    pub fn add_message(&self, session_id: SessionId, role: Role, content: &str) -> Result<Message> {
        let message = self.vault.add_message(session_id, role, content)?;
        self.embed_row(RowRef::Message(message.id), &message.content);
        Ok(message)
    }

    pub fn add_note(&self, note: Note) -> Result<Note> {
        self.vault.insert_note(&note)?;
        let text = match &note.title {
            Some(title) => format!("{}\n{}", title, note.content),
            None => note.content.clone(),
        };
        self.embed_row(RowRef::Note(note.id), &text);
        Ok(note)
    }

    pub fn health(&self) -> Result<Health> {
        Ok(Health {
            stats: self.vault.stats()?,
            meta: self.vault.meta()?,
            selector_version: SELECTOR_VERSION.to_string(),
            embedder: self.embedder.as_ref().map(|e| e.name().to_string()),
        })
    }

    fn embed_row(&self, owner: RowRef, text: &str) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        let stored = embedder
            .embed(text)
            .map_err(|e| e.to_string())
            .and_then(|vector| {
                self.vault
                    .set_embedding(owner, embedder.name(), &vector)
                    .map_err(|e| e.to_string())
            });
        match stored {
            Ok(()) => debug!("Embedded {} {}", owner.kind(), owner.id_string()),
            Err(e) => warn!("Failed to embed {} {}: {}", owner.kind(), owner.id_string(), e),
        }
    }
}
