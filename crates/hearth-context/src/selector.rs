//! Hybrid retrieval, scoring and budget packing.
//!
//! Selection runs in fixed stages:
//!
//! ```text
//! priority facts ─┐
//! keyword search ─┼─▶ policy filter ─▶ union by row ─▶ score ─▶ forced ─▶ greedy pack
//! semantic search ┘   (then per-channel cap) (max per channel) (alpha mix × relevance)  (score, recency, id)
//! ```
//!
//! The policy runs before the candidate cap, so restricted facts never take
//! a retrieval slot from an allowed one.
//!
//! Nothing in here reads the wall clock except the optional deadline; every
//! ordering decision falls back to row ids, so identical inputs produce
//! identical payloads.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use hearth_vault::{
    DecayParams, Fact, FactFilter, FactId, KeywordScope, MatchedRow, PiiLevel, RowRef,
    SemanticScope, SimilarityFn, Vault, cosine_similarity, relevance,
};
use tracing::{debug, info};

use crate::embedder::SharedEmbedder;
use crate::error::{Result, SelectError};
use crate::payload::{
    ContextFact, ContextMessage, ContextNote, ContextPayload, ProfileSummary, SelectionStats,
};
use crate::policy::{DEFAULT_MAX_PII, Exclusion, ExclusionCounts, Policy};
use crate::tokens::item_cost;

/// Recorded in the vault's meta table and every payload.
pub const SELECTOR_VERSION: &str = "hybrid-1";

// ─────────────────────────────────────────────────────────────────────────────
// Settings and Options
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables fixed for the lifetime of a selector.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorSettings {
    /// Weight of the semantic channel; keyword gets `1 - alpha`.
    pub alpha: f32,
    pub always_include_threshold: f32,
    pub per_item_overhead: usize,
    pub recent_messages: usize,
    /// Hit cap per retrieval channel.
    pub candidate_limit: usize,
    pub min_similarity: f32,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            always_include_threshold: 0.95,
            per_item_overhead: 4,
            recent_messages: 50,
            candidate_limit: 50,
            min_similarity: 0.2,
        }
    }
}

/// Per-call inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOptions {
    /// The only notion of "now" the selector uses.
    pub now: DateTime<Utc>,
    pub max_pii: PiiLevel,
    /// Stop retrieving and scoring once this passes.
    pub deadline: Option<Instant>,
}

impl SelectOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            max_pii: PiiLevel::new(DEFAULT_MAX_PII),
            deadline: None,
        }
    }

    pub fn with_max_pii(mut self, max_pii: PiiLevel) -> Self {
        self.max_pii = max_pii;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Candidates
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Candidate {
    row: MatchedRow,
    keyword: f32,
    semantic: f32,
}

#[derive(Debug)]
struct Scored {
    row: MatchedRow,
    score: f32,
    forced: bool,
}

impl Scored {
    fn text(&self) -> String {
        match &self.row {
            MatchedRow::Fact(f) => ContextFact::text_for(f),
            MatchedRow::Message(m) => ContextMessage::text_for(m),
            MatchedRow::Note(n) => ContextNote::text_for(n),
        }
    }
}

enum Channel {
    Keyword,
    Semantic,
}

fn merge(pool: &mut BTreeMap<RowRef, Candidate>, row: MatchedRow, channel: Channel, score: f32) {
    let candidate = pool.entry(row.row_ref()).or_insert_with(|| Candidate {
        row,
        keyword: 0.0,
        semantic: 0.0,
    });
    let slot = match channel {
        Channel::Keyword => &mut candidate.keyword,
        Channel::Semantic => &mut candidate.semantic,
    };
    *slot = slot.max(score);
}

/// Applies the upload policy at retrieval and remembers what it dropped.
struct Gate {
    policy: Policy,
    excluded: BTreeMap<RowRef, Exclusion>,
}

impl Gate {
    fn new(policy: Policy) -> Self {
        Self {
            policy,
            excluded: BTreeMap::new(),
        }
    }

    fn admits(&mut self, row: &MatchedRow) -> bool {
        let MatchedRow::Fact(fact) = row else {
            return true;
        };
        match self.policy.check(fact) {
            Some(exclusion) => {
                self.excluded.insert(RowRef::Fact(fact.id), exclusion);
                false
            }
            None => true,
        }
    }

    /// Each fact counts once, however many channels matched it.
    fn counts(&self) -> ExclusionCounts {
        let mut counts = ExclusionCounts::default();
        for exclusion in self.excluded.values() {
            counts.record(*exclusion);
        }
        counts
    }
}

/// Score desc, most recent first, then row id ascending.
fn rank(rows: &mut [Scored]) {
    rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.row.recency().cmp(&a.row.recency()))
            .then_with(|| a.row.row_ref().cmp(&b.row.row_ref()))
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Selector
// ─────────────────────────────────────────────────────────────────────────────

/// Builds context payloads from a vault.
pub struct ContextSelector {
    vault: Arc<Vault>,
    embedder: Option<SharedEmbedder>,
    settings: SelectorSettings,
    similarity: SimilarityFn,
}

impl ContextSelector {
    /// Keyword-only selector with default settings.
    pub fn new(vault: Arc<Vault>) -> Self {
        Self {
            vault,
            embedder: None,
            settings: SelectorSettings::default(),
            similarity: cosine_similarity,
        }
    }

    /// Enable the semantic channel.
    pub fn with_embedder(mut self, embedder: SharedEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_settings(mut self, settings: SelectorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_similarity(mut self, similarity: SimilarityFn) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn settings(&self) -> &SelectorSettings {
        &self.settings
    }

    pub fn vault(&self) -> &Arc<Vault> {
        &self.vault
    }

    /// Smallest budget that can hold a one-token item.
    pub fn minimum_budget(&self) -> usize {
        self.settings.per_item_overhead + 1
    }

    /// Select the memory slice for `goal` within `token_budget`.
    ///
    /// Facts forced in by the always-include rule may push `tokens_used`
    /// past the budget; they are flagged `forced` and counted in
    /// `stats.forced_tokens`. Everything else fits within the budget.
    pub fn select_context(
        &self,
        goal: &str,
        token_budget: usize,
        opts: &SelectOptions,
    ) -> Result<ContextPayload> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(SelectError::InvalidGoal);
        }
        let minimum = self.minimum_budget();
        if token_budget < minimum {
            return Err(SelectError::BudgetTooSmall {
                budget: token_budget,
                minimum,
            });
        }

        let mut stats = SelectionStats::default();
        let mut truncated = false;

        let mut gate = Gate::new(Policy::new(opts.max_pii));
        let pool = self.retrieve(goal, opts, &mut gate, &mut stats, &mut truncated)?;
        stats.candidates = pool.len();

        let mut scored = self.score(pool, opts, &mut truncated);
        stats.scored = scored.len();

        let excluded = gate.counts();
        stats.excluded_pii = excluded.pii_level;
        stats.excluded_consent = excluded.never_upload;

        rank(&mut scored);
        let payload = self.pack(scored, token_budget, opts, stats, truncated)?;

        info!(
            budget = token_budget,
            tokens = payload.tokens_used,
            facts = payload.facts.len(),
            messages = payload.messages.len(),
            notes = payload.notes.len(),
            excluded = excluded.total(),
            truncated = payload.truncated,
            "Context selected"
        );
        Ok(payload)
    }

    /// Forward a reinforcement to the vault after a turn used these facts.
    pub fn reinforce(&self, fact_ids: &[FactId], now: DateTime<Utc>) -> Result<Vec<Fact>> {
        Ok(self.vault.reinforce_facts(fact_ids, now)?)
    }

    fn retrieve(
        &self,
        goal: &str,
        opts: &SelectOptions,
        gate: &mut Gate,
        stats: &mut SelectionStats,
        truncated: &mut bool,
    ) -> Result<BTreeMap<RowRef, Candidate>> {
        let settings = &self.settings;
        let mut pool = BTreeMap::new();

        // Priority facts are candidates whether or not they match.
        let priority =
            FactFilter::all().min_priority(settings.always_include_threshold);
        for fact in self.vault.get_facts(&priority)? {
            let row = MatchedRow::Fact(fact);
            if gate.admits(&row) {
                pool.insert(
                    row.row_ref(),
                    Candidate {
                        row,
                        keyword: 0.0,
                        semantic: 0.0,
                    },
                );
            }
        }

        if opts.expired() {
            *truncated = true;
            return Ok(pool);
        }
        let keyword_scope = KeywordScope {
            messages: true,
            facts: true,
            notes: true,
            recent_messages: settings.recent_messages,
            // Capped below, after the policy.
            limit: usize::MAX,
        };
        let mut keyword_hits: Vec<_> = self
            .vault
            .search_keyword(goal, &keyword_scope)?
            .into_iter()
            .filter(|hit| gate.admits(&hit.row))
            .collect();
        keyword_hits.truncate(settings.candidate_limit);
        stats.keyword_hits = keyword_hits.len();
        for hit in keyword_hits {
            merge(&mut pool, hit.row, Channel::Keyword, hit.score);
        }

        let Some(embedder) = &self.embedder else {
            return Ok(pool);
        };
        if opts.expired() {
            *truncated = true;
            return Ok(pool);
        }
        let query = embedder.embed(goal)?;
        let semantic_scope = SemanticScope {
            messages: true,
            facts: true,
            notes: true,
            recent_messages: settings.recent_messages,
            min_similarity: settings.min_similarity,
            limit: usize::MAX,
        };
        let mut semantic_hits: Vec<_> = self
            .vault
            .search_semantic(&query, &semantic_scope, self.similarity)?
            .into_iter()
            .filter(|hit| gate.admits(&hit.row))
            .collect();
        semantic_hits.truncate(settings.candidate_limit);
        stats.semantic_hits = semantic_hits.len();
        for hit in semantic_hits {
            merge(&mut pool, hit.row, Channel::Semantic, hit.score);
        }

        debug!(
            keyword = stats.keyword_hits,
            semantic = stats.semantic_hits,
            union = pool.len(),
            "Hybrid retrieval"
        );
        Ok(pool)
    }

    /// Composite scores. Priority facts are scored unconditionally, then
    /// other facts, then messages and notes until the deadline.
    fn score(
        &self,
        pool: BTreeMap<RowRef, Candidate>,
        opts: &SelectOptions,
        truncated: &mut bool,
    ) -> Vec<Scored> {
        let decay: DecayParams = *self.vault.decay();
        let alpha = self.settings.alpha.clamp(0.0, 1.0);
        let threshold = self.settings.always_include_threshold;

        let is_priority =
            |c: &Candidate| matches!(&c.row, MatchedRow::Fact(f) if f.priority >= threshold);
        let mut candidates: Vec<Candidate> = pool.into_values().collect();
        // Stable, so row id order holds within each tier.
        candidates.sort_by_key(|c| match &c.row {
            MatchedRow::Fact(f) if f.priority >= threshold => 0,
            MatchedRow::Fact(_) => 1,
            _ => 2,
        });

        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !is_priority(&candidate) && opts.expired() {
                *truncated = true;
                break;
            }

            let mut score = alpha * candidate.semantic + (1.0 - alpha) * candidate.keyword;
            let mut forced = false;
            if let MatchedRow::Fact(fact) = &candidate.row {
                score *= relevance(fact, opts.now, &decay) as f32;
                forced = fact.priority >= threshold || score >= threshold;
            }
            scored.push(Scored {
                row: candidate.row,
                score,
                forced,
            });
        }
        scored
    }

    fn pack(
        &self,
        ranked: Vec<Scored>,
        token_budget: usize,
        opts: &SelectOptions,
        mut stats: SelectionStats,
        truncated: bool,
    ) -> Result<ContextPayload> {
        let overhead = self.settings.per_item_overhead;
        let (forced, rest): (Vec<_>, Vec<_>) = ranked.into_iter().partition(|s| s.forced);

        let mut facts = Vec::new();
        let mut messages = Vec::new();
        let mut notes = Vec::new();

        for item in forced {
            if let MatchedRow::Fact(fact) = item.row {
                let tokens = item_cost(&ContextFact::text_for(&fact), overhead);
                stats.forced += 1;
                stats.forced_tokens += tokens;
                facts.push(ContextFact::new(fact, item.score, tokens, true));
            }
        }

        let mut remaining = token_budget.saturating_sub(stats.forced_tokens);
        let mut budgeted = 0;

        let mut profile = None;
        if let Some(identity) = self.vault.identity()?
            && let Some(name) = identity.display_name
        {
            let tokens = item_cost(&ProfileSummary::text_for(&name), overhead);
            if tokens <= remaining {
                remaining -= tokens;
                budgeted += tokens;
                profile = Some(ProfileSummary {
                    identity_id: identity.id,
                    display_name: name,
                    tokens,
                });
            }
        }

        for item in rest {
            let tokens = item_cost(&item.text(), overhead);
            if tokens > remaining {
                stats.over_budget += 1;
                continue;
            }
            remaining -= tokens;
            budgeted += tokens;
            match item.row {
                MatchedRow::Fact(fact) => {
                    facts.push(ContextFact::new(fact, item.score, tokens, false))
                }
                MatchedRow::Message(message) => {
                    messages.push(ContextMessage::new(message, item.score, tokens))
                }
                MatchedRow::Note(note) => notes.push(ContextNote::new(note, item.score, tokens)),
            }
        }

        Ok(ContextPayload {
            selector_version: SELECTOR_VERSION.to_string(),
            generated_at: opts.now,
            token_budget,
            tokens_used: stats.forced_tokens + budgeted,
            profile,
            facts,
            messages,
            notes,
            truncated,
            stats,
        })
    }
}
