//! Keyword and semantic search.
//!
//! Encrypted columns cannot be indexed, so message and fact matching decrypts
//! a bounded window in process. Notes are plaintext and go through FTS5
//! plus a LIKE pass for matches inside a word.
//! Both searches return hits ordered by score, then recency, then row id.

use std::collections::{BTreeMap, HashSet};

use rusqlite::params;
use tracing::debug;

use crate::error::Result;
use crate::types::{FactFilter, MessageId, Note, NoteId, RowRef};
use crate::vector::SimilarityFn;

use super::query::{KeywordHit, KeywordScope, MatchedRow, SemanticHit, SemanticScope};
use super::{Db, Vault};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "for", "from", "how", "i", "in", "is",
    "it", "me", "my", "of", "on", "or", "s", "so", "that", "the", "this", "to", "was", "what",
    "when", "where", "which", "who", "why", "with", "you",
];

/// Lowercased, de-duplicated search terms in query order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Fraction of `terms` that occur in `text` (case-insensitive substring).
pub fn keyword_score(text: &str, terms: &[String]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    matched as f32 / terms.len() as f32
}

/// `%term%` with LIKE wildcards in the term escaped.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Score desc, most recent first, then row id ascending.
fn rank(hits: &mut [(MatchedRow, f32)]) {
    hits.sort_by(|(a_row, a_score), (b_row, b_score)| {
        b_score
            .total_cmp(a_score)
            .then_with(|| b_row.recency().cmp(&a_row.recency()))
            .then_with(|| a_row.row_ref().cmp(&b_row.row_ref()))
    });
}

impl Db<'_> {
    pub(crate) fn search_keyword(&self, query: &str, scope: &KeywordScope) -> Result<Vec<KeywordHit>> {
        let terms = query_terms(query);
        if terms.is_empty() || scope.limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(MatchedRow, f32)> = Vec::new();

        if scope.messages {
            for message in self.recent_messages(scope.recent_messages)? {
                let score = keyword_score(&message.content, &terms);
                if score > 0.0 {
                    hits.push((MatchedRow::Message(message), score));
                }
            }
        }

        if scope.facts {
            for fact in self.get_facts(&FactFilter::all())? {
                let score = keyword_score(&fact.search_text(), &terms);
                if score > 0.0 {
                    hits.push((MatchedRow::Fact(fact), score));
                }
            }
        }

        if scope.notes {
            for note in self.match_notes(&terms)? {
                let row = MatchedRow::Note(note);
                let score = keyword_score(&row.text(), &terms);
                if score > 0.0 {
                    hits.push((row, score));
                }
            }
        }

        rank(&mut hits);
        hits.truncate(scope.limit);
        debug!("Keyword search: {} terms, {} hits", terms.len(), hits.len());

        Ok(hits
            .into_iter()
            .map(|(row, score)| KeywordHit { row, score })
            .collect())
    }

    /// Notes whose title or content contains any term.
    ///
    /// FTS5 finds token prefixes with Unicode case folding. The LIKE pass
    /// adds matches inside a word, which the tokenizer never sees.
    fn match_notes(&self, terms: &[String]) -> Result<Vec<Note>> {
        let mut found: BTreeMap<NoteId, Note> = BTreeMap::new();

        let fts_query = terms
            .iter()
            .map(|t| format!("\"{}\"*", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ");
        let mut stmt = self.conn.prepare(
            r#"
            SELECT n.id, n.title, n.content, n.tags, n.created_at, n.updated_at
            FROM notes_fts
            JOIN notes n ON n.rowid = notes_fts.rowid
            WHERE notes_fts MATCH ?1
            "#,
        )?;
        let mut rows = stmt.query(params![fts_query])?;
        while let Some(row) = rows.next()? {
            let note = Self::row_to_note(row)?;
            found.insert(note.id, note);
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, title, content, tags, created_at, updated_at
            FROM notes
            WHERE content LIKE ?1 ESCAPE '\' OR title LIKE ?1 ESCAPE '\'
            "#,
        )?;
        for term in terms {
            let mut rows = stmt.query(params![like_pattern(term)])?;
            while let Some(row) = rows.next()? {
                let note = Self::row_to_note(row)?;
                found.entry(note.id).or_insert(note);
            }
        }

        Ok(found.into_values().collect())
    }

    pub(crate) fn search_semantic(
        &self,
        query_vector: &[f32],
        scope: &SemanticScope,
        similarity: SimilarityFn,
    ) -> Result<Vec<SemanticHit>> {
        if query_vector.is_empty() || scope.limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(MatchedRow, f32)> = Vec::new();
        let consider = |vector: &[f32]| -> Option<f32> {
            if vector.len() != query_vector.len() {
                return None;
            }
            let score = similarity(query_vector, vector);
            (score.is_finite() && score > 0.0 && score >= scope.min_similarity).then_some(score)
        };

        if scope.facts {
            for embedding in self.embeddings_of_kind("fact")? {
                if let Some(score) = consider(&embedding.vector)
                    && let RowRef::Fact(id) = embedding.owner
                    && let Some(fact) = self.get_fact(id)?
                {
                    hits.push((MatchedRow::Fact(fact), score));
                }
            }
        }

        if scope.messages {
            let recent: HashSet<MessageId> = self
                .recent_messages(scope.recent_messages)?
                .into_iter()
                .map(|m| m.id)
                .collect();
            for embedding in self.embeddings_of_kind("message")? {
                if let RowRef::Message(id) = embedding.owner
                    && recent.contains(&id)
                    && let Some(score) = consider(&embedding.vector)
                    && let Some(message) = self.get_message(id)?
                {
                    hits.push((MatchedRow::Message(message), score));
                }
            }
        }

        if scope.notes {
            for embedding in self.embeddings_of_kind("note")? {
                if let Some(score) = consider(&embedding.vector)
                    && let RowRef::Note(id) = embedding.owner
                    && let Some(note) = self.get_note(id)?
                {
                    hits.push((MatchedRow::Note(note), score));
                }
            }
        }

        rank(&mut hits);
        hits.truncate(scope.limit);
        debug!("Semantic search: {} hits", hits.len());

        Ok(hits
            .into_iter()
            .map(|(row, score)| SemanticHit { row, score })
            .collect())
    }
}

impl Vault {
    /// Case-insensitive term match over recent messages, facts and notes.
    ///
    /// The score of a hit is the fraction of query terms it contains.
    pub fn search_keyword(&self, query: &str, scope: &KeywordScope) -> Result<Vec<KeywordHit>> {
        self.with_db(|db| db.search_keyword(query, scope))
    }

    /// Brute-force similarity search over stored embeddings.
    ///
    /// Embeddings whose dimension differs from the query are skipped.
    pub fn search_semantic(
        &self,
        query_vector: &[f32],
        scope: &SemanticScope,
        similarity: SimilarityFn,
    ) -> Result<Vec<SemanticHit>> {
        self.with_db(|db| db.search_semantic(query_vector, scope, similarity))
    }
}
