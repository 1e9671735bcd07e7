//! Fact operations: upsert, CRUD and reinforcement.

use chrono::{DateTime, Utc};
use rusqlite::{ToSql, params};
use tracing::{debug, info};

use crate::decay::reinforced_confidence;
use crate::error::{Result, VaultError};
use crate::types::{
    ConsentScope, Fact, FactFilter, FactId, FactPatch, IdentityId, MessageId, NewFact, PiiLevel,
    SetFactOutcome, clamp_unit,
};

use super::{Db, Vault, now, parse_opt_timestamp, parse_timestamp, timestamp};

const FACT_COLUMNS: &str = "id, identity_id, category, predicate, object, confidence, priority, \
     pii_level, consent_scope, created_at, last_reinforced_at, reinforcement_count, source_message_id";

/// Priority given to facts inserted without one.
pub const DEFAULT_PRIORITY: f32 = 0.5;

impl Db<'_> {
    /// Insert a fully-formed fact. Used by `set_fact` and by restores.
    pub(crate) fn insert_fact(&self, fact: &Fact) -> Result<()> {
        let id = fact.id.to_string();
        let object = self.seal("facts", "object", &id, &fact.object)?;

        self.conn.execute(
            r#"
            INSERT INTO facts (id, identity_id, category, predicate, object, confidence, priority,
                               pii_level, consent_scope, created_at, last_reinforced_at,
                               reinforcement_count, source_message_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                id,
                fact.identity_id.to_string(),
                fact.category,
                fact.predicate,
                object,
                f64::from(clamp_unit(fact.confidence)),
                f64::from(clamp_unit(fact.priority)),
                fact.pii_level.value(),
                fact.consent_scope.as_str(),
                timestamp(&fact.created_at),
                fact.last_reinforced_at.as_ref().map(timestamp),
                fact.reinforcement_count,
                fact.source_message_id.map(|m| m.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Rewrite the mutable columns of an existing fact.
    fn write_fact(&self, fact: &Fact) -> Result<()> {
        let id = fact.id.to_string();
        let object = self.seal("facts", "object", &id, &fact.object)?;

        let rows = self.conn.execute(
            r#"
            UPDATE facts
            SET object = ?2, confidence = ?3, priority = ?4, pii_level = ?5, consent_scope = ?6,
                last_reinforced_at = ?7, reinforcement_count = ?8
            WHERE id = ?1
            "#,
            params![
                id,
                object,
                f64::from(clamp_unit(fact.confidence)),
                f64::from(clamp_unit(fact.priority)),
                fact.pii_level.value(),
                fact.consent_scope.as_str(),
                fact.last_reinforced_at.as_ref().map(timestamp),
                fact.reinforcement_count,
            ],
        )?;

        if rows == 0 {
            return Err(VaultError::NotFound(format!("Fact {}", fact.id)));
        }
        Ok(())
    }

    pub(crate) fn set_fact(&self, identity_id: IdentityId, new: &NewFact) -> Result<SetFactOutcome> {
        if new.category.trim().is_empty() || new.predicate.trim().is_empty() {
            return Err(VaultError::InvalidData(
                "fact category and predicate must not be empty".to_string(),
            ));
        }

        let Some(existing) = self.find_fact(identity_id, &new.category, &new.predicate)? else {
            let fact = Fact {
                id: FactId::new(),
                identity_id,
                category: new.category.clone(),
                predicate: new.predicate.clone(),
                object: new.object.clone(),
                confidence: clamp_unit(new.confidence),
                priority: clamp_unit(new.priority.unwrap_or(DEFAULT_PRIORITY)),
                pii_level: new.pii_level.unwrap_or(PiiLevel::MAX),
                consent_scope: new.consent_scope.unwrap_or(ConsentScope::NeverUpload),
                created_at: new.created_at.unwrap_or_else(now),
                last_reinforced_at: None,
                reinforcement_count: 0,
                source_message_id: new.source_message_id,
            };
            self.insert_fact(&fact)?;
            debug!("Inserted fact {} ({}/{})", fact.id, fact.category, fact.predicate);
            return Ok(SetFactOutcome::Inserted(fact.id));
        };

        // created_at and provenance stay with the original row.
        let mut updated = existing.clone();
        updated.object = new.object.clone();
        updated.confidence = clamp_unit(new.confidence);
        if let Some(priority) = new.priority {
            updated.priority = clamp_unit(priority);
        }
        if let Some(level) = new.pii_level {
            updated.pii_level = level;
        }
        if let Some(scope) = new.consent_scope {
            updated.consent_scope = scope;
        }

        if updated == existing {
            return Ok(SetFactOutcome::Unchanged(existing.id));
        }

        self.write_fact(&updated)?;
        debug!("Updated fact {} ({}/{})", updated.id, updated.category, updated.predicate);
        Ok(SetFactOutcome::Updated(updated.id))
    }

    fn find_fact(
        &self,
        identity_id: IdentityId,
        category: &str,
        predicate: &str,
    ) -> Result<Option<Fact>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM facts WHERE identity_id = ?1 AND category = ?2 AND predicate = ?3",
            FACT_COLUMNS
        ))?;
        let mut rows = stmt.query(params![identity_id.to_string(), category, predicate])?;

        if let Some(row) = rows.next()? {
            Ok(Some(self.row_to_fact(row)?))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn get_fact(&self, id: FactId) -> Result<Option<Fact>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM facts WHERE id = ?1", FACT_COLUMNS))?;
        let mut rows = stmt.query(params![id.to_string()])?;

        if let Some(row) = rows.next()? {
            Ok(Some(self.row_to_fact(row)?))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn get_facts(&self, filter: &FactFilter) -> Result<Vec<Fact>> {
        let mut sql = format!("SELECT {} FROM facts WHERE 1 = 1", FACT_COLUMNS);
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(category) = &filter.category {
            values.push(Box::new(category.clone()));
            sql.push_str(&format!(" AND category = ?{}", values.len()));
        }
        if let Some(level) = filter.max_pii {
            values.push(Box::new(level.value()));
            sql.push_str(&format!(" AND pii_level <= ?{}", values.len()));
        }
        if filter.exclude_never_upload {
            values.push(Box::new(ConsentScope::NeverUpload.as_str()));
            sql.push_str(&format!(" AND consent_scope != ?{}", values.len()));
        }
        if let Some(priority) = filter.min_priority {
            values.push(Box::new(f64::from(priority)));
            sql.push_str(&format!(" AND priority >= ?{}", values.len()));
        }
        sql.push_str(" ORDER BY category ASC, predicate ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(values.iter()))?;

        let mut facts = Vec::new();
        while let Some(row) = rows.next()? {
            facts.push(self.row_to_fact(row)?);
        }
        Ok(facts)
    }

    pub(crate) fn update_fact(&self, id: FactId, patch: &FactPatch) -> Result<Fact> {
        let mut fact = self
            .get_fact(id)?
            .ok_or_else(|| VaultError::NotFound(format!("Fact {}", id)))?;
        if patch.is_empty() {
            return Ok(fact);
        }

        if let Some(object) = &patch.object {
            fact.object = object.clone();
        }
        if let Some(confidence) = patch.confidence {
            fact.confidence = clamp_unit(confidence);
        }
        if let Some(priority) = patch.priority {
            fact.priority = clamp_unit(priority);
        }
        if let Some(level) = patch.pii_level {
            fact.pii_level = level;
        }
        if let Some(scope) = patch.consent_scope {
            fact.consent_scope = scope;
        }

        self.write_fact(&fact)?;
        debug!("Patched fact {}", id);
        Ok(fact)
    }

    pub(crate) fn delete_fact(&self, id: FactId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM facts WHERE id = ?1", params![id.to_string()])?;
        Ok(rows > 0)
    }

    /// Reinforce every id or none. Duplicate ids count once.
    pub(crate) fn reinforce_facts(
        &self,
        ids: &[FactId],
        at: DateTime<Utc>,
        step: f32,
    ) -> Result<Vec<Fact>> {
        let mut seen = std::collections::HashSet::new();
        let mut reinforced = Vec::with_capacity(ids.len());

        for id in ids.iter().filter(|id| seen.insert(**id)) {
            let mut fact = self
                .get_fact(*id)?
                .ok_or_else(|| VaultError::NotFound(format!("Fact {}", id)))?;

            fact.confidence = reinforced_confidence(fact.confidence, step);
            fact.last_reinforced_at = Some(at);
            fact.reinforcement_count = fact.reinforcement_count.saturating_add(1);

            self.conn.execute(
                r#"
                UPDATE facts
                SET confidence = ?2, last_reinforced_at = ?3,
                    reinforcement_count = reinforcement_count + 1
                WHERE id = ?1
                "#,
                params![id.to_string(), f64::from(fact.confidence), timestamp(&at)],
            )?;
            reinforced.push(fact);
        }

        Ok(reinforced)
    }

    fn row_to_fact(&self, row: &rusqlite::Row) -> Result<Fact> {
        let id: String = row.get(0)?;
        let identity_id: String = row.get(1)?;
        let object: Vec<u8> = row.get(4)?;
        let confidence: f64 = row.get(5)?;
        let priority: f64 = row.get(6)?;
        let pii_level: i64 = row.get(7)?;
        let consent_scope: String = row.get(8)?;
        let created_at: String = row.get(9)?;
        let reinforcement_count: i64 = row.get(11)?;
        let source_message_id: Option<String> = row.get(12)?;

        Ok(Fact {
            identity_id: IdentityId::parse(&identity_id)?,
            category: row.get(2)?,
            predicate: row.get(3)?,
            object: self.open("facts", "object", &id, &object)?,
            confidence: clamp_unit(confidence as f32),
            priority: clamp_unit(priority as f32),
            pii_level: PiiLevel::new(pii_level.clamp(0, i64::from(u8::MAX)) as u8),
            consent_scope: ConsentScope::parse(&consent_scope).ok_or_else(|| {
                VaultError::InvalidData(format!("unknown consent scope '{}'", consent_scope))
            })?,
            created_at: parse_timestamp(&created_at)?,
            last_reinforced_at: parse_opt_timestamp(row.get(10)?)?,
            reinforcement_count: reinforcement_count.max(0) as u32,
            source_message_id: source_message_id
                .as_deref()
                .map(MessageId::parse)
                .transpose()?,
            id: FactId::parse(&id)?,
        })
    }
}

impl Vault {
    /// Insert or refresh a fact keyed by `(identity, category, predicate)`.
    ///
    /// On update, `created_at` and `source_message_id` are preserved while
    /// `object` and `confidence` are replaced. `priority`, `pii_level` and
    /// `consent_scope` change only when supplied.
    pub fn set_fact(&self, fact: NewFact) -> Result<SetFactOutcome> {
        self.with_tx(|db| {
            let identity = db.require_identity()?;
            db.set_fact(identity.id, &fact)
        })
    }

    /// Get a fact by ID.
    pub fn get_fact(&self, id: FactId) -> Result<Option<Fact>> {
        self.with_db(|db| db.get_fact(id))
    }

    /// Facts matching the filter, ordered by category, predicate and id.
    pub fn get_facts(&self, filter: &FactFilter) -> Result<Vec<Fact>> {
        self.with_db(|db| db.get_facts(filter))
    }

    /// Apply a partial update and return the stored fact.
    pub fn update_fact(&self, id: FactId, patch: &FactPatch) -> Result<Fact> {
        self.with_tx(|db| db.update_fact(id, patch))
    }

    /// Hard-delete a fact and its embedding. Returns whether a row existed.
    pub fn delete_fact(&self, id: FactId) -> Result<bool> {
        let deleted = self.with_tx(|db| db.delete_fact(id))?;
        if deleted {
            info!("Deleted fact {}", id);
        }
        Ok(deleted)
    }

    /// Reinforce facts after a model turn used them.
    ///
    /// Runs as one transaction: a missing id aborts the batch with
    /// [`VaultError::NotFound`] and no fact changes.
    pub fn reinforce_facts(&self, ids: &[FactId], at: DateTime<Utc>) -> Result<Vec<Fact>> {
        let step = self.decay.reinforce_step;
        let reinforced = self.with_tx(|db| db.reinforce_facts(ids, at, step))?;
        debug!("Reinforced {} facts", reinforced.len());
        Ok(reinforced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::VaultKey;
    use crate::decay::{DecayParams, relevance};
    use chrono::Duration;

    fn vault() -> Vault {
        let vault = Vault::open_in_memory(&VaultKey::from_bytes([5u8; 32])).unwrap();
        vault.create_identity(IdentityId::new(), Some("Alex")).unwrap();
        vault
    }

    #[test]
    fn test_set_fact_insert_defaults_are_restrictive() {
        let vault = vault();
        let outcome = vault
            .set_fact(NewFact::new("location", "city", "Philadelphia"))
            .unwrap();
        assert!(matches!(outcome, SetFactOutcome::Inserted(_)));

        let fact = vault.get_fact(outcome.id()).unwrap().unwrap();
        assert_eq!(fact.object, "Philadelphia");
        assert_eq!(fact.pii_level, PiiLevel::MAX);
        assert_eq!(fact.consent_scope, ConsentScope::NeverUpload);
        assert_eq!(fact.priority, DEFAULT_PRIORITY);
        assert_eq!(fact.reinforcement_count, 0);
    }

    #[test]
    fn test_set_fact_update_preserves_provenance() {
        let vault = vault();
        let session = vault.create_session(None).unwrap();
        let message = vault
            .add_message(session.id, crate::types::Role::User, "I live in Philly")
            .unwrap();

        let first = vault
            .set_fact(
                NewFact::new("location", "city", "Philadelphia")
                    .with_confidence(0.6)
                    .with_pii_level(PiiLevel::new(1))
                    .with_source(message.id),
            )
            .unwrap();
        let original = vault.get_fact(first.id()).unwrap().unwrap();

        let second = vault
            .set_fact(NewFact::new("location", "city", "Pittsburgh").with_confidence(0.8))
            .unwrap();
        assert_eq!(second, SetFactOutcome::Updated(first.id()));

        let fact = vault.get_fact(first.id()).unwrap().unwrap();
        assert_eq!(fact.object, "Pittsburgh");
        assert!((fact.confidence - 0.8).abs() < 1e-6);
        assert_eq!(fact.created_at, original.created_at);
        assert_eq!(fact.source_message_id, Some(message.id));
        // Not supplied, so kept.
        assert_eq!(fact.pii_level, PiiLevel::new(1));
    }

    #[test]
    fn test_set_fact_unchanged() {
        let vault = vault();
        let fact = NewFact::new("personal", "name", "Alex")
            .with_confidence(0.9)
            .with_pii_level(PiiLevel::PUBLIC);
        let first = vault.set_fact(fact.clone()).unwrap();
        let second = vault.set_fact(fact).unwrap();
        assert_eq!(second, SetFactOutcome::Unchanged(first.id()));
    }

    #[test]
    fn test_set_fact_clamps_scores() {
        let vault = vault();
        let outcome = vault
            .set_fact(
                NewFact::new("misc", "score", "x")
                    .with_confidence(1.7)
                    .with_priority(f32::NAN),
            )
            .unwrap();
        let fact = vault.get_fact(outcome.id()).unwrap().unwrap();
        assert_eq!(fact.confidence, 1.0);
        assert_eq!(fact.priority, 0.0);
    }

    #[test]
    fn test_set_fact_rejects_empty_key() {
        let vault = vault();
        assert!(vault.set_fact(NewFact::new("", "city", "x")).is_err());
    }

    #[test]
    fn test_get_facts_filter() {
        let vault = vault();
        vault
            .set_fact(
                NewFact::new("location", "city", "Philadelphia")
                    .with_pii_level(PiiLevel::new(1))
                    .with_consent(ConsentScope::Default),
            )
            .unwrap();
        vault
            .set_fact(
                NewFact::new("health", "condition", "asthma")
                    .with_pii_level(PiiLevel::MAX)
                    .with_consent(ConsentScope::Default),
            )
            .unwrap();
        vault
            .set_fact(
                NewFact::new("personal", "name", "Alex")
                    .with_pii_level(PiiLevel::PUBLIC)
                    .with_priority(0.97)
                    .with_consent(ConsentScope::NeverUpload),
            )
            .unwrap();

        assert_eq!(vault.get_facts(&FactFilter::all()).unwrap().len(), 3);
        assert_eq!(
            vault
                .get_facts(&FactFilter::all().category("location"))
                .unwrap()
                .len(),
            1
        );

        let low_pii = vault
            .get_facts(&FactFilter::all().max_pii(PiiLevel::new(2)))
            .unwrap();
        assert!(low_pii.iter().all(|f| f.pii_level <= PiiLevel::new(2)));
        assert_eq!(low_pii.len(), 2);

        let uploadable = vault.get_facts(&FactFilter::all().uploadable()).unwrap();
        assert!(
            uploadable
                .iter()
                .all(|f| f.consent_scope != ConsentScope::NeverUpload)
        );
        assert_eq!(uploadable.len(), 2);

        let important = vault
            .get_facts(&FactFilter::all().min_priority(0.95))
            .unwrap();
        assert_eq!(important.len(), 1);
        assert_eq!(important[0].object, "Alex");
    }

    #[test]
    fn test_update_fact() {
        let vault = vault();
        let id = vault
            .set_fact(NewFact::new("location", "city", "Philadelphia"))
            .unwrap()
            .id();

        let patch = FactPatch {
            object: Some("Boston".to_string()),
            consent_scope: Some(ConsentScope::Default),
            ..Default::default()
        };
        let fact = vault.update_fact(id, &patch).unwrap();
        assert_eq!(fact.object, "Boston");
        assert_eq!(fact.consent_scope, ConsentScope::Default);
        assert_eq!(vault.get_fact(id).unwrap().unwrap(), fact);
    }

    #[test]
    fn test_update_missing_fact() {
        let vault = vault();
        let err = vault
            .update_fact(FactId::new(), &FactPatch::default())
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[test]
    fn test_delete_fact_is_hard() {
        let vault = vault();
        let id = vault
            .set_fact(NewFact::new("location", "city", "Philadelphia"))
            .unwrap()
            .id();

        assert!(vault.delete_fact(id).unwrap());
        assert!(vault.get_fact(id).unwrap().is_none());
        assert!(!vault.delete_fact(id).unwrap());
        assert_eq!(vault.stats().unwrap().fact_count, 0);
    }

    #[test]
    fn test_reinforce_facts() {
        let vault = vault();
        let id = vault
            .set_fact(NewFact::new("location", "city", "Philadelphia").with_confidence(0.5))
            .unwrap()
            .id();
        let at = now() + Duration::days(10);

        let before = vault.get_fact(id).unwrap().unwrap();
        let reinforced = vault.reinforce_facts(&[id, id], at).unwrap();
        assert_eq!(reinforced.len(), 1);

        let after = vault.get_fact(id).unwrap().unwrap();
        assert!((after.confidence - 0.6).abs() < 1e-6);
        assert_eq!(after.last_reinforced_at, Some(at));
        assert_eq!(after.reinforcement_count, 1);

        let params = DecayParams::default();
        assert!(relevance(&after, at, &params) >= relevance(&before, at, &params));
    }

    #[test]
    fn test_reinforce_is_all_or_nothing() {
        let vault = vault();
        let id = vault
            .set_fact(NewFact::new("location", "city", "Philadelphia").with_confidence(0.5))
            .unwrap()
            .id();

        let err = vault
            .reinforce_facts(&[id, FactId::new()], now())
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));

        let fact = vault.get_fact(id).unwrap().unwrap();
        assert!((fact.confidence - 0.5).abs() < 1e-6);
        assert!(fact.last_reinforced_at.is_none());
        assert_eq!(fact.reinforcement_count, 0);
    }

    #[test]
    fn test_reinforce_uses_configured_step() {
        let vault = vault().with_decay(DecayParams::default().with_reinforce_step(0.25));
        let id = vault
            .set_fact(NewFact::new("a", "b", "c").with_confidence(0.5))
            .unwrap()
            .id();
        vault.reinforce_facts(&[id], now()).unwrap();
        let fact = vault.get_fact(id).unwrap().unwrap();
        assert!((fact.confidence - 0.75).abs() < 1e-6);
    }
}
