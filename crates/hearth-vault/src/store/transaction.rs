//! Explicit transaction scope over the vault.

use chrono::{DateTime, Utc};
use parking_lot::MutexGuard;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::crypto::FieldCipher;
use crate::error::Result;
use crate::types::{
    Fact, FactFilter, FactId, FactPatch, Identity, IdentityId, Message, MessageId, NewFact, Note,
    Role, Session, SessionId, SetFactOutcome,
};

use super::query::{StoreStats, StoredEmbedding};
use super::{Db, now};

/// A write transaction holding the vault lock.
///
/// Created by [`crate::Vault::transaction`], which issues `BEGIN IMMEDIATE`.
/// Nothing is visible to other readers until [`VaultTx::commit`]. Dropping the
/// scope without committing (an early `return` or `?`) rolls back.
pub struct VaultTx<'a> {
    conn: MutexGuard<'a, Connection>,
    cipher: &'a FieldCipher,
    finished: bool,
}

impl<'a> VaultTx<'a> {
    pub(crate) fn begin(conn: MutexGuard<'a, Connection>, cipher: &'a FieldCipher) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!("Transaction started");
        Ok(Self {
            conn,
            cipher,
            finished: false,
        })
    }

    fn db(&self) -> Db<'_> {
        Db::new(&self.conn, self.cipher)
    }

    /// Make every change in this scope durable.
    pub fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        debug!("Transaction committed");
        Ok(())
    }

    /// Discard every change in this scope.
    pub fn rollback(mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        self.finished = true;
        debug!("Transaction rolled back");
        Ok(())
    }

    pub fn identity(&self) -> Result<Option<Identity>> {
        self.db().identity()
    }

    /// Insert a prebuilt identity (imports and restores).
    pub fn insert_identity(&self, identity: &Identity) -> Result<()> {
        self.db().insert_identity(identity)
    }

    /// Insert a prebuilt session as-is.
    pub fn insert_session(&self, session: &Session) -> Result<()> {
        self.db().insert_session(session)
    }

    /// Insert a prebuilt message without touching its session's counters.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.db().insert_message(message)
    }

    /// Append a message, bumping the session's count and timestamp.
    pub fn add_message(&self, session_id: SessionId, role: Role, content: &str) -> Result<Message> {
        let message = Message {
            id: MessageId::new(),
            session_id,
            role,
            content: content.to_string(),
            created_at: now(),
        };
        self.db().append_message(&message)?;
        Ok(message)
    }

    pub fn set_fact(&self, identity_id: IdentityId, fact: &NewFact) -> Result<SetFactOutcome> {
        self.db().set_fact(identity_id, fact)
    }

    /// Insert a fully-formed fact, keeping its id and timestamps.
    pub fn insert_fact(&self, fact: &Fact) -> Result<()> {
        self.db().insert_fact(fact)
    }

    pub fn get_fact(&self, id: FactId) -> Result<Option<Fact>> {
        self.db().get_fact(id)
    }

    pub fn get_facts(&self, filter: &FactFilter) -> Result<Vec<Fact>> {
        self.db().get_facts(filter)
    }

    pub fn update_fact(&self, id: FactId, patch: &FactPatch) -> Result<Fact> {
        self.db().update_fact(id, patch)
    }

    pub fn delete_fact(&self, id: FactId) -> Result<bool> {
        self.db().delete_fact(id)
    }

    /// Reinforce facts inside this scope with an explicit step.
    pub fn reinforce_facts(&self, ids: &[FactId], at: DateTime<Utc>, step: f32) -> Result<Vec<Fact>> {
        self.db().reinforce_facts(ids, at, step)
    }

    pub fn insert_note(&self, note: &Note) -> Result<()> {
        self.db().insert_note(note)
    }

    pub fn set_embedding(&self, embedding: &StoredEmbedding) -> Result<()> {
        self.db().set_embedding(embedding)
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.db().get_meta(key)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.db().set_meta(key, value)
    }

    /// Row counts as seen inside this scope.
    pub fn stats(&self) -> Result<StoreStats> {
        self.db().stats()
    }
}

impl Drop for VaultTx<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!("Failed to roll back abandoned transaction: {}", e);
        } else {
            debug!("Abandoned transaction rolled back");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::crypto::VaultKey;
    use crate::error::VaultError;
    use crate::store::Vault;
    use crate::types::{FactFilter, IdentityId, NewFact};

    fn vault() -> (Vault, IdentityId) {
        let vault = Vault::open_in_memory(&VaultKey::from_bytes([8u8; 32])).unwrap();
        let id = IdentityId::new();
        vault.create_identity(id, None).unwrap();
        (vault, id)
    }

    #[test]
    fn test_commit_persists() {
        let (vault, identity) = vault();
        let tx = vault.transaction().unwrap();
        tx.set_fact(identity, &NewFact::new("a", "b", "c")).unwrap();
        assert_eq!(tx.stats().unwrap().fact_count, 1);
        tx.commit().unwrap();

        assert_eq!(vault.stats().unwrap().fact_count, 1);
    }

    #[test]
    fn test_drop_rolls_back() {
        let (vault, identity) = vault();
        {
            let tx = vault.transaction().unwrap();
            tx.set_fact(identity, &NewFact::new("a", "b", "c")).unwrap();
        }
        assert_eq!(vault.stats().unwrap().fact_count, 0);
    }

    #[test]
    fn test_error_path_rolls_back() {
        let (vault, identity) = vault();

        let attempt = || -> crate::Result<()> {
            let tx = vault.transaction()?;
            tx.set_fact(identity, &NewFact::new("a", "b", "c"))?;
            tx.set_fact(identity, &NewFact::new("", "b", "c"))?;
            tx.commit()
        };
        assert!(matches!(attempt(), Err(VaultError::InvalidData(_))));
        assert!(vault.get_facts(&FactFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn test_explicit_rollback() {
        let (vault, identity) = vault();
        let tx = vault.transaction().unwrap();
        tx.set_fact(identity, &NewFact::new("a", "b", "c")).unwrap();
        tx.rollback().unwrap();
        assert_eq!(vault.stats().unwrap().fact_count, 0);

        // The lock is released; a new scope can start.
        vault.transaction().unwrap().commit().unwrap();
    }
}
