//! Password-wrapped export and restore.
//!
//! An export is a JSON snapshot of every decrypted row, encrypted to an age
//! scrypt passphrase recipient and ASCII-armored. It does not depend on the
//! OS credential store, so it can move a vault to another machine.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use age::secrecy::SecretString;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, VaultError};
use crate::types::{Fact, Identity, Message, Note, Session};

use super::query::{StoreStats, StoredEmbedding};
use super::{Db, META_KEY_CHECK, META_SCHEMA_VERSION, Vault, now};

/// Version of the snapshot layout.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

/// Everything in a vault, decrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSnapshot {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub identity: Option<Identity>,
    pub sessions: Vec<Session>,
    pub messages: Vec<Message>,
    pub facts: Vec<Fact>,
    pub notes: Vec<Note>,
    pub embeddings: Vec<StoredEmbedding>,
    pub meta: BTreeMap<String, String>,
}

impl ExportSnapshot {
    /// Decrypt and parse an export blob.
    pub fn open(blob: &[u8], password: &str) -> Result<Self> {
        let decryptor = age::Decryptor::new(age::armor::ArmoredReader::new(blob))
            .map_err(|e| VaultError::Export(format!("not an export file: {}", e)))?;
        if !decryptor.is_scrypt() {
            return Err(VaultError::Export(
                "export is not password-protected".to_string(),
            ));
        }

        let identity = age::scrypt::Identity::new(SecretString::from(password.to_owned()));
        let mut reader = decryptor
            .decrypt(std::iter::once(&identity as &dyn age::Identity))
            .map_err(|e| VaultError::Export(format!("failed to decrypt export: {}", e)))?;

        let mut json = Vec::new();
        reader.read_to_end(&mut json)?;
        let snapshot: ExportSnapshot = serde_json::from_slice(&json)?;
        json.iter_mut().for_each(|b| *b = 0);

        if snapshot.format_version > EXPORT_FORMAT_VERSION {
            return Err(VaultError::Export(format!(
                "export format {} is newer than supported format {}",
                snapshot.format_version, EXPORT_FORMAT_VERSION
            )));
        }
        Ok(snapshot)
    }

    /// Encrypt the snapshot under a password.
    pub fn seal(&self, password: &str) -> Result<Vec<u8>> {
        if password.is_empty() {
            return Err(VaultError::Export("export password must not be empty".to_string()));
        }

        let mut json = serde_json::to_vec(self)?;
        let encryptor =
            age::Encryptor::with_user_passphrase(SecretString::from(password.to_owned()));

        let mut blob = Vec::new();
        let armor =
            age::armor::ArmoredWriter::wrap_output(&mut blob, age::armor::Format::AsciiArmor)?;
        let mut writer = encryptor.wrap_output(armor)?;
        writer.write_all(&json)?;
        writer.finish().and_then(|armor| armor.finish())?;
        json.iter_mut().for_each(|b| *b = 0);

        Ok(blob)
    }
}

impl Db<'_> {
    fn snapshot(&self) -> Result<ExportSnapshot> {
        let mut meta = BTreeMap::new();
        let mut stmt = self.conn.prepare("SELECT key, value FROM meta ORDER BY key")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            if key != META_KEY_CHECK {
                meta.insert(key, row.get(1)?);
            }
        }

        Ok(ExportSnapshot {
            format_version: EXPORT_FORMAT_VERSION,
            exported_at: now(),
            identity: self.identity()?,
            sessions: self.all_sessions()?,
            messages: self.all_messages()?,
            facts: self.get_facts(&crate::types::FactFilter::all())?,
            notes: self.all_notes()?,
            embeddings: self.all_embeddings()?,
            meta,
        })
    }
}

impl Vault {
    /// Snapshot the whole vault.
    pub fn snapshot(&self) -> Result<ExportSnapshot> {
        self.with_db(|db| db.snapshot())
    }

    /// Export the vault as a password-wrapped blob.
    pub fn export_vault(&self, password: &str) -> Result<Vec<u8>> {
        let snapshot = self.snapshot()?;
        let blob = snapshot.seal(password)?;
        info!(
            "Exported vault: {} sessions, {} messages, {} facts, {} notes",
            snapshot.sessions.len(),
            snapshot.messages.len(),
            snapshot.facts.len(),
            snapshot.notes.len()
        );
        Ok(blob)
    }

    /// Load a snapshot into this vault, which must be empty.
    ///
    /// Runs as one transaction; rows are re-encrypted under this vault's key.
    pub fn restore(&self, snapshot: &ExportSnapshot) -> Result<StoreStats> {
        let stats = self.with_tx(|db| {
            let before = db.stats()?;
            if before.identity_count + before.session_count + before.fact_count + before.note_count
                > 0
            {
                return Err(VaultError::InvalidData(
                    "restore requires an empty vault".to_string(),
                ));
            }

            if let Some(identity) = &snapshot.identity {
                db.insert_identity(identity)?;
            }
            for session in &snapshot.sessions {
                db.insert_session(session)?;
            }
            for message in &snapshot.messages {
                db.insert_message(message)?;
            }
            for fact in &snapshot.facts {
                db.insert_fact(fact)?;
            }
            for note in &snapshot.notes {
                db.insert_note(note)?;
            }
            for embedding in &snapshot.embeddings {
                db.set_embedding(embedding)?;
            }
            for (key, value) in &snapshot.meta {
                if key != META_KEY_CHECK && key != META_SCHEMA_VERSION {
                    db.set_meta(key, value)?;
                }
            }

            db.stats()
        })?;

        info!(
            "Restored vault: {} sessions, {} messages, {} facts",
            stats.session_count, stats.message_count, stats.fact_count
        );
        Ok(stats)
    }
}
