//! Vault store implementation using SQLite.
//!
//! One SQLite file holds identities, sessions, messages, facts, notes and
//! embeddings. Sensitive columns (`messages.content`, `facts.object`) are
//! sealed by [`FieldCipher`] on the way in and opened on the way out, so the
//! public API only ever deals in plaintext.
//!
//! Row-level operations live on [`Db`], a borrowed view of a connection plus
//! the cipher. [`Vault`] wraps them in a lock (and a transaction where a call
//! touches more than one row); [`VaultTx`] exposes them inside an explicit
//! transaction scope.

mod embedding_ops;
mod export;
mod fact_ops;
mod identity_ops;
mod note_ops;
pub mod query;
mod search;
mod session_ops;
mod transaction;

use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info};

use crate::crypto::{FieldCipher, FieldRef, VaultKey};
use crate::decay::DecayParams;
use crate::error::{Result, VaultError};

pub use export::{EXPORT_FORMAT_VERSION, ExportSnapshot};
pub use fact_ops::DEFAULT_PRIORITY;
pub use query::{
    KeywordHit, KeywordScope, MatchedRow, SemanticHit, SemanticScope, StoreStats,
    StoredEmbedding, VaultMeta,
};
pub use search::{keyword_score, query_terms};
pub use transaction::VaultTx;

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version and Meta Keys
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

pub const META_SCHEMA_VERSION: &str = "schema_version";
pub const META_SELECTOR_VERSION: &str = "selector_version";
pub const META_CREATED_AT: &str = "vault.created_at";
pub const META_MIGRATION_COMPLETE: &str = "migration.complete";
pub const META_MIGRATION_COMPLETED_AT: &str = "migration.completed_at";
pub const META_MIGRATION_SOURCE: &str = "migration.source";
pub(crate) const META_KEY_CHECK: &str = "key_check";

const KEY_CHECK_PLAINTEXT: &str = "hearth-vault-key-check";

/// How long a call waits on another process's lock before `Locked`.
const LOCK_WAIT: std::time::Duration = std::time::Duration::from_millis(250);

// ─────────────────────────────────────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────────────────────────────────────

/// Current time at the precision the vault stores.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so lexical order matches time order.
pub(crate) fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VaultError::InvalidData(format!("bad timestamp '{}': {}", s, e)))
}

pub(crate) fn parse_opt_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_timestamp).transpose()
}

// ─────────────────────────────────────────────────────────────────────────────
// Db - borrowed connection + cipher
// ─────────────────────────────────────────────────────────────────────────────

/// A connection (or open transaction) paired with the field cipher.
pub(crate) struct Db<'a> {
    pub(crate) conn: &'a Connection,
    pub(crate) cipher: &'a FieldCipher,
}

impl<'a> Db<'a> {
    pub(crate) fn new(conn: &'a Connection, cipher: &'a FieldCipher) -> Self {
        Self { conn, cipher }
    }

    pub(crate) fn seal(&self, table: &str, column: &str, row_id: &str, value: &str) -> Result<Vec<u8>> {
        self.cipher.seal(FieldRef::new(table, column, row_id), value)
    }

    pub(crate) fn open(&self, table: &str, column: &str, row_id: &str, sealed: &[u8]) -> Result<String> {
        self.cipher.open(FieldRef::new(table, column, row_id), sealed)
    }

    pub(crate) fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub(crate) fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub(crate) fn stats(&self) -> Result<StoreStats> {
        let count = |table: &str| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            identity_count: count("identities")?,
            session_count: count("sessions")?,
            message_count: count("messages")?,
            fact_count: count("facts")?,
            note_count: count("notes")?,
            embedding_count: count("embeddings")?,
            schema_version: SCHEMA_VERSION,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vault
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to an open vault.
///
/// Open once per process and share it (e.g. behind an `Arc`). Dropping the
/// handle drops the cipher and zeroes the key copy held for it.
pub struct Vault {
    /// The SQLite connection.
    pub(crate) conn: Mutex<Connection>,
    pub(crate) cipher: FieldCipher,
    pub(crate) decay: DecayParams,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("path", &self.path)
            .field("decay", &self.decay)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Open or create a vault at the given path.
    ///
    /// A new file gets the schema and a key check value. An existing file must
    /// carry a check value the key can open, otherwise this fails with
    /// [`VaultError::KeyMismatch`] and nothing is written.
    pub fn open(path: impl AsRef<Path>, key: &VaultKey) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(LOCK_WAIT)?;

        let vault = Self {
            conn: Mutex::new(conn),
            cipher: FieldCipher::new(key),
            decay: DecayParams::default(),
            path: Some(path.to_path_buf()),
        };
        vault.initialize(true)?;

        info!("Vault opened at {:?}", path);
        Ok(vault)
    }

    /// Create an in-memory vault (useful for testing).
    pub fn open_in_memory(key: &VaultKey) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let vault = Self {
            conn: Mutex::new(conn),
            cipher: FieldCipher::new(key),
            decay: DecayParams::default(),
            path: None,
        };
        vault.initialize(false)?;

        debug!("In-memory vault created");
        Ok(vault)
    }

    /// Override decay and reinforcement parameters.
    pub fn with_decay(mut self, decay: DecayParams) -> Self {
        self.decay = decay;
        self
    }

    /// Decay parameters used by reinforcement.
    pub fn decay(&self) -> &DecayParams {
        &self.decay
    }

    /// Path of the store file, `None` for in-memory vaults.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the locked connection.
    pub(crate) fn with_db<T>(&self, f: impl FnOnce(&Db<'_>) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&Db::new(&conn, &self.cipher))
    }

    /// Run `f` inside a transaction on the locked connection.
    ///
    /// Commits if `f` returns `Ok`; the transaction rolls back when dropped
    /// on the error path.
    pub(crate) fn with_tx<T>(&self, f: impl FnOnce(&Db<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&Db::new(&tx, &self.cipher))?;
        tx.commit()?;
        Ok(result)
    }

    /// Begin an explicit transaction scope.
    ///
    /// Changes made through the returned [`VaultTx`] become visible only on
    /// [`VaultTx::commit`]; dropping it (including via `?`) rolls back.
    pub fn transaction(&self) -> Result<VaultTx<'_>> {
        VaultTx::begin(self.conn.lock(), &self.cipher)
    }

    fn initialize(&self, on_disk: bool) -> Result<()> {
        let conn = self.conn.lock();

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "secure_delete", "ON")?;
        if on_disk {
            // Single writer per vault file; a second process gets `Locked`.
            conn.pragma_update(None, "locking_mode", "EXCLUSIVE")?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }

        Self::create_schema(&conn)?;
        Self::verify_key(&Db::new(&conn, &self.cipher))?;
        Ok(())
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if current_version > SCHEMA_VERSION {
            return Err(VaultError::Corrupt(format!(
                "schema version {} is newer than supported version {}",
                current_version, SCHEMA_VERSION
            )));
        }
        if current_version == SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating schema from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        if current_version < 1 {
            Self::migrate_v1(conn)?;
        }

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![META_SCHEMA_VERSION, SCHEMA_VERSION.to_string()],
        )?;

        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Migration v1: base tables.
    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            BEGIN;

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS identities (
                id TEXT PRIMARY KEY,
                display_name TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                identity_id TEXT NOT NULL REFERENCES identities(id),
                goal TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                ended_at TEXT,
                message_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_updated_at
                ON sessions(updated_at);

            -- content is sealed with the field cipher
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
                content BLOB NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session_created
                ON messages(session_id, created_at);

            CREATE INDEX IF NOT EXISTS idx_messages_created_at
                ON messages(created_at);

            -- object is sealed with the field cipher
            CREATE TABLE IF NOT EXISTS facts (
                id TEXT PRIMARY KEY,
                identity_id TEXT NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
                category TEXT NOT NULL,
                predicate TEXT NOT NULL,
                object BLOB NOT NULL,
                confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
                priority REAL NOT NULL DEFAULT 0.5 CHECK (priority >= 0.0 AND priority <= 1.0),
                pii_level INTEGER NOT NULL DEFAULT 3,
                consent_scope TEXT NOT NULL DEFAULT 'never_upload',
                created_at TEXT NOT NULL,
                last_reinforced_at TEXT,
                reinforcement_count INTEGER NOT NULL DEFAULT 0,
                source_message_id TEXT REFERENCES messages(id) ON DELETE SET NULL,
                UNIQUE (identity_id, category, predicate)
            );

            CREATE INDEX IF NOT EXISTS idx_facts_category
                ON facts(category);

            CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                title TEXT,
                content TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_notes_updated_at
                ON notes(updated_at);

            CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
                title, content, content='notes', content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS notes_fts_insert AFTER INSERT ON notes BEGIN
                INSERT INTO notes_fts(rowid, title, content)
                VALUES (new.rowid, new.title, new.content);
            END;

            CREATE TRIGGER IF NOT EXISTS notes_fts_delete AFTER DELETE ON notes BEGIN
                INSERT INTO notes_fts(notes_fts, rowid, title, content)
                VALUES ('delete', old.rowid, old.title, old.content);
            END;

            CREATE TRIGGER IF NOT EXISTS notes_fts_update AFTER UPDATE ON notes BEGIN
                INSERT INTO notes_fts(notes_fts, rowid, title, content)
                VALUES ('delete', old.rowid, old.title, old.content);
                INSERT INTO notes_fts(rowid, title, content)
                VALUES (new.rowid, new.title, new.content);
            END;

            -- Embeddings are derived children of messages, facts and notes.
            CREATE TABLE IF NOT EXISTS embeddings (
                owner_kind TEXT NOT NULL CHECK (owner_kind IN ('message', 'fact', 'note')),
                owner_id TEXT NOT NULL,
                model TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                vector BLOB NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (owner_kind, owner_id)
            );

            CREATE TRIGGER IF NOT EXISTS facts_embedding_cascade AFTER DELETE ON facts BEGIN
                DELETE FROM embeddings WHERE owner_kind = 'fact' AND owner_id = old.id;
            END;

            CREATE TRIGGER IF NOT EXISTS messages_embedding_cascade AFTER DELETE ON messages BEGIN
                DELETE FROM embeddings WHERE owner_kind = 'message' AND owner_id = old.id;
            END;

            CREATE TRIGGER IF NOT EXISTS notes_embedding_cascade AFTER DELETE ON notes BEGIN
                DELETE FROM embeddings WHERE owner_kind = 'note' AND owner_id = old.id;
            END;

            COMMIT;
            "#,
        )?;

        info!("Migration v1 complete");
        Ok(())
    }

    /// Check the key against the stored check value, writing one on first open.
    fn verify_key(db: &Db<'_>) -> Result<()> {
        match db.get_meta(META_KEY_CHECK)? {
            Some(encoded) => {
                let sealed = BASE64_STANDARD
                    .decode(encoded)
                    .map_err(|_| VaultError::Corrupt("key check value is not base64".into()))?;
                match db.open("meta", "value", META_KEY_CHECK, &sealed) {
                    Ok(plain) if plain == KEY_CHECK_PLAINTEXT => Ok(()),
                    _ => Err(VaultError::KeyMismatch),
                }
            }
            None => {
                let identities: i64 =
                    db.conn
                        .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
                if identities > 0 {
                    return Err(VaultError::Corrupt(
                        "vault has data but no key check value".into(),
                    ));
                }

                let sealed = db.seal("meta", "value", META_KEY_CHECK, KEY_CHECK_PLAINTEXT)?;
                db.set_meta(META_KEY_CHECK, &BASE64_STANDARD.encode(sealed))?;
                db.set_meta(META_CREATED_AT, &timestamp(&now()))?;
                debug!("Wrote key check value");
                Ok(())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Meta and Stats
// ─────────────────────────────────────────────────────────────────────────────

impl Vault {
    /// Get a metadata value.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.with_db(|db| db.get_meta(key))
    }

    /// Set a metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        if key == META_KEY_CHECK {
            return Err(VaultError::InvalidData(
                "the key check value is managed by the vault".into(),
            ));
        }
        self.with_db(|db| db.set_meta(key, value))
    }

    /// Row counts per table.
    pub fn stats(&self) -> Result<StoreStats> {
        self.with_db(|db| db.stats())
    }

    /// Versions and migration status recorded in `meta`.
    pub fn meta(&self) -> Result<VaultMeta> {
        self.with_db(|db| {
            let schema_version = db
                .get_meta(META_SCHEMA_VERSION)?
                .and_then(|v| v.parse().ok())
                .unwrap_or(SCHEMA_VERSION);
            Ok(VaultMeta {
                schema_version,
                selector_version: db.get_meta(META_SELECTOR_VERSION)?,
                created_at: db.get_meta(META_CREATED_AT)?,
                migration_complete: db.get_meta(META_MIGRATION_COMPLETE)?.as_deref()
                    == Some("true"),
                migration_completed_at: db.get_meta(META_MIGRATION_COMPLETED_AT)?,
                migration_source: db.get_meta(META_MIGRATION_SOURCE)?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> VaultKey {
        VaultKey::from_bytes([3u8; 32])
    }

    #[test]
    fn test_open_in_memory() {
        let vault = Vault::open_in_memory(&key()).unwrap();
        let stats = vault.stats().unwrap();
        assert_eq!(stats.fact_count, 0);
        assert_eq!(stats.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_meta_operations() {
        let vault = Vault::open_in_memory(&key()).unwrap();

        assert!(vault.get_meta("test_key").unwrap().is_none());
        vault.set_meta("test_key", "test_value").unwrap();
        assert_eq!(
            vault.get_meta("test_key").unwrap(),
            Some("test_value".to_string())
        );
        vault.set_meta("test_key", "new_value").unwrap();
        assert_eq!(
            vault.get_meta("test_key").unwrap(),
            Some("new_value".to_string())
        );
    }

    #[test]
    fn test_key_check_cannot_be_overwritten() {
        let vault = Vault::open_in_memory(&key()).unwrap();
        assert!(vault.set_meta(META_KEY_CHECK, "x").is_err());
    }

    #[test]
    fn test_meta_defaults() {
        let vault = Vault::open_in_memory(&key()).unwrap();
        let meta = vault.meta().unwrap();
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert!(!meta.migration_complete);
        assert!(meta.created_at.is_some());
    }

    #[test]
    fn test_reopen_with_same_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.db");

        drop(Vault::open(&path, &key()).unwrap());
        let vault = Vault::open(&path, &key()).unwrap();
        assert_eq!(vault.path(), Some(path.as_path()));
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.db");

        let vault = Vault::open(&path, &key()).unwrap();
        vault.create_identity(crate::types::IdentityId::new(), None).unwrap();
        drop(vault);

        let err = Vault::open(&path, &VaultKey::from_bytes([4u8; 32])).unwrap_err();
        assert!(matches!(err, VaultError::KeyMismatch));

        // The original key still opens it and the data is intact.
        let vault = Vault::open(&path, &key()).unwrap();
        assert_eq!(vault.stats().unwrap().identity_count, 1);
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.db");
        std::fs::write(&path, vec![0xABu8; 4096]).unwrap();

        let err = Vault::open(&path, &key()).unwrap_err();
        assert!(matches!(err, VaultError::Corrupt(_)), "got {:?}", err);
    }

    #[test]
    fn test_timestamp_is_fixed_width() {
        let a = timestamp(&parse_timestamp("2026-01-02T03:04:05Z").unwrap());
        let b = timestamp(&parse_timestamp("2026-01-02T03:04:05.5Z").unwrap());
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }
}
