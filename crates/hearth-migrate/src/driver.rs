//! First-open detection and the legacy import state machine.
//!
//! ```text
//! Detect ──vault with identity───────────────────────▶ ExistingVault
//!    │ ──vault without identity: discard, detect again
//!    │ ──no legacy files─────────────────────────────▶ FreshVault
//!    ▼
//! Backup ─▶ Import (one transaction) ─▶ Verify ─▶ Commit ─▶ Migrated
//!    └──────────────── any failure ──────────────────▶ Rollback
//! ```
//!
//! Rollback drops the transaction, deletes the vault file and its sidecars,
//! and restores any legacy file that no longer matches its backup. The
//! system is left as it was before the attempt; only the backup directory
//! remains.
//!
//! A vault file with no identity and no completion flag is what a process
//! killed mid-import (or mid-initialization) leaves behind. Detect removes
//! it and starts over, so an interrupted first open is retried rather than
//! mistaken for a usable vault.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use hearth_vault::store::{
    META_MIGRATION_COMPLETE, META_MIGRATION_COMPLETED_AT, META_MIGRATION_SOURCE,
};
use hearth_vault::{
    Identity, IdentityId, Message, MessageId, Session, SessionId, Vault, VaultKey, VaultTx, now,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backup::Backup;
use crate::error::{MigrationError, Result};
use crate::legacy::{ExpectedCounts, LegacyData};

/// SQLite files that belong to a vault besides the main database.
const VAULT_SIDECARS: [&str; 3] = ["-wal", "-shm", "-journal"];

/// Summary of a completed import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    pub identity_id: IdentityId,
    pub sessions: usize,
    pub messages: usize,
    pub facts: usize,
    pub preferences: usize,
    pub backup_dir: PathBuf,
    pub source: PathBuf,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// What happened on first open.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    /// A vault was already present; nothing was imported.
    ExistingVault,
    /// No vault and no legacy data; an empty vault was initialized.
    FreshVault,
    /// Legacy data was imported and committed.
    Migrated(MigrationReport),
}

/// Opens the vault, importing legacy data first when there is some.
#[derive(Debug, Clone)]
pub struct MigrationDriver {
    vault_path: PathBuf,
    legacy_dir: PathBuf,
    backup_root: PathBuf,
    timeout: Option<Duration>,
    /// Added to the expected fact count to force a verification mismatch.
    #[cfg(test)]
    fact_count_skew: usize,
}

impl MigrationDriver {
    pub fn new(
        vault_path: impl Into<PathBuf>,
        legacy_dir: impl Into<PathBuf>,
        backup_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            vault_path: vault_path.into(),
            legacy_dir: legacy_dir.into(),
            backup_root: backup_root.into(),
            timeout: None,
            #[cfg(test)]
            fact_count_skew: 0,
        }
    }

    /// Fail (and roll back) when the import has not committed within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    /// Whether a run would import: no vault yet and legacy files present.
    pub fn needs_migration(&self) -> bool {
        !self.vault_path.exists() && !LegacyData::detect(&self.legacy_dir).is_empty()
    }

    /// Run the state machine and return the open vault.
    ///
    /// `identity_id` comes from the credential backing so the vault and the
    /// keyring agree on who this is.
    pub fn run(&self, key: &VaultKey, identity_id: IdentityId) -> Result<(Vault, MigrationOutcome)> {
        // Detect
        if self.vault_path.exists() {
            let vault = Vault::open(&self.vault_path, key)?;
            if vault.identity()?.is_some() || vault.meta()?.migration_complete {
                debug!("Existing vault at {}", self.vault_path.display());
                return Ok((vault, MigrationOutcome::ExistingVault));
            }
            drop(vault);
            warn!(
                "Vault at {} has no identity; discarding an interrupted first open",
                self.vault_path.display()
            );
            self.remove_vault_files()?;
        }

        let legacy_files = LegacyData::detect(&self.legacy_dir);
        if legacy_files.is_empty() {
            let vault = Vault::open(&self.vault_path, key)?;
            vault.create_identity(identity_id, None)?;
            info!("Initialized empty vault at {}", self.vault_path.display());
            return Ok((vault, MigrationOutcome::FreshVault));
        }

        info!(
            "Found {} legacy files in {}, migrating",
            legacy_files.len(),
            self.legacy_dir.display()
        );
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);

        // Backup. Nothing has been mutated yet, so a failure here needs no rollback.
        let backup = Backup::create(&self.backup_root, &legacy_files, Utc::now())?;

        match self.import(key, identity_id, deadline, &backup, started) {
            Ok((vault, report)) => {
                info!(
                    sessions = report.sessions,
                    messages = report.messages,
                    facts = report.facts,
                    preferences = report.preferences,
                    "Migration committed"
                );
                Ok((vault, MigrationOutcome::Migrated(report)))
            }
            Err(e) => {
                warn!("Migration failed, rolling back: {}", e);
                match self.rollback(&backup) {
                    Ok(()) => Err(e),
                    Err(rollback_err) => {
                        error!("Rollback failed: {}", rollback_err);
                        Err(MigrationError::RollbackFailed {
                            original: e.to_string(),
                            reason: rollback_err.to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Import, Verify and Commit. The vault handle only escapes on success.
    fn import(
        &self,
        key: &VaultKey,
        identity_id: IdentityId,
        deadline: Option<Instant>,
        backup: &Backup,
        started: Instant,
    ) -> Result<(Vault, MigrationReport)> {
        check_deadline(deadline, "import")?;
        let data = LegacyData::load(&self.legacy_dir)?;
        let expected = self.expected_counts(&data);

        let vault = Vault::open(&self.vault_path, key)?;
        let report = {
            let tx = vault.transaction()?;
            write_legacy(&tx, &data, identity_id, deadline)?;

            check_deadline(deadline, "verify")?;
            verify(&tx, &expected)?;

            let completed_at = now();
            tx.set_meta(META_MIGRATION_COMPLETE, "true")?;
            tx.set_meta(
                META_MIGRATION_COMPLETED_AT,
                &completed_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            )?;
            tx.set_meta(META_MIGRATION_SOURCE, &self.legacy_dir.display().to_string())?;

            check_deadline(deadline, "commit")?;
            tx.commit()?;

            MigrationReport {
                identity_id,
                sessions: expected.sessions,
                messages: expected.messages,
                facts: data.facts.len(),
                preferences: data.preferences.len(),
                backup_dir: backup.dir.clone(),
                source: self.legacy_dir.clone(),
                completed_at,
                duration_ms: started.elapsed().as_millis() as u64,
            }
        };
        Ok((vault, report))
    }

    #[cfg(not(test))]
    fn expected_counts(&self, data: &LegacyData) -> ExpectedCounts {
        data.expected_counts()
    }

    #[cfg(test)]
    fn expected_counts(&self, data: &LegacyData) -> ExpectedCounts {
        let expected = data.expected_counts();
        ExpectedCounts {
            facts: expected.facts + self.fact_count_skew,
            ..expected
        }
    }

    fn remove_vault_files(&self) -> Result<()> {
        for path in vault_files(&self.vault_path) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn rollback(&self, backup: &Backup) -> Result<()> {
        self.remove_vault_files()?;

        let restored = backup.restore_changed()?;
        if restored > 0 {
            warn!("Restored {} legacy files from {}", restored, backup.dir.display());
        }
        info!("Rollback complete; legacy data left in place");
        Ok(())
    }
}

fn check_deadline(deadline: Option<Instant>, stage: &'static str) -> Result<()> {
    match deadline {
        Some(d) if Instant::now() >= d => Err(MigrationError::Timeout { stage }),
        _ => Ok(()),
    }
}

fn vault_files(path: &Path) -> Vec<PathBuf> {
    let mut files = vec![path.to_path_buf()];
    if let Some(name) = path.file_name() {
        for suffix in VAULT_SIDECARS {
            files.push(path.with_file_name(format!("{}{}", name.to_string_lossy(), suffix)));
        }
    }
    files
}

fn write_legacy(
    tx: &VaultTx<'_>,
    data: &LegacyData,
    identity_id: IdentityId,
    deadline: Option<Instant>,
) -> Result<()> {
    let migrated_at = now();
    let profile = data.profile.clone().unwrap_or_default();
    tx.insert_identity(&Identity {
        id: identity_id,
        display_name: profile.name,
        created_at: profile.created_at.unwrap_or(migrated_at),
    })?;

    for (index, legacy) in data.sessions.iter().enumerate() {
        check_deadline(deadline, "import")?;

        let created_at = legacy
            .created_at
            .or_else(|| legacy.messages.iter().find_map(|m| m.timestamp))
            .unwrap_or(migrated_at);
        let updated_at = legacy
            .messages
            .iter()
            .filter_map(|m| m.timestamp)
            .max()
            .unwrap_or(created_at)
            .max(created_at);
        let session = Session {
            id: SessionId::new(),
            identity_id,
            goal: legacy.title.clone(),
            created_at,
            updated_at,
            ended_at: legacy.ended_at,
            message_count: legacy.messages.len() as u32,
        };
        tx.insert_session(&session)?;

        for message in &legacy.messages {
            let role = message.role().ok_or_else(|| MigrationError::Legacy {
                path: PathBuf::from(crate::legacy::SESSIONS_FILE),
                reason: format!("session {} has unknown role '{}'", index, message.role),
            })?;
            tx.insert_message(&Message {
                id: MessageId::new(),
                session_id: session.id,
                role,
                content: message.content.clone(),
                created_at: message.timestamp.unwrap_or(created_at),
            })?;
        }
    }

    for fact in data.vault_facts() {
        check_deadline(deadline, "import")?;
        tx.set_fact(identity_id, &fact)?;
    }

    debug!("Legacy rows written");
    Ok(())
}

fn verify(tx: &VaultTx<'_>, expected: &ExpectedCounts) -> Result<()> {
    let stats = tx.stats()?;
    let checks = [
        ("identities", 1, stats.identity_count),
        ("sessions", expected.sessions, stats.session_count),
        ("messages", expected.messages, stats.message_count),
        ("facts", expected.facts, stats.fact_count),
    ];
    for (table, expected, actual) in checks {
        if expected != actual {
            return Err(MigrationError::VerificationFailed {
                table,
                expected,
                actual,
            });
        }
    }
    debug!("Verified row counts");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_files_include_sidecars() {
        let files = vault_files(Path::new("/data/vault.db"));
        assert_eq!(files.len(), 4);
        assert!(files.contains(&PathBuf::from("/data/vault.db-wal")));
        assert!(files.contains(&PathBuf::from("/data/vault.db-shm")));
    }

    #[test]
    fn test_count_mismatch_rolls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let legacy = dir.path().join("legacy");
        std::fs::create_dir_all(&legacy).unwrap();
        let facts = r#"[{"category": "pets", "key": "dog", "value": "Biscuit"}]"#;
        std::fs::write(legacy.join(crate::legacy::FACTS_FILE), facts).unwrap();
        let vault_path = dir.path().join("vault.db");

        let mut driver = MigrationDriver::new(&vault_path, &legacy, dir.path().join("backups"));
        driver.fact_count_skew = 1;
        let err = driver
            .run(&VaultKey::generate(), IdentityId::new())
            .unwrap_err();

        assert!(
            matches!(
                err,
                MigrationError::VerificationFailed {
                    table: "facts",
                    expected: 2,
                    actual: 1
                }
            ),
            "got {err:?}"
        );
        assert!(vault_files(&vault_path).iter().all(|p| !p.exists()));
        assert_eq!(
            std::fs::read_to_string(legacy.join(crate::legacy::FACTS_FILE)).unwrap(),
            facts
        );
        assert_eq!(std::fs::read_dir(dir.path().join("backups")).unwrap().count(), 1);
        assert!(driver.needs_migration());
    }

    #[test]
    fn test_deadline() {
        assert!(check_deadline(None, "import").is_ok());
        assert!(check_deadline(Some(Instant::now() + Duration::from_secs(60)), "import").is_ok());
        assert!(matches!(
            check_deadline(Some(Instant::now()), "verify"),
            Err(MigrationError::Timeout { stage: "verify" })
        ));
    }
}
