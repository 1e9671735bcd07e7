//! Migration error types.

use std::path::PathBuf;

use hearth_vault::VaultError;
use thiserror::Error;

/// Errors that can occur during migration. Every one of them that reaches
/// the caller from [`crate::MigrationDriver::run`] has already been rolled
/// back, except [`MigrationError::RollbackFailed`].
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A legacy file exists but cannot be parsed.
    #[error("failed to read legacy file '{}': {reason}", path.display())]
    Legacy { path: PathBuf, reason: String },

    /// Copying legacy files to the backup location failed.
    #[error("backup failed: {0}")]
    Backup(String),

    /// Row counts in the vault differ from the legacy source.
    #[error("verification failed: {table}: expected {expected}, found {actual}")]
    VerificationFailed {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The caller's deadline passed before commit.
    #[error("migration timed out during {stage}")]
    Timeout { stage: &'static str },

    /// Underlying vault failure.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cleanup after a failure did not complete; manual recovery needed.
    #[error("rollback failed after '{original}': {reason}")]
    RollbackFailed { original: String, reason: String },
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
