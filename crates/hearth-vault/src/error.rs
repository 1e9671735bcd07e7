//! Error types for the vault crate.

use thiserror::Error;

/// Errors that can occur in the vault crate.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The supplied key does not open this vault. The vault stays closed.
    #[error("vault key does not match the stored check value")]
    KeyMismatch,

    /// The store file is not a readable vault.
    #[error("vault is corrupt: {0}")]
    Corrupt(String),

    /// An encrypted field failed authentication or was truncated.
    #[error("failed to decrypt {0}")]
    DecryptionFailed(String),

    /// Filesystem failure (usually transient).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another process holds the vault's write lock.
    #[error("vault is locked by another process")]
    Locked,

    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid UUID format.
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// Invalid data or state.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Credential backing could not load or store the key.
    #[error("Credential store error: {0}")]
    Credentials(String),

    /// Building or opening a password-wrapped export failed.
    #[error("Export error: {0}")]
    Export(String),
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
                VaultError::Corrupt(err.to_string())
            }
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => VaultError::Locked,
            _ => VaultError::Database(err),
        }
    }
}

impl VaultError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, VaultError::Io(_) | VaultError::Locked)
    }
}

/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
