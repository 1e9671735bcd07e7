//! Error types for context selection.

use hearth_vault::VaultError;
use thiserror::Error;

/// Errors returned by the selector and the memory service.
#[derive(Debug, Error)]
pub enum SelectError {
    /// The goal is empty or whitespace.
    #[error("goal must not be empty")]
    InvalidGoal,

    /// The budget cannot hold even the smallest item.
    #[error("token budget {budget} is below the minimum of {minimum}")]
    BudgetTooSmall { budget: usize, minimum: usize },

    /// The embedder could not produce a vector.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Underlying vault failure.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl SelectError {
    /// Caller mistakes, as opposed to storage or embedding failures.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, SelectError::InvalidGoal | SelectError::BudgetTooSmall { .. })
    }
}

/// Result type alias for selector operations.
pub type Result<T> = std::result::Result<T, SelectError>;
