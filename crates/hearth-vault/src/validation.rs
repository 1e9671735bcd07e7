//! Validation for data entering the vault.
//!
//! This module provides validation for:
//! - Embedding dimensions and values
//! - Message content

use crate::error::VaultError;

// ─────────────────────────────────────────────────────────────────────────────
// Validation Error
// ─────────────────────────────────────────────────────────────────────────────

/// Specific validation error types for vault data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Message content is empty.
    #[error("message content is empty")]
    EmptyContent,

    /// Embedding has no components.
    #[error("embedding is empty")]
    EmptyEmbedding,

    /// Embedding dimension mismatch.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Embedding contains invalid values (NaN or Inf).
    #[error("embedding contains {count} invalid values (NaN or Inf)")]
    InvalidEmbeddingValues {
        /// Number of invalid values found.
        count: usize,
    },
}

impl From<ValidationError> for VaultError {
    fn from(err: ValidationError) -> Self {
        VaultError::InvalidData(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validate an embedding vector: non-empty, finite, and of the expected
/// dimension when one is given.
pub fn validate_embedding(
    embedding: &[f32],
    expected_dim: Option<usize>,
) -> Result<(), ValidationError> {
    if embedding.is_empty() {
        return Err(ValidationError::EmptyEmbedding);
    }

    if let Some(expected) = expected_dim
        && embedding.len() != expected
    {
        return Err(ValidationError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }

    let invalid_count = embedding.iter().filter(|v| !v.is_finite()).count();
    if invalid_count > 0 {
        return Err(ValidationError::InvalidEmbeddingValues {
            count: invalid_count,
        });
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Content Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Reject blank message content.
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    Ok(())
}
