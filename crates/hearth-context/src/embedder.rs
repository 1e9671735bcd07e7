//! Text embedding abstraction.
//!
//! The vault treats embeddings as opaque fixed-length float vectors. This
//! module provides the trait the selector and service embed through, and
//! [`HashingEmbedder`], a deterministic local implementation that needs no
//! model files or network access.

use std::sync::Arc;

use hearth_vault::store::query_terms;

use crate::error::{Result, SelectError};

/// Trait for embedding text into vectors.
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Dimensionality of the vectors this embedder produces.
    fn dimensions(&self) -> usize;

    /// Model name recorded alongside stored vectors.
    fn name(&self) -> &str;
}

/// A shared embedder that can be used across threads.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Hashing Embedder
// ─────────────────────────────────────────────────────────────────────────────

const TRIGRAM_WEIGHT: f32 = 0.5;

/// Feature-hashing bag of words with character trigrams.
///
/// Each query term and each of its boundary-padded trigrams is hashed into a
/// signed bucket; the result is L2-normalized. Identical text always yields
/// the identical vector, and texts sharing words or word stems land close
/// together under cosine similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    name: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            name: format!("hashing-{}", dimensions),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(SelectError::Embedding(
                "embedder configured with zero dimensions".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for term in query_terms(text) {
            self.add_feature(&mut vector, &term, 1.0);

            let padded: Vec<char> = format!("^{}$", term).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, &trigram, TRIGRAM_WEIGHT);
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 64-bit FNV-1a. Stable across platforms and releases, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
