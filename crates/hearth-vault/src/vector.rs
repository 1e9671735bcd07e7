//! Embedding vector encoding and similarity.
//!
//! Embeddings are opaque fixed-length `f32` vectors stored as raw bytes. The
//! similarity function is pluggable; cosine is the default.

use zerocopy::{FromBytes, IntoBytes};

use crate::error::{Result, VaultError};

/// Signature of a pluggable similarity function. Higher means more similar.
pub type SimilarityFn = fn(&[f32], &[f32]) -> f32;

/// Encode a vector to its storage bytes.
pub fn to_bytes(vector: &[f32]) -> &[u8] {
    vector.as_bytes()
}

/// Decode storage bytes back into a vector.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % size_of::<f32>() != 0 {
        return Err(VaultError::Corrupt(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    bytes
        .chunks_exact(size_of::<f32>())
        .map(|chunk| {
            f32::read_from_bytes(chunk)
                .map_err(|_| VaultError::Corrupt("embedding blob is malformed".to_string()))
        })
        .collect()
}

/// Cosine similarity in `[-1, 1]`; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}
