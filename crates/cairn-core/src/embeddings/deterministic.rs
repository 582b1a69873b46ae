//! A seeded, hash-based [`EmbeddingBackend`] with no model weights and no
//! startup cost. Always available, used by tests and as the degraded path
//! spec §7 requires when a real backend is cold or unavailable.
//!
//! Each token is hashed into a bucket of the output vector (a standard
//! "hashing trick" bag-of-words embedding); textually similar inputs land
//! close together under cosine similarity because they share tokens, which is
//! enough for deterministic ranking tests without needing real semantics.

use crate::embeddings::{EmbeddingBackend, EmbeddingError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub struct DeterministicBackend {
    dim: usize,
}

impl DeterministicBackend {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn tokenize(text: &str) -> impl Iterator<Item = &str> {
        text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty())
    }

    fn hash_token(token: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        token.to_lowercase().hash(&mut hasher);
        hasher.finish()
    }
}

impl EmbeddingBackend for DeterministicBackend {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".to_string()));
        }
        let mut vector = vec![0.0f32; self.dim];
        let mut any_token = false;
        for token in Self::tokenize(text) {
            any_token = true;
            let h = Self::hash_token(token);
            let bucket = (h as usize) % self.dim;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        if !any_token {
            // Punctuation-only or whitespace-only input: fall back to a
            // whole-string hash so the vector is non-zero and deterministic.
            let h = Self::hash_token(text);
            vector[(h as usize) % self.dim] = 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        "deterministic:hashing-trick"
    }
}
