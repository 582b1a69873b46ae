//! Embeddings (spec §2.4, §9): a narrow backend interface.
//!
//! Spec §9's re-architecture note maps "dynamic dispatch via 'get embedding
//! service'" onto a narrow `EmbeddingBackend` trait — `embed` and
//! `embed_batch` — so the rest of the crate (capture, sync, recall) never
//! knows which concrete model produced a vector. Two implementations:
//!
//! - [`FastEmbedBackend`] (feature `embeddings`): local ONNX inference via
//!   `fastembed`, ported from the teacher's `get_model()` double-checked
//!   `OnceLock`+`Mutex` pattern.
//! - [`DeterministicBackend`]: always available, seeded hash-based vectors.
//!   Used by tests and as the degraded path spec §7 requires ("if the
//!   embedding service is cold or unavailable... never raise across a hook
//!   boundary") — the teacher has no such fallback; this is new, grounded in
//!   the trait seam the teacher's `EmbeddingService` already gestures at.

#[cfg(feature = "embeddings")]
mod fastembed_backend;

mod deterministic;

#[cfg(feature = "embeddings")]
pub use fastembed_backend::FastEmbedBackend;

pub use deterministic::DeterministicBackend;

/// Errors from embedding generation. Never fatal to a capture (spec §4.4
/// step 6: "Embedding failure MUST NOT undo step 4"); callers downgrade this
/// into a warning rather than propagating it as a hard failure.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding model initialization failed: {0}")]
    ModelInit(String),

    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// The seam named in spec §9: "a narrow `EmbeddingBackend` interface with
/// `embed(text)` and `embed_batch(texts, batch_size)`; the core does not
/// know what backend produces the vectors."
pub trait EmbeddingBackend: Send + Sync {
    /// Embeds a single text. Empty input is rejected with `InvalidInput`.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embeds many texts using the backend's batch API (spec §4.5: "Embedding
    /// MUST use the batch API when N>1"). The default implementation chunks
    /// and calls `embed` per item; backends with a real batch API override it.
    fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size.max(1)) {
            for text in chunk {
                out.push(self.embed(text)?);
            }
        }
        Ok(out)
    }

    /// Fixed output dimensionality (invariant I6: recorded in DI at creation).
    fn dimensions(&self) -> usize;

    /// Identifier surfaced in `status` output and logs.
    fn model_name(&self) -> &str;
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 for
/// mismatched lengths or zero vectors rather than panicking or NaN-ing.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Euclidean distance between two equal-length vectors.
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let a = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
