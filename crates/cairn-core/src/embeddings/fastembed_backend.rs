//! Local semantic embeddings via `fastembed` (ONNX inference, no network
//! calls at query time). Ported from the teacher's `embeddings::local`
//! module: same `OnceLock<Result<Mutex<TextEmbedding>, String>>`
//! double-checked init, same `directories`-resolved cache dir, same
//! Matryoshka truncation trick — generalized to a configurable output
//! dimension instead of a hardcoded constant, and wrapped behind the
//! `EmbeddingBackend` trait instead of being the only embedding type.

use crate::embeddings::{EmbeddingBackend, EmbeddingError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

/// Maximum input length in characters, matching the model's 8192-token context.
const MAX_TEXT_LENGTH: usize = 8192;

pub struct FastEmbedBackend {
    model: OnceLock<Result<Mutex<TextEmbedding>, String>>,
    dim: usize,
    cache_dir: PathBuf,
}

impl FastEmbedBackend {
    /// `dim` is the Matryoshka-truncated output width (spec §6's
    /// `embedding-dim` config option); the model always produces
    /// [`NATIVE_DIMENSIONS`] internally and this backend truncates+renormalizes.
    pub fn new(dim: usize, cache_dir: PathBuf) -> Self {
        Self { model: OnceLock::new(), dim, cache_dir }
    }

    fn get_model(&self) -> Result<std::sync::MutexGuard<'_, TextEmbedding>, EmbeddingError> {
        let result = self.model.get_or_init(|| {
            if let Err(e) = std::fs::create_dir_all(&self.cache_dir) {
                tracing::warn!(cache_dir = %self.cache_dir.display(), error = %e, "failed to create embedding cache dir");
            }
            let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
                .with_show_download_progress(true)
                .with_cache_dir(self.cache_dir.clone());
            tracing::info!("loading nomic-embed-text-v1.5 (first load may take several seconds)");
            TextEmbedding::try_new(options).map(Mutex::new).map_err(|e| {
                format!(
                    "failed to initialize nomic-embed-text-v1.5: {e}. \
                     ensure the model can be downloaded or is already cached at {}",
                    self.cache_dir.display()
                )
            })
        });
        match result {
            Ok(model) => model.lock().map_err(|e| EmbeddingError::ModelInit(format!("lock poisoned: {e}"))),
            Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
        }
    }

    fn truncate_and_normalize(&self, mut vector: Vec<f32>) -> Vec<f32> {
        if vector.len() > self.dim {
            vector.truncate(self.dim);
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    fn clamp_text(text: &str) -> &str {
        if text.len() <= MAX_TEXT_LENGTH {
            text
        } else {
            let mut end = MAX_TEXT_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        }
    }
}

impl EmbeddingBackend for FastEmbedBackend {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".to_string()));
        }
        let mut model = self.get_model()?;
        let text = Self::clamp_text(text);
        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
        let raw = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("no embedding generated".to_string()))?;
        Ok(self.truncate_and_normalize(raw))
    }

    fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self.get_model()?;
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size.max(1)) {
            let clamped: Vec<&str> = chunk.iter().map(|t| Self::clamp_text(t)).collect();
            let embeddings = model
                .embed(clamped, None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
            out.extend(embeddings.into_iter().map(|v| self.truncate_and_normalize(v)));
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        "fastembed:nomic-embed-text-v1.5"
    }
}
