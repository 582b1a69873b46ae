//! Application context (spec §9): the single owner of CS/RS/SS/OSA/DI.
//!
//! Spec §9 maps the teacher's service-locator globals and lazy
//! module-level singletons onto one explicit owner that constructs every
//! component once and hands out borrowed service handles on demand. There
//! is no process-global registry here: `cairn` and the hook binaries are
//! one-shot processes, so "construct once, use, exit" already gives the
//! non-reentrant construction spec §5 asks for ("Singleton service
//! registry... creation protected by a double-checked lock") without a
//! second locking layer — recorded as an explicit choice in DESIGN.md.

use crate::capture::{CaptureInput, CaptureService, ContentFilter, NoopFilter};
use crate::config::Config;
#[cfg(feature = "embeddings")]
use crate::embeddings::FastEmbedBackend;
use crate::embeddings::{DeterministicBackend, EmbeddingBackend};
use crate::error::{CaptureError, ConfigError, OsaError};
use crate::index::DerivedIndex;
use crate::model::{CaptureResult, Domain};
use crate::osa::OsaAdapter;
use crate::recall::RecallService;
use crate::sync::SyncService;
use std::path::Path;

/// Top-level errors raised while constructing an [`Application`].
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Osa(#[from] OsaError),
    #[error("failed to open derived index: {0}")]
    Index(#[from] crate::error::IndexError),
}

/// Owns every long-lived handle for one repository. Constructed once per
/// process (the CLI and each hook binary build exactly one), passed down
/// explicitly rather than reached for through module-level statics.
pub struct Application {
    config: Config,
    osa: OsaAdapter,
    index: DerivedIndex,
    embeddings: Box<dyn EmbeddingBackend>,
    filter: Box<dyn ContentFilter>,
}

impl Application {
    /// Opens (and lazily creates) every store rooted at `repo_root`, per the
    /// object-store/derived-index layout in spec §6.
    pub fn open(repo_root: &Path, config_path: Option<&Path>) -> Result<Self, ApplicationError> {
        let config = Config::load(repo_root, config_path)?;
        let osa = OsaAdapter::new(repo_root, &config.notes_ref_root)?;
        let index = DerivedIndex::open(&config.index_db_path(), config.embedding_dim)?;
        let embeddings = build_embedding_backend(&config);
        Ok(Self { config, osa, index, embeddings, filter: Box::new(NoopFilter) })
    }

    /// Replaces the default pass-through content filter with an external
    /// adversarial-screening implementation (spec §1: "pluggable filters").
    pub fn with_filter(mut self, filter: Box<dyn ContentFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedding_model_name(&self) -> &str {
        self.embeddings.model_name()
    }

    /// Runs `capture` (spec §4.4). Lazily initializes the per-user domain
    /// store on first user-domain capture (spec §6).
    pub fn capture(&mut self, input: CaptureInput) -> Result<CaptureResult, CaptureError> {
        if input.domain == Domain::User {
            let user_dir = Config::user_domain_store_dir()
                .map_err(|e| CaptureError::StoreUnavailable(e.to_string()))?;
            self.osa
                .ensure_user_store(&user_dir, &self.config.notes_ref_root)
                .map_err(CaptureError::from)?;
        }
        let service = CaptureService::new(&self.osa, &self.index, self.embeddings.as_ref(), self.filter.as_ref());
        service.capture(input, self.config.lock_timeout_ms)
    }

    pub fn recall(&self) -> RecallService<'_> {
        RecallService::full(
            &self.osa,
            &self.index,
            self.embeddings.as_ref(),
            self.config.hydration_file_cap,
            self.config.hydration_file_bytes,
            self.config.similarity_threshold,
            self.config.working_memory_fraction,
        )
    }

    pub fn sync(&self) -> SyncService<'_> {
        SyncService::new(&self.osa, &self.index, self.embeddings.as_ref(), self.config.reindex_batch)
    }

    pub fn index(&self) -> &DerivedIndex {
        &self.index
    }

    /// Ensures the user-domain store exists without requiring a capture
    /// first — used by `status`/`sync` CLI paths that need to inspect it.
    pub fn ensure_user_store(&mut self) -> Result<(), crate::error::OsaError> {
        let user_dir = Config::user_domain_store_dir().map_err(|e| OsaError::StoreUnavailable(e.to_string()))?;
        self.osa.ensure_user_store(&user_dir, &self.config.notes_ref_root)
    }
}

fn build_embedding_backend(config: &Config) -> Box<dyn EmbeddingBackend> {
    #[cfg(feature = "embeddings")]
    {
        if config.embedding_model.starts_with("fastembed:") {
            let cache_dir = config.data_dir.join("embedding-cache");
            return Box::new(FastEmbedBackend::new(config.embedding_dim, cache_dir));
        }
    }
    Box::new(DeterministicBackend::new(config.embedding_dim))
}
