//! cairn-core: a git-native memory store for coding-agent sessions.
//!
//! A repository's `.git` already holds one append-only, content-addressed,
//! replicable log — this crate puts structured session memories there
//! instead of inventing a second database to keep in sync with it.
//!
//! # Layers
//!
//! - [`osa`] — the Object-Store Adapter: git-notes-backed append-only
//!   storage, one ref per namespace, advisory-locked for concurrent writers.
//! - [`codec`] — the restricted header+markdown format each note is
//!   serialized as.
//! - [`index`] — a SQLite-backed derived index: FTS5 text search and a
//!   single-query vector KNN join, rebuildable from the object store at any
//!   time.
//! - [`embeddings`] — the [`embeddings::EmbeddingBackend`] seam, with a real
//!   ONNX-backed implementation and a deterministic fallback.
//! - [`capture`], [`recall`], [`sync`] — the three operations a caller
//!   actually performs: write a memory, read/assemble context, and
//!   reconcile the index against the object store.
//! - [`app`] — [`app::Application`], the one place all of the above are
//!   constructed and wired together.
//!
//! Binaries (the `cairn` CLI and the hook executables) live in a separate
//! crate and depend on this one as a library.

pub mod app;
pub mod capture;
pub mod codec;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod model;
pub mod osa;
pub mod recall;
pub mod sync;

pub use app::{Application, ApplicationError};
pub use config::Config;
pub use model::{
    CaptureResult, Domain, FileSnapshot, HydrationLevel, Memory, MemoryId, MemoryResult, Namespace, Status,
};

/// Schema version of the derived index this build expects (see
/// [`index::migrations::CURRENT_SCHEMA_VERSION`]).
pub const INDEX_SCHEMA_VERSION: u32 = index::migrations::CURRENT_SCHEMA_VERSION;

/// Convenience re-exports for the common capture/recall/sync entry points.
pub mod prelude {
    pub use crate::app::{Application, ApplicationError};
    pub use crate::capture::{CaptureInput, ContentFilter, FilterOutcome};
    pub use crate::config::Config;
    pub use crate::error::{CaptureError, CodecError, ConfigError, IndexError, OsaError, RecallError, SyncError};
    pub use crate::model::{
        CaptureResult, ConsistencyReport, Domain, FileSnapshot, HydrationLevel, Memory, MemoryId, MemoryResult,
        Namespace, Status,
    };
    pub use crate::recall::{DomainScope, SearchFilters};
}
