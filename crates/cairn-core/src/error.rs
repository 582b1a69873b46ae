//! Error taxonomy for the memory store.
//!
//! Each component gets its own error enum so callers can match on a stable
//! discriminator instead of parsing message strings. Internal helpers
//! propagate cause chains via `#[source]`/`#[from]`; the only permitted
//! "swallow" is lock-release failure, which is logged at `warn!` in
//! `osa::lock` and never surfaces here.

use std::path::PathBuf;

/// Errors from the object-store adapter (§4.1).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum OsaError {
    /// The underlying git repository could not be opened or used.
    #[error("object store unavailable: {0}")]
    StoreUnavailable(String),

    /// A namespace was requested that isn't in the configured set.
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    /// A note-level lock could not be acquired before the deadline.
    #[error("lock acquisition timed out after {waited_ms}ms on {lock_path}")]
    LockTimeout { lock_path: PathBuf, waited_ms: u64 },

    /// The requested commit ref has no note attached under the namespace.
    #[error("note not found: {namespace}/{commit_ref}")]
    NotFound { namespace: String, commit_ref: String },

    /// A remote fetch/merge/push operation failed.
    #[error("remote operation '{op}' failed: {reason}")]
    RemoteFailed { op: &'static str, reason: String },

    /// Lower-level git2 failure not otherwise classified above.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the note codec (§4.2).
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at line {line}: {reason}")]
pub struct CodecError {
    pub reason: String,
    pub line: usize,
}

impl CodecError {
    pub fn new(reason: impl Into<String>, line: usize) -> Self {
        Self { reason: reason.into(), line }
    }
}

/// Errors from the derived index (§4.3).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `schema_meta.version` in the database is newer than this binary
    /// supports; refusing to open rather than risk a lossy downgrade.
    #[error("schema version {found} is newer than supported version {supported}; refusing to open")]
    SchemaFromFuture { found: u32, supported: u32 },

    /// An incoming embedding's dimensionality doesn't match the dimension
    /// recorded in `schema_meta` at index creation. Fatal per invariant I6.
    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("memory not found: {0}")]
    NotFound(String),
}

/// Errors from `capture` (§4.4).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("invalid summary: {0}")]
    InvalidSummary(String),

    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// The registered content filter rejected this capture outright.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    #[error("lock acquisition timed out")]
    LockTimeout(#[from] LockTimeoutError),

    #[error("object store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Thin wrapper so `OsaError::LockTimeout` converts cleanly into
/// `CaptureError::LockTimeout` without losing the underlying detail.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct LockTimeoutError(pub String);

impl From<OsaError> for CaptureError {
    fn from(err: OsaError) -> Self {
        match err {
            OsaError::LockTimeout { lock_path, waited_ms } => CaptureError::LockTimeout(
                LockTimeoutError(format!("{} (waited {}ms)", lock_path.display(), waited_ms)),
            ),
            other => CaptureError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Errors from `reindex` / `verify_consistency` / `repair` / `sync_with_remote` (§4.5).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Osa(#[from] OsaError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("embedding backend error: {0}")]
    Embedding(String),
}

/// Errors from `search` / `hydrate` / `proactive_recall` (§4.6).
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RecallError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Osa(#[from] OsaError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("embedding backend error: {0}")]
    Embedding(String),
}

/// Configuration errors — always fatal, never retried.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a configuration/data directory")]
    NoDataDir,

    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}
