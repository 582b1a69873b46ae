//! Configuration (spec §6): built-in defaults, overridden by `cairn.toml`,
//! overridden by `CAIRN_*` environment variables — in ascending priority.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// All recognized options from spec §6's configuration table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for the derived index and the user-domain object store.
    pub data_dir: PathBuf,
    /// Object-store ref namespace prefix (`refs/notes/<notes_ref_root>/<namespace>`).
    pub notes_ref_root: String,
    /// Identifier of the embedding backend (`"fastembed:nomic-embed-text-v1.5"`,
    /// `"deterministic"`, …).
    pub embedding_model: String,
    /// Vector dimensionality, fixed at DI creation (invariant I6).
    pub embedding_dim: usize,
    /// Capture lock acquisition deadline.
    pub lock_timeout_ms: u64,
    /// Embedding batch size during `reindex`.
    pub reindex_batch: usize,
    /// Default minimum similarity for `recall`.
    pub similarity_threshold: f32,
    /// Default context-document token budget.
    pub token_budget: usize,
    /// Fraction of `token_budget` reserved for the working-memory slice.
    pub working_memory_fraction: f32,
    /// Max files attached at the FILES hydration level.
    pub hydration_file_cap: usize,
    /// Max bytes per attached file before elision.
    pub hydration_file_bytes: u64,
    /// Whether `sync_with_remote` pushes by default.
    pub remote_sync: bool,
    /// Cap on hook stdin size, in bytes (spec §6: "bounded... e.g. 10 MiB").
    pub hook_max_input_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            notes_ref_root: "cairn".to_string(),
            embedding_model: "fastembed:nomic-embed-text-v1.5".to_string(),
            embedding_dim: 256,
            lock_timeout_ms: 5_000,
            reindex_batch: 32,
            similarity_threshold: 0.3,
            token_budget: 4_000,
            working_memory_fraction: 0.4,
            hydration_file_cap: 8,
            hydration_file_bytes: 16_384,
            remote_sync: false,
            hook_max_input_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Partial overlay parsed from `cairn.toml` — every field optional so a file
/// specifying only `embedding_dim` doesn't clobber the rest with zeros.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    notes_ref_root: Option<String>,
    embedding_model: Option<String>,
    embedding_dim: Option<usize>,
    lock_timeout_ms: Option<u64>,
    reindex_batch: Option<usize>,
    similarity_threshold: Option<f32>,
    token_budget: Option<usize>,
    working_memory_fraction: Option<f32>,
    hydration_file_cap: Option<usize>,
    hydration_file_bytes: Option<u64>,
    remote_sync: Option<bool>,
    hook_max_input_bytes: Option<u64>,
}

impl Config {
    /// Loads configuration for a repository rooted at `repo_root`.
    ///
    /// Priority, lowest to highest: built-in defaults, `<repo_root>/.git/cairn.toml`
    /// (or `config_path` if given explicitly), `CAIRN_*` environment variables.
    pub fn load(repo_root: &Path, config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.data_dir = default_data_dir(repo_root)?;

        let file_path = config_path
            .map(PathBuf::from)
            .unwrap_or_else(|| repo_root.join(".git").join("cairn.toml"));

        if file_path.exists() {
            let raw = std::fs::read_to_string(&file_path).map_err(|source| ConfigError::Read {
                path: file_path.clone(),
                source,
            })?;
            let overlay: ConfigFile = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: file_path.clone(),
                source,
            })?;
            config.apply_overlay(overlay);
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_overlay(&mut self, overlay: ConfigFile) {
        if let Some(v) = overlay.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = overlay.notes_ref_root {
            self.notes_ref_root = v;
        }
        if let Some(v) = overlay.embedding_model {
            self.embedding_model = v;
        }
        if let Some(v) = overlay.embedding_dim {
            self.embedding_dim = v;
        }
        if let Some(v) = overlay.lock_timeout_ms {
            self.lock_timeout_ms = v;
        }
        if let Some(v) = overlay.reindex_batch {
            self.reindex_batch = v;
        }
        if let Some(v) = overlay.similarity_threshold {
            self.similarity_threshold = v;
        }
        if let Some(v) = overlay.token_budget {
            self.token_budget = v;
        }
        if let Some(v) = overlay.working_memory_fraction {
            self.working_memory_fraction = v;
        }
        if let Some(v) = overlay.hydration_file_cap {
            self.hydration_file_cap = v;
        }
        if let Some(v) = overlay.hydration_file_bytes {
            self.hydration_file_bytes = v;
        }
        if let Some(v) = overlay.remote_sync {
            self.remote_sync = v;
        }
        if let Some(v) = overlay.hook_max_input_bytes {
            self.hook_max_input_bytes = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("CAIRN_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CAIRN_NOTES_REF_ROOT") {
            self.notes_ref_root = v;
        }
        if let Ok(v) = std::env::var("CAIRN_EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        env_parsed(&mut self.embedding_dim, "CAIRN_EMBEDDING_DIM");
        env_parsed(&mut self.lock_timeout_ms, "CAIRN_LOCK_TIMEOUT_MS");
        env_parsed(&mut self.reindex_batch, "CAIRN_REINDEX_BATCH");
        env_parsed(&mut self.similarity_threshold, "CAIRN_SIMILARITY_THRESHOLD");
        env_parsed(&mut self.token_budget, "CAIRN_TOKEN_BUDGET");
        env_parsed(&mut self.working_memory_fraction, "CAIRN_WORKING_MEMORY_FRACTION");
        env_parsed(&mut self.hydration_file_cap, "CAIRN_HYDRATION_FILE_CAP");
        env_parsed(&mut self.hydration_file_bytes, "CAIRN_HYDRATION_FILE_BYTES");
        env_parsed(&mut self.hook_max_input_bytes, "CAIRN_HOOK_MAX_INPUT_BYTES");
        if let Ok(v) = std::env::var("CAIRN_REMOTE_SYNC") {
            self.remote_sync = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dim == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding_dim",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.working_memory_fraction) {
            return Err(ConfigError::InvalidValue {
                key: "working_memory_fraction",
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if self.token_budget == 0 {
            return Err(ConfigError::InvalidValue {
                key: "token_budget",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn index_db_path(&self) -> PathBuf {
        self.data_dir.join("index.sqlite3")
    }

    /// XDG-resolved root for the per-user global object store, lazily
    /// initialized on first user-domain capture (spec §6).
    pub fn user_domain_store_dir() -> Result<PathBuf, ConfigError> {
        let proj_dirs = directories::ProjectDirs::from("dev", "cairn", "cairn")
            .ok_or(ConfigError::NoDataDir)?;
        Ok(proj_dirs.data_dir().join("user-store"))
    }
}

fn env_parsed<T: std::str::FromStr>(field: &mut T, key: &str) {
    if let Ok(v) = std::env::var(key) {
        if let Ok(parsed) = v.parse() {
            *field = parsed;
        }
    }
}

fn default_data_dir(repo_root: &Path) -> Result<PathBuf, ConfigError> {
    Ok(repo_root.join(".git").join("cairn"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_pass_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_without_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path(), None).unwrap();
        assert_eq!(config.notes_ref_root, "cairn");
        assert_eq!(config.embedding_dim, 256);
    }

    #[test]
    fn toml_overlay_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(
            dir.path().join(".git").join("cairn.toml"),
            "embedding_dim = 512\nsimilarity_threshold = 0.5\n",
        )
        .unwrap();
        let config = Config::load(dir.path(), None).unwrap();
        assert_eq!(config.embedding_dim, 512);
        assert_eq!(config.similarity_threshold, 0.5);
        // Untouched fields keep their defaults.
        assert_eq!(config.notes_ref_root, "cairn");
    }

    #[test]
    fn env_var_overrides_toml_overlay() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(
            dir.path().join(".git").join("cairn.toml"),
            "embedding_dim = 512\n",
        )
        .unwrap();
        // SAFETY: test-local env var, no other test in this module reads it concurrently
        // (cargo test runs file-scoped tests single-threaded unless explicitly parallelized
        // across files; this module doesn't spawn threads).
        unsafe {
            std::env::set_var("CAIRN_EMBEDDING_DIM", "768");
        }
        let config = Config::load(dir.path(), None).unwrap();
        unsafe {
            std::env::remove_var("CAIRN_EMBEDDING_DIM");
        }
        assert_eq!(config.embedding_dim, 768);
    }

    #[test]
    fn invalid_embedding_dim_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("cairn.toml"), "embedding_dim = 0\n").unwrap();
        let err = Config::load(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "embedding_dim", .. }));
    }

    #[test]
    fn malformed_toml_is_reported_with_path() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("cairn.toml"), "not valid [[[").unwrap();
        let err = Config::load(dir.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
