//! Advisory per-(repository, namespace, domain) locking for concurrent
//! append safety (spec §4.1, §5).

use crate::error::OsaError;
use crate::model::{Domain, Namespace};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Holds an exclusive-create lock file for the lifetime of the guard.
/// Released on every exit path via `Drop`; release failures are logged at
/// `warn!` and never propagated (the one permitted "swallow", spec §7).
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Acquires the lock for `(namespace, domain)` under `locks_dir`, retrying
    /// with exponential backoff until `timeout_ms` elapses.
    pub fn acquire(
        locks_dir: &Path,
        namespace: Namespace,
        domain: Domain,
        timeout_ms: u64,
    ) -> Result<Self, OsaError> {
        Self::acquire_keyed(locks_dir, namespace.as_str(), domain, timeout_ms)
    }

    /// Same as [`Self::acquire`] but keyed by an arbitrary string instead of a
    /// [`Namespace`] — used for the reserved `blocked` audit pseudo-namespace,
    /// which isn't part of the closed namespace set.
    pub fn acquire_keyed(
        locks_dir: &Path,
        key: &str,
        domain: Domain,
        timeout_ms: u64,
    ) -> Result<Self, OsaError> {
        std::fs::create_dir_all(locks_dir)?;
        let path = locks_dir.join(format!("{}-{}.lock", domain.as_str(), key));

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut backoff = Duration::from_millis(5);
        const MAX_BACKOFF: Duration = Duration::from_millis(250);

        loop {
            match std::fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(OsaError::LockTimeout {
                            lock_path: path,
                            waited_ms: timeout_ms,
                        });
                    }
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(OsaError::Io(e)),
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock file");
        }
    }
}
