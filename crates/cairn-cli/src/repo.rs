//! Repository-root discovery and [`Application`] construction for the CLI
//! and hook binaries.

use cairn_core::app::{Application, ApplicationError};
use std::path::PathBuf;

/// Errors surfaced to `main` before `cairn-core`'s own error types apply.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not inside a git repository: {0}")]
    NotAGitRepo(#[source] git2::Error),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

/// Walks up from the current directory to find the enclosing git
/// repository (mirroring `git`'s own behavior), then opens an
/// [`Application`] rooted there.
pub fn open_application() -> Result<Application, RepoError> {
    let repo_root = discover_repo_root()?;
    Application::open(&repo_root, None).map_err(RepoError::from)
}

fn discover_repo_root() -> Result<PathBuf, RepoError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let discovered = git2::Repository::discover(&cwd).map_err(RepoError::NotAGitRepo)?;
    let path = discovered.path().parent().map(|p| p.to_path_buf()).unwrap_or(cwd);
    Ok(path)
}
