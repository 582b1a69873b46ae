//! Object-Store Adapter (spec §4.1): the durable source of truth.
//!
//! Wraps two [`GitNoteStore`]s — one over the project's own repository, one
//! over the lazily-initialized per-user bare store — and dispatches every
//! operation to the one matching the requested [`Domain`].

pub mod lock;
pub mod store;

pub use store::{FileBlob, GitNoteStore, NoteRecord};

use crate::error::OsaError;
use crate::model::{Domain, FetchStats, MergeStats, Namespace, PushStats};
use std::path::Path;

pub struct OsaAdapter {
    project: GitNoteStore,
    user: Option<GitNoteStore>,
}

impl OsaAdapter {
    pub fn new(project_repo_path: &Path, ref_root: &str) -> Result<Self, OsaError> {
        let project = GitNoteStore::open(project_repo_path, ref_root.to_string(), Domain::Project)?;
        Ok(Self { project, user: None })
    }

    /// Lazily opens (initializing if necessary) the per-user domain store.
    fn user_store(&mut self, user_store_path: &Path, ref_root: &str) -> Result<&GitNoteStore, OsaError> {
        if self.user.is_none() {
            self.user = Some(GitNoteStore::init_bare(user_store_path, ref_root.to_string(), Domain::User)?);
        }
        Ok(self.user.as_ref().expect("just initialized"))
    }

    fn store_for(&self, domain: Domain) -> Result<&GitNoteStore, OsaError> {
        match domain {
            Domain::Project => Ok(&self.project),
            Domain::User => self
                .user
                .as_ref()
                .ok_or_else(|| OsaError::StoreUnavailable("user domain store not initialized".to_string())),
        }
    }

    pub fn ensure_user_store(&mut self, user_store_path: &Path, ref_root: &str) -> Result<(), OsaError> {
        self.user_store(user_store_path, ref_root)?;
        Ok(())
    }

    pub fn append(
        &self,
        domain: Domain,
        namespace: Namespace,
        body: &[u8],
        lock_timeout_ms: u64,
    ) -> Result<(String, u32), OsaError> {
        self.store_for(domain)?.append(namespace, body, lock_timeout_ms)
    }

    pub fn read(&self, domain: Domain, namespace: Namespace, commit_ref: &str, ordinal: u32) -> Result<Vec<u8>, OsaError> {
        self.store_for(domain)?.read(namespace, commit_ref, ordinal)
    }

    /// Records a content-filter rejection as an audit entry under the
    /// reserved `blocked` pseudo-namespace (never indexed, never listed
    /// alongside real namespaces).
    pub fn append_blocked(&self, domain: Domain, body: &[u8], lock_timeout_ms: u64) -> Result<(String, u32), OsaError> {
        self.store_for(domain)?.append_blocked(body, lock_timeout_ms)
    }

    pub fn list(&self, domain: Domain, namespace: Namespace) -> Result<Vec<NoteRecord>, OsaError> {
        self.store_for(domain)?.list(namespace)
    }

    pub fn read_batch(&self, domain: Domain, namespace: Namespace, commit_refs: &[String]) -> Result<Vec<NoteRecord>, OsaError> {
        self.store_for(domain)?.read_batch(namespace, commit_refs)
    }

    /// Reads a file snapshot from a commit's tree (FILES hydration level).
    pub fn read_file_at_commit(
        &self,
        domain: Domain,
        commit_ref: &str,
        path: &str,
        max_bytes: u64,
    ) -> Result<Option<FileBlob>, OsaError> {
        self.store_for(domain)?.read_file_at_commit(commit_ref, path, max_bytes)
    }

    pub fn fetch_remote(&self, domain: Domain, remote_name: &str, namespaces: &[Namespace]) -> Result<FetchStats, OsaError> {
        self.store_for(domain)?.fetch_remote(remote_name, namespaces)
    }

    pub fn merge_from_tracking(&self, domain: Domain, namespaces: &[Namespace]) -> Result<MergeStats, OsaError> {
        self.store_for(domain)?.merge_from_tracking(namespaces)
    }

    pub fn push_remote(&self, domain: Domain, remote_name: &str, namespaces: &[Namespace]) -> Result<PushStats, OsaError> {
        self.store_for(domain)?.push_remote(remote_name, namespaces)
    }
}
