//! Git-notes-backed object store (spec §4.1).
//!
//! A single `GitNoteStore` wraps one `git2::Repository` — either the
//! project's own repository or the per-user bare content-addressed store at
//! the XDG data directory (spec §6, "Persisted object-store layout"). Each
//! namespace gets its own notes ref, `refs/notes/<ref_root>/<namespace>`.
//! Multiple memories appended while the target commit doesn't change (no new
//! developer commit landed) share one note object; they are distinguished by
//! an ordinal within that object's message, delimited by an ASCII record
//! separator that is vanishingly unlikely to occur in note content.

use crate::error::OsaError;
use crate::model::{Domain, FetchStats, MergeStats, Namespace, PushStats};
use crate::osa::lock::LockGuard;
use git2::{Oid, Repository, Signature};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

const SEGMENT_SEP: &str = "\n\u{1e}\n";
const ANCHOR_REF: &str = "refs/cairn/anchor";

/// One note body plus the coordinates `read`/`list`/`read_batch` expose it
/// under: the target commit it's attached to, and its ordinal within that
/// commit's combined note (spec §3: `MemoryId = {namespace}:{commit_ref}:{ordinal}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub commit_ref: String,
    pub ordinal: u32,
    pub body: Vec<u8>,
}

/// A file read from a commit's tree at FILES hydration level. `content` is
/// `None` when the blob exceeds the caller's byte cap; `size` is always the
/// true size so callers can render the `<elided: size=N>` marker (spec §4.6).
#[derive(Debug, Clone)]
pub struct FileBlob {
    pub content: Option<Vec<u8>>,
    pub size: u64,
}

pub struct GitNoteStore {
    repo: Repository,
    ref_root: String,
    domain: Domain,
    locks_dir: PathBuf,
}

impl GitNoteStore {
    /// Opens (but does not initialize) the git repository at `path`.
    pub fn open(path: &Path, ref_root: String, domain: Domain) -> Result<Self, OsaError> {
        let repo = Repository::open(path)
            .map_err(|e| OsaError::StoreUnavailable(format!("{}: {e}", path.display())))?;
        let locks_dir = path.join(".git").join("cairn").join("locks");
        Ok(Self { repo, ref_root, domain, locks_dir })
    }

    /// Initializes a fresh bare repository at `path` if one doesn't already
    /// exist — used to lazily create the per-user domain store (spec §6).
    pub fn init_bare(path: &Path, ref_root: String, domain: Domain) -> Result<Self, OsaError> {
        std::fs::create_dir_all(path)?;
        let repo = match Repository::open_bare(path) {
            Ok(repo) => repo,
            Err(_) => Repository::init_bare(path)
                .map_err(|e| OsaError::StoreUnavailable(format!("{}: {e}", path.display())))?,
        };
        let locks_dir = path.join("cairn").join("locks");
        Ok(Self { repo, ref_root, domain, locks_dir })
    }

    fn notes_ref_path(&self, namespace: Namespace) -> String {
        self.notes_ref_path_raw(namespace.as_str())
    }

    fn notes_ref_path_raw(&self, suffix: &str) -> String {
        format!("refs/notes/{}/{}", self.ref_root, suffix)
    }

    fn tracking_ref_path(&self, namespace: Namespace) -> String {
        format!("refs/notes/{}-tracking/origin/{}", self.ref_root, namespace.as_str())
    }

    /// The commit every append in this store currently targets: the real
    /// HEAD commit if one exists, else a cached throwaway anchor commit.
    fn target_commit(&self) -> Result<Oid, OsaError> {
        if let Ok(head) = self.repo.head() {
            if let Ok(commit) = head.peel_to_commit() {
                return Ok(commit.id());
            }
        }
        self.anchor_commit()
    }

    fn anchor_commit(&self) -> Result<Oid, OsaError> {
        if let Ok(reference) = self.repo.find_reference(ANCHOR_REF) {
            if let Some(oid) = reference.target() {
                return Ok(oid);
            }
        }
        let sig = signature()?;
        let tree_oid = self.repo.treebuilder(None)?.write()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let commit_oid = self.repo.commit(None, &sig, &sig, "cairn anchor", &tree, &[])?;
        self.repo.reference(ANCHOR_REF, commit_oid, true, "cairn anchor")?;
        Ok(commit_oid)
    }

    fn read_segments(&self, notes_ref: &str, target: Oid) -> Result<Vec<Vec<u8>>, OsaError> {
        match self.repo.find_note(Some(notes_ref), target) {
            Ok(note) => {
                let message = note.message().unwrap_or("").to_string();
                Ok(split_segments(&message))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(Vec::new()),
            Err(e) => Err(OsaError::Git(e)),
        }
    }

    /// Appends one note body to `namespace`, returning the target commit's
    /// oid (as the note's `commit_ref`) and the new note's ordinal.
    pub fn append(&self, namespace: Namespace, body: &[u8], lock_timeout_ms: u64) -> Result<(String, u32), OsaError> {
        let _guard = LockGuard::acquire(&self.locks_dir, namespace, self.domain, lock_timeout_ms)?;
        let target = self.target_commit()?;
        let notes_ref = self.notes_ref_path(namespace);
        let mut segments = self.read_segments(&notes_ref, target)?;
        let ordinal = segments.len() as u32;
        segments.push(body.to_vec());
        let combined = join_segments(&segments);
        let sig = signature()?;
        self.repo
            .note(&sig, &sig, Some(&notes_ref), target, &combined, true)?;
        Ok((target.to_string(), ordinal))
    }

    /// Appends an audit entry to the reserved `blocked` pseudo-namespace
    /// (spec's open question on content-filter rejections: retained as an
    /// audit entry, not silently discarded). Excluded from
    /// [`Self::list`]/[`Self::read_batch`] under real namespaces and never
    /// reaches the derived index.
    pub fn append_blocked(&self, body: &[u8], lock_timeout_ms: u64) -> Result<(String, u32), OsaError> {
        let _guard = LockGuard::acquire_keyed(&self.locks_dir, "blocked", self.domain, lock_timeout_ms)?;
        let target = self.target_commit()?;
        let notes_ref = self.notes_ref_path_raw("blocked");
        let mut segments = self.read_segments(&notes_ref, target)?;
        let ordinal = segments.len() as u32;
        segments.push(body.to_vec());
        let combined = join_segments(&segments);
        let sig = signature()?;
        self.repo
            .note(&sig, &sig, Some(&notes_ref), target, &combined, true)?;
        Ok((target.to_string(), ordinal))
    }

    /// Reads a single note body by its full coordinates.
    pub fn read(&self, namespace: Namespace, commit_ref: &str, ordinal: u32) -> Result<Vec<u8>, OsaError> {
        let target = Oid::from_str(commit_ref)
            .map_err(|e| OsaError::InvalidNamespace(format!("malformed commit ref: {e}")))?;
        let notes_ref = self.notes_ref_path(namespace);
        let segments = self.read_segments(&notes_ref, target)?;
        segments.into_iter().nth(ordinal as usize).ok_or_else(|| OsaError::NotFound {
            namespace: namespace.as_str().to_string(),
            commit_ref: format!("{commit_ref}:{ordinal}"),
        })
    }

    /// Reads every note record under `namespace`, across all target commits.
    pub fn list(&self, namespace: Namespace) -> Result<Vec<NoteRecord>, OsaError> {
        let notes_ref = self.notes_ref_path(namespace);
        let mut out = Vec::new();
        let notes = match self.repo.notes(Some(&notes_ref)) {
            Ok(n) => n,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(out),
            Err(e) => return Err(OsaError::Git(e)),
        };
        for entry in notes {
            let (_note_oid, annotated_oid) = entry?;
            let segments = self.read_segments(&notes_ref, annotated_oid)?;
            for (ordinal, body) in segments.into_iter().enumerate() {
                out.push(NoteRecord {
                    commit_ref: annotated_oid.to_string(),
                    ordinal: ordinal as u32,
                    body,
                });
            }
        }
        Ok(out)
    }

    /// Batched read grouped by `commit_ref` — the only read path `reindex`
    /// uses (spec §4.5's "batched OSA reads" performance contract): one
    /// `find_note` call per distinct target, not per id.
    pub fn read_batch(&self, namespace: Namespace, commit_refs: &[String]) -> Result<Vec<NoteRecord>, OsaError> {
        let notes_ref = self.notes_ref_path(namespace);
        let mut distinct: Vec<&String> = Vec::new();
        for cr in commit_refs {
            if !distinct.contains(&cr) {
                distinct.push(cr);
            }
        }
        let mut out = Vec::new();
        for commit_ref in distinct {
            let target = Oid::from_str(commit_ref)
                .map_err(|e| OsaError::InvalidNamespace(format!("malformed commit ref: {e}")))?;
            let segments = self.read_segments(&notes_ref, target)?;
            for (ordinal, body) in segments.into_iter().enumerate() {
                out.push(NoteRecord { commit_ref: commit_ref.clone(), ordinal: ordinal as u32, body });
            }
        }
        Ok(out)
    }

    /// Fetches remote notes refs for every namespace into the local tracking
    /// refs, using the `+` (non-fast-forward-allowed) refspec from spec §6.
    pub fn fetch_remote(&self, remote_name: &str, namespaces: &[Namespace]) -> Result<FetchStats, OsaError> {
        let mut remote = self.repo.find_remote(remote_name).map_err(|e| OsaError::RemoteFailed {
            op: "fetch",
            reason: e.to_string(),
        })?;
        let mut refs_updated = 0usize;
        for &ns in namespaces {
            let refspec = format!(
                "+refs/notes/{}/{}/*:{}/*",
                self.ref_root,
                ns.as_str(),
                self.tracking_ref_path(ns)
            );
            remote
                .fetch(&[refspec.as_str()], None, None)
                .map_err(|e| OsaError::RemoteFailed { op: "fetch", reason: e.to_string() })?;
            refs_updated += 1;
        }
        Ok(FetchStats { namespaces_fetched: namespaces.len(), refs_updated })
    }

    /// Merges fetched tracking notes into the local notes refs using the
    /// append-combining strategy (spec §6: "concatenate, line-sort, dedupe").
    pub fn merge_from_tracking(&self, namespaces: &[Namespace]) -> Result<MergeStats, OsaError> {
        let mut notes_merged = 0;
        let mut notes_deduped = 0;
        for &ns in namespaces {
            let local_ref = self.notes_ref_path(ns);
            let tracking_ref = self.tracking_ref_path(ns);
            let tracking_notes = match self.repo.notes(Some(&tracking_ref)) {
                Ok(n) => n,
                Err(e) if e.code() == git2::ErrorCode::NotFound => continue,
                Err(e) => return Err(OsaError::Git(e)),
            };
            let targets: Vec<Oid> = tracking_notes.filter_map(|e| e.ok().map(|(_, t)| t)).collect();
            for target in targets {
                let local_segments = self.read_segments(&local_ref, target)?;
                let remote_segments = self.read_segments(&tracking_ref, target)?;
                let (merged, added, deduped) = union_sorted_dedup(local_segments, remote_segments);
                notes_merged += added;
                notes_deduped += deduped;
                if added > 0 {
                    let combined = join_segments(&merged);
                    let sig = signature()?;
                    self.repo.note(&sig, &sig, Some(&local_ref), target, &combined, true)?;
                }
            }
        }
        Ok(MergeStats { namespaces_merged: namespaces.len(), notes_added: notes_merged, notes_deduped })
    }

    /// Pushes local notes refs using the symmetric non-forced refspec.
    pub fn push_remote(&self, remote_name: &str, namespaces: &[Namespace]) -> Result<PushStats, OsaError> {
        let mut remote = self.repo.find_remote(remote_name).map_err(|e| OsaError::RemoteFailed {
            op: "push",
            reason: e.to_string(),
        })?;
        let mut refs_updated = 0usize;
        for &ns in namespaces {
            let local_ref = self.notes_ref_path(ns);
            let refspec = format!("{local_ref}:{local_ref}");
            remote
                .push(&[refspec.as_str()], None)
                .map_err(|e| OsaError::RemoteFailed { op: "push", reason: e.to_string() })?;
            refs_updated += 1;
        }
        Ok(PushStats { namespaces_pushed: namespaces.len(), refs_updated })
    }

    /// Reads a single file from `commit_ref`'s tree at `path`, bounded by
    /// `max_bytes` (FILES hydration level, spec §4.6). Returns `None` if the
    /// commit or path doesn't exist (e.g. the anchor commit for bare/no-commit
    /// repositories, or a file the note referenced that was later removed).
    pub fn read_file_at_commit(&self, commit_ref: &str, path: &str, max_bytes: u64) -> Result<Option<FileBlob>, OsaError> {
        let oid = Oid::from_str(commit_ref)
            .map_err(|e| OsaError::InvalidNamespace(format!("malformed commit ref: {e}")))?;
        let commit = match self.repo.find_commit(oid) {
            Ok(c) => c,
            Err(_) => return Ok(None),
        };
        let tree = commit.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(e) => e,
            Err(_) => return Ok(None),
        };
        let object = entry.to_object(&self.repo)?;
        let blob = match object.as_blob() {
            Some(b) => b,
            None => return Ok(None),
        };
        let size = blob.content().len() as u64;
        if size > max_bytes {
            Ok(Some(FileBlob { content: None, size }))
        } else {
            Ok(Some(FileBlob { content: Some(blob.content().to_vec()), size }))
        }
    }
}

fn signature() -> Result<Signature<'static>, OsaError> {
    Signature::now("cairn", "cairn@localhost").map_err(OsaError::Git)
}

fn split_segments(message: &str) -> Vec<Vec<u8>> {
    if message.is_empty() {
        return Vec::new();
    }
    message.split(SEGMENT_SEP).map(|s| s.as_bytes().to_vec()).collect()
}

fn join_segments(segments: &[Vec<u8>]) -> String {
    segments
        .iter()
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect::<Vec<_>>()
        .join(SEGMENT_SEP)
}

fn content_hash(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Combines two segment lists: union by content hash, sorted by hash for
/// determinism (spec §6 "conflicts between structurally identical notes
/// resolve by union"). Returns (merged, newly_added_count, deduped_count).
fn union_sorted_dedup(local: Vec<Vec<u8>>, remote: Vec<Vec<u8>>) -> (Vec<Vec<u8>>, usize, usize) {
    let mut seen = std::collections::BTreeMap::new();
    for segment in local {
        seen.entry(content_hash(&segment)).or_insert(segment);
    }
    let local_count = seen.len();
    let mut deduped = 0;
    for segment in remote {
        let hash = content_hash(&segment);
        if seen.insert(hash, segment).is_some() {
            deduped += 1;
        }
    }
    let added = seen.len().saturating_sub(local_count);
    let merged: Vec<Vec<u8>> = seen.into_values().collect();
    (merged, added, deduped)
}
