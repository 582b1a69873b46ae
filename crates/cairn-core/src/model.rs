//! The memory entity and its supporting types (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of namespaces a memory can be filed under. Extensible by
/// configuration but stable within a deployment — see `Config::namespaces`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Namespace {
    Inception,
    Elicitation,
    Research,
    Decisions,
    Progress,
    Blockers,
    Reviews,
    Learnings,
    Retrospective,
    Patterns,
}

pub const ALL_NAMESPACES: [Namespace; 10] = [
    Namespace::Inception,
    Namespace::Elicitation,
    Namespace::Research,
    Namespace::Decisions,
    Namespace::Progress,
    Namespace::Blockers,
    Namespace::Reviews,
    Namespace::Learnings,
    Namespace::Retrospective,
    Namespace::Patterns,
];

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Inception => "inception",
            Namespace::Elicitation => "elicitation",
            Namespace::Research => "research",
            Namespace::Decisions => "decisions",
            Namespace::Progress => "progress",
            Namespace::Blockers => "blockers",
            Namespace::Reviews => "reviews",
            Namespace::Learnings => "learnings",
            Namespace::Retrospective => "retrospective",
            Namespace::Patterns => "patterns",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inception" => Some(Namespace::Inception),
            "elicitation" => Some(Namespace::Elicitation),
            "research" => Some(Namespace::Research),
            "decisions" => Some(Namespace::Decisions),
            "progress" => Some(Namespace::Progress),
            "blockers" => Some(Namespace::Blockers),
            "reviews" => Some(Namespace::Reviews),
            "learnings" => Some(Namespace::Learnings),
            "retrospective" => Some(Namespace::Retrospective),
            "patterns" => Some(Namespace::Patterns),
            _ => None,
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scopes a memory to the current repository, or to a per-user global store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    #[default]
    Project,
    User,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Project => "project",
            Domain::User => "user",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a memory. Archival is recorded by a new append
/// (invariant I3); this field never changes on an existing note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Archived,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Status::Active),
            "archived" => Some(Status::Archived),
            _ => None,
        }
    }
}

/// Stable identifier of the form `{namespace}:{commit_ref}:{ordinal}`,
/// with a `user:` prefix for user-domain memories (spec §4.4 step 5).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub String);

impl MemoryId {
    pub fn new(namespace: Namespace, commit_ref: &str, ordinal: u32, domain: Domain) -> Self {
        let raw = format!("{}:{}:{}", namespace.as_str(), commit_ref, ordinal);
        let id = match domain {
            Domain::Project => raw,
            Domain::User => format!("user:{raw}"),
        };
        MemoryId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The primary entity: a small structured note (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub namespace: Namespace,
    pub domain: Domain,
    pub summary: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<String>,
    pub spec: Option<String>,
    pub status: Status,
    pub relates_to: Vec<MemoryId>,
    /// Unknown header keys, preserved verbatim for forward compatibility
    /// (spec §4.2: "permissive on unknown header keys").
    pub extra: BTreeMap<String, String>,
}

impl Memory {
    /// Maximum length of `summary`, in characters (invariant I5).
    pub const MAX_SUMMARY_LEN: usize = 100;

    /// Short prefix of `content` retained in the derived index for full-text
    /// search, independent of the FILES/FULL hydration levels.
    pub fn content_prefix(&self, max_bytes: usize) -> String {
        if self.content.len() <= max_bytes {
            self.content.clone()
        } else {
            let mut end = max_bytes;
            while !self.content.is_char_boundary(end) {
                end -= 1;
            }
            self.content[..end].to_string()
        }
    }
}

/// Result of a `capture` call (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResult {
    pub success: bool,
    pub memory: Option<Memory>,
    pub indexed: bool,
    pub warning: Option<String>,
}

/// Ordered hydration fidelity levels (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HydrationLevel {
    Summary,
    Full,
    Files,
}

/// A snapshot of a file referenced in a memory's content, captured at the
/// memory's commit (FILES hydration level).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub path: String,
    /// `None` when the file content was elided for exceeding the configured
    /// byte cap; `elided_size` then carries the true size.
    pub content: Option<String>,
    pub elided_size: Option<u64>,
}

/// A Memory annotated with a similarity distance and the hydration level at
/// which it was returned (spec §3). Lower distance = more similar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResult {
    pub memory: Memory,
    pub distance: f32,
    pub hydration_level: HydrationLevel,
    pub files: Vec<FileSnapshot>,
}

/// The diff between object-store contents and derived-index contents
/// (spec §3, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub missing_in_index: Vec<MemoryId>,
    pub orphaned_in_index: Vec<MemoryId>,
    pub hash_mismatches: Vec<MemoryId>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_in_index.is_empty()
            && self.orphaned_in_index.is_empty()
            && self.hash_mismatches.is_empty()
    }
}

/// Aggregate counters returned by `DerivedIndex::stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub total: u64,
    pub by_namespace: BTreeMap<String, u64>,
    pub by_spec: BTreeMap<String, u64>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_schema_version: u32,
}

/// Outcome of `OsaAdapter::fetch_remote`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchStats {
    pub namespaces_fetched: usize,
    pub refs_updated: usize,
}

/// Outcome of `OsaAdapter::merge_from_tracking`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeStats {
    pub namespaces_merged: usize,
    pub notes_added: usize,
    pub notes_deduped: usize,
}

/// Outcome of `OsaAdapter::push_remote`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushStats {
    pub namespaces_pushed: usize,
    pub refs_updated: usize,
}

/// Outcome of `SyncService::sync_with_remote`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSyncResult {
    pub fetch: FetchStats,
    pub merge: MergeStats,
    pub push: Option<PushStats>,
    pub reindexed: usize,
}
