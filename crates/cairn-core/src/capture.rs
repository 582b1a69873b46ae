//! Capture Service (spec §4.4): validated, durable, indexed creation of a
//! [`Memory`].
//!
//! `DURABLE` (step 4, the OSA append) is the irreversibility barrier: once a
//! note is appended, embedding and indexing failures are reported as
//! warnings, never unwound. Sync Service reconciles anything left
//! unembedded/unindexed on its next pass.

use crate::codec;
use crate::embeddings::EmbeddingBackend;
use crate::error::CaptureError;
use crate::index::{DerivedIndex, IndexedMemory};
use crate::model::{CaptureResult, Domain, Memory, MemoryId, Namespace, Status};
use crate::osa::OsaAdapter;
use chrono::Utc;

/// Input to [`capture`]. `namespace` is taken as a raw string so malformed
/// input produces `InvalidNamespace` rather than failing to parse upstream.
#[derive(Debug, Clone)]
pub struct CaptureInput {
    pub namespace: String,
    pub summary: String,
    pub content: String,
    pub tags: Vec<String>,
    pub spec: Option<String>,
    pub domain: Domain,
    pub relates_to: Vec<MemoryId>,
}

impl CaptureInput {
    pub fn new(namespace: impl Into<String>, summary: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            summary: summary.into(),
            content: content.into(),
            tags: Vec::new(),
            spec: None,
            domain: Domain::Project,
            relates_to: Vec::new(),
        }
    }
}

/// The outcome of passing a candidate capture through a [`ContentFilter`].
#[derive(Debug, Clone)]
pub enum FilterOutcome {
    Pass,
    /// The filter redacted/masked part of the content; capture proceeds with
    /// the rewritten text and a warning is attached to the result.
    Rewrite { summary: String, content: String, warning: String },
    /// The filter rejected the capture outright (spec §4.4: `ContentBlocked`).
    Reject(String),
}

/// Adversarial screening is an external, pluggable concern (spec §1): the
/// core defines this seam, not the policy behind it. Object-safe so
/// `Application` can hold it as `Box<dyn ContentFilter>`.
pub trait ContentFilter: Send + Sync {
    fn screen(&self, summary: &str, content: &str) -> FilterOutcome;
}

/// Default pass-through filter: no external screening configured.
pub struct NoopFilter;

impl ContentFilter for NoopFilter {
    fn screen(&self, _summary: &str, _content: &str) -> FilterOutcome {
        FilterOutcome::Pass
    }
}

/// Borrows the services it needs for the duration of one or more `capture`
/// calls; holds no state of its own (spec §9: explicit ownership via the
/// application context, no service-level globals).
pub struct CaptureService<'a> {
    osa: &'a OsaAdapter,
    index: &'a DerivedIndex,
    embeddings: &'a dyn EmbeddingBackend,
    filter: &'a dyn ContentFilter,
    content_prefix_bytes: usize,
}

impl<'a> CaptureService<'a> {
    pub fn new(
        osa: &'a OsaAdapter,
        index: &'a DerivedIndex,
        embeddings: &'a dyn EmbeddingBackend,
        filter: &'a dyn ContentFilter,
    ) -> Self {
        Self { osa, index, embeddings, filter, content_prefix_bytes: 2048 }
    }

    /// Runs the spec §4.4 algorithm, steps 1–8.
    pub fn capture(&self, input: CaptureInput, lock_timeout_ms: u64) -> Result<CaptureResult, CaptureError> {
        let namespace = Namespace::parse(&input.namespace)
            .ok_or_else(|| CaptureError::InvalidNamespace(input.namespace.clone()))?;

        if input.summary.is_empty() || input.summary.chars().count() > Memory::MAX_SUMMARY_LEN || input.summary.contains('\n') {
            return Err(CaptureError::InvalidSummary(format!(
                "summary must be 1-{} characters with no embedded newlines",
                Memory::MAX_SUMMARY_LEN
            )));
        }
        if input.content.is_empty() {
            return Err(CaptureError::InvalidContent("content must not be empty".to_string()));
        }

        let mut summary = input.summary.clone();
        let mut content = input.content.clone();
        let mut warning = None;

        match self.filter.screen(&summary, &content) {
            FilterOutcome::Pass => {}
            FilterOutcome::Rewrite { summary: s, content: c, warning: w } => {
                summary = s;
                content = c;
                warning = Some(w);
            }
            FilterOutcome::Reject(reason) => {
                self.record_blocked(namespace, input.domain, &summary, &content, &reason, lock_timeout_ms);
                return Err(CaptureError::ContentBlocked(reason));
            }
        }

        let mut tags = input.tags.clone();
        tags.sort();
        tags.dedup();

        let provisional_id = MemoryId::new(namespace, "pending", 0, input.domain);
        let memory = Memory {
            id: provisional_id,
            namespace,
            domain: input.domain,
            summary,
            content,
            timestamp: Utc::now(),
            tags,
            spec: input.spec,
            status: Status::Active,
            relates_to: input.relates_to,
            extra: Default::default(),
        };

        let bytes = codec::serialize(&memory);

        let (commit_ref, ordinal) = self
            .osa
            .append(input.domain, namespace, &bytes, lock_timeout_ms)
            .map_err(CaptureError::from)?;

        let mut memory = memory;
        memory.id = MemoryId::new(namespace, &commit_ref, ordinal, input.domain);

        let (indexed, embed_warning) = self.embed_and_index(&memory, &commit_ref, ordinal);
        let warning = embed_warning.or(warning);

        Ok(CaptureResult { success: true, memory: Some(memory), indexed, warning })
    }

    fn record_blocked(
        &self,
        namespace: Namespace,
        domain: Domain,
        summary: &str,
        content: &str,
        reason: &str,
        lock_timeout_ms: u64,
    ) {
        let audit = format!(
            "namespace: {}\ndomain: {}\nreason: {reason}\nsummary: {summary}\n---\n{content}",
            namespace.as_str(),
            domain.as_str()
        );
        if let Err(e) = self.osa.append_blocked(domain, audit.as_bytes(), lock_timeout_ms) {
            tracing::warn!(error = %e, "failed to record blocked-content audit entry");
        }
    }

    /// Steps 6–7: embedding and indexing never roll back the durable note
    /// (spec §4.4). Returns `(indexed, warning)`.
    fn embed_and_index(&self, memory: &Memory, commit_ref: &str, ordinal: u32) -> (bool, Option<String>) {
        let embedding = match self.embeddings.embed(&memory.content) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(id = %memory.id, error = %e, "embedding failed, capture remains durable");
                return (false, Some("embedding-failed".to_string()));
            }
        };

        let row = IndexedMemory {
            id: memory.id.clone(),
            namespace: memory.namespace,
            domain: memory.domain,
            summary: memory.summary.clone(),
            content_prefix: memory.content_prefix(self.content_prefix_bytes),
            content_hash: content_hash_hex(&codec::serialize(memory)),
            timestamp: memory.timestamp,
            tags: memory.tags.clone(),
            spec: memory.spec.clone(),
            status: memory.status,
            relates_to: memory.relates_to.clone(),
            commit_ref: commit_ref.to_string(),
            ordinal,
        };

        match self.index.upsert(&row, Some(&embedding)) {
            Ok(()) => (true, None),
            Err(e) => {
                tracing::warn!(id = %memory.id, error = %e, "derived index insert failed, capture remains durable");
                (false, Some("index-failed".to_string()))
            }
        }
    }
}

/// A stable, cheap content hash used for `verify_consistency`'s hash-mismatch
/// comparison. Not cryptographic; collision resistance isn't a requirement
/// here, only change detection against the object store.
pub fn content_hash_hex(bytes: &[u8]) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::DeterministicBackend;
    use tempfile::TempDir;

    fn setup() -> (TempDir, OsaAdapter, DerivedIndex) {
        let dir = TempDir::new().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        let sig = git2::Signature::now("t", "t@t.com").unwrap();
        let tree_oid = repo.treebuilder(None).unwrap().write().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();
        let osa = OsaAdapter::new(dir.path(), "cairn").unwrap();
        let index = DerivedIndex::open(&dir.path().join("idx.sqlite3"), 16).unwrap();
        (dir, osa, index)
    }

    #[test]
    fn single_capture_is_indexed_and_recorded() {
        let (_dir, osa, index) = setup();
        let embeddings = DeterministicBackend::new(16);
        let filter = NoopFilter;
        let cs = CaptureService::new(&osa, &index, &embeddings, &filter);

        let input = CaptureInput::new("decisions", "Use B-tree over LSM", "Rationale: read-heavy workload.");
        let result = cs.capture(input, 1000).unwrap();

        assert!(result.success);
        assert!(result.indexed);
        let memory = result.memory.unwrap();
        assert!(memory.id.as_str().starts_with("decisions:"));
        assert_eq!(index.stats().unwrap().by_namespace.get("decisions"), Some(&1));
    }

    #[test]
    fn oversize_summary_is_rejected_before_any_append() {
        let (_dir, osa, index) = setup();
        let embeddings = DeterministicBackend::new(16);
        let filter = NoopFilter;
        let cs = CaptureService::new(&osa, &index, &embeddings, &filter);

        let input = CaptureInput::new("learnings", "x".repeat(101), "y");
        let err = cs.capture(input, 1000).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidSummary(_)));
        assert_eq!(index.stats().unwrap().total, 0);
    }

    #[test]
    fn empty_content_is_rejected() {
        let (_dir, osa, index) = setup();
        let embeddings = DeterministicBackend::new(16);
        let filter = NoopFilter;
        let cs = CaptureService::new(&osa, &index, &embeddings, &filter);

        let input = CaptureInput::new("learnings", "ok", "");
        let err = cs.capture(input, 1000).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidContent(_)));
    }

    #[test]
    fn unknown_namespace_is_rejected() {
        let (_dir, osa, index) = setup();
        let embeddings = DeterministicBackend::new(16);
        let filter = NoopFilter;
        let cs = CaptureService::new(&osa, &index, &embeddings, &filter);

        let input = CaptureInput::new("not-a-namespace", "ok", "content");
        let err = cs.capture(input, 1000).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidNamespace(_)));
    }

    struct RejectAllFilter;
    impl ContentFilter for RejectAllFilter {
        fn screen(&self, _summary: &str, _content: &str) -> FilterOutcome {
            FilterOutcome::Reject("contains a secret".to_string())
        }
    }

    #[test]
    fn blocked_content_is_recorded_as_audit_entry_not_silently_dropped() {
        let (_dir, osa, index) = setup();
        let embeddings = DeterministicBackend::new(16);
        let filter = RejectAllFilter;
        let cs = CaptureService::new(&osa, &index, &embeddings, &filter);

        let input = CaptureInput::new("learnings", "ok", "sk-some-secret-token");
        let err = cs.capture(input, 1000).unwrap_err();
        assert!(matches!(err, CaptureError::ContentBlocked(_)));
        // Not indexed, and not visible under the real namespace.
        assert_eq!(index.stats().unwrap().total, 0);
        assert!(osa.list(Domain::Project, Namespace::Learnings).unwrap().is_empty());
    }

    struct FailingBackend;
    impl EmbeddingBackend for FailingBackend {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, crate::embeddings::EmbeddingError> {
            Err(crate::embeddings::EmbeddingError::EmbeddingFailed("offline".to_string()))
        }
        fn dimensions(&self) -> usize {
            16
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn embed_failure_leaves_note_durable_but_unindexed() {
        let (_dir, osa, index) = setup();
        let embeddings = FailingBackend;
        let filter = NoopFilter;
        let cs = CaptureService::new(&osa, &index, &embeddings, &filter);

        let input = CaptureInput::new("progress", "Shipped the thing", "Details.");
        let result = cs.capture(input, 1000).unwrap();

        assert!(result.success);
        assert!(!result.indexed);
        assert_eq!(result.warning.as_deref(), Some("embedding-failed"));
        let memory = result.memory.unwrap();
        // The note is durable in OSA even though it never reached DI.
        let records = osa.list(Domain::Project, Namespace::Progress).unwrap();
        assert_eq!(records.len(), 1);
        assert!(index.get(&memory.id).unwrap().is_none());
    }
}
