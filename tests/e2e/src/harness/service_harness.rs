//! White-box component wiring: the object store, derived index, and a
//! deterministic embedding backend, assembled the same way `Application`
//! does but with each handle exposed — for tests that need to poke one
//! layer (e.g. insert an orphaned index row) without going through the
//! full capture pipeline.

use cairn_core::capture::{CaptureInput, CaptureService, NoopFilter};
use cairn_core::embeddings::DeterministicBackend;
use cairn_core::error::CaptureError;
use cairn_core::index::DerivedIndex;
use cairn_core::model::CaptureResult;
use cairn_core::osa::OsaAdapter;
use cairn_core::recall::RecallService;
use cairn_core::sync::SyncService;
use tempfile::TempDir;

pub const EMBEDDING_DIM: usize = 16;
pub const LOCK_TIMEOUT_MS: u64 = 2_000;

pub struct ServiceHarness {
    _dir: TempDir,
    pub osa: OsaAdapter,
    pub index: DerivedIndex,
    pub embeddings: DeterministicBackend,
    filter: NoopFilter,
}

impl ServiceHarness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp directory");
        let repo = git2::Repository::init(dir.path()).expect("git init failed");
        let sig = git2::Signature::now("test", "test@cairn.dev").expect("failed to build signature");
        let tree_oid = repo.treebuilder(None).unwrap().write().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).expect("initial commit failed");

        let osa = OsaAdapter::new(dir.path(), "cairn").expect("failed to open OSA");
        let index = DerivedIndex::open(&dir.path().join("idx.sqlite3"), EMBEDDING_DIM).expect("failed to open index");
        Self { _dir: dir, osa, index, embeddings: DeterministicBackend::new(EMBEDDING_DIM), filter: NoopFilter }
    }

    pub fn capture_service(&self) -> CaptureService<'_> {
        CaptureService::new(&self.osa, &self.index, &self.embeddings, &self.filter)
    }

    pub fn sync_service(&self) -> SyncService<'_> {
        SyncService::new(&self.osa, &self.index, &self.embeddings, 32)
    }

    pub fn recall_service(&self) -> RecallService<'_> {
        RecallService::new(&self.osa, &self.index, &self.embeddings, 8, 16_384)
    }

    pub fn capture(&self, input: CaptureInput) -> Result<CaptureResult, CaptureError> {
        self.capture_service().capture(input, LOCK_TIMEOUT_MS)
    }
}
