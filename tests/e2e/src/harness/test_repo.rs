//! An isolated temp-directory git repository wired through [`Application`],
//! the same way the `cairn` CLI and hook binaries open one.

use cairn_core::app::Application;
use cairn_core::capture::CaptureInput;
use cairn_core::model::CaptureResult;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct TestRepo {
    dir: TempDir,
    pub app: Application,
}

impl TestRepo {
    /// Creates a fresh git repository with one empty initial commit and
    /// opens an `Application` against it.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp directory");
        init_git_repo(dir.path());
        let app = Application::open(dir.path(), None).expect("failed to open application");
        Self { dir, app }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn capture(&mut self, input: CaptureInput) -> Result<CaptureResult, cairn_core::error::CaptureError> {
        self.app.capture(input)
    }

    /// Writes `relative_path` with `contents` and commits it to HEAD, so a
    /// later FILES-level hydration has a real blob to read back.
    pub fn commit_file(&self, relative_path: &str, contents: &str) -> PathBuf {
        let full_path = self.dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent directories");
        }
        std::fs::write(&full_path, contents).expect("failed to write fixture file");

        let repo = git2::Repository::open(self.dir.path()).expect("failed to reopen repo");
        let mut index = repo.index().expect("failed to open git index");
        index.add_path(Path::new(relative_path)).expect("failed to stage fixture file");
        index.write().expect("failed to write git index");
        let tree_oid = index.write_tree().expect("failed to write tree");
        let tree = repo.find_tree(tree_oid).expect("failed to find tree");
        let sig = git2::Signature::now("test", "test@cairn.dev").expect("failed to build signature");
        let parent = repo.head().expect("repo has no HEAD").peel_to_commit().expect("HEAD is not a commit");
        repo.commit(Some("HEAD"), &sig, &sig, "add fixture file", &tree, &[&parent])
            .expect("failed to commit fixture file");

        full_path
    }
}

fn init_git_repo(path: &Path) {
    let repo = git2::Repository::init(path).expect("git init failed");
    let sig = git2::Signature::now("test", "test@cairn.dev").expect("failed to build signature");
    let tree_oid = repo.treebuilder(None).unwrap().write().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).expect("initial commit failed");
}
