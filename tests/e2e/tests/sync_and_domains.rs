//! Reindex idempotency at the `Application` level, and project/user domain
//! isolation: a capture into the user-domain store must never surface
//! under a project-only search and vice versa.

use cairn_core::capture::CaptureInput;
use cairn_core::model::Domain;
use cairn_core::recall::{DomainScope, SearchFilters};
use cairn_e2e_tests::harness::{ServiceHarness, TestRepo};
use tempfile::TempDir;

#[test]
fn reindex_through_application_is_idempotent() {
    let mut repo = TestRepo::new();
    repo.capture(CaptureInput::new("retrospective", "sprint went well", "shipped the sync service on schedule")).unwrap();

    let sync = repo.app.sync();
    let first = sync.reindex(Domain::Project, None, false).unwrap();
    let second = sync.reindex(Domain::Project, None, false).unwrap();
    assert_eq!(first.upserted, second.upserted);
    assert_eq!(repo.app.index().stats().unwrap().total, 1);
}

#[test]
fn user_domain_capture_is_isolated_from_project_domain_search() {
    let mut harness = ServiceHarness::new();
    let user_store_dir = TempDir::new().unwrap();
    harness.osa.ensure_user_store(user_store_dir.path(), "cairn").unwrap();

    harness.capture(CaptureInput::new("learnings", "project-only note", "only visible in the project domain")).unwrap();

    let mut user_input = CaptureInput::new("learnings", "user-only note", "only visible in the user domain");
    user_input.domain = Domain::User;
    harness.capture_service().capture(user_input, 1_000).unwrap();

    let project_only = SearchFilters { domain: DomainScope::Project, k: 10, ..SearchFilters::default() };
    let project_results = harness.recall_service().search_text("note", &project_only).unwrap();
    assert!(project_results.iter().all(|m| m.domain == Domain::Project));
    assert!(project_results.iter().any(|m| m.summary.contains("project-only")));

    let user_only = SearchFilters { domain: DomainScope::User, k: 10, ..SearchFilters::default() };
    let user_results = harness.recall_service().search_text("note", &user_only).unwrap();
    assert!(user_results.iter().all(|m| m.domain == Domain::User));
    assert!(user_results.iter().any(|m| m.summary.contains("user-only")));
}
