//! S1 (single capture) and S2 (oversize summary) from the testable
//! properties, plus the `capture -> reindex -> verify_consistency`
//! quantified invariant, driven through the full `Application` surface the
//! way the CLI does.

use cairn_core::error::CaptureError;
use cairn_core::model::Domain;
use cairn_e2e_tests::harness::TestRepo;
use cairn_e2e_tests::mocks::CaptureFixtures;

#[test]
fn single_capture_is_indexed_and_ided_with_ordinal_zero() {
    let mut repo = TestRepo::new();
    let result = repo.capture(CaptureFixtures::single_decision()).unwrap();

    assert!(result.success);
    assert!(result.indexed);
    let memory = result.memory.unwrap();
    assert!(memory.id.as_str().starts_with("decisions:"));
    assert!(memory.id.as_str().ends_with(":0"));

    let stats = repo.app.index().stats().unwrap();
    assert_eq!(stats.by_namespace.get("decisions"), Some(&1));
}

#[test]
fn oversize_summary_is_rejected_before_any_durable_append() {
    let mut repo = TestRepo::new();
    let err = repo.capture(CaptureFixtures::oversize_summary()).unwrap_err();
    assert!(matches!(err, CaptureError::InvalidSummary(_)));

    let stats = repo.app.index().stats().unwrap();
    assert_eq!(stats.total, 0);
}

#[test]
fn capture_then_reindex_then_verify_is_consistent() {
    let mut repo = TestRepo::new();
    repo.capture(CaptureFixtures::single_decision()).unwrap();
    repo.capture(CaptureFixtures::progress("shipped the indexer", "finished the FTS5 wiring today")).unwrap();

    let sync = repo.app.sync();
    let reindex_stats = sync.reindex(Domain::Project, None, true).unwrap();
    assert_eq!(reindex_stats.scanned, 2);

    let report = sync.verify_consistency(Domain::Project, None).unwrap();
    assert!(report.is_consistent());
}
