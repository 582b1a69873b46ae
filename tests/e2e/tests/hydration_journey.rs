//! S6 (progressive hydration): two memories that share a commit_ref should
//! cost one OSA batched read per commit_ref group rather than one per id,
//! and FILES level should attach the real blob for a path mentioned in the
//! content.

use cairn_core::model::HydrationLevel;
use cairn_e2e_tests::harness::TestRepo;
use cairn_e2e_tests::mocks::CaptureFixtures;

#[test]
fn hydrate_batch_groups_by_commit_ref_and_reads_full_content() {
    let mut repo = TestRepo::new();
    // Both captures land under the same HEAD commit, so they share one
    // commit_ref group for hydration purposes.
    let first = repo.capture(CaptureFixtures::progress("day one", "made progress on the note codec")).unwrap();
    let second = repo.capture(CaptureFixtures::progress("day two", "wired up the sqlite schema migrations")).unwrap();

    let id1 = first.memory.unwrap().id;
    let id2 = second.memory.unwrap().id;
    assert_eq!(id1.as_str().split(':').nth(1), id2.as_str().split(':').nth(1), "fixture setup expects a shared commit_ref");

    let results = repo.app.recall().hydrate_batch(&[id1.clone(), id2.clone()], HydrationLevel::Full).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.hydration_level == HydrationLevel::Full));
    assert!(results.iter().any(|r| r.memory.content.contains("note codec")));
    assert!(results.iter().any(|r| r.memory.content.contains("sqlite schema")));
}

#[test]
fn files_level_attaches_a_referenced_source_file() {
    let mut repo = TestRepo::new();
    repo.commit_file("src/lib.rs", "pub fn entrypoint() {}\n");

    let captured = repo.capture(CaptureFixtures::learning_referencing_file("src/lib.rs")).unwrap();
    let id = captured.memory.unwrap().id;

    let result = repo.app.recall().hydrate(&id, HydrationLevel::Files).unwrap();
    assert_eq!(result.hydration_level, HydrationLevel::Files);
    assert!(result.files.iter().any(|f| f.path == "src/lib.rs"));
    let file = result.files.iter().find(|f| f.path == "src/lib.rs").unwrap();
    assert_eq!(file.content.as_deref(), Some("pub fn entrypoint() {}\n"));
    assert!(file.elided_size.is_none());
}

#[test]
fn summary_level_never_touches_the_object_store_for_missing_notes() {
    let repo = TestRepo::new();
    let bogus_id = cairn_core::model::MemoryId("decisions:0000000000000000000000000000000000000000:0".to_string());
    // A summary-level hydration of an id with no index row simply yields no
    // results, rather than erroring out trying to read the object store.
    let results = repo.app.recall().hydrate_batch(&[bogus_id], HydrationLevel::Summary).unwrap();
    assert!(results.is_empty());
}
