//! S5 (recall ranking): given the three storage-decision captures, a
//! "durable storage choice" query with k=2 should rank the B-tree/LSM pair
//! ahead of the unrelated Raft-vs-Paxos decision, sorted by ascending
//! distance.

use cairn_core::recall::SearchFilters;
use cairn_e2e_tests::harness::TestRepo;
use cairn_e2e_tests::mocks::CaptureFixtures;

#[test]
fn storage_choice_query_ranks_related_decisions_first() {
    let mut repo = TestRepo::new();
    for input in CaptureFixtures::storage_decisions() {
        repo.capture(input).unwrap();
    }

    let filters = SearchFilters { k: 2, min_similarity: 0.0, ..SearchFilters::default() };
    let results = repo.app.recall().search("durable storage choice", &filters).unwrap();

    assert!(results.len() <= 2);
    assert!(results.windows(2).all(|pair| pair[0].distance <= pair[1].distance), "results must be sorted by ascending distance");

    let raft_id_in_top_two = results.iter().any(|r| r.memory.summary.contains("Raft"));
    assert!(!raft_id_in_top_two, "the Raft/Paxos decision is the odd one out and should not make the top 2");
}

#[test]
fn search_never_returns_more_than_k_results() {
    let mut repo = TestRepo::new();
    for input in CaptureFixtures::storage_decisions() {
        repo.capture(input).unwrap();
    }

    let filters = SearchFilters { k: 1, ..SearchFilters::default() };
    let results = repo.app.recall().search("storage engine", &filters).unwrap();
    assert!(results.len() <= 1);
}

#[test]
fn min_similarity_threshold_can_exclude_the_unrelated_decision() {
    let mut repo = TestRepo::new();
    for input in CaptureFixtures::storage_decisions() {
        repo.capture(input).unwrap();
    }

    let filters = SearchFilters { k: 5, min_similarity: 0.999, ..SearchFilters::default() };
    let results = repo.app.recall().search("durable storage choice", &filters).unwrap();
    // A near-impossible-to-clear threshold should filter out everything but
    // a near-exact match, never more than the unfiltered result set.
    assert!(results.len() <= 3);
}
