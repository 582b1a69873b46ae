//! S4 (embed failure, store succeeds) and the general consistency
//! invariant `capture -> reindex -> verify_consistency().is_consistent`,
//! exercised against the raw OSA/index/sync components so a note can be
//! durably appended without ever reaching the index — the same situation
//! an embedding-backend failure leaves behind.

use cairn_core::capture::{content_hash_hex, CaptureInput};
use cairn_core::codec;
use cairn_core::index::IndexedMemory;
use cairn_core::model::{Domain, MemoryId, Namespace, Status};
use cairn_e2e_tests::harness::ServiceHarness;

#[test]
fn note_durable_without_index_row_is_caught_and_repaired() {
    let harness = ServiceHarness::new();

    // Simulate the capture pipeline's steps 1-4 without step 6/7 (embed +
    // index) ever running, the state an embedding-backend failure leaves.
    let memory = sample_memory();
    let (commit_ref, ordinal) =
        harness.osa.append(Domain::Project, Namespace::Blockers, &codec::serialize(&memory), 1_000).unwrap();
    let id = MemoryId::new(Namespace::Blockers, &commit_ref, ordinal, Domain::Project);

    assert!(harness.osa.read(Domain::Project, Namespace::Blockers, &commit_ref, ordinal).is_ok());
    assert!(harness.index.get(&id).unwrap().is_none());

    let sync = harness.sync_service();
    let report = sync.verify_consistency(Domain::Project, None).unwrap();
    assert!(report.missing_in_index.contains(&id));
    assert!(!report.is_consistent());

    let repair_stats = sync.repair(Domain::Project, &report).unwrap();
    assert_eq!(repair_stats.reinserted, 1);

    let report_after = sync.verify_consistency(Domain::Project, None).unwrap();
    assert!(report_after.is_consistent());
}

#[test]
fn stale_content_hash_is_flagged_as_mismatch_and_repaired() {
    let harness = ServiceHarness::new();
    let result = harness.capture(CaptureInput::new("decisions", "pin the dependency", "pinned rusqlite to 0.38 for FTS5 stability")).unwrap();
    let memory = result.memory.unwrap();

    let mut row = harness.index.get(&memory.id).unwrap().unwrap();
    row.content_hash = content_hash_hex(b"stale");
    harness.index.upsert(&row, None).unwrap();

    let sync = harness.sync_service();
    let report = sync.verify_consistency(Domain::Project, None).unwrap();
    assert!(report.hash_mismatches.contains(&memory.id));

    let repair_stats = sync.repair(Domain::Project, &report).unwrap();
    assert_eq!(repair_stats.overwritten, 1);

    let fixed_row = harness.index.get(&memory.id).unwrap().unwrap();
    assert_eq!(fixed_row.content_hash, content_hash_hex(&codec::serialize(&memory)));
}

#[test]
fn capture_then_reindex_is_idempotent_and_consistent() {
    let harness = ServiceHarness::new();
    harness.capture(CaptureInput::new("learnings", "fts5 needs the bundled feature", "rusqlite's fts5 Cargo feature must be enabled explicitly")).unwrap();

    let sync = harness.sync_service();
    let first = sync.reindex(Domain::Project, None, false).unwrap();
    let second = sync.reindex(Domain::Project, None, false).unwrap();
    assert_eq!(first.upserted, second.upserted);

    let report = sync.verify_consistency(Domain::Project, None).unwrap();
    assert!(report.is_consistent());
}

fn sample_memory() -> cairn_core::model::Memory {
    cairn_core::model::Memory {
        id: MemoryId::new(Namespace::Blockers, "pending", 0, Domain::Project),
        namespace: Namespace::Blockers,
        domain: Domain::Project,
        summary: "waiting on upstream fix".to_string(),
        content: "blocked until the upstream crate cuts a release with the patch".to_string(),
        timestamp: chrono::Utc::now(),
        tags: vec![],
        spec: None,
        status: Status::Active,
        relates_to: vec![],
        extra: Default::default(),
    }
}
