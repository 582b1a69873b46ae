//! S3 (concurrent captures): two threads appending to the same
//! `(namespace, domain)` pair must both succeed, land on distinct ids, and
//! leave the derived index consistent with the object store afterward.

use cairn_core::capture::CaptureInput;
use cairn_core::model::Domain;
use cairn_e2e_tests::harness::ServiceHarness;

#[test]
fn concurrent_captures_to_same_namespace_get_distinct_ids() {
    let harness = ServiceHarness::new();

    let (a, b) = std::thread::scope(|scope| {
        let harness_ref = &harness;
        let thread_a = scope.spawn(move || {
            harness_ref.capture(CaptureInput::new("progress", "Thread A update", "Thread A finished its slice of work."))
        });
        let thread_b = scope.spawn(move || {
            harness_ref.capture(CaptureInput::new("progress", "Thread B update", "Thread B finished its slice of work."))
        });
        (thread_a.join().unwrap(), thread_b.join().unwrap())
    });

    let result_a = a.unwrap();
    let result_b = b.unwrap();
    assert!(result_a.success && result_b.success);

    let id_a = result_a.memory.unwrap().id;
    let id_b = result_b.memory.unwrap().id;
    assert_ne!(id_a, id_b, "concurrent captures to the same namespace must not collide on id");

    // Ordinals are assigned under the same advisory lock, so one capture
    // must have landed on ordinal 0 and the other on ordinal 1 — never both
    // on 0.
    let ordinals: Vec<&str> = [id_a.as_str(), id_b.as_str()]
        .iter()
        .map(|id| id.rsplit(':').next().unwrap())
        .collect();
    assert!(ordinals.contains(&"0") && ordinals.contains(&"1"));

    let report = harness.sync_service().verify_consistency(Domain::Project, None).unwrap();
    assert!(report.is_consistent());
}

#[test]
fn twenty_concurrent_captures_all_land_with_pairwise_distinct_ids() {
    let harness = ServiceHarness::new();
    const N: usize = 20;

    let results = std::thread::scope(|scope| {
        let harness_ref = &harness;
        let handles: Vec<_> = (0..N)
            .map(|i| {
                scope.spawn(move || {
                    harness_ref.capture(CaptureInput::new(
                        "blockers",
                        format!("blocker #{i}"),
                        format!("content body for blocker {i}"),
                    ))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
    });

    let mut ids: Vec<String> = results
        .into_iter()
        .map(|r| r.unwrap().memory.unwrap().id.as_str().to_string())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), N, "all concurrently captured ids must be pairwise distinct");

    let report = harness.sync_service().verify_consistency(Domain::Project, None).unwrap();
    assert!(report.is_consistent());
}
