//! Realistic `CaptureInput` fixtures for the scenarios in the integration
//! tests: a handful of concrete captures per namespace rather than a
//! generic, parameterized generator, since coverage here is about matching
//! scenarios to their expected outcomes, not sheer volume.

use cairn_core::capture::CaptureInput;
use cairn_core::model::Domain;

pub struct CaptureFixtures;

impl CaptureFixtures {
    /// The three storage-engine decisions used throughout the recall
    /// ranking scenarios: ordered so the first two are the closest match to
    /// a "durable storage choice" query and the third (Raft vs Paxos) is
    /// the odd one out.
    pub fn storage_decisions() -> Vec<CaptureInput> {
        vec![
            CaptureInput::new(
                "decisions",
                "B-tree chosen for reads",
                "B-tree chosen for reads: the read-heavy access pattern favors B-tree locality over LSM compaction overhead.",
            ),
            CaptureInput::new(
                "decisions",
                "LSM chosen for writes",
                "LSM chosen for writes: the write-heavy ingest path favors LSM's append-only compaction over B-tree random writes.",
            ),
            CaptureInput::new(
                "decisions",
                "Chose Raft over Paxos",
                "Chose Raft over Paxos for cluster consensus: operational simplicity outweighs Paxos's extra flexibility.",
            ),
        ]
    }

    pub fn single_decision() -> CaptureInput {
        CaptureInput::new("decisions", "Use B-tree over LSM", "Rationale: read-heavy workload.")
    }

    /// Exceeds `Memory::MAX_SUMMARY_LEN`; exercises the `InvalidSummary`
    /// rejection path before anything reaches the object store.
    pub fn oversize_summary() -> CaptureInput {
        CaptureInput::new("learnings", "x".repeat(101), "y")
    }

    pub fn blocker(summary: &str, content: &str) -> CaptureInput {
        CaptureInput::new("blockers", summary, content)
    }

    pub fn progress(summary: &str, content: &str) -> CaptureInput {
        CaptureInput::new("progress", summary, content)
    }

    /// A learning that references a source file, for FILES-level hydration
    /// scenarios — `scan_file_paths` picks up `src/lib.rs` as a path token.
    pub fn learning_referencing_file(path: &str) -> CaptureInput {
        CaptureInput::new(
            "learnings",
            "Refactored the entrypoint",
            format!("Split the startup logic out of {path} into a dedicated module."),
        )
    }

    pub fn user_domain(namespace: &str, summary: &str, content: &str) -> CaptureInput {
        let mut input = CaptureInput::new(namespace, summary, content);
        input.domain = Domain::User;
        input
    }
}
