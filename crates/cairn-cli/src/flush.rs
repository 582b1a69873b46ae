//! Shared capture-oriented flush logic for `session-stop` and
//! `pre-compaction` (spec §6: "flush points the host may invoke before
//! losing context"). Both hooks accept the same payload shape: zero or more
//! pending memories the host wants durably recorded before it tears down or
//! compacts its own context window.

use cairn_core::app::Application;
use cairn_core::capture::CaptureInput;
use cairn_core::model::Domain;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Default)]
pub struct FlushInput {
    #[serde(default)]
    pub memories: Vec<PendingMemory>,
}

#[derive(Debug, Deserialize)]
pub struct PendingMemory {
    pub namespace: String,
    pub summary: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub domain: DomainField,
    #[serde(default)]
    pub spec: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DomainField {
    #[default]
    Project,
    User,
}

impl From<DomainField> for Domain {
    fn from(value: DomainField) -> Self {
        match value {
            DomainField::Project => Domain::Project,
            DomainField::User => Domain::User,
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct FlushOutput {
    pub captured: usize,
    pub failed: usize,
}

/// Captures every pending memory, never failing the hook as a whole if one
/// entry is rejected — a flush point's job is to lose as little as possible,
/// not to enforce correctness of individual entries.
pub fn flush(app: &mut Application, input: FlushInput) -> FlushOutput {
    let mut output = FlushOutput::default();
    for pending in input.memories {
        let mut capture_input = CaptureInput::new(pending.namespace, pending.summary, pending.content);
        capture_input.tags = pending.tags;
        capture_input.domain = pending.domain.into();
        capture_input.spec = pending.spec;
        match app.capture(capture_input) {
            Ok(result) if result.success => output.captured += 1,
            Ok(_) => output.failed += 1,
            Err(e) => {
                tracing::warn!(error = %e, "flush capture failed");
                output.failed += 1;
            }
        }
    }
    output
}
