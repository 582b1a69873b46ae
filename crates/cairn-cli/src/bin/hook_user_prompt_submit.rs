//! `cairn-hook-user-prompt-submit`: scans the submitted prompt for capture
//! markers (spec §6) and records each one as a memory.

use cairn_cli::hook_io::{read_bounded_stdin, respond_empty};
use cairn_cli::markers;
use cairn_cli::repo::open_application;
use cairn_core::capture::CaptureInput;
use serde::{Deserialize, Serialize};
use std::process::ExitCode;

#[derive(Debug, Deserialize, Default)]
struct UserPromptSubmitInput {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    spec: Option<String>,
}

#[derive(Debug, Serialize, Default)]
struct UserPromptSubmitOutput {
    captured: usize,
}

fn main() -> ExitCode {
    cairn_cli::logging::init_hook();

    let Ok(mut app) = open_application() else {
        return respond_empty();
    };

    let max_bytes = app.config().hook_max_input_bytes;
    let Some(raw) = read_bounded_stdin(max_bytes) else {
        return respond_empty();
    };
    let input: UserPromptSubmitInput = serde_json::from_slice(&raw).unwrap_or_default();

    let detected = markers::scan(&input.prompt);
    let mut captured = 0usize;
    for marker in detected {
        let namespace = marker.namespace.clone();
        let summary = summary_from(&marker.content);
        let mut capture_input = CaptureInput::new(namespace, summary, marker.content);
        capture_input.domain = marker.domain;
        capture_input.spec = input.spec.clone();
        match app.capture(capture_input) {
            Ok(result) => {
                if result.success {
                    captured += 1;
                }
            }
            Err(e) => tracing::warn!(error = %e, "marker capture failed"),
        }
    }

    cairn_cli::hook_io::respond(&UserPromptSubmitOutput { captured })
}

/// The codec requires a one-line summary with a fixed max length; a detected
/// marker's content rarely arrives pre-summarized, so this takes the first
/// line (or a truncated prefix of the first line) as a stand-in.
fn summary_from(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or(content);
    let mut summary: String = first_line.chars().take(cairn_core::model::Memory::MAX_SUMMARY_LEN).collect();
    if summary.is_empty() {
        summary = "(untitled memory)".to_string();
    }
    summary
}
