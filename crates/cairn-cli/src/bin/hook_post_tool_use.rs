//! `cairn-hook-post-tool-use`: a no-op pass-through by default. The
//! signal-detection heuristics that decide whether a tool result is worth
//! remembering are explicitly out of scope for this crate; this hook exists
//! so a host runtime always has a `PostToolUse` endpoint to call, and leaves
//! [`ToolUseClassifier`] as the seam a pluggable heuristic would implement.

use cairn_cli::hook_io::{read_bounded_stdin, respond_empty};
use serde_json::Value;
use std::process::ExitCode;

/// External collaborator seam: decides whether a completed tool call is
/// worth turning into a memory. The default implementation never is.
trait ToolUseClassifier {
    fn worth_remembering(&self, _tool_name: &str, _tool_input: &Value, _tool_response: &Value) -> bool {
        false
    }
}

struct NoopClassifier;
impl ToolUseClassifier for NoopClassifier {}

fn main() -> ExitCode {
    cairn_cli::logging::init_hook();

    // A config/repo open failure still must not block the host; fall
    // through to the same empty response either way.
    let max_bytes = cairn_cli::repo::open_application()
        .map(|app| app.config().hook_max_input_bytes)
        .unwrap_or(10 * 1024 * 1024);
    let Some(raw) = read_bounded_stdin(max_bytes) else {
        return respond_empty();
    };

    let classifier = NoopClassifier;
    if let Ok(body) = serde_json::from_slice::<Value>(&raw) {
        let tool_name = body.get("toolName").and_then(Value::as_str).unwrap_or("");
        let tool_input = body.get("toolInput").cloned().unwrap_or(Value::Null);
        let tool_response = body.get("toolResponse").cloned().unwrap_or(Value::Null);
        if classifier.worth_remembering(tool_name, &tool_input, &tool_response) {
            tracing::info!(tool_name, "tool use flagged as worth remembering, but no capture policy is wired up");
        }
    }

    respond_empty()
}
