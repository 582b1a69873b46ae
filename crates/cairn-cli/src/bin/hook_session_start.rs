//! `cairn-hook-session-start`: runs `proactive_recall` and emits the
//! `<memory_consolidated_summaries>` injection envelope (spec §6).

use cairn_cli::envelope::SessionStartOutput;
use cairn_cli::hook_io::{read_bounded_stdin, respond, respond_empty};
use cairn_cli::repo::open_application;
use serde::Deserialize;
use std::process::ExitCode;

#[derive(Debug, Deserialize, Default)]
struct SessionStartInput {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    spec: Option<String>,
}

fn main() -> ExitCode {
    cairn_cli::logging::init_hook();

    let Ok(app) = open_application() else {
        return respond_empty();
    };

    let max_bytes = app.config().hook_max_input_bytes;
    let Some(raw) = read_bounded_stdin(max_bytes) else {
        return respond_empty();
    };
    let input: SessionStartInput = serde_json::from_slice(&raw).unwrap_or_default();

    let trigger_terms: Vec<String> = input.session_id.into_iter().chain(input.prompt).collect();
    let budget = app.config().token_budget;
    match app.recall().proactive_recall(&trigger_terms, budget, input.spec.as_deref()) {
        Ok(doc) => respond(&SessionStartOutput::new(&doc)),
        Err(e) => {
            tracing::warn!(error = %e, "proactive_recall failed, returning empty session-start response");
            respond_empty()
        }
    }
}
