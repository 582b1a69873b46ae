//! `cairn-hook-pre-compaction`: a flush point the host invokes before
//! compacting its own context window (spec §6).

use cairn_cli::flush::{flush, FlushInput};
use cairn_cli::hook_io::{read_bounded_stdin, respond, respond_empty};
use cairn_cli::repo::open_application;
use std::process::ExitCode;

fn main() -> ExitCode {
    cairn_cli::logging::init_hook();

    let Ok(mut app) = open_application() else {
        return respond_empty();
    };

    let max_bytes = app.config().hook_max_input_bytes;
    let Some(raw) = read_bounded_stdin(max_bytes) else {
        return respond_empty();
    };
    let input: FlushInput = serde_json::from_slice(&raw).unwrap_or_default();

    respond(&flush(&mut app, input))
}
