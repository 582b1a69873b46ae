//! Shared stdin/stdout machinery for the five hook binaries (spec §6): read
//! one bounded JSON document, write one JSON document, exit 0 regardless.

use serde::Serialize;
use std::io::Read;

/// Reads stdin up to `max_bytes`, returning `None` (not an error) if the
/// cap is exceeded — spec §6: "beyond which the hook returns a non-blocking
/// empty response", never a failure exit.
pub fn read_bounded_stdin(max_bytes: u64) -> Option<Vec<u8>> {
    let mut stdin = std::io::stdin().lock();
    let mut buf = Vec::new();
    let mut limited = (&mut stdin).take(max_bytes + 1);
    if limited.read_to_end(&mut buf).is_err() {
        return None;
    }
    if buf.len() as u64 > max_bytes {
        return None;
    }
    Some(buf)
}

/// Writes `value` to stdout as a single JSON document and always returns
/// exit code 0 — hook errors are carried inside the JSON body, never as a
/// process exit code (spec §6).
pub fn respond<T: Serialize>(value: &T) -> std::process::ExitCode {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(_) => println!("{{}}"),
    }
    std::process::ExitCode::from(0)
}

/// An empty, non-blocking hook response: used when stdin is empty, oversize,
/// unparseable, or the repository can't be opened — every failure mode a
/// hook can hit still exits 0 with *some* valid JSON document.
#[derive(Debug, Serialize, Default)]
pub struct EmptyResponse {}

pub fn respond_empty() -> std::process::ExitCode {
    respond(&EmptyResponse::default())
}
