//! Stderr-only logging setup — stdout is reserved for the hook JSON envelope
//! or CLI output (spec §6), so tracing must never write there.

use tracing_subscriber::EnvFilter;

/// Human-readable format for the interactive `cairn` CLI.
pub fn init_cli() {
    let filter = EnvFilter::try_from_env("CAIRN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// JSON format for hook binaries — structured lines a host runtime can
/// collect without interleaving with the stdout JSON envelope.
pub fn init_hook() {
    let filter = EnvFilter::try_from_env("CAIRN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().json().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
