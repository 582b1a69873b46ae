//! Shared plumbing for the `cairn` CLI and the lifecycle-hook binaries.
//!
//! Everything here sits at the process boundary: repo-root discovery,
//! marker recognition in free-text hook payloads, the session-start
//! injection envelope, and stderr-only logging setup. Domain logic lives in
//! `cairn-core`; this crate only wires it to stdin/stdout/argv.

pub mod envelope;
pub mod flush;
pub mod hook_io;
pub mod logging;
pub mod markers;
pub mod repo;
