//! Shared harness and fixtures for the integration-test binaries under
//! `tests/`. Not part of the published workspace — exists only to keep the
//! per-journey test files thin.

pub mod harness;
pub mod mocks;
