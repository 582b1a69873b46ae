//! Derived Index (spec §4.3): a disposable, rebuildable-from-OSA projection.

pub mod migrations;
pub mod sqlite;

pub use sqlite::{sanitize_fts5_query, DerivedIndex, IndexedMemory};
