//! Additive-only schema migrations for the derived index (spec §4.3).
//!
//! Migrations only ever add tables/columns/indexes; there is no down
//! migration, matching spec §1's "schema evolution beyond additive
//! migration" non-goal. `schema_meta.version` records how far a database has
//! been migrated; opening a database with a version newer than this binary
//! knows about is a fatal `IndexError::SchemaFromFuture`, never a silent
//! downgrade.

/// A single migration step.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, vec_memories, schema_meta, FTS5",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Track last remote sync timestamp in schema_meta",
        up: MIGRATION_V2_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS schema_meta (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    version INTEGER NOT NULL,
    embedding_dim INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    domain TEXT NOT NULL,
    summary TEXT NOT NULL,
    content_prefix TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    spec TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    relates_to TEXT NOT NULL DEFAULT '[]',
    commit_ref TEXT NOT NULL,
    ordinal INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_namespace ON memories(namespace);
CREATE INDEX IF NOT EXISTS idx_memories_spec ON memories(spec);
CREATE INDEX IF NOT EXISTS idx_memories_domain ON memories(domain);
CREATE INDEX IF NOT EXISTS idx_memories_commit_ref ON memories(commit_ref);

CREATE TABLE IF NOT EXISTS vec_memories (
    id TEXT PRIMARY KEY REFERENCES memories(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id UNINDEXED,
    summary,
    content_prefix,
    content='memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, id, summary, content_prefix)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.content_prefix);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, summary, content_prefix)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.content_prefix);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, summary, content_prefix)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.content_prefix);
    INSERT INTO memories_fts(rowid, id, summary, content_prefix)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.content_prefix);
END;
"#;

const MIGRATION_V2_UP: &str = r#"
ALTER TABLE schema_meta ADD COLUMN last_sync TEXT;
"#;
