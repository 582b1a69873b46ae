//! SQLite-backed derived index (spec §4.3).
//!
//! Vector search is a single SQL statement — a join between `memories` and
//! `vec_memories` ordered by a registered scalar function — never a
//! Rust-side loop joining a separately-queried in-memory index against
//! per-row SQL lookups (spec §4.3 calls that N+1 shape a design-time
//! defect). Two connections are kept open per the teacher's reader/writer
//! split: one writer behind a mutex, one reader, both WAL-mode.

use crate::error::IndexError;
use crate::index::migrations::{CURRENT_SCHEMA_VERSION, MIGRATIONS};
use crate::model::{Domain, IndexStats, MemoryId, Namespace, Status};
use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// A row as stored in the index: every scalar field plus the OSA coordinates
/// needed to fetch full content/files on demand. Does *not* carry the full
/// memory body — the SUMMARY hydration level is served entirely from this
/// row; FULL and FILES levels fetch the body from the object store.
#[derive(Debug, Clone)]
pub struct IndexedMemory {
    pub id: MemoryId,
    pub namespace: Namespace,
    pub domain: Domain,
    pub summary: String,
    pub content_prefix: String,
    pub content_hash: String,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<String>,
    pub spec: Option<String>,
    pub status: Status,
    pub relates_to: Vec<MemoryId>,
    pub commit_ref: String,
    pub ordinal: u32,
}

pub struct DerivedIndex {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    embedding_dim: usize,
}

impl DerivedIndex {
    pub fn open(path: &Path, embedding_dim: usize) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = Connection::open(path)?;
        let reader = Connection::open(path)?;
        configure_connection(&writer)?;
        configure_connection(&reader)?;
        register_distance_function(&writer)?;
        register_distance_function(&reader)?;
        run_migrations(&writer)?;

        let index = Self { writer: Mutex::new(writer), reader: Mutex::new(reader), embedding_dim };
        index.reconcile_schema_meta(embedding_dim)?;
        Ok(index)
    }

    fn reconcile_schema_meta(&self, embedding_dim: usize) -> Result<(), IndexError> {
        let writer = self.writer.lock().expect("writer mutex poisoned");
        let existing: Option<(u32, usize)> = writer
            .query_row("SELECT version, embedding_dim FROM schema_meta WHERE id = 0", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        match existing {
            None => {
                writer.execute(
                    "INSERT INTO schema_meta (id, version, embedding_dim) VALUES (0, ?1, ?2)",
                    params![CURRENT_SCHEMA_VERSION, embedding_dim as i64],
                )?;
            }
            Some((found_version, found_dim)) => {
                if found_version > CURRENT_SCHEMA_VERSION {
                    return Err(IndexError::SchemaFromFuture {
                        found: found_version,
                        supported: CURRENT_SCHEMA_VERSION,
                    });
                }
                if found_dim != embedding_dim {
                    return Err(IndexError::DimensionMismatch { expected: found_dim, actual: embedding_dim });
                }
                if found_version < CURRENT_SCHEMA_VERSION {
                    writer.execute(
                        "UPDATE schema_meta SET version = ?1 WHERE id = 0",
                        params![CURRENT_SCHEMA_VERSION],
                    )?;
                }
            }
        }
        Ok(())
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Inserts or replaces a memory row, and its embedding if present.
    /// `indexed=false` in a `CaptureResult` corresponds to `embedding` being
    /// `None` here (spec S4: embed failure, store succeeds).
    pub fn upsert(&self, row: &IndexedMemory, embedding: Option<&[f32]>) -> Result<(), IndexError> {
        let writer = self.writer.lock().expect("writer mutex poisoned");
        writer.execute(
            "INSERT INTO memories
                (id, namespace, domain, summary, content_prefix, content_hash, timestamp, tags, spec, status, relates_to, commit_ref, ordinal)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                namespace=excluded.namespace, domain=excluded.domain, summary=excluded.summary,
                content_prefix=excluded.content_prefix, content_hash=excluded.content_hash,
                timestamp=excluded.timestamp, tags=excluded.tags, spec=excluded.spec,
                status=excluded.status, relates_to=excluded.relates_to,
                commit_ref=excluded.commit_ref, ordinal=excluded.ordinal",
            params![
                row.id.as_str(),
                row.namespace.as_str(),
                row.domain.as_str(),
                row.summary,
                row.content_prefix,
                row.content_hash,
                row.timestamp.to_rfc3339(),
                serde_json::to_string(&row.tags).unwrap_or_else(|_| "[]".to_string()),
                row.spec,
                row.status.as_str(),
                serde_json::to_string(&row.relates_to.iter().map(|id| id.as_str()).collect::<Vec<_>>())
                    .unwrap_or_else(|_| "[]".to_string()),
                row.commit_ref,
                row.ordinal,
            ],
        )?;
        if let Some(embedding) = embedding {
            if embedding.len() != self.embedding_dim {
                return Err(IndexError::DimensionMismatch { expected: self.embedding_dim, actual: embedding.len() });
            }
            writer.execute(
                "INSERT INTO vec_memories (id, embedding) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding",
                params![row.id.as_str(), embedding_to_blob(embedding)],
            )?;
        }
        Ok(())
    }

    pub fn get(&self, id: &MemoryId) -> Result<Option<IndexedMemory>, IndexError> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        reader
            .query_row(SELECT_MEMORY_COLUMNS_WHERE_ID, params![id.as_str()], row_to_indexed_memory)
            .optional()
            .map_err(IndexError::from)
    }

    pub fn delete(&self, id: &MemoryId) -> Result<bool, IndexError> {
        let writer = self.writer.lock().expect("writer mutex poisoned");
        let changed = writer.execute("DELETE FROM memories WHERE id = ?1", params![id.as_str()])?;
        Ok(changed > 0)
    }

    pub fn all_ids(&self) -> Result<Vec<MemoryId>, IndexError> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let mut stmt = reader.prepare("SELECT id FROM memories")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(MemoryId(row?));
        }
        Ok(ids)
    }

    /// Ids currently indexed under `(namespace, domain)` — used by sync's
    /// `full` reindex and `verify_consistency` to find orphaned rows without
    /// scanning the whole table in Rust.
    pub fn ids_for_namespace_domain(&self, namespace: Namespace, domain: Domain) -> Result<Vec<MemoryId>, IndexError> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let mut stmt = reader.prepare("SELECT id FROM memories WHERE namespace = ?1 AND domain = ?2")?;
        let rows = stmt.query_map(params![namespace.as_str(), domain.as_str()], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(MemoryId(row?));
        }
        Ok(ids)
    }

    /// Vector search: one join, ordered by the registered distance function,
    /// never an application-level merge of two separate query results.
    pub fn search_vector(
        &self,
        query_embedding: &[f32],
        k: usize,
        namespaces: Option<&[Namespace]>,
        domain: Option<Domain>,
        min_similarity: f32,
    ) -> Result<Vec<(IndexedMemory, f32)>, IndexError> {
        if query_embedding.len() != self.embedding_dim {
            return Err(IndexError::DimensionMismatch { expected: self.embedding_dim, actual: query_embedding.len() });
        }
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let max_distance = 1.0 - min_similarity;
        let ns_filter = namespaces.map(|ns| ns.iter().map(|n| format!("'{}'", n.as_str())).collect::<Vec<_>>().join(","));

        let mut sql = format!(
            "SELECT {cols}, cairn_cosine_distance(v.embedding, ?1) AS dist
             FROM memories m JOIN vec_memories v ON v.id = m.id
             WHERE dist <= ?2",
            cols = MEMORY_COLUMNS_PREFIXED
        );
        if let Some(list) = &ns_filter {
            sql.push_str(&format!(" AND m.namespace IN ({list})"));
        }
        if let Some(domain) = domain {
            sql.push_str(&format!(" AND m.domain = '{}'", domain.as_str()));
        }
        sql.push_str(" ORDER BY dist ASC, m.timestamp DESC, m.id ASC LIMIT ?3");

        let mut stmt = reader.prepare(&sql)?;
        let blob = embedding_to_blob(query_embedding);
        let rows = stmt.query_map(params![blob, max_distance, k as i64], |row| {
            let memory = row_to_indexed_memory(row)?;
            let dist: f32 = row.get(MEMORY_COLUMN_COUNT)?;
            Ok((memory, dist))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Full-text search over `summary || content_prefix` via FTS5 — the
    /// degraded-mode path when the embedding backend is unavailable (spec §7).
    pub fn search_text(
        &self,
        query: &str,
        k: usize,
        namespaces: Option<&[Namespace]>,
        domains: Option<&[Domain]>,
    ) -> Result<Vec<IndexedMemory>, IndexError> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let ns_filter = namespaces.map(|ns| ns.iter().map(|n| format!("'{}'", n.as_str())).collect::<Vec<_>>().join(","));
        let domain_filter = domains.map(|ds| ds.iter().map(|d| format!("'{}'", d.as_str())).collect::<Vec<_>>().join(","));

        let mut sql = format!(
            "SELECT {cols} FROM memories m
             JOIN memories_fts f ON f.rowid = m.rowid
             WHERE memories_fts MATCH ?1",
            cols = MEMORY_COLUMNS_PREFIXED
        );
        if let Some(list) = &ns_filter {
            sql.push_str(&format!(" AND m.namespace IN ({list})"));
        }
        if let Some(list) = &domain_filter {
            sql.push_str(&format!(" AND m.domain IN ({list})"));
        }
        sql.push_str(" ORDER BY rank, m.timestamp DESC, m.id ASC LIMIT ?2");

        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(params![sanitized, k as i64], row_to_indexed_memory)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn stats(&self) -> Result<IndexStats, IndexError> {
        let reader = self.reader.lock().expect("reader mutex poisoned");
        let total: u64 = reader.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;

        let mut by_namespace = BTreeMap::new();
        let mut stmt = reader.prepare("SELECT namespace, COUNT(*) FROM memories GROUP BY namespace")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?;
        for row in rows {
            let (ns, count) = row?;
            by_namespace.insert(ns, count);
        }
        drop(stmt);

        let mut by_spec = BTreeMap::new();
        let mut stmt = reader.prepare("SELECT spec, COUNT(*) FROM memories WHERE spec IS NOT NULL GROUP BY spec")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?;
        for row in rows {
            let (spec, count) = row?;
            by_spec.insert(spec, count);
        }
        drop(stmt);

        let (last_sync, last_schema_version): (Option<String>, u32) = reader.query_row(
            "SELECT last_sync, version FROM schema_meta WHERE id = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(IndexStats {
            total,
            by_namespace,
            by_spec,
            last_sync: last_sync.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
            last_schema_version,
        })
    }

    pub fn record_sync(&self, at: DateTime<Utc>) -> Result<(), IndexError> {
        let writer = self.writer.lock().expect("writer mutex poisoned");
        writer.execute("UPDATE schema_meta SET last_sync = ?1 WHERE id = 0", params![at.to_rfc3339()])?;
        Ok(())
    }
}

const MEMORY_COLUMNS_PREFIXED: &str =
    "m.id, m.namespace, m.domain, m.summary, m.content_prefix, m.content_hash, m.timestamp, m.tags, m.spec, m.status, m.relates_to, m.commit_ref, m.ordinal";
const MEMORY_COLUMN_COUNT: usize = 13;

const SELECT_MEMORY_COLUMNS_WHERE_ID: &str = "SELECT id, namespace, domain, summary, content_prefix, content_hash, timestamp, tags, spec, status, relates_to, commit_ref, ordinal FROM memories WHERE id = ?1";

fn row_to_indexed_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexedMemory> {
    let namespace_str: String = row.get(1)?;
    let domain_str: String = row.get(2)?;
    let timestamp_str: String = row.get(6)?;
    let tags_json: String = row.get(7)?;
    let status_str: String = row.get(9)?;
    let relates_json: String = row.get(10)?;

    Ok(IndexedMemory {
        id: MemoryId(row.get(0)?),
        namespace: Namespace::parse(&namespace_str).unwrap_or(Namespace::Learnings),
        domain: if domain_str == "user" { Domain::User } else { Domain::Project },
        summary: row.get(3)?,
        content_prefix: row.get(4)?,
        content_hash: row.get(5)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        spec: row.get(8)?,
        status: Status::parse(&status_str).unwrap_or(Status::Active),
        relates_to: serde_json::from_str::<Vec<String>>(&relates_json)
            .unwrap_or_default()
            .into_iter()
            .map(MemoryId)
            .collect(),
        commit_ref: row.get(11)?,
        ordinal: row.get(12)?,
    })
}

fn configure_connection(conn: &Connection) -> Result<(), IndexError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<(), IndexError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_meta (id INTEGER PRIMARY KEY CHECK (id = 0), version INTEGER NOT NULL, embedding_dim INTEGER NOT NULL)")?;
    let applied: u32 = conn
        .query_row("SELECT version FROM schema_meta WHERE id = 0", [], |row| row.get(0))
        .optional()?
        .unwrap_or(0);
    for migration in MIGRATIONS {
        if migration.version > applied {
            conn.execute_batch(migration.up)?;
        }
    }
    Ok(())
}

/// Registers `cairn_cosine_distance(BLOB, BLOB) -> REAL`, the scalar
/// function `search_vector` relies on to keep vector search a single query.
fn register_distance_function(conn: &Connection) -> Result<(), IndexError> {
    conn.create_scalar_function(
        "cairn_cosine_distance",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a: Vec<u8> = ctx.get(0)?;
            let b: Vec<u8> = ctx.get(1)?;
            let va = blob_to_embedding(&a);
            let vb = blob_to_embedding(&b);
            Ok(cosine_distance(&va, &vb))
        },
    )?;
    Ok(())
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    let similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    (1.0 - similarity) as f64
}

/// Escapes FTS5 special characters by quoting each token, preventing a query
/// like `foo"bar` or `a OR (` from causing a syntax error.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use tempfile::TempDir;

    fn sample_row(id: &str) -> IndexedMemory {
        IndexedMemory {
            id: MemoryId(id.to_string()),
            namespace: Namespace::Decisions,
            domain: Domain::Project,
            summary: "Use B-tree over LSM".to_string(),
            content_prefix: "Rationale: read-heavy workload.".to_string(),
            content_hash: "abc".to_string(),
            timestamp: Utc::now(),
            tags: vec!["storage".to_string()],
            spec: None,
            status: Status::Active,
            relates_to: vec![],
            commit_ref: "deadbeef".to_string(),
            ordinal: 0,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let index = DerivedIndex::open(&dir.path().join("idx.sqlite3"), 4).unwrap();
        let row = sample_row("decisions:deadbeef:0");
        index.upsert(&row, Some(&[1.0, 0.0, 0.0, 0.0])).unwrap();
        let fetched = index.get(&row.id).unwrap().unwrap();
        assert_eq!(fetched.summary, row.summary);
    }

    #[test]
    fn dimension_mismatch_on_embedding_is_rejected() {
        let dir = TempDir::new().unwrap();
        let index = DerivedIndex::open(&dir.path().join("idx.sqlite3"), 4).unwrap();
        let row = sample_row("decisions:deadbeef:0");
        let err = index.upsert(&row, Some(&[1.0, 0.0])).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn reopening_with_different_dim_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("idx.sqlite3");
        let _index = DerivedIndex::open(&path, 4).unwrap();
        let err = DerivedIndex::open(&path, 8).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn search_vector_orders_by_ascending_distance() {
        let dir = TempDir::new().unwrap();
        let index = DerivedIndex::open(&dir.path().join("idx.sqlite3"), 2).unwrap();
        let mut a = sample_row("decisions:a:0");
        a.summary = "close".to_string();
        index.upsert(&a, Some(&[1.0, 0.0])).unwrap();
        let mut b = sample_row("decisions:b:0");
        b.summary = "far".to_string();
        index.upsert(&b, Some(&[0.0, 1.0])).unwrap();

        let results = index.search_vector(&[1.0, 0.0], 2, None, None, 0.0).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.summary, "close");
        assert!(results[0].1 <= results[1].1);
    }

    #[test]
    fn search_vector_respects_k_and_similarity_threshold() {
        let dir = TempDir::new().unwrap();
        let index = DerivedIndex::open(&dir.path().join("idx.sqlite3"), 2).unwrap();
        let mut a = sample_row("decisions:a:0");
        a.summary = "close".to_string();
        index.upsert(&a, Some(&[1.0, 0.0])).unwrap();
        let mut b = sample_row("decisions:b:0");
        b.summary = "orthogonal".to_string();
        index.upsert(&b, Some(&[0.0, 1.0])).unwrap();

        // orthogonal vectors have similarity 0.0, below a 0.5 threshold.
        let results = index.search_vector(&[1.0, 0.0], 5, None, None, 0.5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.summary, "close");
    }

    #[test]
    fn search_text_matches_summary_content() {
        let dir = TempDir::new().unwrap();
        let index = DerivedIndex::open(&dir.path().join("idx.sqlite3"), 2).unwrap();
        let row = sample_row("decisions:a:0");
        index.upsert(&row, None).unwrap();
        let results = index.search_text("B-tree", 5, None, None).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn stats_counts_by_namespace() {
        let dir = TempDir::new().unwrap();
        let index = DerivedIndex::open(&dir.path().join("idx.sqlite3"), 2).unwrap();
        index.upsert(&sample_row("decisions:a:0"), None).unwrap();
        let stats = index.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_namespace.get("decisions"), Some(&1));
    }

    #[test]
    fn ids_for_namespace_domain_filters_correctly() {
        let dir = TempDir::new().unwrap();
        let index = DerivedIndex::open(&dir.path().join("idx.sqlite3"), 2).unwrap();
        index.upsert(&sample_row("decisions:a:0"), None).unwrap();
        let mut other = sample_row("blockers:b:0");
        other.namespace = Namespace::Blockers;
        index.upsert(&other, None).unwrap();
        let ids = index.ids_for_namespace_domain(Namespace::Decisions, Domain::Project).unwrap();
        assert_eq!(ids, vec![MemoryId("decisions:a:0".to_string())]);
    }

    #[test]
    fn sanitize_quotes_each_token() {
        assert_eq!(sanitize_fts5_query("a\"b c"), "\"a\"\"b\" \"c\"");
    }
}
