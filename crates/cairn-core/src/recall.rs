//! Recall Service (spec §4.6): query and assemble context for consumers.
//!
//! Three progressive hydration levels (SUMMARY/FULL/FILES) trade laziness
//! for fidelity. SUMMARY never touches the object store — everything it
//! needs lives in the derived index row. FULL and FILES pay for an OSA read,
//! batched per commit_ref where the caller hydrates more than one id at once.

use crate::codec;
use crate::embeddings::{cosine_similarity, EmbeddingBackend};
use crate::error::RecallError;
use crate::index::{DerivedIndex, IndexedMemory};
use crate::model::{Domain, FileSnapshot, HydrationLevel, Memory, MemoryId, MemoryResult, Namespace};
use crate::osa::OsaAdapter;
use crate::sync::parse_memory_id;
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Capacity of the query-embedding cache: enough to cover one
/// `proactive_recall` call's trigger terms several times over without
/// growing unbounded across a long CLI/hook process lifetime.
const QUERY_CACHE_CAPACITY: usize = 100;

/// Similarity above which two results from different domains are considered
/// the same memory (spec §4.6 domain-merge policy). Not in the configuration
/// table, so fixed here rather than invented as a new config key.
const DOMAIN_MERGE_THRESHOLD: f32 = 0.9;

/// Requested domain scope for a `search` call. `model::Domain` has only
/// `Project`/`User`; this adds the "both, merged" case the recall operations
/// need without polluting the core entity's domain type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainScope {
    Project,
    User,
    Both,
}

/// Filters accepted by [`RecallService::search`]/[`RecallService::search_text`].
#[derive(Debug, Clone)]
pub struct SearchFilters {
    pub k: usize,
    pub namespaces: Option<Vec<Namespace>>,
    pub domain: DomainScope,
    pub min_similarity: f32,
    pub spec: Option<String>,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self { k: 5, namespaces: None, domain: DomainScope::Both, min_similarity: 0.0, spec: None }
    }
}

/// An element of a rendered [`ContextDocument`].
#[derive(Debug, Clone)]
pub enum ContextElement {
    Memory { id: MemoryId, namespace: Namespace, summary: String },
    Unavailable { id: MemoryId },
}

/// Output of [`RecallService::proactive_recall`]: spec §4.6's composition
/// pipeline, rendered with a fixed element order and wrapped in a versioned,
/// content-hashed envelope so an outer hook layer can replace rather than
/// accumulate prior injections.
#[derive(Debug, Clone)]
pub struct ContextDocument {
    pub working_memory: Vec<ContextElement>,
    pub semantic_context: Vec<ContextElement>,
    pub version: String,
    pub generated_at: DateTime<Utc>,
}

/// Namespaces that seed the working-memory slice, and their fixed rendering
/// order (spec §4.6 step 1/4).
const WORKING_MEMORY_NAMESPACES: [Namespace; 3] = [Namespace::Blockers, Namespace::Decisions, Namespace::Progress];

/// Minimum number of "meaningful" (longer than 2 characters) words a trigger
/// term needs before it's worth running a semantic search for (spec §4.6
/// edge case: "shorter than a configured minimum (default 3 meaningful words)
/// skips the semantic slice").
const MIN_MEANINGFUL_WORDS: usize = 3;

const CHARS_PER_TOKEN: usize = 4;

pub struct RecallService<'a> {
    osa: &'a OsaAdapter,
    index: &'a DerivedIndex,
    embeddings: &'a dyn EmbeddingBackend,
    hydration_file_cap: usize,
    hydration_file_bytes: u64,
    similarity_threshold: f32,
    working_memory_fraction: f32,
    /// Avoids re-embedding a repeated query within the same recall call —
    /// `proactive_recall`'s trigger terms often repeat across turns.
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl<'a> RecallService<'a> {
    pub fn new(
        osa: &'a OsaAdapter,
        index: &'a DerivedIndex,
        embeddings: &'a dyn EmbeddingBackend,
        hydration_file_cap: usize,
        hydration_file_bytes: u64,
    ) -> Self {
        Self::with_similarity_threshold(osa, index, embeddings, hydration_file_cap, hydration_file_bytes, 0.0)
    }

    /// Same as [`Self::new`] but with an explicit default minimum similarity
    /// for `proactive_recall`'s semantic slice (spec §6 `similarity-threshold`,
    /// spec §4.6 edge case: "all trigger terms yield <S similarity → include
    /// only the working-memory slice").
    pub fn with_similarity_threshold(
        osa: &'a OsaAdapter,
        index: &'a DerivedIndex,
        embeddings: &'a dyn EmbeddingBackend,
        hydration_file_cap: usize,
        hydration_file_bytes: u64,
        similarity_threshold: f32,
    ) -> Self {
        Self::full(osa, index, embeddings, hydration_file_cap, hydration_file_bytes, similarity_threshold, 0.5)
    }

    /// Full constructor threading every per-repository recall tunable from
    /// [`crate::config::Config`] (spec §6 `similarity-threshold` and
    /// `working-memory-fraction`).
    #[allow(clippy::too_many_arguments)]
    pub fn full(
        osa: &'a OsaAdapter,
        index: &'a DerivedIndex,
        embeddings: &'a dyn EmbeddingBackend,
        hydration_file_cap: usize,
        hydration_file_bytes: u64,
        similarity_threshold: f32,
        working_memory_fraction: f32,
    ) -> Self {
        Self {
            osa,
            index,
            embeddings,
            hydration_file_cap,
            hydration_file_bytes,
            similarity_threshold,
            working_memory_fraction,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_CAPACITY).expect("QUERY_CACHE_CAPACITY is non-zero"),
            )),
        }
    }

    /// Looks up `text` in the query-embedding cache, computing and inserting
    /// it on a miss.
    fn embed_cached(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(cached) = cache.get(text) {
                return Ok(cached.clone());
            }
        }
        let embedding = self.embeddings.embed(text).map_err(|e| RecallError::Embedding(e.to_string()))?;
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(text.to_string(), embedding.clone());
        }
        Ok(embedding)
    }

    /// Embeds `query`, runs `DI.search_vector` per requested domain, applies
    /// the domain-merge policy, and hydrates every result at SUMMARY.
    pub fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<MemoryResult>, RecallError> {
        let embedding = self.embed_cached(query)?;
        let namespaces = filters.namespaces.as_deref();

        let mut project_hits = Vec::new();
        let mut user_hits = Vec::new();
        if matches!(filters.domain, DomainScope::Project | DomainScope::Both) {
            project_hits = self.index.search_vector(&embedding, filters.k, namespaces, Some(Domain::Project), filters.min_similarity)?;
        }
        if matches!(filters.domain, DomainScope::User | DomainScope::Both) {
            user_hits = self.index.search_vector(&embedding, filters.k, namespaces, Some(Domain::User), filters.min_similarity)?;
        }

        let merged = merge_by_domain(project_hits, user_hits);
        let filtered: Vec<(IndexedMemory, f32)> = merged
            .into_iter()
            .filter(|(row, _)| match &filters.spec {
                Some(s) => row.spec.as_deref() == Some(s.as_str()),
                None => true,
            })
            .take(filters.k)
            .collect();

        Ok(filtered
            .into_iter()
            .map(|(row, distance)| summary_result(row, distance))
            .collect())
    }

    /// Full-text analog of [`Self::search`]. Returns bare `Memory` values
    /// built from the index row's `content_prefix`, not the full OSA body —
    /// SUMMARY-level search never touches the object store, full-text search
    /// included.
    pub fn search_text(&self, q: &str, filters: &SearchFilters) -> Result<Vec<Memory>, RecallError> {
        let namespaces = filters.namespaces.as_deref();
        let domains: &[Domain] = match filters.domain {
            DomainScope::Project => &[Domain::Project],
            DomainScope::User => &[Domain::User],
            DomainScope::Both => &[Domain::Project, Domain::User],
        };
        // A single query with `domain IN (...)` so the FTS5 scorer ranks
        // project and user hits against each other, rather than two
        // independent per-domain queries stitched together out of rank order.
        let mut rows = self.index.search_text(q, filters.k, namespaces, Some(domains))?;
        rows.retain(|row| match &filters.spec {
            Some(s) => row.spec.as_deref() == Some(s.as_str()),
            None => true,
        });
        rows.truncate(filters.k);
        Ok(rows.into_iter().map(row_to_summary_memory).collect())
    }

    /// Upgrades a single id to `level`. `distance` on the returned result is
    /// always `0.0` — hydration is not a ranked operation, but `MemoryResult`
    /// is the only entity that carries both a hydration level and file
    /// snapshots, so it's the natural return type here too.
    pub fn hydrate(&self, id: &MemoryId, level: HydrationLevel) -> Result<MemoryResult, RecallError> {
        let mut results = self.hydrate_batch(std::slice::from_ref(id), level)?;
        results.pop().ok_or_else(|| {
            RecallError::Osa(crate::error::OsaError::NotFound {
                namespace: "unknown".to_string(),
                commit_ref: id.as_str().to_string(),
            })
        })
    }

    /// Hydrates many ids at once, grouped by `(domain, namespace, commit_ref)`
    /// so FULL/FILES levels cost one OSA batched read per group, not one per
    /// id (spec §4.6: "ONE OSA batched read per group"). An id that fails to
    /// hydrate is silently skipped (the placeholder-element substitution
    /// happens one layer up, in `proactive_recall`'s renderer, not here).
    pub fn hydrate_batch(&self, ids: &[MemoryId], level: HydrationLevel) -> Result<Vec<MemoryResult>, RecallError> {
        if level == HydrationLevel::Summary {
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(row) = self.index.get(id)? {
                    out.push(summary_result(row, 0.0));
                }
            }
            return Ok(out);
        }

        let mut rows_by_id: HashMap<MemoryId, IndexedMemory> = HashMap::new();
        for id in ids {
            if let Some(row) = self.index.get(id)? {
                rows_by_id.insert(id.clone(), row);
            }
        }

        let mut groups: HashMap<(Domain, Namespace, String), Vec<MemoryId>> = HashMap::new();
        for id in ids {
            if let Some(row) = rows_by_id.get(id) {
                groups
                    .entry((row.domain, row.namespace, row.commit_ref.clone()))
                    .or_default()
                    .push(id.clone());
            }
        }

        let mut bodies: HashMap<MemoryId, Vec<u8>> = HashMap::new();
        for ((domain, namespace, commit_ref), group_ids) in &groups {
            let records = self.osa.read_batch(*domain, *namespace, std::slice::from_ref(commit_ref))?;
            for id in group_ids {
                let row = &rows_by_id[id];
                if let Some(record) = records.iter().find(|r| r.commit_ref == *commit_ref && r.ordinal == row.ordinal) {
                    bodies.insert(id.clone(), record.body.clone());
                }
            }
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(row) = rows_by_id.get(id) else { continue };
            let Some(body) = bodies.get(id) else { continue };
            let memory = codec::parse(body, id.clone(), row.domain)?;
            let files = if level == HydrationLevel::Files { self.attach_files(&memory, &row.commit_ref)? } else { Vec::new() };
            out.push(MemoryResult { memory, distance: 0.0, hydration_level: level, files });
        }
        Ok(out)
    }

    /// FILES level: scans `content` for file-path-looking tokens and reads
    /// each one from the commit's tree, capped and elided per spec §4.6.
    fn attach_files(&self, memory: &Memory, commit_ref: &str) -> Result<Vec<FileSnapshot>, RecallError> {
        let mut files = Vec::new();
        for path in scan_file_paths(&memory.content).into_iter().take(self.hydration_file_cap) {
            match self.osa.read_file_at_commit(memory.domain, commit_ref, &path, self.hydration_file_bytes)? {
                Some(blob) => {
                    let content = blob.content.and_then(|bytes| String::from_utf8(bytes).ok());
                    let elided_size = if content.is_none() { Some(blob.size) } else { None };
                    files.push(FileSnapshot { path, content, elided_size });
                }
                None => continue,
            }
        }
        Ok(files)
    }

    /// The context-document composition pipeline (spec §4.6, "the hardest
    /// sub-algorithm"): a working-memory slice plus a per-term semantic
    /// slice, token-budgeted and rendered in a fixed element order.
    pub fn proactive_recall(&self, trigger_terms: &[String], budget_tokens: usize, spec: Option<&str>) -> Result<ContextDocument, RecallError> {
        let budget_tokens = if budget_tokens == 0 { 2000 } else { budget_tokens };
        let working_budget = (budget_tokens as f32 * self.working_memory_fraction) as usize;
        let semantic_budget = budget_tokens.saturating_sub(working_budget);

        let working = self.working_memory_slice(spec, working_budget)?;
        let semantic = self.semantic_slice(trigger_terms, semantic_budget, spec)?;

        let mut hasher_input = String::new();
        for element in working.iter().chain(semantic.iter()) {
            if let ContextElement::Memory { id, .. } = element {
                hasher_input.push_str(id.as_str());
                hasher_input.push('\n');
            }
        }
        let version = crate::capture::content_hash_hex(hasher_input.as_bytes());

        Ok(ContextDocument { working_memory: working, semantic_context: semantic, version, generated_at: Utc::now() })
    }

    fn working_memory_slice(&self, spec: Option<&str>, budget_tokens: usize) -> Result<Vec<ContextElement>, RecallError> {
        let mut spent = 0usize;
        let mut elements = Vec::new();
        for &namespace in &WORKING_MEMORY_NAMESPACES {
            let mut rows = self.namespace_rows(namespace)?;
            rows.retain(|row| row.status == crate::model::Status::Active);
            if let Some(spec) = spec {
                rows.retain(|row| row.spec.as_deref() == Some(spec));
            }
            rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            for row in rows {
                let cost = estimate_tokens(&row.summary);
                if spent + cost > budget_tokens {
                    break;
                }
                spent += cost;
                elements.push(ContextElement::Memory { id: row.id, namespace: row.namespace, summary: row.summary });
            }
        }
        Ok(elements)
    }

    fn namespace_rows(&self, namespace: Namespace) -> Result<Vec<IndexedMemory>, RecallError> {
        let mut out = Vec::new();
        for id in self.index.ids_for_namespace_domain(namespace, Domain::Project)? {
            if let Some(row) = self.index.get(&id)? {
                out.push(row);
            }
        }
        Ok(out)
    }

    fn semantic_slice(&self, trigger_terms: &[String], budget_tokens: usize, spec: Option<&str>) -> Result<Vec<ContextElement>, RecallError> {
        let mut seen = std::collections::HashSet::new();
        let mut candidates: Vec<(IndexedMemory, f32)> = Vec::new();

        for term in trigger_terms {
            if meaningful_word_count(term) < MIN_MEANINGFUL_WORDS {
                continue;
            }
            let embedding = match self.embed_cached(term) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let hits = self.index.search_vector(&embedding, 10, None, None, self.similarity_threshold)?;
            for (row, distance) in hits {
                if !seen.insert(row.id.clone()) {
                    continue;
                }
                if let Some(spec) = spec {
                    if row.spec.as_deref() != Some(spec) {
                        continue;
                    }
                }
                candidates.push((row, distance));
            }
        }

        candidates.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.timestamp.cmp(&a.0.timestamp))
                .then_with(|| a.0.id.as_str().cmp(b.0.id.as_str()))
        });

        let mut spent = 0usize;
        let mut elements = Vec::new();
        for (row, _distance) in candidates {
            let cost = estimate_tokens(&row.summary);
            if spent + cost > budget_tokens {
                break;
            }
            spent += cost;
            elements.push(ContextElement::Memory { id: row.id, namespace: row.namespace, summary: row.summary });
        }
        Ok(elements)
    }
}

fn summary_result(row: IndexedMemory, distance: f32) -> MemoryResult {
    MemoryResult { memory: row_to_summary_memory(row), distance, hydration_level: HydrationLevel::Summary, files: Vec::new() }
}

fn row_to_summary_memory(row: IndexedMemory) -> Memory {
    Memory {
        id: row.id,
        namespace: row.namespace,
        domain: row.domain,
        summary: row.summary,
        content: row.content_prefix,
        timestamp: row.timestamp,
        tags: row.tags,
        spec: row.spec,
        status: row.status,
        relates_to: row.relates_to,
        extra: Default::default(),
    }
}

/// Unions project and user hits; when a pair of results across domains has a
/// summary cosine similarity above [`DOMAIN_MERGE_THRESHOLD`], the project
/// result wins and the user result is dropped (spec §4.6).
fn merge_by_domain(project: Vec<(IndexedMemory, f32)>, user: Vec<(IndexedMemory, f32)>) -> Vec<(IndexedMemory, f32)> {
    if project.is_empty() {
        return sort_by_distance(user);
    }
    if user.is_empty() {
        return sort_by_distance(project);
    }

    let project_terms: Vec<Vec<f32>> = project.iter().map(|(row, _)| bag_of_words(&row.summary)).collect();
    let mut merged = project;
    for (user_row, user_distance) in user {
        let user_terms = bag_of_words(&user_row.summary);
        let collides = project_terms.iter().any(|p| cosine_similarity(p, &user_terms) > DOMAIN_MERGE_THRESHOLD);
        if !collides {
            merged.push((user_row, user_distance));
        }
    }
    sort_by_distance(merged)
}

fn sort_by_distance(mut rows: Vec<(IndexedMemory, f32)>) -> Vec<(IndexedMemory, f32)> {
    rows.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.timestamp.cmp(&a.0.timestamp))
            .then_with(|| a.0.id.as_str().cmp(b.0.id.as_str()))
    });
    rows
}

/// A crude bag-of-words vector over a fixed small vocabulary bucket, used
/// only to compare two summaries for the domain-merge collision check — not
/// the real embedding space, just enough signal to catch "same fact, filed
/// twice" near-duplicates cheaply without a second model call per pair.
fn bag_of_words(text: &str) -> Vec<f32> {
    const BUCKETS: usize = 64;
    let mut v = vec![0.0f32; BUCKETS];
    for word in text.split_whitespace() {
        let mut hash: u32 = 2166136261;
        for byte in word.to_lowercase().bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(16777619);
        }
        v[(hash as usize) % BUCKETS] += 1.0;
    }
    v
}

fn estimate_tokens(text: &str) -> usize {
    (text.len() / CHARS_PER_TOKEN).max(1)
}

fn meaningful_word_count(term: &str) -> usize {
    term.split_whitespace().filter(|w| w.len() > 2).count()
}

/// A manual, non-regex scanner for file-path-looking tokens in free text:
/// whitespace-delimited words containing a `/` or a recognizable extension,
/// stripped of trailing punctuation. Good enough to find `src/foo.rs` or
/// `./bar.py` in a memory's content without pulling in a dependency the rest
/// of the core never needs.
fn scan_file_paths(content: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for word in content.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != '.' && c != '_' && c != '-');
        if trimmed.is_empty() {
            continue;
        }
        let looks_like_path = trimmed.contains('/') || has_known_extension(trimmed);
        if looks_like_path && !paths.iter().any(|p| p == trimmed) {
            paths.push(trimmed.to_string());
        }
    }
    paths
}

fn has_known_extension(word: &str) -> bool {
    const EXTENSIONS: &[&str] = &[".rs", ".toml", ".md", ".py", ".ts", ".js", ".json", ".yaml", ".yml"];
    EXTENSIONS.iter().any(|ext| word.ends_with(ext) && word.len() > ext.len())
}
