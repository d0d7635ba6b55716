//! Vector store orchestration.
//!
//! [`VectorStore`] ties a [`RecordStore`] (durable records), an [`HnswIndex`]
//! (approximate neighbors) and a [`ResilientEmbedder`] (text to vectors)
//! together. Records are cached in memory after the first initialization;
//! the index only ranks candidates, final scores are exact cosine similarity
//! against the cached vectors.
//!
//! All operations initialize lazily. Concurrent first calls share a single
//! initialization attempt.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use memvec_db::{
    create_record_store, HnswIndex, HnswParams, IntegrityReport, MemoryType, RecordStore,
    Snapshot, VectorRecord, VectorSearchFilter,
};
use memvec_model::{
    cosine_similarity, create_resilient_embedder, EmbedderStats, ResilientEmbedder,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{MemvecConfig, SearchConfig};
use crate::db_adapter::{from_db_error, IntoMemvecResult};
use crate::errors::{MemvecError, MemvecResult};

// ============================================================================
// MemoryNode
// ============================================================================

/// Producer-facing input to [`VectorStore::store`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNode {
    /// Record id; a fresh UUID v4 is assigned when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(default, rename = "type")]
    pub memory_type: MemoryType,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl MemoryNode {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// The node's id, assigning a fresh UUID v4 first if it has none.
    pub fn ensure_id(&mut self) -> &str {
        self.id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .as_str()
    }

    fn validate(&self) -> MemvecResult<()> {
        if self.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(MemvecError::InvalidArgument("Memory id is empty".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(MemvecError::InvalidArgument(
                "Memory content is empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Options and results
// ============================================================================

/// Per-call search options.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub max_results: usize,
    /// Results scoring below this cosine similarity are dropped.
    pub min_score: f32,
    /// Layer-0 beam width; the index's `efSearch` when `None`.
    pub ef: Option<usize>,
    pub filter: VectorSearchFilter,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_results: config.max_results,
            min_score: config.min_score,
            ef: None,
            filter: VectorSearchFilter::default(),
        }
    }
}

impl SearchOptions {
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_ef(mut self, ef: usize) -> Self {
        self.ef = Some(ef);
        self
    }

    pub fn with_filter(mut self, filter: VectorSearchFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// A search result with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub record: VectorRecord,
    pub score: f32,
}

/// One rejected item of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of [`VectorStore::store_batch`]. Batches are never atomic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStoreResult {
    pub success: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchStoreResult {
    fn fail(&mut self, id: impl Into<String>, error: impl ToString) {
        self.failed += 1;
        self.failures.push(BatchFailure {
            id: id.into(),
            error: error.to_string(),
        });
    }

    /// Whether `id` is among the failures.
    pub fn failed_id(&self, id: &str) -> bool {
        self.failures.iter().any(|f| f.id == id)
    }
}

/// Outcome of [`VectorStore::import`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn fail(&mut self, error: String) {
        self.failed += 1;
        self.errors.push(error);
    }
}

/// Snapshot of store and index counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub initialized: bool,
    pub records: usize,
    pub index_live: usize,
    pub index_tombstones: usize,
    pub index_graph_size: usize,
    pub dimension: usize,
    pub backend: String,
    pub rebuilds: u64,
    pub embedding: EmbedderStats,
}

// ============================================================================
// Initialization gate
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitPhase {
    Idle,
    Running,
    Ready,
}

#[derive(Debug)]
struct InitGate {
    phase: InitPhase,
    attempt: u64,
    last_error: Option<String>,
}

struct StoreState {
    records: HashMap<String, VectorRecord>,
    index: HnswIndex,
}

impl StoreState {
    /// Build the record for `node`, keeping creation and access stats of an existing id.
    fn build_record(&self, id: String, node: MemoryNode, vector: Vec<f32>) -> VectorRecord {
        let mut record = VectorRecord::new(id, vector, node.content)
            .with_type(node.memory_type)
            .with_tags(node.tags);
        if let Some(existing) = self.records.get(&record.id) {
            record.created = existing.created;
            record.last_accessed = existing.last_accessed;
            record.access_count = existing.access_count;
        }
        record
    }

    /// Cache a persisted record and index it.
    fn apply(&mut self, record: VectorRecord) -> MemvecResult<()> {
        let indexed = self.index.insert(record.id.clone(), record.vector.clone());
        let id = record.id.clone();
        self.records.insert(id.clone(), record);
        indexed.map_err(|e| MemvecError::IndexInconsistency {
            message: format!("record '{}' was stored but not indexed: {}", id, e),
        })
    }

    fn forget(&mut self, id: &str) {
        self.records.remove(id);
        self.index.remove(id);
    }

    fn sorted_records(&self) -> Vec<VectorRecord> {
        let mut records: Vec<VectorRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

// ============================================================================
// VectorStore
// ============================================================================

/// Semantic memory store: durable records plus an approximate nearest-neighbor index.
pub struct VectorStore {
    store: Arc<dyn RecordStore>,
    embedder: ResilientEmbedder,
    search_defaults: SearchConfig,
    state: RwLock<StoreState>,
    gate: Mutex<InitGate>,
    gate_changed: Condvar,
    rebuilds: AtomicU64,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("backend", &self.store.backend_name())
            .field("dimension", &self.store.dimension())
            .field("embedder", &self.embedder)
            .finish()
    }
}

impl VectorStore {
    /// Assemble a store from its parts. Nothing is opened until first use.
    ///
    /// # Errors
    ///
    /// Returns [`MemvecError::DimensionMismatch`] when the embedder and the
    /// record store disagree on the vector dimension, and
    /// [`MemvecError::InvalidConfiguration`] for invalid index parameters.
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedder: ResilientEmbedder,
        params: HnswParams,
    ) -> MemvecResult<Self> {
        if store.dimension() != embedder.dimension() {
            return Err(MemvecError::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimension(),
            });
        }
        params.validate().into_memvec_result()?;

        let index = HnswIndex::new(store.dimension(), params);
        Ok(Self {
            store,
            embedder,
            search_defaults: SearchConfig::default(),
            state: RwLock::new(StoreState {
                records: HashMap::new(),
                index,
            }),
            gate: Mutex::new(InitGate {
                phase: InitPhase::Idle,
                attempt: 0,
                last_error: None,
            }),
            gate_changed: Condvar::new(),
            rebuilds: AtomicU64::new(0),
        })
    }

    /// Build the record store and embedder described by `config`.
    pub fn from_config(config: &MemvecConfig) -> MemvecResult<Self> {
        let store = create_record_store(&config.record_store_config()?).into_memvec_result()?;
        let embedder = create_resilient_embedder(&config.embedding_config());
        Ok(Self::new(store, embedder, config.index.clone())?
            .with_search_defaults(config.search.clone()))
    }

    /// Override the defaults used by [`Self::search_options`] and candidate oversampling.
    pub fn with_search_defaults(mut self, search: SearchConfig) -> Self {
        self.search_defaults = search;
        self
    }

    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    pub fn embedder(&self) -> &ResilientEmbedder {
        &self.embedder
    }

    /// Search options seeded from the configured defaults.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions::from(&self.search_defaults)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_gate()
            .map(|gate| gate.phase == InitPhase::Ready)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------------

    /// Open the record store, load every record and build the index.
    ///
    /// Idempotent. Callers arriving while an attempt is running wait for it
    /// and share its outcome; after a failure the next call tries again.
    ///
    /// # Errors
    ///
    /// Returns [`MemvecError::InitializationFailure`] when the backend cannot
    /// be opened or read.
    pub fn initialize(&self) -> MemvecResult<()> {
        let mut gate = self.lock_gate()?;
        match gate.phase {
            InitPhase::Ready => return Ok(()),
            InitPhase::Running => {
                let attempt = gate.attempt;
                while gate.phase == InitPhase::Running && gate.attempt == attempt {
                    gate = self.gate_changed.wait(gate).map_err(|e| {
                        MemvecError::internal(format!("Failed to wait for initialization: {}", e))
                    })?;
                }
                return match gate.phase {
                    InitPhase::Ready => Ok(()),
                    _ => Err(MemvecError::InitializationFailure {
                        message: gate
                            .last_error
                            .clone()
                            .unwrap_or_else(|| "initialization did not complete".to_string()),
                    }),
                };
            }
            InitPhase::Idle => {}
        }

        gate.phase = InitPhase::Running;
        gate.attempt += 1;
        let attempt = gate.attempt;
        drop(gate);

        debug!("Initializing vector store (attempt {})", attempt);
        let outcome = self.load();

        let mut gate = self.lock_gate()?;
        let result = match outcome {
            Ok(()) => {
                gate.phase = InitPhase::Ready;
                gate.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!("Vector store initialization failed: {}", e);
                gate.phase = InitPhase::Idle;
                gate.last_error = Some(e.to_string());
                Err(MemvecError::InitializationFailure {
                    message: e.to_string(),
                })
            }
        };
        self.gate_changed.notify_all();
        result
    }

    fn load(&self) -> MemvecResult<()> {
        self.store.open().into_memvec_result()?;
        let records = self.store.get_all().into_memvec_result()?;

        let mut state = self.write_state()?;
        let skipped = state
            .index
            .rebuild(records.iter().map(|r| (r.id.clone(), r.vector.clone())));
        state.records = records.into_iter().map(|r| (r.id.clone(), r)).collect();

        info!(
            "Vector store ready: {} records ({} backend, dimension {})",
            state.records.len(),
            self.store.backend_name(),
            self.store.dimension()
        );
        if skipped > 0 {
            warn!("{} records could not be indexed", skipped);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Embed and persist one memory, returning the stored record.
    ///
    /// Re-storing an existing id replaces its content, type, tags and vector
    /// but keeps its creation time and access stats.
    ///
    /// # Errors
    ///
    /// [`MemvecError::StorageFull`] when the backend is over quota; the caller
    /// can evict and retry. [`MemvecError::InvalidArgument`] for empty content.
    pub fn store(&self, mut node: MemoryNode) -> MemvecResult<VectorRecord> {
        self.initialize()?;
        node.validate()?;
        let id = node.ensure_id().to_string();
        let embedding = self.embedder.embed(&node.content);

        let mut state = self.write_state()?;
        let record = state.build_record(id, node, embedding.vector);
        self.store.put(&record).into_memvec_result()?;
        state.apply(record.clone())?;
        self.maybe_rebuild(&mut state);

        debug!("Stored memory '{}'", record.id);
        Ok(record)
    }

    /// Store many memories, reporting per-item failures.
    pub fn store_batch(&self, nodes: Vec<MemoryNode>) -> MemvecResult<BatchStoreResult> {
        self.initialize()?;
        let mut result = BatchStoreResult::default();

        let mut accepted = Vec::with_capacity(nodes.len());
        for mut node in nodes {
            let id = node.ensure_id().to_string();
            match node.validate() {
                Ok(()) => accepted.push((id, node)),
                Err(e) => result.fail(id, e),
            }
        }
        if accepted.is_empty() {
            return Ok(result);
        }

        let texts: Vec<&str> = accepted.iter().map(|(_, n)| n.content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts);

        let mut state = self.write_state()?;
        let records: Vec<VectorRecord> = accepted
            .into_iter()
            .zip(embeddings)
            .map(|((id, node), embedding)| state.build_record(id, node, embedding.vector))
            .collect();

        let outcomes = self.store.put_batch(&records);
        for (record, outcome) in records.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    let id = record.id.clone();
                    match state.apply(record) {
                        Ok(()) => result.success += 1,
                        Err(e) => result.fail(id, e),
                    }
                }
                Err(e) => result.fail(record.id, from_db_error(e)),
            }
        }
        self.maybe_rebuild(&mut state);
        self.store.flush().into_memvec_result()?;

        debug!(
            "Stored batch: {} succeeded, {} failed",
            result.success, result.failed
        );
        Ok(result)
    }

    /// Delete a record. Returns `false` when it did not exist.
    ///
    /// The index entry is tombstoned; the graph is rebuilt once tombstones
    /// exceed the configured share.
    pub fn delete(&self, id: &str) -> MemvecResult<bool> {
        self.initialize()?;
        let mut state = self.write_state()?;
        let existed = self.store.delete(id).into_memvec_result()?;
        state.forget(id);
        self.maybe_rebuild(&mut state);
        Ok(existed)
    }

    /// Push buffered writes to durable storage.
    pub fn flush(&self) -> MemvecResult<()> {
        self.initialize()?;
        self.store.flush().into_memvec_result()
    }

    /// Remove every record.
    pub fn clear(&self) -> MemvecResult<()> {
        self.initialize()?;
        let mut state = self.write_state()?;
        self.store.clear().into_memvec_result()?;
        state.records.clear();
        state.index.clear();
        self.store.flush().into_memvec_result()?;
        info!("Vector store cleared");
        Ok(())
    }

    /// Remove the `n` least recently accessed records, returning their ids.
    ///
    /// Ties on access time go to the less frequently accessed record.
    pub fn evict_least_recently_used(&self, n: usize) -> MemvecResult<Vec<String>> {
        self.initialize()?;
        let mut state = self.write_state()?;

        let mut candidates: Vec<&VectorRecord> = state.records.values().collect();
        candidates.sort_by(|a, b| {
            a.last_accessed
                .cmp(&b.last_accessed)
                .then_with(|| a.access_count.cmp(&b.access_count))
                .then_with(|| a.created.cmp(&b.created))
                .then_with(|| a.id.cmp(&b.id))
        });
        let victims: Vec<String> = candidates.into_iter().take(n).map(|r| r.id.clone()).collect();

        let mut evicted = Vec::with_capacity(victims.len());
        for id in victims {
            self.store.delete(&id).into_memvec_result()?;
            state.forget(&id);
            evicted.push(id);
        }
        self.maybe_rebuild(&mut state);
        self.store.flush().into_memvec_result()?;

        info!("Evicted {} least recently used records", evicted.len());
        Ok(evicted)
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    /// Semantic search. Failures are logged and yield no results.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
        self.search_with(query, options, |_| true)
    }

    /// Semantic search with an extra predicate over candidate records.
    pub fn search_with<F>(&self, query: &str, options: &SearchOptions, predicate: F) -> Vec<SearchHit>
    where
        F: Fn(&VectorRecord) -> bool,
    {
        match self.try_search(query, options, predicate) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Search failed, returning no results: {}", e);
                Vec::new()
            }
        }
    }

    /// Semantic search that reports failures.
    ///
    /// Returned records have their access stats updated; persisting those
    /// stats is best-effort.
    pub fn try_search<F>(
        &self,
        query: &str,
        options: &SearchOptions,
        predicate: F,
    ) -> MemvecResult<Vec<SearchHit>>
    where
        F: Fn(&VectorRecord) -> bool,
    {
        self.initialize()?;
        if options.max_results == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).vector;
        let mut hits = match self.rank(&query_vector, options, &predicate) {
            Err(MemvecError::IndexInconsistency { message }) => {
                warn!("Index inconsistency during search ({}); rebuilding", message);
                self.rebuild_index()?;
                self.rank(&query_vector, options, &predicate)?
            }
            other => other?,
        };

        self.record_access(&mut hits);
        Ok(hits)
    }

    fn rank<F>(
        &self,
        query: &[f32],
        options: &SearchOptions,
        predicate: &F,
    ) -> MemvecResult<Vec<SearchHit>>
    where
        F: Fn(&VectorRecord) -> bool,
    {
        let state = self.read_state()?;
        let ef = options.ef.unwrap_or(state.index.params().ef_search);
        let wanted = options
            .max_results
            .saturating_mul(self.search_defaults.oversample.max(1));
        let candidates = state
            .index
            .search(query, ef.max(wanted), ef)
            .into_memvec_result()?;

        let mut hits = Vec::new();
        for candidate in candidates {
            let record = state.records.get(&candidate.id).ok_or_else(|| {
                MemvecError::IndexInconsistency {
                    message: format!("index returned '{}' which has no record", candidate.id),
                }
            })?;
            if !options.filter.matches(record) || !predicate(record) {
                continue;
            }
            let score = cosine_similarity(query, &record.vector);
            if score >= options.min_score {
                hits.push(SearchHit {
                    record: record.clone(),
                    score,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        hits.truncate(options.max_results);
        Ok(hits)
    }

    fn record_access(&self, hits: &mut [SearchHit]) {
        if hits.is_empty() {
            return;
        }
        let mut state = match self.write_state() {
            Ok(state) => state,
            Err(e) => {
                warn!("Could not update access stats: {}", e);
                return;
            }
        };

        let mut touched = Vec::with_capacity(hits.len());
        for hit in hits.iter_mut() {
            if let Some(record) = state.records.get_mut(&hit.record.id) {
                record.touch();
                hit.record = record.clone();
                touched.push(record.clone());
            }
        }
        for (record, outcome) in touched.iter().zip(self.store.put_batch(&touched)) {
            if let Err(e) = outcome {
                debug!("Access stats for '{}' not persisted: {}", record.id, e);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Look up a record by id. Does not count as an access.
    pub fn get_by_id(&self, id: &str) -> Option<VectorRecord> {
        if let Err(e) = self.initialize() {
            warn!("get_by_id('{}') unavailable: {}", id, e);
            return None;
        }
        self.read_state().ok()?.records.get(id).cloned()
    }

    /// Every record, oldest first.
    pub fn get_all(&self) -> MemvecResult<Vec<VectorRecord>> {
        self.initialize()?;
        Ok(self.read_state()?.sorted_records())
    }

    /// Current counters. Does not initialize the store.
    pub fn get_stats(&self) -> StoreStats {
        let (records, index_live, index_tombstones, index_graph_size) = match self.read_state() {
            Ok(state) => (
                state.records.len(),
                state.index.len(),
                state.index.tombstones(),
                state.index.graph_size(),
            ),
            Err(_) => (0, 0, 0, 0),
        };
        StoreStats {
            initialized: self.is_initialized(),
            records,
            index_live,
            index_tombstones,
            index_graph_size,
            dimension: self.dimension(),
            backend: self.store.backend_name().to_string(),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            embedding: self.embedder.stats(),
        }
    }

    /// Cosine similarity of two texts.
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        self.embedder.similarity(a, b)
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Export every record.
    pub fn export(&self) -> MemvecResult<Snapshot> {
        let records = self.get_all()?;
        let snapshot = Snapshot::from_records(&records);
        info!("Exported {} records", snapshot.len());
        Ok(snapshot)
    }

    /// Import a snapshot entry by entry.
    ///
    /// Entries with an empty vector are re-embedded from their content;
    /// entries with a vector of the wrong dimension are rejected.
    pub fn import(&self, snapshot: Snapshot) -> MemvecResult<ImportReport> {
        self.initialize()?;
        let dimension = self.dimension();
        let mut report = ImportReport::default();

        let mut accepted: Vec<VectorRecord> = Vec::new();
        let mut unembedded: Vec<usize> = Vec::new();
        for (position, entry) in snapshot.into_records().into_iter().enumerate() {
            match entry {
                Err(e) => report.fail(format!("entry {}: {}", position, e)),
                Ok(record) if record.vector.is_empty() => {
                    unembedded.push(accepted.len());
                    accepted.push(record);
                }
                Ok(record) if record.vector.len() != dimension => report.fail(format!(
                    "{}: vector dimension mismatch: expected {}, got {}",
                    record.id,
                    dimension,
                    record.vector.len()
                )),
                Ok(record) => accepted.push(record),
            }
        }

        if !unembedded.is_empty() {
            let texts: Vec<&str> = unembedded
                .iter()
                .map(|&i| accepted[i].content.as_str())
                .collect();
            let vectors: Vec<Vec<f32>> = self
                .embedder
                .embed_batch(&texts)
                .into_iter()
                .map(|e| e.vector)
                .collect();
            for (i, vector) in unembedded.into_iter().zip(vectors) {
                accepted[i].vector = vector;
            }
        }

        let mut state = self.write_state()?;
        let outcomes = self.store.put_batch(&accepted);
        for (record, outcome) in accepted.into_iter().zip(outcomes) {
            let id = record.id.clone();
            match outcome.into_memvec_result().and_then(|()| state.apply(record)) {
                Ok(()) => report.imported += 1,
                Err(e) => report.fail(format!("{}: {}", id, e)),
            }
        }
        self.maybe_rebuild(&mut state);
        self.store.flush().into_memvec_result()?;

        info!(
            "Imported {} records ({} failed)",
            report.imported, report.failed
        );
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Index maintenance
    // ------------------------------------------------------------------------

    /// Reload every record from the backend and rebuild the index from scratch.
    ///
    /// Returns the number of indexed records.
    pub fn rebuild_index(&self) -> MemvecResult<usize> {
        self.initialize()?;
        let records = self.store.get_all().into_memvec_result()?;
        let mut state = self.write_state()?;
        state.records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        self.rebuild_locked(&mut state);
        Ok(state.index.len())
    }

    /// Check graph structure and cache/index agreement, rebuilding when either fails.
    ///
    /// Returns the report taken before any rebuild.
    pub fn verify_index(&self) -> MemvecResult<IntegrityReport> {
        self.initialize()?;
        let mut state = self.write_state()?;
        let report = state.index.check_integrity();
        let unindexed = state
            .records
            .keys()
            .filter(|id| !state.index.contains(id))
            .count();
        let consistent = unindexed == 0 && state.index.len() == state.records.len();

        if !report.is_healthy() || !consistent {
            warn!(
                "Index check failed ({:?}, {} unindexed records); rebuilding",
                report, unindexed
            );
            self.rebuild_locked(&mut state);
        }
        Ok(report)
    }

    fn maybe_rebuild(&self, state: &mut StoreState) {
        if state.index.needs_rebuild() {
            self.rebuild_locked(state);
        }
    }

    fn rebuild_locked(&self, state: &mut StoreState) {
        let started = Utc::now();
        let StoreState { records, index } = state;
        let dropped = index.tombstones();
        let skipped = index.rebuild(records.values().map(|r| (r.id.clone(), r.vector.clone())));
        self.rebuilds.fetch_add(1, Ordering::Relaxed);

        info!(
            "Rebuilt index: {} entries, {} tombstones dropped in {} ms",
            index.len(),
            dropped,
            (Utc::now() - started).num_milliseconds()
        );
        if skipped > 0 {
            warn!("{} records could not be indexed during rebuild", skipped);
        }
    }

    // ------------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------------

    fn lock_gate(&self) -> MemvecResult<MutexGuard<'_, InitGate>> {
        self.gate
            .lock()
            .map_err(|e| MemvecError::internal(format!("Failed to acquire init lock: {}", e)))
    }

    fn read_state(&self) -> MemvecResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|e| MemvecError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_state(&self) -> MemvecResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|e| MemvecError::internal(format!("Failed to acquire write lock: {}", e)))
    }
}
