//! Shared test doubles for memvec-core integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use memvec_core::{ResilientEmbedder, VectorStore};
use memvec_db::{DbError, DbResult, HnswParams, MemoryRecordStore, RecordStore, VectorRecord};
use memvec_model::{EmbeddingProvider, ModelResult};

// ============================================================================
// ConceptEmbedder
// ============================================================================

/// Dimension of [`ConceptEmbedder`] vectors.
pub const CONCEPT_DIM: usize = 8;

/// Maps a handful of words onto fixed concept axes so similarity is predictable.
///
/// Axes: 0 food, 1 display, 2 weather, 3 preference. Every other word adds a
/// small weight to the last axis.
#[derive(Debug, Default)]
pub struct ConceptEmbedder;

impl ConceptEmbedder {
    fn axis(word: &str) -> Option<usize> {
        match word {
            "pizza" | "food" | "pasta" | "eat" => Some(0),
            "dark" | "mode" | "display" | "theme" => Some(1),
            "sunny" | "weather" | "rain" => Some(2),
            "preference" | "like" | "likes" | "prefer" => Some(3),
            _ => None,
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; CONCEPT_DIM];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            match Self::axis(&word.to_lowercase()) {
                Some(axis) => v[axis] += 1.0,
                None => v[CONCEPT_DIM - 1] += 0.1,
            }
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            v[CONCEPT_DIM - 1] = 1.0;
            return v;
        }
        v.iter().map(|x| x / norm).collect()
    }
}

impl EmbeddingProvider for ConceptEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        CONCEPT_DIM
    }

    fn name(&self) -> &str {
        "concept"
    }
}

/// Returns NaN-laden vectors of the concept dimension.
#[derive(Debug, Default)]
pub struct NanEmbedder;

impl EmbeddingProvider for NanEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|_| {
                let mut v = vec![0.0f32; CONCEPT_DIM];
                v[0] = f32::NAN;
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        CONCEPT_DIM
    }

    fn name(&self) -> &str {
        "nan"
    }
}

// ============================================================================
// TestStore
// ============================================================================

/// In-memory record store that counts calls and injects failures.
#[derive(Debug)]
pub struct TestStore {
    inner: MemoryRecordStore,
    pub opens: AtomicUsize,
    pub loads: AtomicUsize,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub flushes: AtomicUsize,
    open_delay: Duration,
    fail_open: AtomicBool,
    fail_all_writes: AtomicBool,
    failing_puts: AtomicUsize,
    pub put_log: Mutex<Vec<String>>,
}

impl TestStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: MemoryRecordStore::new(dimension),
            opens: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            open_delay: Duration::ZERO,
            fail_open: AtomicBool::new(false),
            fail_all_writes: AtomicBool::new(false),
            failing_puts: AtomicUsize::new(0),
            put_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.inner = self.inner.with_max_records(max_records);
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Fail every put and delete until turned off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_all_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `n` puts.
    pub fn fail_next_puts(&self, n: usize) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Puts and deletes attempted so far.
    pub fn write_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst) + self.deletes.load(Ordering::SeqCst)
    }

    pub fn put_ids(&self) -> Vec<String> {
        self.put_log.lock().unwrap().clone()
    }

    fn injected_failure(&self) -> bool {
        if self.fail_all_writes.load(Ordering::SeqCst) {
            return true;
        }
        self.failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl RecordStore for TestStore {
    fn open(&self) -> DbResult<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.open_delay);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(DbError::internal("backend unavailable"));
        }
        self.inner.open()
    }

    fn put(&self, record: &VectorRecord) -> DbResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.injected_failure() {
            return Err(DbError::internal("injected put failure"));
        }
        self.inner.put(record)?;
        self.put_log.lock().unwrap().push(record.id.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> DbResult<Option<VectorRecord>> {
        self.inner.get(id)
    }

    fn get_all(&self) -> DbResult<Vec<VectorRecord>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_all()
    }

    fn delete(&self, id: &str) -> DbResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_writes.load(Ordering::SeqCst) {
            return Err(DbError::internal("injected delete failure"));
        }
        self.inner.delete(id)
    }

    fn clear(&self) -> DbResult<()> {
        self.inner.clear()
    }

    fn len(&self) -> DbResult<usize> {
        self.inner.len()
    }

    fn flush(&self) -> DbResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        self.inner.flush()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn backend_name(&self) -> &'static str {
        "test"
    }
}

// ============================================================================
// Builders
// ============================================================================

/// A vector store over `backend` using the concept embedder.
pub fn concept_store(backend: Arc<TestStore>) -> VectorStore {
    VectorStore::new(
        backend,
        ResilientEmbedder::new(Box::new(ConceptEmbedder)),
        HnswParams::default().with_seed(42),
    )
    .expect("dimensions match")
}
