//! VectorStore behavior over an instrumented in-memory backend.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use memvec_db::{HnswParams, RecordStore};
use memvec_core::{
    MemoryNode, MemoryType, MemvecError, ResilientEmbedder, SearchOptions, Snapshot,
    VectorSearchFilter, VectorStore,
};

use common::{concept_store, NanEmbedder, TestStore, CONCEPT_DIM};

fn seeded_store() -> (Arc<TestStore>, VectorStore) {
    let backend = Arc::new(TestStore::new(CONCEPT_DIM));
    let store = concept_store(Arc::clone(&backend));
    store
        .store(
            MemoryNode::new("pizza preference")
                .with_id("pizza")
                .with_type(MemoryType::Preference)
                .with_tags(["food"]),
        )
        .unwrap();
    store
        .store(
            MemoryNode::new("dark mode preference")
                .with_id("dark-mode")
                .with_type(MemoryType::Preference),
        )
        .unwrap();
    store
        .store(
            MemoryNode::new("sunny weather")
                .with_id("weather")
                .with_type(MemoryType::Fact),
        )
        .unwrap();
    (backend, store)
}

#[test]
fn test_get_after_store_returns_content_and_tags() {
    let (_, store) = seeded_store();
    let record = store.get_by_id("pizza").unwrap();
    assert_eq!(record.content, "pizza preference");
    assert_eq!(record.memory_type, MemoryType::Preference);
    assert!(record.tags.contains("food"));
    assert_eq!(record.vector.len(), CONCEPT_DIM);
    assert!(store.get_by_id("absent").is_none());
}

#[test]
fn test_food_query_ranks_pizza_first() {
    let (_, store) = seeded_store();
    let options = SearchOptions::default()
        .with_min_score(0.5)
        .with_max_results(5);

    let hits = store.search("what food does the user like", &options);
    assert!(!hits.is_empty());
    assert_eq!(hits[0].record.id, "pizza");
    assert!(hits.iter().all(|h| h.score >= 0.5));
}

#[test]
fn test_search_never_returns_below_min_score() {
    let (_, store) = seeded_store();
    for min_score in [0.0, 0.2, 0.4, 0.6, 0.9] {
        let options = SearchOptions::default().with_min_score(min_score);
        for query in ["preference", "sunny food", "dark theme", "nothing matches"] {
            let hits = store.search(query, &options);
            assert!(
                hits.iter().all(|h| h.score >= min_score),
                "query {:?} at {}",
                query,
                min_score
            );
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }
}

#[test]
fn test_filter_and_predicate_narrow_results() {
    let (_, store) = seeded_store();
    let facts = SearchOptions::default()
        .with_min_score(0.0)
        .with_filter(VectorSearchFilter::new().with_type(MemoryType::Fact));
    let hits = store.search("preference weather", &facts);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, "weather");

    let options = SearchOptions::default().with_min_score(0.0);
    let hits = store.search_with("preference", &options, |r| r.id != "pizza");
    assert!(hits.iter().all(|h| h.record.id != "pizza"));
    assert!(hits.iter().any(|h| h.record.id == "dark-mode"));
}

#[test]
fn test_search_updates_access_stats() {
    let (backend, store) = seeded_store();
    let options = SearchOptions::default().with_min_score(0.5);
    let hits = store.search("pizza", &options);
    assert_eq!(hits[0].record.access_count, 1);
    assert_eq!(store.get_by_id("pizza").unwrap().access_count, 1);

    let persisted = backend.get("pizza").unwrap().unwrap();
    assert_eq!(persisted.access_count, 1);
}

#[test]
fn test_export_clear_import_round_trip() {
    let (_, store) = seeded_store();
    let before = store.get_all().unwrap();
    let json = store.export().unwrap().to_json().unwrap();

    store.clear().unwrap();
    assert!(store.get_all().unwrap().is_empty());

    let report = store.import(Snapshot::from_json(&json).unwrap()).unwrap();
    assert_eq!(report.imported, before.len());
    assert_eq!(report.failed, 0);

    let after = store.get_all().unwrap();
    let summary = |records: &[memvec_core::VectorRecord]| {
        let mut v: Vec<(String, String)> = records
            .iter()
            .map(|r| (r.id.clone(), r.content.clone()))
            .collect();
        v.sort();
        v
    };
    assert_eq!(summary(&after), summary(&before));
    assert_eq!(store.search("pizza", &SearchOptions::default())[0].record.id, "pizza");
}

#[test]
fn test_import_reembeds_and_rejects_per_entry() {
    let backend = Arc::new(TestStore::new(CONCEPT_DIM));
    let store = concept_store(backend);
    let json = r#"{
        "version": "1.0",
        "exportedAt": "2024-05-01T12:00:00Z",
        "vectors": [
            {"id": "bare", "vector": [], "metadata": {"content": "pizza"}},
            {"id": "short", "vector": [1.0, 0.0], "metadata": {"content": "rain"}},
            {"id": "", "vector": [], "metadata": {"content": "orphan"}}
        ]
    }"#;

    let report = store.import(Snapshot::from_json(json).unwrap()).unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.errors.len(), 2);

    let bare = store.get_by_id("bare").unwrap();
    assert_eq!(bare.vector.len(), CONCEPT_DIM);
    assert!(bare.vector[0] > 0.9);
}

#[test]
fn test_concurrent_initialize_opens_once() {
    let backend =
        Arc::new(TestStore::new(CONCEPT_DIM).with_open_delay(Duration::from_millis(100)));
    let store = Arc::new(concept_store(Arc::clone(&backend)));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.initialize())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
    assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    assert!(store.is_initialized());
}

#[test]
fn test_failed_initialize_is_shared_then_retried() {
    let backend =
        Arc::new(TestStore::new(CONCEPT_DIM).with_open_delay(Duration::from_millis(50)));
    backend.set_fail_open(true);
    let store = Arc::new(concept_store(Arc::clone(&backend)));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.initialize())
        })
        .collect();
    for handle in handles {
        assert!(matches!(
            handle.join().unwrap(),
            Err(MemvecError::InitializationFailure { .. })
        ));
    }
    assert!(!store.is_initialized());
    assert!(store.search("pizza", &SearchOptions::default()).is_empty());

    backend.set_fail_open(false);
    store.initialize().unwrap();
    assert!(store.is_initialized());
    assert!(backend.opens.load(Ordering::SeqCst) >= 2);
}

#[test]
fn test_deletes_tombstone_then_rebuild() {
    let backend = Arc::new(TestStore::new(CONCEPT_DIM));
    let store = concept_store(backend);
    let words = ["pizza", "pasta", "rain", "sunny", "dark", "theme", "prefer", "food"];
    for i in 0..20 {
        store
            .store(
                MemoryNode::new(format!("{} {}", words[i % words.len()], i))
                    .with_id(format!("m{}", i)),
            )
            .unwrap();
    }

    for i in 0..5 {
        assert!(store.delete(&format!("m{}", i)).unwrap());
    }
    let stats = store.get_stats();
    assert_eq!(stats.index_tombstones, 5);
    assert_eq!(stats.rebuilds, 0);

    assert!(store.delete("m5").unwrap());
    let stats = store.get_stats();
    assert_eq!(stats.rebuilds, 1);
    assert_eq!(stats.index_tombstones, 0);
    assert_eq!(stats.index_live, 14);
    assert_eq!(stats.records, 14);

    let options = SearchOptions::default().with_min_score(-1.0).with_max_results(20);
    let hits = store.search("pizza pasta rain", &options);
    assert_eq!(hits.len(), 14);
    assert!(hits.iter().all(|h| h.record.id != "m0" && h.record.id != "m5"));
    assert!(!store.delete("m0").unwrap());
}

#[test]
fn test_storage_full_then_evict_and_retry() {
    let backend = Arc::new(TestStore::new(CONCEPT_DIM).with_max_records(3));
    let store = concept_store(backend);
    store.store(MemoryNode::new("pizza").with_id("a")).unwrap();
    store.store(MemoryNode::new("sunny weather").with_id("b")).unwrap();
    store.store(MemoryNode::new("dark mode").with_id("c")).unwrap();

    let err = store.store(MemoryNode::new("pasta").with_id("d")).unwrap_err();
    assert!(err.is_storage_full());
    assert!(store.get_by_id("d").is_none());

    // Touch "a" so it is the most recently used.
    store.search("pizza", &SearchOptions::default().with_min_score(0.5));

    let evicted = store.evict_least_recently_used(1).unwrap();
    assert_eq!(evicted, vec!["b".to_string()]);
    store.store(MemoryNode::new("pasta").with_id("d")).unwrap();
    assert_eq!(store.get_all().unwrap().len(), 3);
    assert!(store.get_by_id("a").is_some());
}

#[test]
fn test_bulk_writes_flush_backend() {
    let backend = Arc::new(TestStore::new(CONCEPT_DIM));
    let store = concept_store(Arc::clone(&backend));

    store
        .store_batch(vec![
            MemoryNode::new("pizza").with_id("a"),
            MemoryNode::new("pasta").with_id("b"),
        ])
        .unwrap();
    assert_eq!(backend.flushes.load(Ordering::SeqCst), 1);

    let snapshot = store.export().unwrap();
    store.evict_least_recently_used(1).unwrap();
    store.clear().unwrap();
    store.import(snapshot).unwrap();
    assert_eq!(backend.flushes.load(Ordering::SeqCst), 4);
}

#[test]
fn test_non_finite_provider_still_stores() {
    let backend = Arc::new(TestStore::new(CONCEPT_DIM));
    let store = VectorStore::new(
        Arc::clone(&backend) as Arc<dyn RecordStore>,
        ResilientEmbedder::new(Box::new(NanEmbedder)),
        HnswParams::default().with_seed(42),
    )
    .unwrap();

    let record = store
        .store(MemoryNode::new("pizza preference").with_id("p"))
        .unwrap();
    assert!(record.vector.iter().all(|x| x.is_finite()));
    assert_eq!(store.get_by_id("p").unwrap().content, "pizza preference");
    assert!(store.embedder().stats().fallback_embeddings >= 1);
}

#[test]
fn test_rebuild_and_verify_index() {
    let (_, store) = seeded_store();
    assert_eq!(store.rebuild_index().unwrap(), 3);
    let report = store.verify_index().unwrap();
    assert!(report.is_healthy());
    assert_eq!(report.live, 3);
    assert!(store.get_stats().rebuilds >= 1);
}

#[test]
fn test_similarity_of_texts() {
    let (_, store) = seeded_store();
    assert!(store.similarity("pizza", "food") > 0.99);
    assert!(store.similarity("pizza", "sunny weather") < 0.01);
}
