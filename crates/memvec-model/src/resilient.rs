//! Embedding front-end that never fails.
//!
//! [`ResilientEmbedder`] owns one primary provider, chosen once when it is
//! built, and a [`HashEmbedding`] of the same dimension. A call that the
//! primary cannot serve (error, wrong vector count, wrong dimension, or
//! non-finite values) is answered by the hash embedding instead and counted.
//! Primary results are kept in a bounded LRU cache keyed by the (truncated)
//! input text.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::hash::{cosine_similarity, HashEmbedding, HASH_PROVIDER_NAME};
use crate::{create_embedding_provider, EmbeddingProvider};

/// Where an embedding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingSource {
    /// Computed by the primary provider.
    Primary,
    /// Served from the LRU cache of primary results.
    Cache,
    /// Computed by the hash fallback.
    Fallback,
}

/// A vector together with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub source: EmbeddingSource,
}

/// Counters reported by [`ResilientEmbedder::stats`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedderStats {
    pub provider: String,
    pub dimension: usize,
    pub degraded: bool,
    pub primary_embeddings: u64,
    pub fallback_embeddings: u64,
    pub cache_hits: u64,
    pub cache_len: usize,
    pub cache_capacity: usize,
}

/// Infallible embedder with fallback and caching.
pub struct ResilientEmbedder {
    primary: Option<Box<dyn EmbeddingProvider>>,
    fallback: HashEmbedding,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
    max_text_chars: usize,
    primary_count: AtomicU64,
    fallback_count: AtomicU64,
    cache_hits: AtomicU64,
}

impl std::fmt::Debug for ResilientEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientEmbedder")
            .field("provider", &self.provider_name())
            .field("dimension", &self.dimension())
            .finish()
    }
}

impl ResilientEmbedder {
    /// Wrap `primary`; the fallback takes the primary's dimension.
    pub fn new(primary: Box<dyn EmbeddingProvider>) -> Self {
        let fallback = HashEmbedding::new(primary.dimension());
        Self::build(Some(primary), fallback)
    }

    /// Embedder that only ever uses the hash embedding.
    pub fn hash_only(dimension: usize) -> Self {
        Self::build(None, HashEmbedding::new(dimension))
    }

    fn build(primary: Option<Box<dyn EmbeddingProvider>>, fallback: HashEmbedding) -> Self {
        Self {
            primary,
            fallback,
            cache: None,
            max_text_chars: usize::MAX,
            primary_count: AtomicU64::new(0),
            fallback_count: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// Enable an LRU cache of `capacity` primary embeddings (0 disables it).
    pub fn with_cache_size(mut self, capacity: usize) -> Self {
        self.cache = match (&self.primary, NonZeroUsize::new(capacity)) {
            (Some(_), Some(cap)) => Some(Mutex::new(LruCache::new(cap))),
            _ => None,
        };
        self
    }

    /// Truncate inputs to at most `max_chars` characters before embedding.
    pub fn with_max_text_chars(mut self, max_chars: usize) -> Self {
        self.max_text_chars = max_chars.max(1);
        self
    }

    /// Vector dimension of every embedding this embedder returns.
    pub fn dimension(&self) -> usize {
        self.fallback.dimension()
    }

    /// Name of the primary provider, or `hash` when running degraded.
    pub fn provider_name(&self) -> &str {
        self.primary
            .as_ref()
            .map(|p| p.name())
            .unwrap_or(HASH_PROVIDER_NAME)
    }

    /// True when no primary provider is available.
    pub fn is_degraded(&self) -> bool {
        self.primary.is_none()
    }

    /// Embed one text.
    pub fn embed(&self, text: &str) -> Embedding {
        self.embed_batch(&[text])
            .pop()
            .unwrap_or_else(|| Embedding {
                vector: self.fallback.embed_text(text),
                source: EmbeddingSource::Fallback,
            })
    }

    /// Embed many texts, one result per input, in order.
    pub fn embed_batch(&self, texts: &[&str]) -> Vec<Embedding> {
        let inputs: Vec<&str> = texts.iter().map(|t| self.truncate(t)).collect();
        let mut results: Vec<Option<Embedding>> = vec![None; inputs.len()];

        let Some(primary) = self.primary.as_ref() else {
            return inputs.iter().map(|t| self.fallback_for(t)).collect();
        };

        let mut misses: Vec<usize> = Vec::new();
        if let Some(cache) = self.cache.as_ref() {
            if let Ok(mut cache) = cache.lock() {
                for (i, text) in inputs.iter().enumerate() {
                    match cache.get(*text) {
                        Some(vector) => {
                            self.cache_hits.fetch_add(1, Ordering::Relaxed);
                            results[i] = Some(Embedding {
                                vector: vector.clone(),
                                source: EmbeddingSource::Cache,
                            });
                        }
                        None => misses.push(i),
                    }
                }
            } else {
                misses.extend(0..inputs.len());
            }
        } else {
            misses.extend(0..inputs.len());
        }

        if !misses.is_empty() {
            let miss_texts: Vec<&str> = misses.iter().map(|&i| inputs[i]).collect();
            match self.call_primary(primary.as_ref(), &miss_texts) {
                Some(vectors) => {
                    self.primary_count
                        .fetch_add(vectors.len() as u64, Ordering::Relaxed);
                    if let Some(Ok(mut cache)) = self.cache.as_ref().map(|c| c.lock()) {
                        for (&i, vector) in misses.iter().zip(&vectors) {
                            cache.put(inputs[i].to_string(), vector.clone());
                        }
                    }
                    for (&i, vector) in misses.iter().zip(vectors) {
                        results[i] = Some(Embedding {
                            vector,
                            source: EmbeddingSource::Primary,
                        });
                    }
                }
                None => {
                    for &i in &misses {
                        results[i] = Some(self.fallback_for(inputs[i]));
                    }
                }
            }
        }

        results
            .into_iter()
            .zip(inputs)
            .map(|(result, text)| result.unwrap_or_else(|| self.fallback_for(text)))
            .collect()
    }

    /// Cosine similarity of the embeddings of two texts.
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        let mut pair = self.embed_batch(&[a, b]).into_iter();
        match (pair.next(), pair.next()) {
            (Some(x), Some(y)) => cosine_similarity(&x.vector, &y.vector),
            _ => 0.0,
        }
    }

    /// Drop every cached embedding.
    pub fn clear_cache(&self) -> usize {
        match self.cache.as_ref().map(|c| c.lock()) {
            Some(Ok(mut cache)) => {
                let n = cache.len();
                cache.clear();
                n
            }
            _ => 0,
        }
    }

    /// Snapshot of the embedder's counters.
    pub fn stats(&self) -> EmbedderStats {
        let (cache_len, cache_capacity) = match self.cache.as_ref().map(|c| c.lock()) {
            Some(Ok(cache)) => (cache.len(), cache.cap().get()),
            _ => (0, 0),
        };
        EmbedderStats {
            provider: self.provider_name().to_string(),
            dimension: self.dimension(),
            degraded: self.is_degraded(),
            primary_embeddings: self.primary_count.load(Ordering::Relaxed),
            fallback_embeddings: self.fallback_count.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_len,
            cache_capacity,
        }
    }

    fn call_primary(&self, primary: &dyn EmbeddingProvider, texts: &[&str]) -> Option<Vec<Vec<f32>>> {
        match primary.embed_batch(texts) {
            Ok(vectors) if vectors.len() != texts.len() => {
                warn!(
                    "Provider '{}' returned {} vectors for {} texts; using hash fallback",
                    primary.name(),
                    vectors.len(),
                    texts.len()
                );
                None
            }
            Ok(vectors) => {
                let expected = self.dimension();
                if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                    warn!(
                        "Provider '{}' returned dimension {}, expected {}; using hash fallback",
                        primary.name(),
                        bad.len(),
                        expected
                    );
                    return None;
                }
                if vectors.iter().flatten().any(|x| !x.is_finite()) {
                    warn!(
                        "Provider '{}' returned non-finite values; using hash fallback",
                        primary.name()
                    );
                    return None;
                }
                Some(vectors)
            }
            Err(e) => {
                warn!(
                    "Provider '{}' failed: {}; using hash fallback",
                    primary.name(),
                    e
                );
                None
            }
        }
    }

    fn fallback_for(&self, text: &str) -> Embedding {
        self.fallback_count.fetch_add(1, Ordering::Relaxed);
        Embedding {
            vector: self.fallback.embed_text(text),
            source: EmbeddingSource::Fallback,
        }
    }

    fn truncate<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.max_text_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }
}

/// Build the embedder described by `config`.
///
/// The primary provider is constructed once here. If that fails, the error is
/// logged and the embedder runs on the hash embedding for its whole lifetime.
pub fn create_resilient_embedder(config: &EmbeddingConfig) -> ResilientEmbedder {
    let embedder = if config.provider == EmbeddingProviderKind::Hash {
        ResilientEmbedder::hash_only(config.dimension)
    } else {
        match create_embedding_provider(config) {
            Ok(provider) if provider.dimension() == config.dimension => {
                debug!(
                    "Using embedding provider '{}' (dim={})",
                    provider.name(),
                    provider.dimension()
                );
                ResilientEmbedder::new(provider)
            }
            Ok(provider) => {
                warn!(
                    "Embedding provider '{}' has dimension {}, store expects {}; using hash embedding",
                    provider.name(),
                    provider.dimension(),
                    config.dimension
                );
                ResilientEmbedder::hash_only(config.dimension)
            }
            Err(e) => {
                warn!(
                    "Embedding provider '{}' unavailable, using hash embedding: {}",
                    config.provider, e
                );
                ResilientEmbedder::hash_only(config.dimension)
            }
        }
    };

    embedder
        .with_cache_size(config.cache_size)
        .with_max_text_chars(config.max_text_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, ModelResult};
    use std::sync::atomic::AtomicBool;

    #[derive(Debug, Default)]
    struct FlakyProvider {
        failing: AtomicBool,
        calls: AtomicU64,
    }

    impl EmbeddingProvider for FlakyProvider {
        fn embed_batch(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(ModelError::embedding_failed("flaky", "offline"));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0, 0.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[test]
    fn test_primary_then_cache() {
        let embedder = ResilientEmbedder::new(Box::new(FlakyProvider::default())).with_cache_size(8);

        let first = embedder.embed("hello");
        assert_eq!(first.source, EmbeddingSource::Primary);
        assert_eq!(first.vector, vec![5.0, 1.0, 0.0, 0.0]);

        let second = embedder.embed("hello");
        assert_eq!(second.source, EmbeddingSource::Cache);
        assert_eq!(second.vector, first.vector);

        let stats = embedder.stats();
        assert_eq!(stats.primary_embeddings, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_len, 1);
    }

    #[test]
    fn test_failure_falls_back_without_error() {
        let provider = FlakyProvider::default();
        provider.failing.store(true, Ordering::SeqCst);
        let embedder = ResilientEmbedder::new(Box::new(provider)).with_cache_size(8);

        let out = embedder.embed_batch(&["a", "b"]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.source == EmbeddingSource::Fallback));
        assert!(out.iter().all(|e| e.vector.len() == 4));
        assert_eq!(embedder.stats().fallback_embeddings, 2);
        // fallback vectors are never cached
        assert_eq!(embedder.stats().cache_len, 0);
    }

    #[derive(Debug)]
    struct NanProvider;

    impl EmbeddingProvider for NanProvider {
        fn embed_batch(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![f32::NAN, 1.0, 0.0, f32::INFINITY]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "nan"
        }
    }

    #[test]
    fn test_non_finite_vectors_fall_back() {
        let embedder = ResilientEmbedder::new(Box::new(NanProvider)).with_cache_size(8);

        let out = embedder.embed_batch(&["pizza preference"]);
        assert_eq!(out[0].source, EmbeddingSource::Fallback);
        assert!(out[0].vector.iter().all(|x| x.is_finite()));
        assert_eq!(out[0].vector.len(), 4);
        assert_eq!(embedder.stats().fallback_embeddings, 1);
        assert_eq!(embedder.stats().cache_len, 0);
    }

    #[test]
    fn test_lru_evicts_oldest() {
        let embedder = ResilientEmbedder::new(Box::new(FlakyProvider::default())).with_cache_size(2);
        embedder.embed("one");
        embedder.embed("two");
        embedder.embed("three");

        assert_eq!(embedder.stats().cache_len, 2);
        assert_eq!(embedder.embed("one").source, EmbeddingSource::Primary);
        assert_eq!(embedder.embed("three").source, EmbeddingSource::Cache);
        assert_eq!(embedder.clear_cache(), 2);
    }

    #[test]
    fn test_truncates_long_text() {
        let embedder = ResilientEmbedder::new(Box::new(FlakyProvider::default()))
            .with_cache_size(4)
            .with_max_text_chars(3);
        let out = embedder.embed("héllo world");
        // truncated to "hél" = 4 bytes
        assert_eq!(out.vector[0], 4.0);
    }

    #[test]
    fn test_hash_only_is_degraded() {
        let embedder = ResilientEmbedder::hash_only(32).with_cache_size(100);
        assert!(embedder.is_degraded());
        assert_eq!(embedder.provider_name(), "hash");
        let e = embedder.embed("offline");
        assert_eq!(e.source, EmbeddingSource::Fallback);
        assert_eq!(e.vector.len(), 32);
        assert!(embedder.similarity("dark mode", "dark mode") > 0.99);
    }

    #[test]
    fn test_factory_hash_provider() {
        let config = EmbeddingConfig::default()
            .with_provider(EmbeddingProviderKind::Hash)
            .with_dimension(48);
        let embedder = create_resilient_embedder(&config);
        assert_eq!(embedder.dimension(), 48);
        assert!(embedder.is_degraded());
    }

    #[test]
    fn test_factory_missing_model_degrades() {
        let config = EmbeddingConfig::default()
            .with_local_path("/nonexistent/memvec/model")
            .with_dimension(16);
        let embedder = create_resilient_embedder(&config);
        assert!(embedder.is_degraded());
        assert_eq!(embedder.embed("still works").vector.len(), 16);
    }
}
