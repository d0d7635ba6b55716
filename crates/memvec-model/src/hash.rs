//! Deterministic hash-based embedding.
//!
//! Used as the offline provider and as the fallback whenever the primary
//! provider fails. Text is segmented into Unicode words, lowercased,
//! stop-word filtered and stemmed; every unigram and adjacent bigram is then
//! hashed (FNV-1a) into a signed bucket of the output vector, which is finally
//! L2-normalized. The same text always yields the same vector, and texts
//! sharing stemmed words land close together under cosine similarity.

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::ModelResult;
use crate::EmbeddingProvider;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

/// Provider name reported by [`HashEmbedding`].
pub const HASH_PROVIDER_NAME: &str = "hash";

/// Feature-hashing embedding provider. Never fails.
pub struct HashEmbedding {
    dimension: usize,
    stemmer: Stemmer,
    stopwords: HashSet<&'static str>,
}

impl std::fmt::Debug for HashEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashEmbedding")
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl HashEmbedding {
    /// Create a hash embedding producing vectors of `dimension` floats.
    ///
    /// A dimension of 0 is bumped to 1 so the output is always a valid vector.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            stemmer: Stemmer::create(Algorithm::English),
            stopwords: stopwords(),
        }
    }

    /// Embed a single text. Infallible counterpart of [`EmbeddingProvider::embed`].
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let tokens = self.tokenize(text);
        let mut vector = vec![0.0f32; self.dimension];

        if tokens.is_empty() {
            // Nothing survived filtering: fall back to the raw text so distinct
            // inputs still get distinct vectors.
            self.accumulate(&mut vector, text.trim(), UNIGRAM_WEIGHT);
        } else {
            for token in &tokens {
                self.accumulate(&mut vector, token, UNIGRAM_WEIGHT);
            }
            for pair in tokens.windows(2) {
                let bigram = format!("{} {}", pair[0], pair[1]);
                self.accumulate(&mut vector, &bigram, BIGRAM_WEIGHT);
            }
        }

        l2_normalize(&mut vector);
        vector
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .filter_map(|word| {
                let lower = word.to_lowercase();
                if !lower.chars().any(|c| c.is_alphanumeric()) {
                    return None;
                }
                if self.stopwords.contains(lower.as_str()) {
                    return None;
                }
                Some(self.stemmer.stem(&lower).into_owned())
            })
            .collect()
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl EmbeddingProvider for HashEmbedding {
    fn embed_batch(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        HASH_PROVIDER_NAME
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Scale `vector` to unit length in place. Zero vectors become a unit basis vector.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    } else if let Some(first) = vector.first_mut() {
        *first = 1.0;
    }
}

/// Cosine similarity of two equal-length vectors; 0.0 on length mismatch or zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

fn stopwords() -> HashSet<&'static str> {
    [
        "a", "an", "the", "in", "on", "at", "to", "of", "with", "by", "from", "as", "into",
        "about", "and", "or", "but", "nor", "so", "i", "you", "he", "she", "it", "we", "they",
        "me", "him", "her", "us", "them", "my", "your", "his", "its", "our", "their", "this",
        "that", "these", "those", "which", "who", "whom", "what", "where", "when", "how", "why",
        "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
        "did", "will", "would", "could", "should", "can", "may", "might", "must", "very",
        "just", "also", "than", "then", "there", "here",
    ]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_deterministic_and_normalized() {
        let hash = HashEmbedding::new(64);
        let a = hash.embed_text("The user prefers dark mode");
        let b = hash.embed_text("The user prefers dark mode");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_stems_score_higher() {
        let hash = HashEmbedding::new(384);
        let pizza = hash.embed_text("pizza preference");
        let query = hash.embed_text("which pizza toppings are preferred");
        let weather = hash.embed_text("sunny weather");

        assert!(cosine_similarity(&pizza, &query) > cosine_similarity(&weather, &query));
    }

    #[test]
    fn test_empty_and_stopword_only_text() {
        let hash = HashEmbedding::new(16);
        let empty = hash.embed_text("");
        let stop = hash.embed_text("the and of");
        assert_eq!(empty.len(), 16);
        assert!(empty.iter().any(|x| *x != 0.0));
        assert!(stop.iter().any(|x| *x != 0.0));
    }

    #[test]
    fn test_provider_trait() {
        let hash = HashEmbedding::new(8);
        let out = hash.embed_batch(&["one", "two"]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(hash.dimension(), 8);
        assert_eq!(hash.name(), HASH_PROVIDER_NAME);
        assert_eq!(hash.embed("one").unwrap(), out[0]);
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
