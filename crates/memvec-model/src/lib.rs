//! # memvec-model
//!
//! Embedding layer for memvec: turns text into fixed-length vectors.
//!
//! - **Providers**: the [`EmbeddingProvider`] trait and its implementations
//!   (Candle sentence-transformers, HTTP embedding server, hash fallback)
//! - **Resilience**: [`ResilientEmbedder`] picks one provider at construction
//!   and answers every call, falling back to [`HashEmbedding`] on failure
//! - **Model locator**: runtime path resolution for disk-based models
//!
//! ## Model Location
//!
//! Models are searched in this order:
//! 1. `$MEMVEC_MODELS_DIR` environment variable
//! 2. `~/.memvec/models` user directory
//! 3. `{exe_dir}/models` next to the binary
//!
//! ## Features
//!
//! - `embedded` (default): Local Candle inference with disk-based models
//! - `remote`: Client for an HTTP embedding server
//!
//! ## Usage
//!
//! ```ignore
//! use memvec_model::{create_resilient_embedder, EmbeddingConfig};
//!
//! let embedder = create_resilient_embedder(&EmbeddingConfig::default());
//! let embedding = embedder.embed("Hello, world!");
//! assert_eq!(embedding.vector.len(), embedder.dimension());
//! ```

pub mod config;
pub mod error;
pub mod hash;
pub mod model_locator;
pub mod resilient;

#[cfg(feature = "embedded")]
mod embedding;

#[cfg(feature = "remote")]
mod remote;

pub use config::{
    DevicePreference, EmbeddingConfig, EmbeddingProviderKind, HuggingFaceModelConfig,
    ModelArchitecture,
};
pub use error::{ModelError, ModelResult};
pub use hash::{cosine_similarity, l2_normalize, HashEmbedding};
pub use model_locator::{
    ModelLocator, DEFAULT_EMBEDDING_MODEL_NAME, EMBEDDINGS_SUBDIR, MEMVEC_MODELS_DIR_ENV,
    REQUIRED_MODEL_FILES,
};
pub use resilient::{
    create_resilient_embedder, EmbedderStats, Embedding, EmbeddingSource, ResilientEmbedder,
};

#[cfg(feature = "embedded")]
pub use embedding::CandleEmbeddingModel;

#[cfg(feature = "remote")]
pub use remote::HttpEmbeddingModel;

/// Default model ID (full HuggingFace identifier).
pub const DEFAULT_EMBEDDING_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Output dimension of the default model.
pub const DEFAULT_DIMENSION: usize = 384;

// ============================================================================
// Embedding Provider Trait
// ============================================================================

/// A text-to-vector function.
///
/// Implementations must be `Send + Sync` so a single provider can serve the
/// store and the sync worker concurrently.
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Embed a batch of texts, one vector of length `dimension()` per input.
    fn embed_batch(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed(&self, text: &str) -> ModelResult<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| ModelError::embedding_failed(self.name(), "provider returned no vector"))
    }

    /// Run a dummy inference so the first real call does not pay load costs.
    fn warm_up(&self) -> ModelResult<()> {
        let _ = self.embed("warmup")?;
        Ok(())
    }

    /// Length of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Human-readable provider or model name.
    fn name(&self) -> &str;
}

// ============================================================================
// Factory
// ============================================================================

/// Create the provider selected by `config.provider`.
///
/// # Errors
///
/// Returns `ModelError::ProviderNotAvailable` when the provider's cargo
/// feature is disabled, or the provider's own error when it fails to load.
pub fn create_embedding_provider(
    config: &EmbeddingConfig,
) -> ModelResult<Box<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderKind::Hash => Ok(Box::new(HashEmbedding::new(config.dimension))),

        #[cfg(feature = "embedded")]
        EmbeddingProviderKind::Candle => {
            Ok(Box::new(embedding::CandleEmbeddingModel::new(config)?))
        }

        #[cfg(not(feature = "embedded"))]
        EmbeddingProviderKind::Candle => Err(ModelError::not_available(
            "candle",
            "memvec was built without the 'embedded' feature",
        )),

        #[cfg(feature = "remote")]
        EmbeddingProviderKind::Http => Ok(Box::new(remote::HttpEmbeddingModel::new(config)?)),

        #[cfg(not(feature = "remote"))]
        EmbeddingProviderKind::Http => Err(ModelError::not_available(
            "http",
            "memvec was built without the 'remote' feature",
        )),
    }
}
