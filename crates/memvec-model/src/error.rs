//! Error types for memvec-model.
//!
//! Errors explain what went wrong and, for model discovery problems, where
//! models are expected and how to install them. None of these errors ever
//! escape [`ResilientEmbedder`](crate::ResilientEmbedder): it absorbs them by
//! switching to the hash fallback.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for memvec-model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in memvec-model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    // ========================================================================
    // Model discovery errors
    // ========================================================================
    /// No models directory found in any search location.
    #[error("{}", format_models_dir_not_found(.searched))]
    ModelsDirectoryNotFound { searched: Vec<PathBuf> },

    /// Model files not found at expected location.
    #[error("Model not found: {model_id}\n\nExpected at: {}\n\nThe directory must contain config.json, model.safetensors, and tokenizer.json.", .path.display())]
    ModelNotFound { model_id: String, path: PathBuf },

    /// Model directory exists but is missing required files.
    #[error("Incomplete model installation at {}: missing {}", .path.display(), .missing.join(", "))]
    IncompleteModelFiles {
        path: PathBuf,
        missing: Vec<&'static str>,
    },

    // ========================================================================
    // Model loading errors
    // ========================================================================
    /// Failed to load model.
    #[error("Failed to load model '{model_id}': {message}")]
    ModelLoad { model_id: String, message: String },

    /// Model configuration invalid or corrupted.
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    // ========================================================================
    // Inference errors
    // ========================================================================
    /// Tokenization failed.
    #[error("Tokenization failed: {message}")]
    Tokenization { message: String },

    /// Embedding generation failed.
    #[error("Embedding failed for provider '{provider}': {message}")]
    EmbeddingFailed { provider: String, message: String },

    /// Provider returned vectors of the wrong length.
    #[error("Provider '{provider}' returned dimension {actual}, expected {expected}")]
    DimensionMismatch {
        provider: String,
        expected: usize,
        actual: usize,
    },

    // ========================================================================
    // Provider errors
    // ========================================================================
    /// Provider not available.
    #[error("Provider '{provider}' not available: {reason}")]
    ProviderNotAvailable { provider: String, reason: String },

    /// Device not available.
    #[error("Compute device not available: {reason}\n\nSet embedding.device to 'cpu' in ~/.memvec/config.yaml to use CPU-only inference.")]
    DeviceNotAvailable { reason: String },

    /// Remote embedding server request failed.
    #[error("Embedding server request to {url} failed: {message}")]
    Remote { url: String, message: String },

    // ========================================================================
    // I/O errors
    // ========================================================================
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_models_dir_not_found(searched: &[PathBuf]) -> String {
    let list = searched
        .iter()
        .enumerate()
        .map(|(i, p)| format!("  {}. {}", i + 1, p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Models directory not found.\n\n\
        memvec searched these locations:\n\
        {list}\n\n\
        To fix:\n\
        1. Set $MEMVEC_MODELS_DIR to your models directory, OR\n\
        2. Copy models to ~/.memvec/models/, OR\n\
        3. Use `provider: hash` for offline operation."
    )
}

// ============================================================================
// Error constructors
// ============================================================================

impl ModelError {
    /// Create a model load error.
    pub fn model_load(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Create an embedding failed error.
    pub fn embedding_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a tokenization error.
    pub fn tokenization(message: impl Into<String>) -> Self {
        Self::Tokenization {
            message: message.into(),
        }
    }

    /// Create a remote request error.
    pub fn remote(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a provider-not-available error.
    pub fn not_available(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderNotAvailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}
