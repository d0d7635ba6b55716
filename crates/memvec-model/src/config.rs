//! Configuration types for memvec-model.
//!
//! [`EmbeddingConfig`] is embedded verbatim as the `embedding:` section of the
//! memvec YAML configuration, so its keys are camelCase.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model_locator::{extract_model_name, ModelLocator, EMBEDDINGS_SUBDIR};
use crate::{DEFAULT_DIMENSION, DEFAULT_EMBEDDING_MODEL_ID};

// ============================================================================
// DevicePreference
// ============================================================================

/// Preference for compute device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Auto-select best device (GPU if available, else CPU).
    #[default]
    Auto,
    /// Force GPU (Metal on macOS, CUDA on Linux).
    Gpu,
    /// Force CPU only.
    Cpu,
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" | "metal" | "cuda" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            _ => Err(format!(
                "Unknown device: '{}'. Use 'auto', 'gpu', or 'cpu'.",
                s
            )),
        }
    }
}

// ============================================================================
// EmbeddingProviderKind
// ============================================================================

/// Which embedding provider to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local Candle inference.
    #[default]
    Candle,
    /// Remote embedding server over HTTP.
    Http,
    /// Deterministic feature hashing, no model required.
    Hash,
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Candle => write!(f, "candle"),
            Self::Http => write!(f, "http"),
            Self::Hash => write!(f, "hash"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "candle" | "local" | "embedded" => Ok(Self::Candle),
            "http" | "remote" | "server" => Ok(Self::Http),
            "hash" | "offline" => Ok(Self::Hash),
            _ => Err(format!(
                "Unknown provider: '{}'. Use 'candle', 'http', or 'hash'.",
                s
            )),
        }
    }
}

// ============================================================================
// ModelArchitecture
// ============================================================================

/// Model architecture type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelArchitecture {
    #[default]
    Bert,
    Roberta,
    Mpnet,
    Unknown,
}

impl std::fmt::Display for ModelArchitecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bert => write!(f, "bert"),
            Self::Roberta => write!(f, "roberta"),
            Self::Mpnet => write!(f, "mpnet"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// EmbeddingConfig
// ============================================================================

/// Configuration for the embedding layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Provider type.
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    /// Model ID (e.g., "sentence-transformers/all-MiniLM-L6-v2").
    #[serde(default = "default_embedding_model_id")]
    pub model_id: String,

    /// Device preference.
    #[serde(default)]
    pub device: DevicePreference,

    /// Local path to model files.
    /// If None, the model locator search order is used.
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    /// Vector dimension expected from the provider; also the hash fallback's dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum sequence length in tokens.
    #[serde(default = "default_max_seq_len")]
    pub max_sequence_length: usize,

    /// Number of texts sent to the provider per call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Base URL of the embedding server (http provider).
    #[serde(default = "default_url")]
    pub url: String,

    /// Request timeout for the embedding server, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Capacity of the LRU cache of primary embeddings. 0 disables caching.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Texts longer than this many characters are truncated before embedding.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

fn default_embedding_model_id() -> String {
    DEFAULT_EMBEDDING_MODEL_ID.to_string()
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

fn default_max_seq_len() -> usize {
    256
}

fn default_batch_size() -> usize {
    32
}

fn default_url() -> String {
    "http://127.0.0.1:5002".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_cache_size() -> usize {
    10_000
}

fn default_max_text_chars() -> usize {
    10_000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model_id: default_embedding_model_id(),
            device: DevicePreference::default(),
            local_path: None,
            dimension: default_dimension(),
            max_sequence_length: default_max_seq_len(),
            batch_size: default_batch_size(),
            url: default_url(),
            timeout_ms: default_timeout_ms(),
            cache_size: default_cache_size(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

impl EmbeddingConfig {
    /// Resolve the effective model path using ModelLocator.
    ///
    /// Priority:
    /// 1. Explicit `local_path` if set
    /// 2. ModelLocator search order ($MEMVEC_MODELS_DIR → ~/.memvec/models → {exe}/models)
    ///
    /// Returns the path even if it doesn't exist (caller should validate).
    pub fn effective_model_path(&self) -> PathBuf {
        if let Some(ref path) = self.local_path {
            return path.clone();
        }

        match ModelLocator::new().embedding_model_path(&self.model_id) {
            Ok(path) => path,
            Err(_) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".memvec")
                .join("models")
                .join(EMBEDDINGS_SUBDIR)
                .join(extract_model_name(&self.model_id)),
        }
    }

    /// Use a specific provider.
    pub fn with_provider(mut self, provider: EmbeddingProviderKind) -> Self {
        self.provider = provider;
        self
    }

    /// Use a specific local model directory.
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Use a specific model ID.
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Set the expected dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Set the cache capacity.
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Set the embedding server URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

// ============================================================================
// HuggingFaceModelConfig
// ============================================================================

/// Config.json structure from HuggingFace models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingFaceModelConfig {
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default)]
    pub hidden_size: usize,
    #[serde(default = "default_max_position")]
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub model_type: String,
}

fn default_max_position() -> usize {
    512
}

impl HuggingFaceModelConfig {
    /// Infer architecture from config.
    pub fn infer_architecture(&self) -> ModelArchitecture {
        for arch in &self.architectures {
            let lower = arch.to_lowercase();
            if lower.contains("roberta") {
                return ModelArchitecture::Roberta;
            }
            if lower.contains("mpnet") {
                return ModelArchitecture::Mpnet;
            }
            if lower.contains("bert") {
                return ModelArchitecture::Bert;
            }
        }

        match self.model_type.to_lowercase().as_str() {
            "bert" => ModelArchitecture::Bert,
            "roberta" | "xlm-roberta" => ModelArchitecture::Roberta,
            "mpnet" => ModelArchitecture::Mpnet,
            _ => ModelArchitecture::Unknown,
        }
    }
}
