//! Configuration for memvec.
//!
//! Loaded from YAML (camelCase keys). Lookup order:
//!
//! 1. an explicit path (`--config`)
//! 2. `$MEMVEC_CONFIG`
//! 3. `~/.memvec/config.yaml`
//!
//! A missing file yields defaults, so memvec works without any configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! store:
//!   backend: jsonl
//!   path: ~/.memvec/store
//!   dimension: 384
//! index:
//!   m: 16
//!   efConstruction: 200
//!   efSearch: 64
//! search:
//!   maxResults: 5
//!   minScore: 0.3
//! embedding:
//!   provider: candle
//!   modelId: sentence-transformers/all-MiniLM-L6-v2
//! sync:
//!   debounceMs: 500
//!   maxBatchSize: 50
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use memvec_db::{available_backends, HnswParams, RecordStoreConfig};
use memvec_model::{EmbeddingConfig, EmbeddingProviderKind};
use serde::{Deserialize, Serialize};

use crate::errors::{MemvecError, MemvecResult};
use crate::sync_queue::SyncConfig;

/// Environment variable naming the config file.
pub const MEMVEC_CONFIG_ENV: &str = "MEMVEC_CONFIG";

/// Default data directory name under the home directory.
pub const MEMVEC_HOME_DIR: &str = ".memvec";

// ============================================================================
// MemvecConfig
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemvecConfig {
    /// Record store backend, location and quotas.
    #[serde(default)]
    pub store: RecordStoreConfig,

    /// HNSW graph parameters.
    #[serde(default)]
    pub index: HnswParams,

    /// Search defaults.
    #[serde(default)]
    pub search: SearchConfig,

    /// Embedding provider.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Write-behind queue tuning.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl MemvecConfig {
    /// Load using the lookup order: `explicit`, `$MEMVEC_CONFIG`, `~/.memvec/config.yaml`.
    pub fn load(explicit: Option<&Path>) -> MemvecResult<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Some(path) = std::env::var_os(MEMVEC_CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        Self::load_default()
    }

    /// Load from `~/.memvec/config.yaml`, or defaults when it does not exist.
    pub fn load_default() -> MemvecResult<Self> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Ok(Self::default())
            }
        }
    }

    /// Load from a specific path. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`MemvecError::InvalidConfig`] if the file exists but cannot be
    /// read or parsed, and [`MemvecError::InvalidConfiguration`] if validation fails.
    pub fn from_path(path: &Path) -> MemvecResult<Self> {
        if !path.exists() {
            tracing::debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            MemvecError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&content).map_err(|e| match e {
            MemvecError::Yaml(e) => {
                MemvecError::InvalidConfig(format!("Failed to parse {}: {}", path.display(), e))
            }
            other => other,
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate YAML text, logging warnings.
    pub fn from_yaml(yaml: &str) -> MemvecResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        for warning in config.validate()? {
            tracing::warn!("Config warning: {}", warning);
        }
        Ok(config)
    }

    /// Default data directory (`~/.memvec`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(MEMVEC_HOME_DIR))
    }

    /// Default config file path (`~/.memvec/config.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join("config.yaml"))
    }

    /// Use `dir` as the store directory.
    pub fn with_store_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store.path = Some(dir.into());
        self
    }

    /// Override the embedding provider.
    pub fn with_provider(mut self, provider: EmbeddingProviderKind) -> Self {
        self.embedding.provider = provider;
        self
    }

    /// Record store configuration with the path resolved.
    ///
    /// An unset path becomes `~/.memvec/store`; a leading `~/` is expanded.
    pub fn record_store_config(&self) -> MemvecResult<RecordStoreConfig> {
        let mut store = self.store.clone();
        if store.backend == "memory" {
            return Ok(store);
        }

        let path = match store.path.take() {
            Some(path) => expand_home(&path),
            None => Self::default_dir().map(|d| d.join("store")).ok_or_else(|| {
                MemvecError::invalid_configuration(
                    "store.path is not set and the home directory is unknown",
                    "Set store.path or pass --data-dir.",
                )
            })?,
        };
        store.path = Some(path);
        Ok(store)
    }

    /// Embedding configuration sized to the store dimension.
    pub fn embedding_config(&self) -> EmbeddingConfig {
        let mut embedding = self.embedding.clone();
        embedding.dimension = self.store.dimension;
        if let Some(path) = embedding.local_path.take() {
            embedding.local_path = Some(expand_home(&path));
        }
        embedding
    }

    /// Validate the configuration.
    ///
    /// Returns the first critical problem as [`MemvecError::InvalidConfiguration`],
    /// otherwise the list of non-fatal warnings for the caller to log.
    pub fn validate(&self) -> MemvecResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.store.dimension == 0 {
            return Err(MemvecError::invalid_configuration(
                "store.dimension must be positive",
                "Set store.dimension to the embedding model's output size (384 for all-MiniLM-L6-v2).",
            ));
        }
        if !available_backends().contains(&self.store.backend.as_str()) {
            return Err(MemvecError::invalid_configuration(
                format!("unknown store.backend '{}'", self.store.backend),
                format!("Use one of: {}.", available_backends().join(", ")),
            ));
        }
        if self.store.max_records == Some(0) {
            return Err(MemvecError::invalid_configuration(
                "store.maxRecords must be positive",
                "Remove store.maxRecords or set it to at least 1.",
            ));
        }

        self.index.validate().map_err(|e| {
            MemvecError::invalid_configuration(e.to_string(), "Fix the index section.")
        })?;

        warnings.extend(self.search.validate()?);
        warnings.extend(self.sync.validate()?);

        if self.embedding.provider == EmbeddingProviderKind::Hash {
            warnings.push(
                "embedding.provider is 'hash': search matches shared words, not meaning".to_string(),
            );
        } else if self.embedding.dimension != self.store.dimension {
            warnings.push(format!(
                "embedding.dimension ({}) differs from store.dimension ({}); store.dimension is used",
                self.embedding.dimension, self.store.dimension
            ));
        }
        if self.index.seed.is_some() {
            warnings.push("index.seed is set: graph construction is deterministic".to_string());
        }

        Ok(warnings)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

// ============================================================================
// SearchConfig
// ============================================================================

/// Default search options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    /// Results returned when the caller does not say.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Minimum cosine similarity of a returned result.
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// ANN candidates requested per wanted result, before rescoring and filtering.
    #[serde(default = "default_oversample")]
    pub oversample: usize,
}

fn default_max_results() -> usize {
    5
}

fn default_min_score() -> f32 {
    0.3
}

fn default_oversample() -> usize {
    4
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            min_score: default_min_score(),
            oversample: default_oversample(),
        }
    }
}

impl SearchConfig {
    /// Validate search defaults.
    pub fn validate(&self) -> MemvecResult<Vec<String>> {
        let mut warnings = Vec::new();

        if !(-1.0..=1.0).contains(&self.min_score) {
            return Err(MemvecError::invalid_configuration(
                format!("search.minScore ({}) is outside -1.0..=1.0", self.min_score),
                "Cosine similarity ranges from -1 to 1; 0.3 is a reasonable default.",
            ));
        }
        if self.oversample == 0 {
            return Err(MemvecError::invalid_configuration(
                "search.oversample must be positive",
                "Set search.oversample to at least 1.",
            ));
        }
        if self.max_results == 0 {
            warnings.push("search.maxResults is 0: searches return nothing by default".to_string());
        }

        Ok(warnings)
    }
}
