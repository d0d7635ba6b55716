//! Record store configuration and on-disk metadata.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Default backend name.
pub const DEFAULT_BACKEND: &str = "jsonl";

/// Filename for store metadata.
pub const STORE_META_FILENAME: &str = "store.meta.json";

/// Schema version written by this build.
///
/// - v1: one flat JSON record per line
/// - v2: append log of `{"op": "put", id, vector, metadata}` / `{"op": "delete", id}`
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

// ============================================================================
// RecordStoreConfig
// ============================================================================

/// Configuration for creating a record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStoreConfig {
    /// Backend to use ("memory" or "jsonl").
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Store directory (jsonl backend).
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Dimension of every stored vector.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum number of records before writes fail with `StorageFull`.
    #[serde(default)]
    pub max_records: Option<usize>,

    /// Maximum size of the data file in bytes before writes fail with `StorageFull`.
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_dimension() -> usize {
    384
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            dimension: default_dimension(),
            max_records: None,
            max_bytes: None,
        }
    }
}

impl RecordStoreConfig {
    /// Volatile in-memory store.
    pub fn memory(dimension: usize) -> Self {
        Self {
            backend: "memory".to_string(),
            dimension,
            ..Self::default()
        }
    }

    /// Durable JSONL store in `path`.
    pub fn jsonl(dimension: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            backend: "jsonl".to_string(),
            path: Some(path.into()),
            dimension,
            ..Self::default()
        }
    }

    /// Set the record quota.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Set the byte quota.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }
}

// ============================================================================
// StoreMeta
// ============================================================================

/// Metadata persisted in `store.meta.json` next to the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMeta {
    pub backend: String,
    pub dimension: usize,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_schema_version() -> u32 {
    1
}

impl StoreMeta {
    /// Create metadata for a fresh store at the current schema version.
    pub fn new(backend: impl Into<String>, dimension: usize) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            backend: backend.into(),
            dimension,
            count: 0,
            schema_version: CURRENT_SCHEMA_VERSION,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        }
    }

    /// Update the count and timestamp.
    pub fn update_count(&mut self, count: usize) {
        self.count = count;
        self.updated_at = Some(chrono::Utc::now().to_rfc3339());
    }
}

// ============================================================================
// StoreCompatibility
// ============================================================================

/// Result of checking an existing store against a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCompatibility {
    /// Store exists at the current schema version.
    Compatible,

    /// No store exists yet.
    NotFound,

    /// Store exists at an older schema version and must be upgraded.
    NeedsUpgrade { from: u32, to: u32 },

    /// Store was written by a newer build.
    NewerSchema { found: u32, supported: u32 },

    /// Store holds vectors of another dimension.
    IncompatibleDimension { expected: usize, actual: usize },

    /// Store was written by another backend.
    IncompatibleBackend { expected: String, actual: String },

    /// Metadata missing or unreadable.
    Corrupted(String),
}

/// Check an existing store directory against the expected backend and dimension.
pub fn check_store_compatibility(
    path: &Path,
    backend: &str,
    dimension: usize,
) -> StoreCompatibility {
    let meta_path = path.join(STORE_META_FILENAME);

    if !meta_path.exists() {
        if path.is_dir() {
            let entries = path.read_dir().map(|rd| rd.count()).unwrap_or(0);
            if entries > 0 {
                return StoreCompatibility::Corrupted(
                    "Store directory exists but has no metadata".to_string(),
                );
            }
        }
        return StoreCompatibility::NotFound;
    }

    match load_store_meta(path) {
        Ok(meta) => {
            if meta.dimension != dimension {
                return StoreCompatibility::IncompatibleDimension {
                    expected: dimension,
                    actual: meta.dimension,
                };
            }
            if meta.backend != backend {
                return StoreCompatibility::IncompatibleBackend {
                    expected: backend.to_string(),
                    actual: meta.backend,
                };
            }
            if meta.schema_version > CURRENT_SCHEMA_VERSION {
                return StoreCompatibility::NewerSchema {
                    found: meta.schema_version,
                    supported: CURRENT_SCHEMA_VERSION,
                };
            }
            if meta.schema_version < CURRENT_SCHEMA_VERSION {
                return StoreCompatibility::NeedsUpgrade {
                    from: meta.schema_version,
                    to: CURRENT_SCHEMA_VERSION,
                };
            }
            StoreCompatibility::Compatible
        }
        Err(e) => StoreCompatibility::Corrupted(e.to_string()),
    }
}

/// Load store metadata from a directory.
pub fn load_store_meta(path: &Path) -> DbResult<StoreMeta> {
    let meta_path = path.join(STORE_META_FILENAME);
    debug!("Loading store metadata from {:?}", meta_path);

    let content = fs::read_to_string(&meta_path).map_err(|e| DbError::store_io(&meta_path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        DbError::store_parse(&meta_path, format!("Failed to parse store metadata: {}", e))
    })
}

/// Write store metadata to a directory, creating it if needed.
pub fn write_store_meta(path: &Path, meta: &StoreMeta) -> DbResult<()> {
    let meta_path = path.join(STORE_META_FILENAME);
    debug!("Writing store metadata to {:?}", meta_path);

    fs::create_dir_all(path).map_err(|e| DbError::store_io(path, e))?;
    let content = serde_json::to_string_pretty(meta)?;
    fs::write(&meta_path, content).map_err(|e| DbError::store_io(&meta_path, e))
}
