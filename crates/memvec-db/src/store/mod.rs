//! Durable record storage.
//!
//! A [`RecordStore`] is a key-value store of [`VectorRecord`]s keyed by id.
//! Two backends ship with the crate:
//!
//! - `jsonl` (default): append-only JSON lines log with periodic compaction
//! - `memory`: volatile map, used by tests and for ephemeral stores
//!
//! ## Usage
//!
//! ```ignore
//! use memvec_db::store::{create_record_store, RecordStoreConfig};
//!
//! let store = create_record_store(&RecordStoreConfig::jsonl(384, "/path/to/store"))?;
//! store.open()?;
//! store.put(&record)?;
//! ```

mod config;
mod jsonl;
mod memory;

pub use config::{
    check_store_compatibility, load_store_meta, write_store_meta, RecordStoreConfig,
    StoreCompatibility, StoreMeta, CURRENT_SCHEMA_VERSION, DEFAULT_BACKEND, STORE_META_FILENAME,
};
pub use jsonl::{JsonlRecordStore, UpgradeHook, DATA_FILENAME};
pub use memory::MemoryRecordStore;

use crate::error::{DbError, DbResult};
use crate::record::VectorRecord;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// RecordStore Trait
// ============================================================================

/// Core trait for record storage backends.
///
/// ## Implementation Notes
///
/// - Backends must be thread-safe (`Send + Sync`) and use interior mutability.
/// - `open` must be called before any other operation and is idempotent.
/// - `put` has upsert semantics.
/// - Quota or disk-full conditions surface as [`DbError::StorageFull`] so the
///   caller can evict and retry.
pub trait RecordStore: Send + Sync {
    /// Open (or create) the backing storage.
    fn open(&self) -> DbResult<()>;

    /// Insert or replace a record.
    fn put(&self, record: &VectorRecord) -> DbResult<()>;

    /// Insert or replace several records, reporting each outcome separately.
    fn put_batch(&self, records: &[VectorRecord]) -> Vec<DbResult<()>> {
        records.iter().map(|record| self.put(record)).collect()
    }

    /// Fetch a record by id.
    fn get(&self, id: &str) -> DbResult<Option<VectorRecord>>;

    /// Fetch every record.
    fn get_all(&self) -> DbResult<Vec<VectorRecord>>;

    /// Delete a record. Returns `false` when the id was not present.
    fn delete(&self, id: &str) -> DbResult<bool>;

    /// Remove every record.
    fn clear(&self) -> DbResult<()>;

    /// Number of stored records.
    fn len(&self) -> DbResult<usize>;

    /// Check if the store is empty.
    fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Flush pending writes to persistent storage.
    fn flush(&self) -> DbResult<()> {
        Ok(())
    }

    /// Dimension of every stored vector.
    fn dimension(&self) -> usize;

    /// Backend name, as accepted by [`RecordStoreConfig::backend`].
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// Factory
// ============================================================================

/// Create a record store for `config`.
///
/// The store is returned unopened; call [`RecordStore::open`] before use.
pub fn create_record_store(config: &RecordStoreConfig) -> DbResult<Arc<dyn RecordStore>> {
    debug!("Creating '{}' record store", config.backend);

    match config.backend.as_str() {
        "memory" => {
            let mut store = MemoryRecordStore::new(config.dimension);
            if let Some(max) = config.max_records {
                store = store.with_max_records(max);
            }
            Ok(Arc::new(store))
        }

        "jsonl" => {
            let path = config.path.clone().ok_or_else(|| DbError::Config {
                message: "The jsonl backend requires a store path".to_string(),
            })?;
            let mut store = JsonlRecordStore::new(path, config.dimension);
            if let Some(max) = config.max_records {
                store = store.with_max_records(max);
            }
            if let Some(max) = config.max_bytes {
                store = store.with_max_bytes(max);
            }
            Ok(Arc::new(store))
        }

        backend => Err(DbError::Config {
            message: format!(
                "Unknown backend: '{}'. Available backends: {}",
                backend,
                available_backends().join(", ")
            ),
        }),
    }
}

/// Get a list of available backend names.
pub fn available_backends() -> Vec<&'static str> {
    vec!["jsonl", "memory"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_backends() {
        let memory = create_record_store(&RecordStoreConfig::memory(4)).unwrap();
        assert_eq!(memory.backend_name(), "memory");
        assert_eq!(memory.dimension(), 4);

        let jsonl = create_record_store(&RecordStoreConfig::jsonl(4, "/tmp/unused")).unwrap();
        assert_eq!(jsonl.backend_name(), "jsonl");
    }

    #[test]
    fn test_factory_errors() {
        let no_path = RecordStoreConfig {
            path: None,
            ..RecordStoreConfig::default()
        };
        assert!(matches!(
            create_record_store(&no_path),
            Err(DbError::Config { .. })
        ));

        let unknown = RecordStoreConfig {
            backend: "sqlite".to_string(),
            ..RecordStoreConfig::default()
        };
        let err = create_record_store(&unknown).err().unwrap();
        assert!(err.to_string().contains("jsonl, memory"));
    }
}
