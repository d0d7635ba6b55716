//! # memvec-db
//!
//! Storage layer for memvec: durable record stores and the in-memory ANN index.
//!
//! ## Architecture
//!
//! ```text
//! memvec-cli → memvec-core (VectorStore, SyncQueue)
//!                  ↑
//!               memvec-db    (RecordStore backends, HnswIndex, snapshots)
//!               memvec-model (embedding providers)
//! ```
//!
//! ## Modules
//!
//! - `record`: [`VectorRecord`] and its serialized `{id, vector, metadata}` form
//! - `store`: [`RecordStore`] trait with `jsonl` and `memory` backends
//! - `index`: [`HnswIndex`], a layered proximity graph
//! - `filter`: metadata predicates for search
//! - `snapshot`: export / import document
//!
//! ## Usage
//!
//! ```ignore
//! use memvec_db::{create_record_store, HnswIndex, HnswParams, RecordStoreConfig};
//!
//! let store = create_record_store(&RecordStoreConfig::jsonl(384, "/path/to/store"))?;
//! store.open()?;
//!
//! let mut index = HnswIndex::new(384, HnswParams::default());
//! for record in store.get_all()? {
//!     index.insert(record.id, record.vector)?;
//! }
//! let hits = index.search(&query, 10, 64)?;
//! ```

pub mod error;
pub mod filter;
pub mod index;
pub mod record;
pub mod snapshot;
pub mod store;

pub use error::{DbError, DbResult};
pub use filter::VectorSearchFilter;
pub use index::{euclidean_distance, GraphNode, HnswIndex, HnswParams, IndexHit, IntegrityReport};
pub use record::{MemoryType, SerializedRecord, VectorRecord};
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};
pub use store::{
    available_backends, create_record_store, JsonlRecordStore, MemoryRecordStore, RecordStore,
    RecordStoreConfig, StoreCompatibility, StoreMeta, UpgradeHook, CURRENT_SCHEMA_VERSION,
};
