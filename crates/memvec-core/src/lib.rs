//! # memvec-core
//!
//! Core engine for memvec: semantic memory for conversational agents.
//!
//! ## Main Types
//!
//! - [`VectorStore`] – embeds, persists, indexes and searches memories
//! - [`SyncQueue`] – debounced, batched write-behind queue in front of a store
//! - [`MemvecConfig`] – YAML configuration
//! - [`MemvecError`] – domain-specific error type
//!
//! ## Modules
//!
//! - [`config`] – configuration types and file lookup
//! - [`vector_store`] – the VectorStore implementation
//! - [`sync_queue`] – the SyncQueue implementation and its worker
//! - [`errors`] – error types
//! - [`db_adapter`] – conversion of storage errors
//!
//! ## Example
//!
//! ```ignore
//! use memvec_core::{MemoryNode, MemvecConfig, Priority, SyncQueue, VectorStore};
//! use std::sync::Arc;
//!
//! let config = MemvecConfig::load(None)?;
//! let store = Arc::new(VectorStore::from_config(&config)?);
//!
//! store.store(MemoryNode::new("The user likes pizza"))?;
//! let hits = store.search("what food does the user like", &store.search_options());
//!
//! let queue = SyncQueue::new(Arc::clone(&store), config.sync.clone())?;
//! queue.queue_store(MemoryNode::new("Prefers dark mode"), Priority::Normal);
//! queue.sync_now();
//! ```

// Modules
pub mod config;
pub mod db_adapter;
pub mod errors;
pub mod sync_queue;
pub mod vector_store;

// Re-exports for convenience
pub use config::{MemvecConfig, SearchConfig, MEMVEC_CONFIG_ENV, MEMVEC_HOME_DIR};
pub use db_adapter::{from_db_error, IntoMemvecResult};
pub use errors::{MemvecError, MemvecResult};
pub use sync_queue::{
    Priority, SyncConfig, SyncJob, SyncOperation, SyncQueue, SyncState, SyncStats,
    SYNC_THREAD_NAME,
};
pub use vector_store::{
    BatchFailure, BatchStoreResult, ImportReport, MemoryNode, SearchHit, SearchOptions,
    StoreStats, VectorStore,
};

// Storage and embedding types that appear in the public API.
pub use memvec_db::{
    IntegrityReport, MemoryType, RecordStore, Snapshot, VectorRecord, VectorSearchFilter,
};
pub use memvec_model::{EmbedderStats, EmbeddingProviderKind, ResilientEmbedder};
