//! Error types for memvec-db.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for memvec-db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in memvec-db operations.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // Record store errors
    // ========================================================================
    /// The backend is out of space or over its configured quota.
    ///
    /// Callers are expected to evict records and retry rather than abort.
    #[error("Storage full: {message}")]
    StorageFull { message: String },

    /// Record store I/O error.
    #[error("Record store I/O error at {path}: {message}")]
    StoreIo { path: PathBuf, message: String },

    /// Record store parse error.
    #[error("Record store parse error at {path}: {message}")]
    StoreParse { path: PathBuf, message: String },

    /// Record store exists but cannot be opened with this configuration.
    #[error("Record store at {path} is incompatible: {reason}")]
    StoreIncompatible { path: PathBuf, reason: String },

    /// Record store was used before `open()`.
    #[error("Record store '{backend}' is not open")]
    NotOpen { backend: String },

    /// Schema upgrade failed.
    #[error("Schema upgrade from v{from} to v{to} failed: {message}")]
    SchemaUpgrade { from: u32, to: u32, message: String },

    // ========================================================================
    // Record / vector errors
    // ========================================================================
    /// Vector dimension mismatch.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A record is malformed (missing id, non-finite vector values, bad metadata).
    #[error("Invalid record '{id}': {reason}")]
    InvalidRecord { id: String, reason: String },

    // ========================================================================
    // General errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a storage-full error.
    pub fn storage_full(message: impl Into<String>) -> Self {
        Self::StorageFull {
            message: message.into(),
        }
    }

    /// Create a store I/O error.
    ///
    /// An `io::Error` of kind `StorageFull` becomes [`DbError::StorageFull`].
    pub fn store_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::StorageFull {
            return Self::storage_full(format!("{}: {}", path.display(), err));
        }
        Self::StoreIo {
            path,
            message: err.to_string(),
        }
    }

    /// Create a store parse error.
    pub fn store_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StoreParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for quota / disk-full conditions.
    pub fn is_storage_full(&self) -> bool {
        matches!(self, Self::StorageFull { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_storage_full_is_distinguishable() {
        let err = DbError::store_io(
            "/tmp/records.jsonl",
            std::io::Error::from(std::io::ErrorKind::StorageFull),
        );
        assert!(err.is_storage_full());

        let other = DbError::store_io(
            "/tmp/records.jsonl",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(!other.is_storage_full());
        assert!(other.to_string().contains("/tmp/records.jsonl"));
    }
}
