//! Error types for memvec-core.

use thiserror::Error;

/// Result type alias for memvec-core operations.
pub type MemvecResult<T> = Result<T, MemvecError>;

/// Domain-specific errors for memvec operations.
#[derive(Error, Debug)]
pub enum MemvecError {
    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// The record store could not be opened or loaded.
    ///
    /// Returned to every caller that waited on the failed attempt. A later
    /// call to `initialize()` tries again.
    #[error("Vector store initialization failed: {message}")]
    InitializationFailure {
        /// Description of the failure.
        message: String,
    },

    // =========================================================================
    // Storage
    // =========================================================================
    /// The record store is out of space or over quota.
    ///
    /// Evict records (`evict_least_recently_used`) and retry.
    #[error("Storage full: {message}")]
    StorageFull {
        /// Description from the backend.
        message: String,
    },

    /// Any other record store failure.
    #[error("Storage error: {message}")]
    Storage {
        /// Description from the backend.
        message: String,
    },

    /// The ANN index disagrees with the record store.
    ///
    /// Recovered by a full `rebuild_index()`.
    #[error("Index inconsistency: {message}")]
    IndexInconsistency {
        /// What was found to be inconsistent.
        message: String,
    },

    /// A vector has the wrong number of dimensions for this store.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Store dimension.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    // =========================================================================
    // Configuration and input
    // =========================================================================
    /// Configuration file could not be read or parsed.
    #[error("Config invalid: {0}")]
    InvalidConfig(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// Invalid argument provided to an operation.
    #[error("{0}")]
    InvalidArgument(String),

    /// Lock poisoning and similar internal failures.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },

    // =========================================================================
    // Wrappers
    // =========================================================================
    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error wrapper.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MemvecError {
    /// Create an invalid configuration error with a hint.
    pub fn invalid_configuration(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True when the caller should evict records and retry.
    pub fn is_storage_full(&self) -> bool {
        matches!(self, Self::StorageFull { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_configuration_message() {
        let err = MemvecError::invalid_configuration(
            "sync.maxBatchSize must be positive",
            "Set sync.maxBatchSize to at least 1.",
        );
        assert_eq!(
            err.to_string(),
            "Invalid configuration: sync.maxBatchSize must be positive. Set sync.maxBatchSize to at least 1."
        );
    }

    #[test]
    fn test_storage_full_is_distinguishable() {
        assert!(MemvecError::StorageFull {
            message: "quota".into()
        }
        .is_storage_full());
        assert!(!MemvecError::internal("x").is_storage_full());
    }
}
