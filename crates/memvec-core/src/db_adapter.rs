//! Adapter layer for memvec-db infrastructure.
//!
//! Maps `DbError` into `MemvecError`, keeping `StorageFull` and dimension
//! mismatches distinguishable so callers can react to them.

use crate::errors::MemvecError;

/// Convert a memvec-db error to a memvec-core error.
pub fn from_db_error(err: memvec_db::DbError) -> MemvecError {
    use memvec_db::DbError;

    match err {
        DbError::StorageFull { message } => MemvecError::StorageFull { message },

        DbError::DimensionMismatch { expected, actual } => {
            MemvecError::DimensionMismatch { expected, actual }
        }

        DbError::Config { message } => MemvecError::invalid_configuration(
            message,
            "Check the store and index sections of the memvec config.",
        ),

        DbError::InvalidRecord { id, reason } => {
            MemvecError::InvalidArgument(format!("Invalid record '{}': {}", id, reason))
        }

        DbError::Io(io_err) => MemvecError::Io(io_err),

        DbError::Json(json_err) => MemvecError::Json(json_err),

        other @ (DbError::StoreIo { .. }
        | DbError::StoreParse { .. }
        | DbError::StoreIncompatible { .. }
        | DbError::NotOpen { .. }
        | DbError::SchemaUpgrade { .. }
        | DbError::Internal { .. }) => MemvecError::Storage {
            message: other.to_string(),
        },
    }
}

/// Extension trait to convert DbResult to Result<T, MemvecError>.
pub trait IntoMemvecResult<T> {
    /// Convert a DbResult to a MemvecError result.
    fn into_memvec_result(self) -> Result<T, MemvecError>;
}

impl<T> IntoMemvecResult<T> for memvec_db::DbResult<T> {
    fn into_memvec_result(self) -> Result<T, MemvecError> {
        self.map_err(from_db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memvec_db::DbError;

    #[test]
    fn test_storage_full_survives_conversion() {
        let err = from_db_error(DbError::storage_full("quota reached"));
        assert!(err.is_storage_full());
        assert!(err.to_string().contains("quota reached"));
    }

    #[test]
    fn test_other_errors_become_storage() {
        let err = from_db_error(DbError::NotOpen {
            backend: "jsonl".into(),
        });
        assert!(matches!(err, MemvecError::Storage { .. }));

        let result: memvec_db::DbResult<()> = Err(DbError::DimensionMismatch {
            expected: 4,
            actual: 2,
        });
        assert!(matches!(
            result.into_memvec_result(),
            Err(MemvecError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }
}
