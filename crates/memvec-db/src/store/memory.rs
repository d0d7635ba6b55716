//! Volatile in-memory record store.

use super::RecordStore;
use crate::error::{DbError, DbResult};
use crate::record::VectorRecord;
use std::collections::HashMap;
use std::sync::RwLock;

/// Record store backed by a `HashMap`. Nothing survives a restart.
#[derive(Debug)]
pub struct MemoryRecordStore {
    dimension: usize,
    max_records: Option<usize>,
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl MemoryRecordStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            max_records: None,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Fail writes with `StorageFull` once `max_records` records are held.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    fn read(&self) -> DbResult<std::sync::RwLockReadGuard<'_, HashMap<String, VectorRecord>>> {
        self.records
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> DbResult<std::sync::RwLockWriteGuard<'_, HashMap<String, VectorRecord>>> {
        self.records
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))
    }
}

impl RecordStore for MemoryRecordStore {
    fn open(&self) -> DbResult<()> {
        Ok(())
    }

    fn put(&self, record: &VectorRecord) -> DbResult<()> {
        record.validate(self.dimension)?;
        let mut records = self.write()?;
        if let Some(max) = self.max_records {
            if !records.contains_key(&record.id) && records.len() >= max {
                return Err(DbError::storage_full(format!(
                    "memory store holds the maximum of {} records",
                    max
                )));
            }
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> DbResult<Option<VectorRecord>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn get_all(&self) -> DbResult<Vec<VectorRecord>> {
        let mut all: Vec<VectorRecord> = self.read()?.values().cloned().collect();
        all.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    fn delete(&self, id: &str) -> DbResult<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    fn clear(&self) -> DbResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn len(&self) -> DbResult<usize> {
        Ok(self.read()?.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
