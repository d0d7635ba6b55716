//! Snapshot export / import format.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "exportedAt": "2024-05-01T12:00:00Z",
//!   "vectors": [{ "id": "...", "vector": [0.1, ...], "metadata": { "content": "...", ... } }]
//! }
//! ```
//!
//! Entries are decoded one at a time so a single bad entry never fails the
//! whole import.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{DbError, DbResult};
use crate::record::{SerializedRecord, VectorRecord};

/// Snapshot format version written by [`Snapshot::from_records`].
pub const SNAPSHOT_VERSION: &str = "1.0";

/// A full export of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub vectors: Vec<SerializedRecord>,
}

impl Snapshot {
    /// Build a snapshot of `records`, stamped now.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a VectorRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            exported_at: Utc::now(),
            vectors: records.into_iter().map(VectorRecord::to_serialized).collect(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True when the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Decode every entry independently.
    pub fn into_records(self) -> Vec<DbResult<VectorRecord>> {
        self.vectors
            .into_iter()
            .map(SerializedRecord::into_record)
            .collect()
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json(json: &str) -> DbResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> DbResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a snapshot file.
    pub fn read_from(path: &Path) -> DbResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| DbError::store_io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| DbError::store_parse(path, format!("Failed to parse snapshot: {}", e)))
    }

    /// Write a snapshot file.
    pub fn write_to(&self, path: &Path) -> DbResult<()> {
        let content = self.to_json()?;
        fs::write(path, content).map_err(|e| DbError::store_io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryType;

    #[test]
    fn test_snapshot_shape() {
        let records = vec![
            VectorRecord::new("a", vec![1.0, 0.0], "pizza preference")
                .with_type(MemoryType::Preference),
            VectorRecord::new("b", vec![0.0, 1.0], "sunny weather"),
        ];
        let snapshot = Snapshot::from_records(&records);
        let value: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();

        assert_eq!(value["version"], SNAPSHOT_VERSION);
        assert!(value["exportedAt"].is_string());
        assert_eq!(value["vectors"].as_array().unwrap().len(), 2);
        assert_eq!(value["vectors"][0]["metadata"]["type"], "preference");
    }

    #[test]
    fn test_bad_entry_is_isolated() {
        let json = r#"{
            "version": "1.0",
            "exportedAt": "2024-05-01T12:00:00Z",
            "vectors": [
                {"id": "good", "vector": [1.0, 0.0], "metadata": {"content": "ok", "type": "fact"}},
                {"id": "", "vector": [1.0, 0.0], "metadata": {"content": "no id"}},
                {"id": "no-content", "vector": [1.0, 0.0], "metadata": {}},
                {"id": "reembed", "metadata": {"content": "vector missing"}}
            ]
        }"#;
        let results = Snapshot::from_json(json).unwrap().into_records();

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_err());
        let reembed = results[3].as_ref().unwrap();
        assert!(reembed.vector.is_empty());
        assert_eq!(reembed.content, "vector missing");
    }

    #[test]
    fn test_file_round_trip() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("backup.json");
        let records = vec![VectorRecord::new("a", vec![0.25], "x").with_tags(["t"])];

        Snapshot::from_records(&records).write_to(&path).unwrap();
        let restored: Vec<VectorRecord> = Snapshot::read_from(&path)
            .unwrap()
            .into_records()
            .into_iter()
            .collect::<DbResult<_>>()
            .unwrap();
        assert_eq!(restored, records);
    }
}
