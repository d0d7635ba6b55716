//! Vector record data model.
//!
//! [`VectorRecord`] is the in-memory form. On disk and in snapshots a record
//! is a [`SerializedRecord`]: the id, a flat float array and a string-keyed
//! metadata map, so other tools can read the data without knowing the Rust
//! types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{DbError, DbResult};

// ============================================================================
// MemoryType
// ============================================================================

/// Kind of memory a record holds.
///
/// Unknown kinds are preserved verbatim in [`MemoryType::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Conversation,
    Fact,
    Preference,
    Task,
    #[default]
    Note,
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conversation => write!(f, "conversation"),
            Self::Fact => write!(f, "fact"),
            Self::Preference => write!(f, "preference"),
            Self::Task => write!(f, "task"),
            Self::Note => write!(f, "note"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("memory type cannot be empty".to_string());
        }
        Ok(match trimmed.to_lowercase().as_str() {
            "conversation" => Self::Conversation,
            "fact" => Self::Fact,
            "preference" => Self::Preference,
            "task" => Self::Task,
            "note" => Self::Note,
            _ => Self::Other(trimmed.to_string()),
        })
    }
}

// ============================================================================
// VectorRecord
// ============================================================================

/// A stored memory: text, its embedding and access bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    #[serde(rename = "type", default)]
    pub memory_type: MemoryType,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
}

impl VectorRecord {
    /// Create a record stamped with the current time.
    pub fn new(id: impl Into<String>, vector: Vec<f32>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            vector,
            content: content.into(),
            memory_type: MemoryType::default(),
            tags: BTreeSet::new(),
            created: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Set the memory type.
    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }

    /// Set the tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Record a read: bump the access counter and timestamp.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
    }

    /// Check id and vector shape against the store's dimension.
    pub fn validate(&self, dimension: usize) -> DbResult<()> {
        if self.id.trim().is_empty() {
            return Err(DbError::invalid_record(&self.id, "id is empty"));
        }
        if self.vector.len() != dimension {
            return Err(DbError::DimensionMismatch {
                expected: dimension,
                actual: self.vector.len(),
            });
        }
        if self.vector.iter().any(|x| !x.is_finite()) {
            return Err(DbError::invalid_record(
                &self.id,
                "vector contains NaN or infinite values",
            ));
        }
        Ok(())
    }

    /// Convert to the on-disk / snapshot form.
    pub fn to_serialized(&self) -> SerializedRecord {
        let metadata = RecordMetadata {
            content: self.content.clone(),
            memory_type: self.memory_type.clone(),
            tags: self.tags.clone(),
            created: self.created,
            last_accessed: self.last_accessed,
            access_count: self.access_count,
        };
        let metadata = match serde_json::to_value(metadata) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        SerializedRecord {
            id: self.id.clone(),
            vector: self.vector.clone(),
            metadata,
        }
    }
}

// ============================================================================
// Serialized form
// ============================================================================

/// Typed view of the metadata map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordMetadata {
    content: String,
    #[serde(rename = "type", default)]
    memory_type: MemoryType,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default = "Utc::now")]
    created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    last_accessed: DateTime<Utc>,
    #[serde(default)]
    access_count: u64,
}

/// `{ id, vector, metadata }` as written to disk and into snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SerializedRecord {
    /// Decode into a [`VectorRecord`].
    ///
    /// The vector is not validated here; an empty vector is allowed so that
    /// importers can re-embed from content.
    pub fn into_record(self) -> DbResult<VectorRecord> {
        if self.id.trim().is_empty() {
            return Err(DbError::invalid_record("", "missing id"));
        }
        let metadata: RecordMetadata =
            serde_json::from_value(serde_json::Value::Object(self.metadata))
                .map_err(|e| DbError::invalid_record(&self.id, format!("bad metadata: {}", e)))?;

        Ok(VectorRecord {
            id: self.id,
            vector: self.vector,
            content: metadata.content,
            memory_type: metadata.memory_type,
            tags: metadata.tags,
            created: metadata.created,
            last_accessed: metadata.last_accessed,
            access_count: metadata.access_count,
        })
    }
}
