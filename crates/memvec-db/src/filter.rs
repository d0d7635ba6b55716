//! Metadata filters applied to search candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{MemoryType, VectorRecord};

/// Filter criteria for vector search.
///
/// All fields are optional and combined with AND logic. Empty/None fields are
/// ignored, so the default filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchFilter {
    /// Only records of this memory type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,

    /// Only records that have ALL of these tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Only records created at or after this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,

    /// Only records created before this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
}

impl VectorSearchFilter {
    /// Create an empty filter (matches all).
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by memory type.
    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    /// Filter by tags (must have ALL specified tags).
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Filter by creation time window.
    pub fn with_created_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    /// Check if the filter is empty (matches all).
    pub fn is_empty(&self) -> bool {
        self.memory_type.is_none()
            && self.tags.is_empty()
            && self.created_after.is_none()
            && self.created_before.is_none()
    }

    /// Check whether `record` passes every criterion.
    pub fn matches(&self, record: &VectorRecord) -> bool {
        if let Some(ref memory_type) = self.memory_type {
            if &record.memory_type != memory_type {
                return false;
            }
        }

        if !self.tags.iter().all(|tag| record.tags.contains(tag)) {
            return false;
        }

        if let Some(after) = self.created_after {
            if record.created < after {
                return false;
            }
        }

        if let Some(before) = self.created_before {
            if record.created >= before {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> VectorRecord {
        VectorRecord::new("r1", vec![1.0], "pizza")
            .with_type(MemoryType::Preference)
            .with_tags(["food", "user"])
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let filter = VectorSearchFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&record()));
    }

    #[test]
    fn test_type_and_tags() {
        let r = record();
        assert!(VectorSearchFilter::new()
            .with_type(MemoryType::Preference)
            .with_tags(["food"])
            .matches(&r));
        assert!(!VectorSearchFilter::new().with_type(MemoryType::Fact).matches(&r));
        assert!(!VectorSearchFilter::new()
            .with_tags(["food", "weather"])
            .matches(&r));
    }

    #[test]
    fn test_created_window() {
        let r = record();
        let hour = Duration::hours(1);
        assert!(VectorSearchFilter::new()
            .with_created_between(Some(r.created - hour), Some(r.created + hour))
            .matches(&r));
        assert!(!VectorSearchFilter::new()
            .with_created_between(Some(r.created + hour), None)
            .matches(&r));
        assert!(!VectorSearchFilter::new()
            .with_created_between(None, Some(r.created))
            .matches(&r));
    }
}
