//! In-memory approximate nearest-neighbor index.
//!
//! A multi-layer proximity graph (HNSW). Nodes live in a flat arena and
//! neighbor lists hold arena slots, so there are no ownership cycles.
//!
//! Deletion tombstones the node: it stays traversable but is never returned.
//! Once the tombstone ratio exceeds [`HnswParams::rebuild_threshold`] the
//! owner is expected to call [`HnswIndex::rebuild`] from durable storage.
//!
//! Results are approximate. Exact top-k recall is not guaranteed; quality is
//! controlled by `ef_construction` and `ef_search`.

mod hnsw;
mod search;

pub use hnsw::{GraphNode, HnswIndex};

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// HnswParams
// ============================================================================

/// Graph construction and search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HnswParams {
    /// Maximum neighbors per node on layers above 0.
    #[serde(default = "default_m")]
    pub m: usize,

    /// Maximum neighbors per node on layer 0.
    #[serde(default = "default_m0")]
    pub m0: usize,

    /// Beam width while inserting.
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    /// Default beam width while searching.
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,

    /// Highest layer a node may be assigned.
    #[serde(default = "default_max_level")]
    pub max_level: usize,

    /// Tombstone ratio above which a rebuild is due.
    #[serde(default = "default_rebuild_threshold")]
    pub rebuild_threshold: f32,

    /// Seed for level assignment. Random when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_m() -> usize {
    16
}

fn default_m0() -> usize {
    32
}

fn default_ef_construction() -> usize {
    200
}

fn default_ef_search() -> usize {
    64
}

fn default_max_level() -> usize {
    16
}

fn default_rebuild_threshold() -> f32 {
    0.25
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: default_m(),
            m0: default_m0(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            max_level: default_max_level(),
            rebuild_threshold: default_rebuild_threshold(),
            seed: None,
        }
    }
}

impl HnswParams {
    /// Fix the level-assignment seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the construction beam width.
    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    /// Set the neighbor caps (`m0` becomes `2 * m`).
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self.m0 = m * 2;
        self
    }

    /// Maximum neighbor-list length on `layer`.
    pub fn max_neighbors(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m0
        } else {
            self.m
        }
    }

    /// Check the parameters for values the graph cannot work with.
    pub fn validate(&self) -> DbResult<()> {
        let problem = if self.m < 2 {
            Some("m must be at least 2".to_string())
        } else if self.m0 < self.m {
            Some(format!("m0 ({}) must be at least m ({})", self.m0, self.m))
        } else if self.ef_construction < self.m {
            Some(format!(
                "efConstruction ({}) must be at least m ({})",
                self.ef_construction, self.m
            ))
        } else if self.ef_search == 0 {
            Some("efSearch must be positive".to_string())
        } else if !(0.0..=1.0).contains(&self.rebuild_threshold) {
            Some(format!(
                "rebuildThreshold ({}) must be within 0.0..=1.0",
                self.rebuild_threshold
            ))
        } else {
            None
        };

        match problem {
            Some(message) => Err(DbError::Config { message }),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// One search candidate, closest first.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    /// Euclidean distance to the query.
    pub distance: f32,
}

/// Structural health of the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    /// Arena slots, tombstones included.
    pub nodes: usize,
    pub live: usize,
    pub tombstones: usize,
    /// Live nodes not reachable from the entry point on layer 0.
    pub unreachable: usize,
    /// Neighbor lists longer than the layer's cap.
    pub oversized_lists: usize,
    /// Neighbor references to missing slots or to nodes absent from that layer.
    pub dangling_refs: usize,
    /// Self references and repeated entries within one list.
    pub duplicate_refs: usize,
    /// Live nodes whose id maps to another slot.
    pub duplicate_ids: usize,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.unreachable == 0
            && self.oversized_lists == 0
            && self.dangling_refs == 0
            && self.duplicate_refs == 0
            && self.duplicate_ids == 0
    }
}

/// Euclidean (L2) distance.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    search::squared_distance(a, b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults_and_caps() {
        let params = HnswParams::default();
        assert_eq!(params.m, 16);
        assert_eq!(params.max_neighbors(0), 32);
        assert_eq!(params.max_neighbors(3), 16);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_validation() {
        let bad = HnswParams {
            m: 1,
            ..HnswParams::default()
        };
        assert!(bad.validate().is_err());

        let bad = HnswParams {
            rebuild_threshold: 1.5,
            ..HnswParams::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_params_serde_camel_case() {
        let params: HnswParams =
            serde_json::from_str(r#"{"efConstruction": 100, "seed": 7}"#).unwrap();
        assert_eq!(params.ef_construction, 100);
        assert_eq!(params.seed, Some(7));
        assert_eq!(params.ef_search, 64);
    }

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
    }
}
