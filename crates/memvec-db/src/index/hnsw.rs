//! HNSW graph over an arena of nodes.

use super::search::{greedy_closest, search_layer, squared_distance, Candidate};
use super::{HnswParams, IndexHit, IntegrityReport};
use crate::error::{DbError, DbResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace};

/// A vector in the graph.
///
/// `neighbors[layer]` holds arena slots; the node is present on layers
/// `0..=level`.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub vector: Vec<f32>,
    pub level: usize,
    pub neighbors: Vec<Vec<u32>>,
    pub deleted: bool,
}

/// Hierarchical navigable small world index.
///
/// Not internally synchronized: wrap it in a lock to share it.
pub struct HnswIndex {
    dimension: usize,
    params: HnswParams,
    nodes: Vec<GraphNode>,
    /// Live id -> arena slot.
    ids: HashMap<String, u32>,
    entry_point: Option<u32>,
    top_layer: usize,
    tombstones: usize,
    rng: StdRng,
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimension", &self.dimension)
            .field("live", &self.ids.len())
            .field("tombstones", &self.tombstones)
            .field("top_layer", &self.top_layer)
            .finish()
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

impl HnswIndex {
    pub fn new(dimension: usize, params: HnswParams) -> Self {
        let rng = make_rng(params.seed);
        Self {
            dimension,
            params,
            nodes: Vec::new(),
            ids: HashMap::new(),
            entry_point: None,
            top_layer: 0,
            tombstones: 0,
            rng,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Live (searchable) entries.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Arena size, tombstones included.
    pub fn graph_size(&self) -> usize {
        self.nodes.len()
    }

    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// True once tombstones make up more than `rebuild_threshold` of the graph.
    pub fn needs_rebuild(&self) -> bool {
        self.tombstones > 0
            && self.tombstones as f32 / self.nodes.len() as f32 > self.params.rebuild_threshold
    }

    fn check_vector(&self, vector: &[f32]) -> DbResult<()> {
        if vector.len() != self.dimension {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Geometric level: keep climbing with probability 1/2, capped at `max_level`.
    fn random_level(&mut self) -> usize {
        let mut level = 0;
        while level < self.params.max_level && self.rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    // ------------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------------

    /// Insert a vector. An existing entry with the same id is replaced.
    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>) -> DbResult<()> {
        let id = id.into();
        self.check_vector(&vector)?;
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(DbError::invalid_record(
                &id,
                "vector contains NaN or infinite values",
            ));
        }
        if self.nodes.len() >= u32::MAX as usize {
            return Err(DbError::internal("index arena is full"));
        }

        self.remove(&id);

        let level = self.random_level();
        let slot = self.nodes.len() as u32;
        self.nodes.push(GraphNode {
            id: id.clone(),
            vector,
            level,
            neighbors: vec![Vec::new(); level + 1],
            deleted: false,
        });
        self.ids.insert(id, slot);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(slot);
            self.top_layer = level;
            return Ok(());
        };

        let query = self.nodes[slot as usize].vector.clone();
        let mut current = entry;
        for layer in ((level + 1)..=self.top_layer).rev() {
            current = greedy_closest(&self.nodes, &query, current, layer);
        }

        for layer in (0..=level.min(self.top_layer)).rev() {
            let candidates =
                search_layer(&self.nodes, &query, current, self.params.ef_construction, layer);
            let cap = self.params.max_neighbors(layer).max(1);
            let selected = self.select_neighbors(&candidates, slot, cap);

            for &neighbor in &selected {
                self.connect(neighbor, slot, layer);
            }
            self.nodes[slot as usize].neighbors[layer] = selected;

            if let Some(closest) = candidates.first() {
                current = closest.slot;
            }
        }

        if level > self.top_layer {
            trace!("New entry point at layer {}", level);
            self.entry_point = Some(slot);
            self.top_layer = level;
        }
        Ok(())
    }

    /// Closest `count` candidates, live nodes before tombstones.
    fn select_neighbors(&self, candidates: &[Candidate], slot: u32, count: usize) -> Vec<u32> {
        let mut ranked: Vec<&Candidate> = candidates.iter().filter(|c| c.slot != slot).collect();
        ranked.sort_by_key(|c| self.nodes[c.slot as usize].deleted);
        ranked.into_iter().take(count).map(|c| c.slot).collect()
    }

    /// Add `slot` to `node`'s list on `layer`, pruning the farthest past the cap.
    fn connect(&mut self, node: u32, slot: u32, layer: usize) {
        let cap = self.params.max_neighbors(layer).max(1);
        let list = &mut self.nodes[node as usize].neighbors[layer];
        if list.contains(&slot) {
            return;
        }
        list.push(slot);
        if list.len() <= cap {
            return;
        }

        let origin = &self.nodes[node as usize].vector;
        let mut ranked: Vec<Candidate> = self.nodes[node as usize].neighbors[layer]
            .iter()
            .map(|&n| Candidate {
                distance: squared_distance(origin, &self.nodes[n as usize].vector),
                slot: n,
            })
            .collect();
        ranked.sort();
        ranked.truncate(cap);
        self.nodes[node as usize].neighbors[layer] = ranked.into_iter().map(|c| c.slot).collect();
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    /// Approximate `k` nearest live entries, closest first.
    ///
    /// `ef` is the layer-0 beam width and is raised to `k` when smaller.
    /// An empty index yields an empty result.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> DbResult<Vec<IndexHit>> {
        self.check_vector(query)?;
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut current = entry;
        for layer in (1..=self.top_layer).rev() {
            current = greedy_closest(&self.nodes, query, current, layer);
        }

        let hits = search_layer(&self.nodes, query, current, ef.max(k), 0)
            .into_iter()
            .filter(|c| !self.nodes[c.slot as usize].deleted)
            .take(k)
            .map(|c| IndexHit {
                id: self.nodes[c.slot as usize].id.clone(),
                distance: c.distance.sqrt(),
            })
            .collect();
        Ok(hits)
    }

    // ------------------------------------------------------------------------
    // Removal and rebuild
    // ------------------------------------------------------------------------

    /// Tombstone an entry. Returns `false` when the id is not indexed.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.ids.remove(id) {
            Some(slot) => {
                self.nodes[slot as usize].deleted = true;
                self.tombstones += 1;
                true
            }
            None => false,
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.ids.clear();
        self.entry_point = None;
        self.top_layer = 0;
        self.tombstones = 0;
        self.rng = make_rng(self.params.seed);
    }

    /// Replace the graph with a fresh one built from `items`.
    ///
    /// Items that fail to insert are skipped and counted in the return value.
    pub fn rebuild<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let previous = self.tombstones;
        self.clear();

        let mut skipped = 0;
        for (id, vector) in items {
            if let Err(e) = self.insert(id, vector) {
                debug!("Skipping entry during rebuild: {}", e);
                skipped += 1;
            }
        }

        debug!(
            "Rebuilt index: {} entries, {} tombstones dropped, {} skipped",
            self.ids.len(),
            previous,
            skipped
        );
        skipped
    }

    // ------------------------------------------------------------------------
    // Integrity
    // ------------------------------------------------------------------------

    /// Inspect the graph for structural problems.
    pub fn check_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport {
            nodes: self.nodes.len(),
            live: self.ids.len(),
            tombstones: self.tombstones,
            ..IntegrityReport::default()
        };

        for (slot, node) in self.nodes.iter().enumerate() {
            if !node.deleted && self.ids.get(&node.id) != Some(&(slot as u32)) {
                report.duplicate_ids += 1;
            }

            for (layer, list) in node.neighbors.iter().enumerate() {
                if list.len() > self.params.max_neighbors(layer).max(1) {
                    report.oversized_lists += 1;
                }
                let mut seen = HashSet::new();
                for &neighbor in list {
                    if neighbor as usize == slot || !seen.insert(neighbor) {
                        report.duplicate_refs += 1;
                    }
                    match self.nodes.get(neighbor as usize) {
                        Some(target) if target.level >= layer => {}
                        _ => report.dangling_refs += 1,
                    }
                }
            }
        }

        let mut reached = vec![false; self.nodes.len()];
        if let Some(entry) = self.entry_point {
            let mut queue = VecDeque::from([entry]);
            reached[entry as usize] = true;
            while let Some(slot) = queue.pop_front() {
                let Some(list) = self.nodes[slot as usize].neighbors.first() else {
                    continue;
                };
                for &neighbor in list {
                    if let Some(seen) = reached.get_mut(neighbor as usize) {
                        if !*seen {
                            *seen = true;
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
        }
        report.unreachable = self
            .nodes
            .iter()
            .zip(&reached)
            .filter(|(node, reached)| !node.deleted && !**reached)
            .count();

        report
    }
}
