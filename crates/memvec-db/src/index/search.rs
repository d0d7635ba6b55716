//! Layer traversal shared by insert and search.

use super::hnsw::GraphNode;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

/// A visited node and its distance to the query.
#[derive(Debug, Clone, Copy)]
pub(super) struct Candidate {
    pub distance: f32,
    pub slot: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

/// Squared L2 distance. Orders exactly like Euclidean distance.
pub(super) fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn neighbors_at(nodes: &[GraphNode], slot: u32, layer: usize) -> &[u32] {
    nodes
        .get(slot as usize)
        .and_then(|node| node.neighbors.get(layer))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Follow 1-nearest hops on `layer` until no neighbor is closer.
pub(super) fn greedy_closest(nodes: &[GraphNode], query: &[f32], entry: u32, layer: usize) -> u32 {
    let mut current = entry;
    let mut current_dist = squared_distance(query, &nodes[entry as usize].vector);

    loop {
        let mut changed = false;
        for &neighbor in neighbors_at(nodes, current, layer) {
            let dist = squared_distance(query, &nodes[neighbor as usize].vector);
            if dist < current_dist {
                current = neighbor;
                current_dist = dist;
                changed = true;
            }
        }
        if !changed {
            return current;
        }
    }
}

/// Beam search of width `ef` on `layer`. Returns candidates closest first.
///
/// Tombstoned nodes are traversed like any other node; callers filter them.
pub(super) fn search_layer(
    nodes: &[GraphNode],
    query: &[f32],
    entry: u32,
    ef: usize,
    layer: usize,
) -> Vec<Candidate> {
    let ef = ef.max(1);
    let start = Candidate {
        distance: squared_distance(query, &nodes[entry as usize].vector),
        slot: entry,
    };

    let mut visited = HashSet::new();
    visited.insert(entry);

    // Min-heap of nodes to expand, max-heap of the best `ef` so far.
    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse(start));
    let mut results = BinaryHeap::new();
    results.push(start);

    while let Some(Reverse(current)) = frontier.pop() {
        if results.len() >= ef {
            if let Some(worst) = results.peek() {
                if current.distance > worst.distance {
                    break;
                }
            }
        }

        for &neighbor in neighbors_at(nodes, current.slot, layer) {
            if !visited.insert(neighbor) {
                continue;
            }
            let candidate = Candidate {
                distance: squared_distance(query, &nodes[neighbor as usize].vector),
                slot: neighbor,
            };
            let worst = results.peek().map(|c| c.distance).unwrap_or(f32::INFINITY);
            if results.len() < ef || candidate.distance < worst {
                frontier.push(Reverse(candidate));
                results.push(candidate);
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    results.into_sorted_vec()
}
