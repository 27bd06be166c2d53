//! HNSW (Hierarchical Navigable Small World) approximate nearest-neighbor
//! graph (spec §4.6). Kept as a plain in-memory structure, serialized
//! whole into the KV engine by `vector::maintainer::VectorMaintainer` —
//! graph mutation during insert touches neighbor lists across several
//! layers at once, which does not decompose cleanly into independent KV
//! keys the way scalar/bitmap indexes do.
//!
//! Generalizes the teacher's `HashMap<id, Vec<id>>` adjacency idiom (used
//! for forward-link structures elsewhere in the codebase) to a layered,
//! pruned graph.

use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::distance::Metric;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    vector: Vec<f32>,
    /// `neighbors[level]` is this node's neighbor id list at that layer.
    neighbors: Vec<Vec<u64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswIndex {
    nodes: HashMap<u64, Node>,
    entry_point: Option<u64>,
    top_level: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub metric: Metric,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    id: u64,
    dist: f32,
}

impl Eq for Candidate {}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist.total_cmp(&other.dist)
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl HnswIndex {
    pub fn new(m: usize, ef_construction: usize, metric: Metric) -> Self {
        HnswIndex { nodes: HashMap::new(), entry_point: None, top_level: 0, m, ef_construction, metric }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn random_level(&self, seed: u64) -> usize {
        // Deterministic pseudo-random level assignment keyed on the doc id,
        // so a rebuild from the same items reproduces the same graph shape.
        let level_mult = 1.0 / (self.m as f64).ln().max(1.0);
        let mut x = seed.wrapping_mul(2685821657736338717).wrapping_add(1);
        x ^= x >> 33;
        let unit = (x as f64 / u64::MAX as f64).max(1e-12);
        (-unit.ln() * level_mult).floor() as usize
    }

    fn search_layer(&self, query: &[f32], entry: u64, ef: usize, level: usize) -> Vec<Candidate> {
        let mut visited = HashSet::new();
        visited.insert(entry);
        let entry_dist = self.metric.distance(query, &self.nodes[&entry].vector);
        let mut candidates = BinaryHeap::new();
        candidates.push(std::cmp::Reverse(Candidate { id: entry, dist: entry_dist }));
        let mut found = vec![Candidate { id: entry, dist: entry_dist }];

        while let Some(std::cmp::Reverse(current)) = candidates.pop() {
            let worst = found.iter().map(|c| c.dist).fold(f32::MIN, f32::max);
            if current.dist > worst && found.len() >= ef {
                break;
            }
            if let Some(node) = self.nodes.get(&current.id) {
                if let Some(neighbors) = node.neighbors.get(level) {
                    for &nb in neighbors {
                        if visited.insert(nb) {
                            let dist = self.metric.distance(query, &self.nodes[&nb].vector);
                            candidates.push(std::cmp::Reverse(Candidate { id: nb, dist }));
                            found.push(Candidate { id: nb, dist });
                        }
                    }
                }
            }
        }

        found.sort_by(|a, b| a.dist.total_cmp(&b.dist));
        found.truncate(ef.max(1));
        found
    }

    pub fn insert(&mut self, id: u64, vector: Vec<f32>) {
        let level = self.random_level(id);
        let new_levels = level + 1;

        if self.nodes.is_empty() {
            self.nodes.insert(id, Node { vector, neighbors: vec![Vec::new(); new_levels] });
            self.entry_point = Some(id);
            self.top_level = level;
            return;
        }

        let entry = self.entry_point.unwrap();
        let mut current = entry;
        for l in (level + 1..=self.top_level).rev() {
            let found = self.search_layer(&vector, current, 1, l);
            if let Some(best) = found.first() {
                current = best.id;
            }
        }

        let mut per_level_neighbors = vec![Vec::new(); new_levels];
        for l in (0..=level.min(self.top_level)).rev() {
            let candidates = self.search_layer(&vector, current, self.ef_construction, l);
            let selected: Vec<u64> = candidates.iter().take(self.m).map(|c| c.id).collect();
            per_level_neighbors[l] = selected.clone();
            if let Some(best) = candidates.first() {
                current = best.id;
            }
            for &nb in &selected {
                if let Some(node) = self.nodes.get_mut(&nb) {
                    if node.neighbors.len() <= l {
                        node.neighbors.resize(l + 1, Vec::new());
                    }
                    node.neighbors[l].push(id);
                    if node.neighbors[l].len() > self.m {
                        let nb_vector = node.vector.clone();
                        let mut dists: Vec<(u64, f32)> = node.neighbors[l]
                            .iter()
                            .map(|&n| (n, self.metric.distance(&nb_vector, &self.nodes[&n].vector)))
                            .collect();
                        dists.sort_by(|a, b| a.1.total_cmp(&b.1));
                        dists.truncate(self.m);
                        node.neighbors[l] = dists.into_iter().map(|(n, _)| n).collect();
                    }
                }
            }
        }

        self.nodes.insert(id, Node { vector, neighbors: per_level_neighbors });
        if level > self.top_level {
            self.top_level = level;
            self.entry_point = Some(id);
        }
    }

    pub fn remove(&mut self, id: u64) {
        self.nodes.remove(&id);
        for node in self.nodes.values_mut() {
            for layer in node.neighbors.iter_mut() {
                layer.retain(|&n| n != id);
            }
        }
        if self.entry_point == Some(id) {
            self.entry_point = self.nodes.keys().next().copied();
        }
    }

    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<(u64, f32)> {
        let Some(entry) = self.entry_point else { return Vec::new() };
        let mut current = entry;
        for l in (1..=self.top_level).rev() {
            if let Some(best) = self.search_layer(query, current, 1, l).first() {
                current = best.id;
            }
        }
        let found = self.search_layer(query, current, ef_search.max(k), 0);
        found.into_iter().take(k).map(|c| (c.id, c.dist)).collect()
    }

    /// ACORN-style predicate-aware search (spec §4.6): the upper layers are
    /// descended as usual, but layer 0 is explored with the predicate check
    /// decoupled from the stopping criterion. A node that fails `predicate`
    /// is still visited and its neighbors still expanded, so a clique of
    /// filtered-out nodes never severs the path to a filtered-in one behind
    /// it — only nodes that pass `predicate` count towards `ef` and the
    /// returned `k`. `expansion` multiplies how many raw (pre-filter) hops
    /// are explored before giving up, to compensate for low-selectivity
    /// predicates; 1 behaves like plain HNSW search restricted to matches
    /// found incidentally along the unfiltered path.
    pub fn search_filtered(&self, query: &[f32], k: usize, ef_search: usize, expansion: usize, predicate: &dyn Fn(u64) -> bool) -> Vec<(u64, f32)> {
        let Some(entry) = self.entry_point else { return Vec::new() };
        let mut current = entry;
        for l in (1..=self.top_level).rev() {
            if let Some(best) = self.search_layer(query, current, 1, l).first() {
                current = best.id;
            }
        }

        let ef = ef_search.max(k);
        let raw_budget = ef * expansion.max(1);
        let mut visited = HashSet::new();
        visited.insert(current);
        let entry_dist = self.metric.distance(query, &self.nodes[&current].vector);
        let mut frontier = BinaryHeap::new();
        frontier.push(std::cmp::Reverse(Candidate { id: current, dist: entry_dist }));
        let mut matched: Vec<Candidate> = Vec::new();
        if predicate(current) {
            matched.push(Candidate { id: current, dist: entry_dist });
        }

        while let Some(std::cmp::Reverse(node)) = frontier.pop() {
            if visited.len() >= raw_budget {
                break;
            }
            let worst_matched = matched.iter().map(|c| c.dist).fold(f32::MIN, f32::max);
            if node.dist > worst_matched && matched.len() >= ef {
                break;
            }
            let Some(graph_node) = self.nodes.get(&node.id) else { continue };
            let Some(neighbors) = graph_node.neighbors.first() else { continue };
            for &nb in neighbors {
                if !visited.insert(nb) {
                    continue;
                }
                let dist = self.metric.distance(query, &self.nodes[&nb].vector);
                frontier.push(std::cmp::Reverse(Candidate { id: nb, dist }));
                if predicate(nb) {
                    matched.push(Candidate { id: nb, dist });
                }
            }
        }

        matched.sort_by(|a, b| a.dist.total_cmp(&b.dist));
        matched.truncate(k);
        matched.into_iter().map(|c| (c.id, c.dist)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_returns_nearest_neighbor_first() {
        let mut index = HnswIndex::new(8, 32, Metric::Euclidean);
        index.insert(1, vec![0.0, 0.0]);
        index.insert(2, vec![10.0, 10.0]);
        index.insert(3, vec![0.5, 0.5]);

        let results = index.search(&[0.0, 0.0], 1, 32);
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn remove_drops_node_from_future_searches() {
        let mut index = HnswIndex::new(8, 32, Metric::Euclidean);
        index.insert(1, vec![0.0, 0.0]);
        index.insert(2, vec![1.0, 1.0]);
        index.remove(1);
        let results = index.search(&[0.0, 0.0], 2, 32);
        assert!(results.iter().all(|(id, _)| *id != 1));
    }

    #[test]
    fn search_filtered_skips_nodes_that_fail_the_predicate() {
        let mut index = HnswIndex::new(8, 32, Metric::Euclidean);
        index.insert(1, vec![0.0, 0.0]);
        index.insert(2, vec![0.1, 0.1]);
        index.insert(3, vec![5.0, 5.0]);

        let results = index.search_filtered(&[0.0, 0.0], 1, 32, 4, &|id| id == 3);
        assert_eq!(results[0].0, 3);
    }

    #[test]
    fn search_filtered_matches_plain_search_when_everything_passes() {
        let mut index = HnswIndex::new(8, 32, Metric::Euclidean);
        index.insert(1, vec![0.0, 0.0]);
        index.insert(2, vec![10.0, 10.0]);

        let plain = index.search(&[0.0, 0.0], 1, 32);
        let filtered = index.search_filtered(&[0.0, 0.0], 1, 32, 4, &|_| true);
        assert_eq!(plain[0].0, filtered[0].0);
    }
}
