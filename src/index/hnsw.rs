use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bit_vec::BitVec;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{exact_scan, VectorIndex};
use crate::config::{HnswParams, IndexKind};
use crate::model::Neighbor;
use crate::store::VectorStore;
use crate::vector::distance;

const MAX_LEVEL: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    dist: OrderedFloat<f32>,
    id: u64,
    slot: usize,
}

impl Candidate {
    fn new(store: &VectorStore, dist: OrderedFloat<f32>, slot: usize) -> Self {
        Self { dist, id: store.id_at(slot), slot }
    }

    fn rank(&self) -> (OrderedFloat<f32>, u64) {
        (self.dist, self.id)
    }
}

// Reversed so BinaryHeap<Candidate> pops the closest first
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .cmp(&self.dist)
            .then_with(|| other.id.cmp(&self.id))
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct Node {
    /// links[layer] = neighbor slots on that layer
    links: Vec<Vec<usize>>,
}

/// Approximate index over a hierarchical navigable small world graph.
///
/// Node levels come from a seeded RNG and every traversal is ordered by
/// (distance, id), so the same sequence of inserts with the same seed
/// always yields the same graph and the same answers.
#[derive(Debug)]
pub struct HnswIndex {
    nodes: Vec<Node>,
    entry_point: Option<usize>,
    max_layer: usize,
    params: HnswParams,
    level_mult: f64,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(params: HnswParams) -> Self {
        let m = params.m.max(2);
        Self {
            nodes: Vec::new(),
            entry_point: None,
            max_layer: 0,
            level_mult: 1.0 / (m as f64).ln(),
            rng: StdRng::seed_from_u64(params.seed),
            params,
        }
    }

    fn select_level(&mut self) -> usize {
        let r: f64 = self.rng.gen_range(f64::MIN_POSITIVE..1.0);
        ((-r.ln() * self.level_mult).floor() as usize).min(MAX_LEVEL)
    }

    fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m * 2
        } else {
            self.params.m
        }
    }

    /// Walks `layer` greedily towards `query` until no neighbor is closer.
    fn greedy(
        &self,
        store: &VectorStore,
        query: &[f32],
        mut curr: usize,
        mut curr_dist: OrderedFloat<f32>,
        layer: usize,
    ) -> (usize, OrderedFloat<f32>) {
        let mut changed = true;
        while changed {
            changed = false;
            let Some(links) = self.nodes[curr].links.get(layer) else {
                break;
            };
            for &neighbor in links {
                let d = OrderedFloat(distance(query, store.vector_at(neighbor)));
                if (d, store.id_at(neighbor)) < (curr_dist, store.id_at(curr)) {
                    curr_dist = d;
                    curr = neighbor;
                    changed = true;
                }
            }
        }
        (curr, curr_dist)
    }

    /// Beam search on one layer. Returns up to `ef` candidates, closest first.
    fn search_layer(
        &self,
        store: &VectorStore,
        query: &[f32],
        entries: &[Candidate],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited = BitVec::from_elem(self.nodes.len(), false);
        let mut candidates = BinaryHeap::new();
        // Max-heap on (distance, id): the root is the candidate to evict
        let mut results: BinaryHeap<(OrderedFloat<f32>, u64, usize)> = BinaryHeap::new();

        for entry in entries {
            if visited.get(entry.slot) == Some(false) {
                visited.set(entry.slot, true);
                candidates.push(entry.clone());
                results.push((entry.dist, entry.id, entry.slot));
            }
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(cand) = candidates.pop() {
            if let Some(&(worst_dist, worst_id, _)) = results.peek() {
                if results.len() >= ef && cand.rank() > (worst_dist, worst_id) {
                    break;
                }
            }

            let Some(links) = self.nodes[cand.slot].links.get(layer) else {
                continue;
            };
            for &v in links {
                if visited.get(v) != Some(false) {
                    continue;
                }
                visited.set(v, true);

                let next = Candidate::new(store, OrderedFloat(distance(query, store.vector_at(v))), v);
                let admit = match results.peek() {
                    Some(&(worst_dist, worst_id, _)) => results.len() < ef || next.rank() < (worst_dist, worst_id),
                    None => true,
                };
                if admit {
                    results.push((next.dist, next.id, next.slot));
                    candidates.push(next);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results
            .into_sorted_vec()
            .into_iter()
            .map(|(dist, id, slot)| Candidate { dist, id, slot })
            .collect()
    }

    fn add_link(&mut self, store: &VectorStore, peer: usize, new: usize, layer: usize) {
        let cap = self.max_links(layer);
        let Some(links) = self.nodes[peer].links.get_mut(layer) else {
            return;
        };
        if links.contains(&new) {
            return;
        }
        links.push(new);

        // Keep connections capped, dropping the farthest
        if links.len() > cap {
            let base = store.vector_at(peer);
            links.sort_by_key(|&s| (OrderedFloat(distance(base, store.vector_at(s))), store.id_at(s)));
            links.truncate(cap);
        }
    }

    /// Links `slot` into every layer up to `level`. Also used to re-link a
    /// node whose vector changed: its stale outgoing links still serve as a
    /// path during the search and are replaced afterwards.
    fn connect(&mut self, store: &VectorStore, slot: usize, level: usize) {
        let Some(entry) = self.entry_point else {
            self.entry_point = Some(slot);
            self.max_layer = level;
            return;
        };

        let query = store.vector_at(slot);
        let top = self.max_layer;
        let mut curr = entry;
        let mut curr_dist = OrderedFloat(distance(query, store.vector_at(curr)));

        // Zoom in through the layers above the node's own level
        for layer in (level + 1..=top).rev() {
            (curr, curr_dist) = self.greedy(store, query, curr, curr_dist, layer);
        }

        let mut entries = vec![Candidate::new(store, curr_dist, curr)];
        for layer in (0..=level.min(top)).rev() {
            let found = self.search_layer(store, query, &entries, self.params.ef_construction, layer);
            let selected: Vec<usize> = found
                .iter()
                .map(|c| c.slot)
                .filter(|&s| s != slot)
                .take(self.max_links(layer))
                .collect();

            for &peer in &selected {
                self.add_link(store, peer, slot, layer);
            }
            self.nodes[slot].links[layer] = selected;
            entries = found;
        }

        if level > top {
            self.max_layer = level;
            self.entry_point = Some(slot);
        }
    }
}

impl VectorIndex for HnswIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw
    }

    fn build(&mut self, store: &VectorStore) {
        self.nodes.clear();
        self.nodes.reserve(store.len());
        self.entry_point = None;
        self.max_layer = 0;
        self.rng = StdRng::seed_from_u64(self.params.seed);

        for slot in 0..store.len() {
            self.insert(store, slot);
        }
    }

    fn insert(&mut self, store: &VectorStore, slot: usize) {
        if slot < self.nodes.len() {
            let level = self.nodes[slot].links.len() - 1;
            self.connect(store, slot, level);
            return;
        }

        debug_assert_eq!(slot, self.nodes.len());
        let level = self.select_level();
        self.nodes.push(Node {
            links: vec![Vec::new(); level + 1],
        });
        self.connect(store, slot, level);
    }

    fn nearest(&self, store: &VectorStore, query: &[f32], k: usize) -> Vec<Neighbor> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        // Asking for the whole store: a scan is exact and no slower
        if k >= store.len() {
            return exact_scan(store, query, k);
        }

        let mut curr = entry;
        let mut curr_dist = OrderedFloat(distance(query, store.vector_at(curr)));
        for layer in (1..=self.max_layer).rev() {
            (curr, curr_dist) = self.greedy(store, query, curr, curr_dist, layer);
        }

        let ef = self.params.ef_search.max(k);
        let entries = [Candidate::new(store, curr_dist, curr)];
        let mut hits: Vec<Neighbor> = self
            .search_layer(store, query, &entries, ef, 0)
            .into_iter()
            .map(|c| Neighbor::new(store.id_at(c.slot), c.dist.into_inner()))
            .collect();

        // A sparse or overwritten graph can strand nodes; never return short
        if hits.len() < k {
            return exact_scan(store, query, k);
        }
        hits.sort();
        hits.truncate(k);
        hits
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{brute_force, random_store};

    fn built(store: &VectorStore, seed: u64) -> HnswIndex {
        let mut index = HnswIndex::new(HnswParams {
            seed,
            ..HnswParams::default()
        });
        index.build(store);
        index
    }

    #[test]
    fn test_exact_match_found() {
        let store = random_store(8, 300, 5);
        let index = built(&store, 42);
        for slot in [0, 17, 150, 299] {
            let hits = index.nearest(&store, store.vector_at(slot), 1);
            assert_eq!(hits[0].id, store.id_at(slot));
            assert_eq!(hits[0].distance, 0.0);
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let store = random_store(8, 400, 6);
        let a = built(&store, 7);
        let b = built(&store, 7);
        let q = vec![0.1f32; 8];
        assert_eq!(a.nearest(&store, &q, 10), b.nearest(&store, &q, 10));
        assert_eq!(a.max_layer, b.max_layer);
        assert_eq!(a.entry_point, b.entry_point);
    }

    #[test]
    fn test_recall_on_small_data() {
        let store = random_store(12, 600, 8);
        let index = built(&store, 42);
        let mut hit = 0;
        let mut total = 0;
        for slot in (0..600).step_by(40) {
            let q: Vec<f32> = store.vector_at(slot).iter().map(|x| x * 0.9 + 0.05).collect();
            let truth = brute_force(&store, &q, 10);
            let got = index.nearest(&store, &q, 10);
            assert!(got.windows(2).all(|w| w[0] <= w[1]));
            total += truth.len();
            hit += truth.iter().filter(|t| got.iter().any(|g| g.id == t.id)).count();
        }
        assert!(hit as f64 / total as f64 > 0.9, "recall {}/{}", hit, total);
    }

    #[test]
    fn test_k_larger_than_ef_returns_everything() {
        let store = random_store(4, 120, 9);
        let index = built(&store, 1);
        let hits = index.nearest(&store, &[0.0; 4], 120);
        assert_eq!(hits.len(), 120);
        assert_eq!(hits, brute_force(&store, &[0.0; 4], 120));
    }

    #[test]
    fn test_equal_distances_resolve_to_lower_id() {
        let mut store = VectorStore::new(3).unwrap();
        store.insert(3, &[0.0, 0.0, 1.0]).unwrap();
        store.insert(2, &[0.0, 1.0, 0.0]).unwrap();
        store.insert(9, &[5.0, 5.0, 5.0]).unwrap();
        let mut index = HnswIndex::new(HnswParams {
            ef_search: 1,
            ..HnswParams::default()
        });
        index.build(&store);

        let hits = index.nearest(&store, &[1.0, 0.0, 0.0], 1);
        assert_eq!(hits, vec![Neighbor::new(2, 2.0)]);
    }

    #[test]
    fn test_sparse_graph_with_overwrites_returns_every_record() {
        let mut store = VectorStore::new(8).unwrap();
        let mut index = HnswIndex::new(HnswParams {
            m: 2,
            ef_construction: 2,
            ef_search: 1,
            seed: 11,
        });
        let mut rng = StdRng::seed_from_u64(21);
        for i in 0..600u64 {
            let v: Vec<f32> = (0..8).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let slot = store.insert(i % 450, &v).unwrap().slot();
            index.insert(&store, slot);
        }
        assert_eq!(store.len(), 450);

        let q = [0.2f32; 8];
        let all = index.query(&store, &q, store.len() + 10).unwrap();
        assert_eq!(all.len(), 450);
        assert_eq!(all, brute_force(&store, &q, 450));

        let most = index.query(&store, &q, 449).unwrap();
        assert_eq!(most.len(), 449);
        assert!(most.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_overwrite_relinks_node() {
        let mut store = random_store(4, 50, 10);
        let mut index = built(&store, 3);
        let id = store.id_at(20);
        let slot = store.insert(id, &[5.0, 5.0, 5.0, 5.0]).unwrap().slot();
        index.insert(&store, slot);

        assert_eq!(index.len(), 50);
        let hits = index.nearest(&store, &[5.0, 5.0, 5.0, 5.0], 1);
        assert_eq!(hits, vec![Neighbor::new(id, 0.0)]);
    }
}
