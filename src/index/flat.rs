use std::collections::BTreeSet;

use ordered_float::OrderedFloat;

use super::{TopK, VectorIndex};
use crate::config::IndexKind;
use crate::model::Neighbor;
use crate::store::VectorStore;
use crate::vector::{distance, squared_norm};

/// Relative + absolute slack on the pruning bound so f32 rounding of the
/// exact distance can never cut off a true neighbor.
const BOUND_SLACK: f64 = 1e-6;

/// Exact index: slots ordered by vector norm.
///
/// By the triangle inequality `(|q| - |x|)^2 <= |q - x|^2`, so walking
/// outward from the query's norm visits candidates in order of a lower
/// bound and can stop once that bound exceeds the current k-th distance.
#[derive(Debug, Default)]
pub struct FlatIndex {
    norms: Vec<f64>,
    by_norm: BTreeSet<(OrderedFloat<f64>, usize)>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn build(&mut self, store: &VectorStore) {
        self.norms.clear();
        self.by_norm.clear();
        self.norms.reserve(store.len());
        for slot in 0..store.len() {
            self.insert(store, slot);
        }
    }

    fn insert(&mut self, store: &VectorStore, slot: usize) {
        let norm = squared_norm(store.vector_at(slot)).sqrt();

        if let Some(old) = self.norms.get_mut(slot) {
            self.by_norm.remove(&(OrderedFloat(*old), slot));
            *old = norm;
        } else {
            debug_assert_eq!(slot, self.norms.len());
            self.norms.push(norm);
        }
        self.by_norm.insert((OrderedFloat(norm), slot));
    }

    fn nearest(&self, store: &VectorStore, query: &[f32], k: usize) -> Vec<Neighbor> {
        let q_norm = squared_norm(query).sqrt();
        let pivot = (OrderedFloat(q_norm), 0usize);

        let mut below = self.by_norm.range(..pivot).rev().peekable();
        let mut above = self.by_norm.range(pivot..).peekable();
        let mut top = TopK::new(k);

        loop {
            let take_below = match (below.peek(), above.peek()) {
                (None, None) => break,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (Some(b), Some(a)) => q_norm - b.0 .0 <= a.0 .0 - q_norm,
            };
            let next = if take_below { below.next() } else { above.next() };
            let Some(&(OrderedFloat(norm), slot)) = next else {
                break;
            };

            let gap = norm - q_norm;
            if let Some(worst) = top.worst() {
                let worst = worst as f64;
                if gap * gap > worst + worst * BOUND_SLACK + BOUND_SLACK {
                    // Every remaining candidate on both sides has a larger gap
                    break;
                }
            }

            top.push(Neighbor::new(
                store.id_at(slot),
                distance(query, store.vector_at(slot)),
            ));
        }

        top.into_sorted()
    }

    fn len(&self) -> usize {
        self.norms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{brute_force, random_store};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_matches_brute_force() {
        let store = random_store(16, 500, 11);
        let mut index = FlatIndex::new();
        index.build(&store);
        assert_eq!(index.len(), 500);

        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..20 {
            let q: Vec<f32> = (0..16).map(|_| rng.gen_range(-1.5..1.5)).collect();
            for k in [1, 5, 37] {
                assert_eq!(index.nearest(&store, &q, k), brute_force(&store, &q, k));
            }
        }
    }

    #[test]
    fn test_unit_vector_ties_break_by_id() {
        let mut store = VectorStore::new(3).unwrap();
        store.insert(3, &[0.0, 0.0, 1.0]).unwrap();
        store.insert(1, &[1.0, 0.0, 0.0]).unwrap();
        store.insert(2, &[0.0, 1.0, 0.0]).unwrap();
        let mut index = FlatIndex::new();
        index.build(&store);

        let hits = index.nearest(&store, &[1.0, 0.0, 0.0], 2);
        assert_eq!(hits, vec![Neighbor::new(1, 0.0), Neighbor::new(2, 2.0)]);
    }

    #[test]
    fn test_overwrite_refreshes_norm() {
        let mut store = VectorStore::new(2).unwrap();
        let mut index = FlatIndex::new();
        for (id, v) in [(1u64, [10.0f32, 0.0]), (2, [0.0, 1.0])] {
            let slot = store.insert(id, &v).unwrap().slot();
            index.insert(&store, slot);
        }
        let slot = store.insert(1, &[0.0, 0.0]).unwrap().slot();
        index.insert(&store, slot);

        assert_eq!(index.len(), 2);
        assert_eq!(index.by_norm.len(), 2);
        let hits = index.nearest(&store, &[0.0, 0.0], 1);
        assert_eq!(hits, vec![Neighbor::new(1, 0.0)]);
    }
}
