//! Nearest-neighbor index strategies.
//!
//! An index never owns vectors: it keeps derived data (norms, graph links)
//! keyed by store slot and reads the vectors back from the [`VectorStore`].

mod flat;
mod hnsw;

use std::collections::BinaryHeap;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;

use crate::config::{IndexKind, Options};
use crate::error::{FeatherError, Result};
use crate::model::Neighbor;
use crate::store::VectorStore;
use crate::vector::{check_dimension, distance};

pub trait VectorIndex: Send + Sync {
    fn kind(&self) -> IndexKind;

    /// Discards current state and indexes every slot of `store`.
    fn build(&mut self, store: &VectorStore);

    /// Admits a new slot or refreshes one whose vector was overwritten.
    /// Slots are handed in increasing order for new records.
    fn insert(&mut self, store: &VectorStore, slot: usize);

    /// Ranked neighbors for a validated query. `k` is already clamped to
    /// `1..=store.len()`.
    fn nearest(&self, store: &VectorStore, query: &[f32], k: usize) -> Vec<Neighbor>;

    /// Number of indexed slots
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn query(&self, store: &VectorStore, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(FeatherError::InvalidK);
        }
        check_dimension(store.dim(), query)?;
        if store.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.nearest(store, query, k.min(store.len())))
    }
}

pub fn new_index(options: &Options) -> Box<dyn VectorIndex> {
    match options.index {
        IndexKind::Flat => Box::new(FlatIndex::new()),
        IndexKind::Hnsw => Box::new(HnswIndex::new(options.hnsw.clone())),
    }
}

/// Exhaustive top-k over every slot of `store`.
pub(crate) fn exact_scan(store: &VectorStore, query: &[f32], k: usize) -> Vec<Neighbor> {
    let mut top = TopK::new(k);
    for (id, vector) in store.iter() {
        top.push(Neighbor::new(id, distance(query, vector)));
    }
    top.into_sorted()
}

/// Bounded max-heap keeping the k best neighbors seen so far.
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<Neighbor>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    pub fn push(&mut self, candidate: Neighbor) {
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Distance of the current k-th neighbor, once k have been collected.
    pub fn worst(&self) -> Option<f32> {
        if self.heap.len() < self.k {
            return None;
        }
        self.heap.peek().map(|n| n.distance)
    }

    pub fn into_sorted(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}
