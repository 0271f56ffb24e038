use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Dimensionality used by the demo program (128 is efficient for general purpose)
pub const DEMO_DIM: usize = 128;

/// An (identifier, vector) pair as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: u64,
    pub vector: Vec<f32>,
}

impl VectorRecord {
    pub fn new(id: u64, vector: Vec<f32>) -> Self {
        Self { id, vector }
    }
}

/// One entry of a search result. Distance is squared Euclidean.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: u64,
    pub distance: f32,
}

impl Neighbor {
    pub fn new(id: u64, distance: f32) -> Self {
        Self { id, distance }
    }

    /// Total order used for ranking: distance ascending, then id ascending.
    pub fn rank_key(&self) -> (OrderedFloat<f32>, u64) {
        (OrderedFloat(self.distance), self.id)
    }
}

// Equality follows the ranking key so it agrees with Ord, NaN included
impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.rank_key() == other.rank_key()
    }
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_key().cmp(&other.rank_key())
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
