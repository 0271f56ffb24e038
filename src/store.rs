use std::collections::HashMap;

use crate::config::DuplicatePolicy;
use crate::error::{FeatherError, Result};
use crate::vector::check_dimension;

/// Outcome of a successful [`VectorStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// A new record was appended at this slot.
    New(usize),
    /// An existing record at this slot was overwritten.
    Replaced(usize),
}

impl Inserted {
    pub fn slot(self) -> usize {
        match self {
            Inserted::New(slot) | Inserted::Replaced(slot) => slot,
        }
    }
}

/// Authoritative id -> vector mapping.
///
/// Vectors live in one row-major buffer; slot `i` holds `ids[i]` and
/// `data[i * dim..(i + 1) * dim]`. Slots are assigned in insertion order and
/// never move, so indexes can refer to records by slot.
#[derive(Debug, Clone)]
pub struct VectorStore {
    dim: usize,
    ids: Vec<u64>,
    data: Vec<f32>,
    slots: HashMap<u64, usize>,
    duplicates: DuplicatePolicy,
}

impl VectorStore {
    pub fn new(dim: usize) -> Result<Self> {
        Self::with_policy(dim, DuplicatePolicy::default())
    }

    pub fn with_policy(dim: usize, duplicates: DuplicatePolicy) -> Result<Self> {
        if dim == 0 {
            return Err(FeatherError::InvalidDimension);
        }
        Ok(Self {
            dim,
            ids: Vec::new(),
            data: Vec::new(),
            slots: HashMap::new(),
            duplicates,
        })
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.ids.reserve(additional);
        self.data.reserve(additional * self.dim);
        self.slots.reserve(additional);
    }

    /// Validates the vector against the dimension and duplicate policy
    /// without mutating anything.
    pub fn check_insert(&self, id: u64, vector: &[f32]) -> Result<()> {
        check_dimension(self.dim, vector)?;
        if self.duplicates == DuplicatePolicy::Reject && self.slots.contains_key(&id) {
            return Err(FeatherError::DuplicateId(id));
        }
        Ok(())
    }

    pub fn insert(&mut self, id: u64, vector: &[f32]) -> Result<Inserted> {
        self.check_insert(id, vector)?;

        if let Some(&slot) = self.slots.get(&id) {
            let start = slot * self.dim;
            self.data[start..start + self.dim].copy_from_slice(vector);
            return Ok(Inserted::Replaced(slot));
        }

        let slot = self.ids.len();
        self.ids.push(id);
        self.data.extend_from_slice(vector);
        self.slots.insert(id, slot);
        Ok(Inserted::New(slot))
    }

    pub fn get(&self, id: u64) -> Result<&[f32]> {
        let slot = self.slot_of(id).ok_or(FeatherError::NotFound(id))?;
        Ok(self.vector_at(slot))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn slot_of(&self, id: u64) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    #[inline]
    pub fn vector_at(&self, slot: usize) -> &[f32] {
        let start = slot * self.dim;
        &self.data[start..start + self.dim]
    }

    #[inline]
    pub fn id_at(&self, slot: usize) -> u64 {
        self.ids[slot]
    }

    /// Records in insertion order. Holding the iterator borrows the store,
    /// so no insert can interleave with a pass.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[f32])> + '_ {
        self.ids.iter().copied().zip(self.data.chunks_exact(self.dim))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(VectorStore::new(0), Err(FeatherError::InvalidDimension)));
    }

    #[test]
    fn test_insert_get_and_iterate_in_order() {
        let mut store = VectorStore::new(2).unwrap();
        assert_eq!(store.insert(30, &[1.0, 2.0]).unwrap(), Inserted::New(0));
        assert_eq!(store.insert(10, &[3.0, 4.0]).unwrap(), Inserted::New(1));
        assert_eq!(store.insert(20, &[5.0, 6.0]).unwrap(), Inserted::New(2));

        assert_eq!(store.get(10).unwrap(), &[3.0, 4.0]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.dim(), 2);

        let ids: Vec<u64> = store.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
        // Restartable
        assert_eq!(store.iter().count(), 3);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut store = VectorStore::new(2).unwrap();
        store.insert(1, &[1.0, 1.0]).unwrap();
        store.insert(2, &[2.0, 2.0]).unwrap();
        assert_eq!(store.insert(1, &[9.0, 9.0]).unwrap(), Inserted::Replaced(0));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).unwrap(), &[9.0, 9.0]);
        assert_eq!(store.iter().next().unwrap().0, 1);
    }

    #[test]
    fn test_reject_policy() {
        let mut store = VectorStore::with_policy(2, DuplicatePolicy::Reject).unwrap();
        store.insert(1, &[1.0, 1.0]).unwrap();
        assert!(matches!(store.insert(1, &[2.0, 2.0]), Err(FeatherError::DuplicateId(1))));
        assert_eq!(store.get(1).unwrap(), &[1.0, 1.0]);
    }

    #[test]
    fn test_wrong_length_leaves_store_unchanged() {
        let mut store = VectorStore::new(3).unwrap();
        store.insert(1, &[1.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            store.insert(2, &[1.0, 0.0]),
            Err(FeatherError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(store.insert(1, &[1.0; 4]).is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1).unwrap(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_get_missing() {
        let store = VectorStore::new(2).unwrap();
        assert!(matches!(store.get(7), Err(FeatherError::NotFound(7))));
    }
}
