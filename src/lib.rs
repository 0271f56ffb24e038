//! # feather
//!
//! Embedded, single-file vector database.
//!
//! A [`FeatherDb`] is bound to one path and one dimension for its whole
//! life: `open` loads the image at the path (or starts empty), `add` and
//! `search` work in memory, and nothing reaches disk until `save`.

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod parser;
pub mod storage;
pub mod store;
pub mod vector;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

pub use crate::config::{DuplicatePolicy, HnswParams, IndexKind, Options};
pub use crate::error::{FeatherError, Result};
pub use crate::model::{Neighbor, VectorRecord};

use crate::index::{new_index, VectorIndex};
use crate::store::VectorStore;

/// Store and index change together under one lock.
struct Inner {
    store: VectorStore,
    index: Box<dyn VectorIndex>,
}

pub struct FeatherDb {
    path: PathBuf,
    dim: usize,
    options: Options,
    inner: RwLock<Inner>,
    /// Saves share one staging path, so they run one at a time.
    save_lock: Mutex<()>,
}

impl fmt::Debug for FeatherDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatherDb")
            .field("path", &self.path)
            .field("dim", &self.dim)
            .field("len", &self.len())
            .field("index", &self.options.index)
            .finish()
    }
}

impl FeatherDb {
    pub fn open(path: impl AsRef<Path>, dim: usize) -> Result<Self> {
        Self::open_with(path, dim, Options::default())
    }

    /// Opens the store at `path`, creating an empty one in memory if no
    /// file exists yet. An existing image must have been written with the
    /// same `dim`.
    pub fn open_with(path: impl AsRef<Path>, dim: usize, options: Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if dim == 0 {
            return Err(FeatherError::InvalidDimension);
        }
        options.validate()?;

        let tmp = storage::temp_path(&path);
        if tmp.is_file() {
            warn!(path = ?tmp, "Removing staging file left by an interrupted save");
            if let Err(e) = fs::remove_file(&tmp) {
                warn!(path = ?tmp, error = %e, "Could not remove staging file");
            }
        }

        let store = if path.try_exists()? {
            info!(path = ?path, dim, "Loading store from disk");
            storage::load(&path, dim, options.duplicates)?
        } else {
            info!(path = ?path, dim, "Creating new store");
            VectorStore::with_policy(dim, options.duplicates)?
        };

        let mut index = new_index(&options);
        index.build(&store);
        info!(count = store.len(), index = ?index.kind(), "Store ready");

        Ok(Self {
            path,
            dim,
            options,
            inner: RwLock::new(Inner { store, index }),
            save_lock: Mutex::new(()),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| FeatherError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| FeatherError::LockPoisoned)
    }

    /// Inserts or, under [`DuplicatePolicy::Overwrite`], replaces the vector
    /// for `id`. On error neither the store nor the index has changed.
    pub fn add(&self, id: u64, vector: &[f32]) -> Result<()> {
        let mut guard = self.write()?;
        let Inner { store, index } = &mut *guard;

        let slot = store.insert(id, vector)?.slot();
        index.insert(store, slot);
        debug!(id, slot, "Added vector");
        Ok(())
    }

    /// Adds many records as one unit: every record is validated before the
    /// first one is written. Large batches rebuild the index once instead of
    /// inserting incrementally.
    pub fn add_batch(&self, records: &[VectorRecord]) -> Result<()> {
        let mut guard = self.write()?;
        let Inner { store, index } = &mut *guard;

        let reject = store.duplicate_policy() == DuplicatePolicy::Reject;
        let mut seen = HashSet::with_capacity(if reject { records.len() } else { 0 });
        for record in records {
            store.check_insert(record.id, &record.vector)?;
            if reject && !seen.insert(record.id) {
                return Err(FeatherError::DuplicateId(record.id));
            }
        }

        let rebuild = records.len() > store.len();
        store.reserve(records.len());
        for record in records {
            let slot = store.insert(record.id, &record.vector)?.slot();
            if !rebuild {
                index.insert(store, slot);
            }
        }
        if rebuild {
            index.build(store);
        }
        debug!(count = records.len(), rebuild, "Added batch");
        Ok(())
    }

    /// Up to `k` nearest records, closest first, ties broken by id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let guard = self.read()?;
        let hits = guard.index.query(&guard.store, query, k)?;
        debug!(k, found = hits.len(), "Search complete");
        Ok(hits)
    }

    /// Atomically replaces the image at the bound path with the current
    /// contents. Readers may run alongside; `add` waits.
    pub fn save(&self) -> Result<()> {
        let _saving = self.save_lock.lock().map_err(|_| FeatherError::LockPoisoned)?;
        let guard = self.read()?;
        storage::save(&self.path, &guard.store, self.options.sync_on_save)?;
        info!(path = ?self.path, count = guard.store.len(), "Store saved");
        Ok(())
    }

    pub fn get(&self, id: u64) -> Result<Vec<f32>> {
        let guard = self.read()?;
        guard.store.get(id).map(<[f32]>::to_vec)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.read_recovered().store.contains(id)
    }

    /// Snapshot of every record in insertion order.
    pub fn records(&self) -> Result<Vec<VectorRecord>> {
        let guard = self.read()?;
        Ok(guard
            .store
            .iter()
            .map(|(id, vector)| VectorRecord::new(id, vector.to_vec()))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.read_recovered().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    // Counts and membership stay meaningful even after a panicking writer.
    fn read_recovered(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FeatherDb>();
    }

    #[test]
    fn test_zero_dimension() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FeatherDb::open(dir.path().join("x.feather"), 0),
            Err(FeatherError::InvalidDimension)
        ));
    }

    #[test]
    fn test_open_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazy.feather");
        let db = FeatherDb::open(&path, 2).unwrap();
        db.add(1, &[1.0, 2.0]).unwrap();
        drop(db);
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_staging_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.feather");
        fs::write(storage::temp_path(&path), b"half written").unwrap();

        let db = FeatherDb::open(&path, 2).unwrap();
        assert!(db.is_empty());
        assert!(!storage::temp_path(&path).exists());
    }

    #[test]
    fn test_add_batch_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = FeatherDb::open(dir.path().join("b.feather"), 2).unwrap();
        db.add(1, &[0.0, 0.0]).unwrap();

        let bad = vec![
            VectorRecord::new(2, vec![1.0, 1.0]),
            VectorRecord::new(3, vec![1.0]),
        ];
        assert!(matches!(db.add_batch(&bad), Err(FeatherError::DimensionMismatch { .. })));
        assert_eq!(db.len(), 1);

        let good: Vec<VectorRecord> = (10..20)
            .map(|i| VectorRecord::new(i, vec![i as f32, 0.0]))
            .collect();
        db.add_batch(&good).unwrap();
        assert_eq!(db.len(), 11);
        let hits = db.search(&[12.2, 0.0], 2).unwrap();
        assert_eq!(hits[0].id, 12);
        assert_eq!(hits[1].id, 13);
    }

    #[test]
    fn test_add_batch_reject_duplicates_within_batch() {
        let dir = tempfile::tempdir().unwrap();
        let options = Options::default().with_duplicates(DuplicatePolicy::Reject);
        let db = FeatherDb::open_with(dir.path().join("r.feather"), 1, options).unwrap();

        let batch = vec![VectorRecord::new(5, vec![1.0]), VectorRecord::new(5, vec![2.0])];
        assert!(matches!(db.add_batch(&batch), Err(FeatherError::DuplicateId(5))));
        assert!(db.is_empty());
    }
}
