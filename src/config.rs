use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FeatherError, Result};

/// Which nearest-neighbor strategy backs `search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact top-k over a norm-ordered scan.
    #[default]
    Flat,
    /// Approximate, seeded HNSW graph.
    Hnsw,
}

/// What `add` does when the id is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Overwrite,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswParams {
    /// Links per node on the upper layers (layer 0 keeps 2 * m)
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Level assignment RNG seed
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 100,
            ef_search: 64,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub index: IndexKind,
    pub duplicates: DuplicatePolicy,
    pub hnsw: HnswParams,
    /// true = fsync the image before the rename, false = OS buffer (faster)
    pub sync_on_save: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            index: IndexKind::Flat,
            duplicates: DuplicatePolicy::Overwrite,
            hnsw: HnswParams::default(),
            sync_on_save: true,
        }
    }
}

impl Options {
    pub fn with_index(mut self, index: IndexKind) -> Self {
        self.index = index;
        self
    }

    pub fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn with_hnsw(mut self, hnsw: HnswParams) -> Self {
        self.hnsw = hnsw;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.hnsw.seed = seed;
        self
    }

    pub fn with_sync_on_save(mut self, sync: bool) -> Self {
        self.sync_on_save = sync;
        self
    }

    /// Reads options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let options: Options =
            serde_json::from_str(&text).map_err(|e| FeatherError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hnsw.m < 2 {
            return Err(FeatherError::Config("hnsw.m must be at least 2".into()));
        }
        if self.hnsw.ef_construction == 0 || self.hnsw.ef_search == 0 {
            return Err(FeatherError::Config("hnsw ef values must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_exact_and_durable() {
        let options = Options::default();
        assert_eq!(options.index, IndexKind::Flat);
        assert_eq!(options.duplicates, DuplicatePolicy::Overwrite);
        assert!(options.sync_on_save);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let options: Options =
            serde_json::from_str(r#"{ "index": "hnsw", "hnsw": { "seed": 7 } }"#).unwrap();
        assert_eq!(options.index, IndexKind::Hnsw);
        assert_eq!(options.hnsw.seed, 7);
        assert_eq!(options.hnsw.m, 16);
        assert_eq!(options.duplicates, DuplicatePolicy::Overwrite);
    }

    #[test]
    fn test_from_json_file_rejects_bad_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{ "hnsw": { "m": 1 } }"#).unwrap();
        assert!(matches!(Options::from_json_file(&path), Err(FeatherError::Config(_))));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Options::from_json_file(&path), Err(FeatherError::Config(_))));
    }
}
