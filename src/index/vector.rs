//! HNSW vector index over chunk embeddings (usearch)

use crate::error::{OracleError, Result};
use std::path::Path;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// Graph construction parameters. Must be identical across save and load;
/// they are tuned to the registered 384-dim cosine-space embedding model.
#[derive(Debug, Clone)]
pub struct VectorIndexParams {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl Default for VectorIndexParams {
    fn default() -> Self {
        Self {
            dimensions: 384,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
        }
    }
}

impl VectorIndexParams {
    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
            ..Default::default()
        }
    }
}

/// One nearest-neighbor hit. `distance` is cosine distance; callers map it
/// to similarity as `1 - distance`.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub key: u64,
    pub distance: f32,
}

/// Approximate nearest-neighbor index keyed by chunk id.
pub struct VectorIndex {
    index: Index,
    params: VectorIndexParams,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Create an empty index with the given parameters.
    pub fn new(params: VectorIndexParams) -> Result<Self> {
        let index = Index::new(&params.options())
            .map_err(|e| OracleError::Config(format!("Failed to create vector index: {e}")))?;
        Ok(Self { index, params })
    }

    /// Load the persisted graph. `NotFound` for a missing file, `Corrupt`
    /// when the file cannot be restored or its parameters disagree with
    /// `params`; both are answered by the orchestrator with a rebuild.
    pub fn load(path: &Path, params: VectorIndexParams) -> Result<Self> {
        if !path.exists() {
            return Err(OracleError::NotFound(format!(
                "vector index at {}",
                path.display()
            )));
        }

        let index = Index::new(&params.options())
            .map_err(|e| OracleError::Config(format!("Failed to create vector index: {e}")))?;
        let path_str = path
            .to_str()
            .ok_or_else(|| OracleError::InvalidInput(format!("Non-UTF8 path: {path:?}")))?;
        index
            .load(path_str)
            .map_err(|e| OracleError::Corrupt(format!("vector index: {e}")))?;

        if index.dimensions() != params.dimensions {
            return Err(OracleError::Corrupt(format!(
                "vector index dimension mismatch: file has {}, expected {}",
                index.dimensions(),
                params.dimensions
            )));
        }

        Ok(Self { index, params })
    }

    /// Grow reserved capacity to hold at least `additional` more vectors.
    pub fn reserve(&self, additional: usize) -> Result<()> {
        let needed = self.index.size() + additional;
        if needed > self.index.capacity() {
            self.index
                .reserve(needed)
                .map_err(|e| OracleError::Config(format!("Vector index reserve failed: {e}")))?;
        }
        Ok(())
    }

    /// Insert one embedding under a chunk id.
    pub fn add(&self, key: u64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.params.dimensions {
            return Err(OracleError::InvalidInput(format!(
                "Vector dimension mismatch: expected {}, got {}",
                self.params.dimensions,
                vector.len()
            )));
        }
        self.reserve(1)?;
        self.index
            .add(key, vector)
            .map_err(|e| OracleError::InternalInvariant(format!("Vector insert failed: {e}")))?;
        Ok(())
    }

    /// The k nearest keys, ascending by cosine distance. An empty query
    /// vector or `k == 0` yields nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if query.is_empty() || k == 0 || self.index.size() == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.params.dimensions {
            return Err(OracleError::InvalidInput(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.params.dimensions,
                query.len()
            )));
        }

        let matches = self
            .index
            .search(query, k)
            .map_err(|e| OracleError::InternalInvariant(format!("Vector search failed: {e}")))?;

        Ok(matches
            .keys
            .into_iter()
            .zip(matches.distances)
            .map(|(key, distance)| VectorHit { key, distance })
            .collect())
    }

    /// Persist the graph atomically (write then rename), in the library's
    /// native binary format.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OracleError::io(e, format!("Failed to create index directory {parent:?}"))
            })?;
        }

        let tmp = path.with_extension("tmp");
        let tmp_str = tmp
            .to_str()
            .ok_or_else(|| OracleError::InvalidInput(format!("Non-UTF8 path: {tmp:?}")))?;
        self.index
            .save(tmp_str)
            .map_err(|e| OracleError::io(std::io::Error::other(e.to_string()), "Vector index save"))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| OracleError::io(e, format!("Failed to move vector index to {path:?}")))?;
        Ok(())
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.params.dimensions
    }
}
