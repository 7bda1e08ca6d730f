use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use docshelf_core::config::VectorConfig;
use docshelf_core::error::{Error, Result};
use docshelf_core::traits::VectorIndexer;
use docshelf_core::types::{DocId, Metric, SearchHit, SourceKind};

use crate::ann::{distance, dot, IvfIndex};

struct Inner {
    dim: Option<usize>,
    entries: BTreeMap<u64, Vec<f32>>,
    ann: Option<IvfIndex>,
    ann_dirty: bool,
}

/// Embedding store. Dimensionality is fixed by the first successful
/// insert; the metric is fixed at construction. Only the synchronizer
/// writes; queries take the read side of the lock.
pub struct VectorStore {
    metric: Metric,
    exact_threshold: usize,
    nprobe: usize,
    snapshot_path: Option<PathBuf>,
    inner: RwLock<Inner>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    metric: Metric,
    dim: Option<usize>,
    entries: Vec<(u64, Vec<f32>)>,
}

impl VectorStore {
    /// Ephemeral store, mostly for tests and tooling.
    pub fn new(config: &VectorConfig) -> Self {
        Self {
            metric: config.metric,
            exact_threshold: config.exact_threshold,
            nprobe: config.nprobe,
            snapshot_path: None,
            inner: RwLock::new(Inner {
                dim: None,
                entries: BTreeMap::new(),
                ann: None,
                ann_dirty: false,
            }),
        }
    }

    /// Durable store backed by a snapshot file, loaded if present. The
    /// persisted metric must match the configured one.
    pub fn open(snapshot_path: &Path, config: &VectorConfig) -> Result<Self> {
        let mut store = Self::new(config);
        store.snapshot_path = Some(snapshot_path.to_path_buf());
        if snapshot_path.exists() {
            let raw = fs::read(snapshot_path).map_err(Error::storage)?;
            let snapshot: Snapshot = serde_json::from_slice(&raw).map_err(Error::storage)?;
            if snapshot.metric != config.metric {
                return Err(Error::InvalidConfig(format!(
                    "vector snapshot uses metric {:?}, config asks for {:?}",
                    snapshot.metric, config.metric
                )));
            }
            let inner = store
                .inner
                .get_mut()
                .map_err(|_| Error::Storage("vector store lock poisoned".into()))?;
            inner.dim = snapshot.dim;
            inner.entries = snapshot.entries.into_iter().collect();
            inner.ann_dirty = true;
            debug!(
                entries = inner.entries.len(),
                path = %snapshot_path.display(),
                "loaded vector snapshot"
            );
        }
        Ok(store)
    }

    pub fn dim(&self) -> Option<usize> {
        self.read().ok().and_then(|inner| inner.dim)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| Error::Storage("vector store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| Error::Storage("vector store lock poisoned".into()))
    }

    /// Cosine entries are stored L2-normalized so similarity is a plain
    /// dot product. Zero-magnitude vectors stay as-is and score 0.
    fn prepare(&self, vector: &[f32]) -> Vec<f32> {
        match self.metric {
            Metric::Cosine => {
                let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    vector.iter().map(|x| x / norm).collect()
                } else {
                    vector.to_vec()
                }
            }
            Metric::L2 => vector.to_vec(),
        }
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            Metric::Cosine => dot(a, b),
            Metric::L2 => -distance(Metric::L2, a, b).sqrt(),
        }
    }

    fn persist(&self, inner: &Inner) -> Result<()> {
        let Some(path) = &self.snapshot_path else { return Ok(()) };
        let snapshot = Snapshot {
            metric: self.metric,
            dim: inner.dim,
            entries: inner.entries.iter().map(|(id, v)| (*id, v.clone())).collect(),
        };
        let bytes = serde_json::to_vec(&snapshot).map_err(Error::storage)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(Error::storage)?;
        fs::rename(&tmp, path).map_err(Error::storage)?;
        Ok(())
    }

    fn check_dim(dim: Option<usize>, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::InvalidConfig("embedding vector must not be empty".into()));
        }
        match dim {
            Some(expected) if expected != vector.len() => {
                Err(Error::DimensionMismatch { expected, actual: vector.len() })
            }
            _ => Ok(()),
        }
    }
}

impl VectorIndexer for VectorStore {
    fn insert(&self, id: DocId, vector: &[f32]) -> Result<()> {
        let mut inner = self.write()?;
        // Reject before touching anything; a failed insert never mutates.
        Self::check_dim(inner.dim, vector)?;
        if inner.dim.is_none() {
            inner.dim = Some(vector.len());
        }
        inner.entries.insert(id.as_u64(), self.prepare(vector));
        inner.ann_dirty = true;
        self.persist(&inner)?;
        debug!(%id, "vector inserted");
        Ok(())
    }

    fn delete(&self, id: DocId) -> Result<()> {
        let mut inner = self.write()?;
        if inner.entries.remove(&id.as_u64()).is_some() {
            inner.ann_dirty = true;
            self.persist(&inner)?;
            debug!(%id, "vector deleted");
        }
        Ok(())
    }

    /// Top-k by similarity, ties broken by smaller id. Exact brute force
    /// below the threshold; coarse IVF probing above it.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        {
            let inner = self.read()?;
            if inner.entries.is_empty() {
                return Ok(Vec::new());
            }
            Self::check_dim(inner.dim, query)?;
        }
        // Rebuild the coarse index outside the read path if it is stale.
        {
            let needs_rebuild = {
                let inner = self.read()?;
                inner.entries.len() >= self.exact_threshold
                    && (inner.ann.is_none() || inner.ann_dirty)
            };
            if needs_rebuild {
                let mut inner = self.write()?;
                if inner.entries.len() >= self.exact_threshold
                    && (inner.ann.is_none() || inner.ann_dirty)
                {
                    inner.ann = Some(IvfIndex::build(&inner.entries, self.metric));
                    inner.ann_dirty = false;
                }
            }
        }

        let inner = self.read()?;
        let prepared = self.prepare(query);
        let mut hits: Vec<SearchHit> = if inner.entries.len() < self.exact_threshold {
            inner
                .entries
                .iter()
                .map(|(id, v)| SearchHit {
                    id: DocId(*id),
                    score: self.similarity(&prepared, v),
                    source: SourceKind::Vector,
                })
                .collect()
        } else {
            let candidates = match &inner.ann {
                Some(ann) => ann.probe(&prepared, self.nprobe),
                None => inner.entries.keys().copied().collect(),
            };
            candidates
                .into_iter()
                .filter_map(|id| {
                    inner.entries.get(&id).map(|v| SearchHit {
                        id: DocId(id),
                        score: self.similarity(&prepared, v),
                        source: SourceKind::Vector,
                    })
                })
                .collect()
        };
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }
}
