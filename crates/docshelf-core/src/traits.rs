use crate::error::Result;
use crate::types::{DocId, ExtractedContent, SearchHit};
use async_trait::async_trait;
use std::path::Path;

/// The fields a document contributes to the lexical index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexicalFields {
    pub text: String,
    pub tags: Vec<String>,
    pub caption: Option<String>,
    pub path: String,
}

/// Inverted-index seam. Re-indexing an id replaces all prior postings for
/// it atomically; readers observe either the previous or the new state.
pub trait LexicalIndexer: Send + Sync {
    fn index(&self, id: DocId, fields: &LexicalFields) -> Result<()>;
    fn remove(&self, id: DocId) -> Result<()>;
    /// Re-point the stored path for `id` without re-deriving its postings.
    /// Unknown ids are a no-op.
    fn update_path(&self, id: DocId, path: &str) -> Result<()>;
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// Vector-index seam. Dimensionality is fixed by the first successful
/// insert; mismatched vectors are rejected without mutating state.
pub trait VectorIndexer: Send + Sync {
    fn insert(&self, id: DocId, vector: &[f32]) -> Result<()>;
    fn delete(&self, id: DocId) -> Result<()>;
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ingestion/extraction collaborator: turns a library file into text,
/// tags, an optional caption, and an optional embedding. This is the only
/// long-latency dependency of the core, hence async.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedContent>;
}
