use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use docshelf_core::config::RankConfig;
use docshelf_core::error::Result;
use docshelf_core::traits::{LexicalIndexer, VectorIndexer};
use docshelf_core::types::{DocId, IndexState, SearchHit};
use docshelf_meta::MetadataStore;

/// One hybrid search result, hydrated from the metadata store.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDoc {
    pub id: DocId,
    pub score: f32,
    pub path: PathBuf,
    pub snippet: String,
    pub tags: Vec<String>,
    pub caption: Option<String>,
}

pub struct HybridRanker {
    meta: Arc<MetadataStore>,
    lexical: Arc<dyn LexicalIndexer>,
    vector: Arc<dyn VectorIndexer>,
    config: RankConfig,
}

impl HybridRanker {
    pub fn new(
        meta: Arc<MetadataStore>,
        lexical: Arc<dyn LexicalIndexer>,
        vector: Arc<dyn VectorIndexer>,
        config: RankConfig,
    ) -> Self {
        Self { meta, lexical, vector, config }
    }

    /// Ranked top-k for a text query and an optional query vector.
    ///
    /// Each index is asked for `overfetch * k` candidates so the merged
    /// ordering is not clipped by either one. Final order is combined
    /// score descending, id ascending; documents that failed indexing or
    /// are no longer in the metadata store are dropped.
    pub fn query(
        &self,
        text: &str,
        query_vector: Option<&[f32]>,
        k: usize,
    ) -> Result<Vec<RankedDoc>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let fetch = k.saturating_mul(self.config.overfetch.max(1));

        let lexical_hits = self.lexical.search(text, fetch)?;
        let vector_hits = match query_vector {
            Some(vector) => self.vector.search(vector, fetch)?,
            None => Vec::new(),
        };
        debug!(lexical = lexical_hits.len(), vector = vector_hits.len(), "candidates fetched");

        let lexical_scores = normalize(&lexical_hits);
        let vector_scores = normalize(&vector_hits);

        let mut combined: BTreeMap<DocId, f32> = BTreeMap::new();
        for id in lexical_scores.keys().chain(vector_scores.keys()) {
            if combined.contains_key(id) {
                continue;
            }
            let merged = match (lexical_scores.get(id), vector_scores.get(id)) {
                (Some(l), Some(v)) => self.weighted(*l, *v),
                (Some(l), None) => *l,
                (None, Some(v)) => *v,
                (None, None) => continue,
            };
            combined.insert(*id, merged);
        }

        let mut ranked: Vec<(DocId, f32)> = combined.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0))
        });

        let mut results = Vec::with_capacity(k);
        for (id, score) in ranked {
            if results.len() == k {
                break;
            }
            let Some(doc) = self.meta.get(id)? else {
                continue;
            };
            if matches!(doc.state, IndexState::IndexFailed | IndexState::Deleting) {
                continue;
            }
            results.push(RankedDoc {
                id,
                score,
                path: doc.path,
                snippet: doc.snippet,
                tags: doc.tags,
                caption: doc.caption,
            });
        }
        Ok(results)
    }

    /// Weight-normalized sum for documents present in both sets.
    fn weighted(&self, lexical: f32, vector: f32) -> f32 {
        let wl = self.config.lexical_weight;
        let wv = self.config.vector_weight;
        let denom = wl + wv;
        if denom <= 0.0 {
            return (lexical + vector) / 2.0;
        }
        (wl * lexical + wv * vector) / denom
    }
}

/// Min-max normalize one candidate set onto [0, 1]. A degenerate set
/// (every score identical, including a single hit) maps to 1.0: each of
/// those documents is the best its index had to offer.
fn normalize(hits: &[SearchHit]) -> BTreeMap<DocId, f32> {
    let mut out = BTreeMap::new();
    if hits.is_empty() {
        return out;
    }
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for hit in hits {
        min = min.min(hit.score);
        max = max.max(hit.score);
    }
    let range = max - min;
    for hit in hits {
        let value = if range > 0.0 { (hit.score - min) / range } else { 1.0 };
        out.entry(hit.id).or_insert(value);
    }
    out
}
