//! Domain types shared by the metadata store, both indices, the
//! synchronizer, and the ranker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable 64-bit document identity, derived from the canonical path the
/// first time a document is observed. Survives renames and content
/// changes; all score tie-breaks order by the smaller id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DocId(pub u64);

impl DocId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Persisted per-document lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Pending,
    Indexed,
    Stale,
    Deleting,
    IndexFailed,
}

impl IndexState {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexState::Pending => "pending",
            IndexState::Indexed => "indexed",
            IndexState::Stale => "stale",
            IndexState::Deleting => "deleting",
            IndexState::IndexFailed => "index_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IndexState::Pending),
            "indexed" => Some(IndexState::Indexed),
            "stale" => Some(IndexState::Stale),
            "deleting" => Some(IndexState::Deleting),
            "index_failed" => Some(IndexState::IndexFailed),
            _ => None,
        }
    }
}

/// Observable status of an id, including ids the library has never seen
/// (`Unseen`) and ids on their way out (`Gone`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Unseen,
    Pending,
    Indexed,
    Stale,
    IndexFailed,
    Gone,
}

/// A document in the managed library, as recorded by the metadata store.
///
/// Absence of an embedding is a valid state: the vector index simply has
/// no entry for the id and hybrid ranking scores the lexical side alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub path: PathBuf,
    pub fingerprint: String,
    pub snippet: String,
    pub tags: Vec<String>,
    pub caption: Option<String>,
    pub has_embedding: bool,
    pub state: IndexState,
    pub embedding_failed: bool,
    pub retries: u32,
    pub last_indexed: Option<DateTime<Utc>>,
}

impl Document {
    /// A freshly observed document, pending extraction and indexing.
    pub fn new(id: DocId, path: PathBuf, fingerprint: String) -> Self {
        Self {
            id,
            path,
            fingerprint,
            snippet: String::new(),
            tags: Vec::new(),
            caption: None,
            has_embedding: false,
            state: IndexState::Pending,
            embedding_failed: false,
            retries: 0,
            last_indexed: None,
        }
    }
}

/// A library change observed by a filesystem collaborator or the polling
/// scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl ReconciliationEvent {
    /// The path the event resolves to (the destination for renames).
    pub fn path(&self) -> &Path {
        match self {
            ReconciliationEvent::Created(p)
            | ReconciliationEvent::Modified(p)
            | ReconciliationEvent::Deleted(p) => p,
            ReconciliationEvent::Renamed { to, .. } => to,
        }
    }
}

/// Which index produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Lexical,
    Vector,
}

/// The minimal result surface shared by both indices. `score` is
/// engine-specific; higher is always better.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: DocId,
    pub score: f32,
    pub source: SourceKind,
}

/// Payload delivered by the ingestion/extraction collaborator for one
/// document revision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    pub text: String,
    pub tags: Vec<String>,
    pub caption: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

/// Similarity metric of the vector store, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    L2,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Cosine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_state_round_trips_through_text() {
        for state in [
            IndexState::Pending,
            IndexState::Indexed,
            IndexState::Stale,
            IndexState::Deleting,
            IndexState::IndexFailed,
        ] {
            assert_eq!(IndexState::parse(state.as_str()), Some(state));
        }
        assert_eq!(IndexState::parse("bogus"), None);
    }

    #[test]
    fn doc_id_orders_and_displays() {
        let a = DocId(1);
        let b = DocId(2);
        assert!(a < b);
        assert_eq!(a.to_string(), "0000000000000001");
    }

    #[test]
    fn event_path_picks_rename_destination() {
        let ev = ReconciliationEvent::Renamed {
            from: PathBuf::from("/lib/a.pdf"),
            to: PathBuf::from("/lib/b.pdf"),
        };
        assert_eq!(ev.path(), Path::new("/lib/b.pdf"));
    }
}
