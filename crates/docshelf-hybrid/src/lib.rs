//! docshelf-hybrid
//!
//! Merges lexical and vector search results into one ranked list:
//! over-fetch both indices, min-max normalize each candidate set on its
//! own scale, then combine with configurable weights. A document found by
//! only one index scores its normalized value alone; missing an embedding
//! is never a penalty.

pub mod ranker;

pub use ranker::{HybridRanker, RankedDoc};
