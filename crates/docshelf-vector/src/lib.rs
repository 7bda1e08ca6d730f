//! docshelf-vector
//!
//! Fixed-dimension vector store with a metric chosen at construction.
//! Small stores are scanned exactly; once the entry count crosses the
//! configured threshold, queries go through a coarse IVF structure that
//! trades bounded recall for speed. Durable as an atomically-replaced
//! JSON snapshot sharing the document id space with the other stores.

pub mod ann;
pub mod store;

pub use store::VectorStore;
