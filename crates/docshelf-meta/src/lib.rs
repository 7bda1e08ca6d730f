//! docshelf-meta
//!
//! Durable metadata store: the single source of truth for which documents
//! exist, where they live, and how far through the indexing lifecycle they
//! are. SQLite-backed; every write is committed before the call returns.

pub mod store;

pub use store::MetadataStore;
