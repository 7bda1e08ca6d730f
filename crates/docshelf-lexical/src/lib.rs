//! docshelf-lexical
//!
//! Tantivy-backed inverted index over document text, tags, and captions.
//! Re-indexing a document is delete-then-add inside one commit, so readers
//! always see a whole document or none of it.

pub mod index;
pub mod tokenizer;

pub use index::LexicalIndex;
