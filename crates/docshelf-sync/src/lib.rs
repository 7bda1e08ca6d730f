//! docshelf-sync
//!
//! Reconciliation worker keeping the metadata store, the lexical index,
//! and the vector store consistent with the on-disk library. Change
//! events arrive on an mpsc channel (from an external watcher adapter or
//! the built-in polling scanner), settle in a per-path debounce map, and
//! are applied by at most one in-flight task per path.

pub mod scanner;
pub mod worker;

pub use scanner::PollScanner;
pub use worker::Synchronizer;
