#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

//! docshelf-core
//!
//! Shared foundation for the docshelf workspace: configuration loading,
//! the error taxonomy, domain types, content fingerprints, and the traits
//! the indices and the extraction collaborator plug into.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
