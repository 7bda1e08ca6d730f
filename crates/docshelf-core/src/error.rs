use thiserror::Error;

/// Failure taxonomy shared by all docshelf crates.
///
/// Lookups for unknown ids are not failures; store APIs return `Option`
/// for those. `Storage` and `Lexical` are fatal to the affected operation
/// and always surfaced to the caller. `DimensionMismatch` and `Extraction`
/// halt processing of a single document, never the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("lexical index failure: {0}")]
    Lexical(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("extraction failed for {path}: {reason}")]
    Extraction { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }

    pub fn lexical(err: impl std::fmt::Display) -> Self {
        Error::Lexical(err.to_string())
    }

    pub fn extraction(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Error::Extraction { path: path.to_string(), reason: reason.to_string() }
    }
}
