use thiserror::Error;

/// Retrieval error taxonomy.
///
/// Fatal variants carry the missing precondition and the operation that
/// resolves it, so callers can surface actionable messages.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}. Rebuild the index after fixing it")]
    Configuration(String),

    #[error("Index not built: {0}. Run `patentdb-indexer build <chunks.jsonl>` first")]
    NotBuilt(String),

    #[error("A build is already in progress; wait for it to finish before starting another")]
    BuildInProgress,

    #[error("Transient resource failure: {0}")]
    TransientResource(String),

    #[error("Query expansion unavailable: {0}")]
    ExpansionUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap any engine-level error as an `Operation` failure.
    pub fn op<E: std::fmt::Display>(e: E) -> Self {
        Error::Operation(e.to_string())
    }
}
