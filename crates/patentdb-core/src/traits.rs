//! Service traits for the models injected into the retrieval pipeline.
//!
//! One instance of each is constructed at process startup and shared by
//! reference across queries; the traits are object-safe so engines hold
//! `Arc<dyn ...>` handles.

use crate::error::Result;

/// Maps text to fixed-dimension, L2-normalized dense vectors.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g., `local:bge-base:d768`).
    fn id(&self) -> &str;
    /// Embedding dimensionality.
    fn dim(&self) -> usize;
    /// Maximum token length; longer inputs keep their first tokens.
    fn max_len(&self) -> usize;
    /// Embed a batch. `is_query` selects the query-side encoding for
    /// asymmetric models; passage encoding otherwise.
    fn embed(&self, texts: &[String], is_query: bool) -> Result<Vec<Vec<f32>>>;
}

/// Scores (query, passage) pairs jointly for high-precision reordering of a
/// small shortlist. Stateless across pairs; batchable.
pub trait Reranker: Send + Sync {
    fn id(&self) -> &str;
    /// One score per passage, higher is more relevant. Scores are raw model
    /// outputs and may be negative.
    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

/// Generates hypothetical answer passages for a query (HyDE).
///
/// Returns up to `n` generated passages, not including the raw query.
/// Callers treat any error as "skip expansion", never as a query failure.
pub trait QueryExpander: Send + Sync {
    fn expand(&self, query: &str, n: usize) -> Result<Vec<String>>;
}
