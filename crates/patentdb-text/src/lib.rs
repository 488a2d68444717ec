//! Tantivy-based sparse (BM25) indexing and scoring.
//!
//! Term statistics live in the tantivy index; scoring is tantivy's native
//! BM25 (k1=1.2, b=0.75). The same case-folding, punctuation-splitting
//! tokenizer is registered for both build-time and query-time analysis —
//! a mismatch there silently degrades recall, so it is pinned by test.

pub mod index;
pub mod tantivy_utils;

pub use index::SparseIndex;
