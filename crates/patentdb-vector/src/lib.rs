//! Lance-backed dense index and chunk store.
//!
//! One id-addressed table holds each chunk's text, metadata, and its
//! L2-normalized embedding, so the dense index entry and the chunk record
//! stay one-to-one by construction. Cosine top-k runs through lance's
//! vector search; direct lookups bypass ranking entirely.

pub mod index_build;
pub mod schema;
pub mod search;
pub mod writer;

pub use writer::DenseIndex;
