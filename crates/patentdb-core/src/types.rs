//! Domain types shared by the sparse and dense engines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type ChunkId = String;
pub type Meta = HashMap<String, String>;

/// A normalized unit of retrievable text with stable identity.
///
/// - `id`: unique within a corpus, immutable once assigned
/// - `text`: non-empty passage text; never mutated after creation
///   (replace the chunk, don't edit it, so the indexes stay consistent)
/// - `source_section`: section label (e.g., "MPEP 2173" or a patent id)
/// - `page`: source page when the ingestion collaborator knows it
/// - `metadata`: auxiliary fields (grant date, classification code, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub source_section: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub metadata: Meta,
}

/// Indicates which index produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Dense,
    Sparse,
}

/// The minimal surface returned by both indexes before fusion.
///
/// `score` is engine-specific (cosine similarity for dense, BM25 for
/// sparse) and only comparable within one source; fusion is rank-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

/// A final, reranked query result. Produced fresh per query, never persisted.
///
/// `relevance_score` is the cross-encoder score and defines the ordering;
/// the fused and per-source scores are kept as diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: ChunkId,
    pub text: String,
    pub source_section: String,
    pub page: Option<u32>,
    pub relevance_score: f32,
    pub rank: usize,
    pub rrf_score: f32,
    pub dense_score: Option<f32>,
    pub sparse_score: Option<f32>,
}

/// Health snapshot for the loaded index, surfaced by `status()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub built: bool,
    pub chunk_count: usize,
    pub model_name: String,
    pub embedding_dim: usize,
    pub built_at: Option<String>,
}
