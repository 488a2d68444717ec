//! The hybrid query pipeline.
//!
//! expand → embed variants → dense + sparse lookups (concurrent,
//! pre-filtered) → RRF fusion → cross-encoder rerank of the fused top-M →
//! final top-k. One failing retrieval leg degrades the query to
//! single-source ranking with a warning; only both legs failing fails the
//! query.

use std::sync::Arc;

use tracing::{debug, warn};

use patentdb_core::config::RetrievalConfig;
use patentdb_core::error::{Error, Result};
use patentdb_core::traits::{Embedder, QueryExpander, Reranker};
use patentdb_core::types::{Chunk, ChunkId, IndexStatus, ScoredChunk, SearchHit};

use crate::expansion::{self, RAW_QUERY_WEIGHT};
use crate::fusion::{self, FusedCandidate};
use crate::lifecycle::{LifecycleManager, LoadedIndex};

pub struct HybridSearchEngine {
    lifecycle: Arc<LifecycleManager>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    expander: Option<Arc<dyn QueryExpander>>,
    cfg: RetrievalConfig,
}

impl HybridSearchEngine {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        expander: Option<Arc<dyn QueryExpander>>,
        cfg: RetrievalConfig,
    ) -> Self {
        Self {
            lifecycle,
            embedder,
            reranker,
            expander,
            cfg,
        }
    }

    /// Ranked retrieval. Returns at most `min(top_k, chunk_count)` results
    /// ordered by non-increasing `relevance_score`; `section` restricts
    /// candidates before fusion so filtering never starves the pool.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        section: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }
        let loaded = self.loaded()?;
        if loaded.manifest.chunk_count == 0 {
            return Ok(vec![]);
        }

        let top_n = self.cfg.effective_top_n(top_k);
        let variants =
            expansion::expand_query(self.expander.as_deref(), self.cfg.expansion_mode, query);
        debug!(variants = variants.len(), top_n, "query variants resolved");

        let texts: Vec<String> = variants.iter().map(|(t, _)| t.clone()).collect();
        let embedder = self.embedder.clone();
        let vectors = tokio::task::spawn_blocking(move || embedder.embed(&texts, true))
            .await
            .map_err(Error::op)??;
        // One query vector for the dense leg: the single variant's embedding,
        // or the weighted average of raw + hypothetical embeddings in
        // `multiple` mode (raw weighted higher), re-normalized.
        let query_vector = weighted_average(&variants, &vectors);

        // Dense and sparse legs are read-only and independent; run them
        // concurrently and synchronize before fusion. The sparse leg always
        // tokenizes the raw query (expansion applies to the dense leg only).
        let dense_leg = async {
            let mut lists: Vec<(Vec<SearchHit>, f32)> = Vec::new();
            let mut failed = false;
            match loaded.dense.search_vec(&query_vector, top_n, section).await {
                Ok(hits) => lists.push((hits, RAW_QUERY_WEIGHT)),
                Err(e) => {
                    warn!(error = %e, "dense search failed, degrading to sparse-only");
                    failed = true;
                }
            }
            (lists, failed)
        };

        let sparse_loaded = loaded.clone();
        let sparse_query = query.to_string();
        let sparse_section = section.map(str::to_string);
        let sparse_leg = tokio::task::spawn_blocking(move || {
            sparse_loaded
                .sparse
                .as_ref()
                .map(|s| s.search(&sparse_query, top_n, sparse_section.as_deref()))
        });

        let ((mut lists, dense_failed), sparse_join) = tokio::join!(dense_leg, sparse_leg);
        if dense_failed {
            lists.clear();
        }
        let mut sparse_failed = false;
        match sparse_join.map_err(Error::op)? {
            Some(Ok(hits)) => lists.push((hits, RAW_QUERY_WEIGHT)),
            Some(Err(e)) => {
                warn!(error = %e, "sparse search failed, degrading to dense-only");
                sparse_failed = true;
            }
            None => sparse_failed = true,
        }
        if lists.is_empty() {
            if dense_failed && sparse_failed {
                return Err(Error::Operation(
                    "both retrieval sources failed; run a full rebuild".into(),
                ));
            }
            return Ok(vec![]);
        }

        let fused = fusion::fuse(&lists, self.cfg.rrf_k);
        let shortlist: Vec<FusedCandidate> = fused
            .into_iter()
            .take(self.cfg.rerank_top_m.max(top_k))
            .collect();
        if shortlist.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<ChunkId> = shortlist.iter().map(|c| c.id.clone()).collect();
        let mut chunk_map = loaded.dense.get_chunks(&ids).await?;
        let candidates: Vec<(FusedCandidate, Chunk)> = shortlist
            .into_iter()
            .filter_map(|cand| match chunk_map.remove(&cand.id) {
                Some(chunk) => Some((cand, chunk)),
                None => {
                    warn!(id = %cand.id, "candidate missing from chunk store, dropping");
                    None
                }
            })
            .collect();

        // Rerank with the original query, not the expanded variants.
        let passages: Vec<String> = candidates.iter().map(|(_, c)| c.text.clone()).collect();
        let reranker = self.reranker.clone();
        let rerank_query = query.to_string();
        let scores = tokio::task::spawn_blocking(move || {
            reranker.score_pairs(&rerank_query, &passages)
        })
        .await
        .map_err(Error::op)?;
        let scores = match scores {
            Ok(scores) => scores,
            Err(e) => {
                warn!(error = %e, "rerank failed, keeping fused ordering");
                candidates.iter().map(|(c, _)| c.rrf_score).collect()
            }
        };

        let mut results: Vec<ScoredChunk> = candidates
            .into_iter()
            .zip(scores)
            .map(|((cand, chunk), relevance_score)| ScoredChunk {
                id: chunk.id,
                text: chunk.text,
                source_section: chunk.source_section,
                page: chunk.page,
                relevance_score,
                rank: 0,
                rrf_score: cand.rrf_score,
                dense_score: cand.dense_score,
                sparse_score: cand.sparse_score,
            })
            .collect();
        // Stable sort: exact score ties keep fused order.
        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }
        Ok(results)
    }

    /// Every chunk of one source section, bypassing ranking.
    pub async fn get_by_section(&self, section: &str) -> Result<Vec<Chunk>> {
        let loaded = self.loaded()?;
        loaded.dense.get_by_section(section).await
    }

    pub fn status(&self) -> IndexStatus {
        self.lifecycle.status()
    }

    fn loaded(&self) -> Result<Arc<LoadedIndex>> {
        self.lifecycle.current().ok_or_else(|| {
            Error::NotBuilt(format!(
                "no index loaded from {}",
                self.lifecycle.index_dir().display()
            ))
        })
    }
}

/// Weighted mean of the variant embeddings, L2-renormalized. With one
/// variant this is that variant's vector unchanged.
fn weighted_average(variants: &[(String, f32)], vectors: &[Vec<f32>]) -> Vec<f32> {
    if vectors.len() == 1 {
        return vectors[0].clone();
    }
    let dim = vectors.first().map(Vec::len).unwrap_or(0);
    let mut acc = vec![0f32; dim];
    for ((_, weight), vector) in variants.iter().zip(vectors.iter()) {
        for (a, v) in acc.iter_mut().zip(vector.iter()) {
            *a += weight * v;
        }
    }
    let norm = acc.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-6 {
        for a in &mut acc {
            *a /= norm;
        }
    }
    acc
}
