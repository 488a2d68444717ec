//! Reciprocal Rank Fusion: fused = Σ weight · 1/(k + rank).
//!
//! Rank-based, so the dense cosine scale and the sparse BM25 scale never
//! need to be comparable. A candidate absent from a source list simply
//! contributes nothing from that source.

use std::collections::HashMap;

use patentdb_core::types::{ChunkId, SearchHit, SourceKind};

/// A candidate after fusion, carrying the per-source raw scores as
/// diagnostics.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub id: ChunkId,
    pub rrf_score: f32,
    pub dense_score: Option<f32>,
    pub sparse_score: Option<f32>,
}

/// Fuse weighted ranked lists. `k` is the smoothing constant (default 60);
/// higher k flattens the head of every list. Ranks are 1-indexed. Exact
/// fused-score ties keep first-seen order (iteration order of `lists`), so
/// the result is stable.
pub fn fuse(lists: &[(Vec<SearchHit>, f32)], k: u32) -> Vec<FusedCandidate> {
    struct Acc {
        rrf: f64,
        dense: Option<f32>,
        sparse: Option<f32>,
        first_seen: usize,
    }

    let mut by_id: HashMap<ChunkId, Acc> = HashMap::new();
    let mut order = 0usize;
    for (hits, weight) in lists {
        for (rank0, hit) in hits.iter().enumerate() {
            let contribution = f64::from(*weight) / (f64::from(k) + rank0 as f64 + 1.0);
            let entry = by_id.entry(hit.id.clone()).or_insert_with(|| {
                order += 1;
                Acc {
                    rrf: 0.0,
                    dense: None,
                    sparse: None,
                    first_seen: order,
                }
            });
            entry.rrf += contribution;
            // Keep the best raw score per source across query variants.
            match hit.source {
                SourceKind::Dense => {
                    entry.dense = Some(entry.dense.map_or(hit.score, |s| s.max(hit.score)));
                }
                SourceKind::Sparse => {
                    entry.sparse = Some(entry.sparse.map_or(hit.score, |s| s.max(hit.score)));
                }
            }
        }
    }

    let mut fused: Vec<(Acc, ChunkId)> = by_id.into_iter().map(|(id, acc)| (acc, id)).collect();
    fused.sort_by(|a, b| {
        b.0.rrf
            .partial_cmp(&a.0.rrf)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.first_seen.cmp(&b.0.first_seen))
    });
    fused
        .into_iter()
        .map(|(acc, id)| FusedCandidate {
            id,
            rrf_score: acc.rrf as f32,
            dense_score: acc.dense,
            sparse_score: acc.sparse,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32, source: SourceKind) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            score,
            source,
        }
    }

    #[test]
    fn top_of_both_lists_beats_top_of_one() {
        let dense = vec![
            hit("both", 0.9, SourceKind::Dense),
            hit("dense_only", 0.8, SourceKind::Dense),
        ];
        let sparse = vec![
            hit("both", 12.0, SourceKind::Sparse),
            hit("sparse_only", 11.0, SourceKind::Sparse),
        ];
        let fused = fuse(&[(dense, 1.0), (sparse, 1.0)], 60);
        assert_eq!(fused[0].id, "both");
        let both = fused[0].rrf_score;
        for cand in &fused[1..] {
            assert!(
                both >= cand.rrf_score,
                "rank-1-in-both dominates rank-1-in-one"
            );
        }
        assert!(fused[0].dense_score.is_some() && fused[0].sparse_score.is_some());
    }

    #[test]
    fn absent_source_contributes_zero() {
        let dense = vec![hit("a", 0.5, SourceKind::Dense)];
        let fused = fuse(&[(dense, 1.0), (vec![], 1.0)], 60);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].rrf_score - 1.0 / 61.0).abs() < 1e-6);
        assert!(fused[0].sparse_score.is_none());
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let list_a = vec![hit("first", 0.9, SourceKind::Dense)];
        let list_b = vec![hit("second", 0.9, SourceKind::Dense)];
        let fused = fuse(&[(list_a, 1.0), (list_b, 1.0)], 60);
        assert_eq!(fused[0].id, "first");
        assert_eq!(fused[1].id, "second");
    }

    #[test]
    fn variant_weight_scales_contribution() {
        let raw = vec![hit("a", 0.9, SourceKind::Dense)];
        let hypo = vec![hit("b", 0.9, SourceKind::Dense)];
        let fused = fuse(&[(raw, 1.0), (hypo, 0.5)], 60);
        assert_eq!(fused[0].id, "a");
        assert!((fused[1].rrf_score - 0.5 / 61.0).abs() < 1e-6);
    }
}
