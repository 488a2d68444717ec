//! Approximate-index management for large corpora.
//!
//! Below [`APPROX_INDEX_THRESHOLD`] rows, lance's flat scan is exact and fast
//! enough; above it an IVF_PQ structure (cosine) is trained behind the same
//! search contract, with partition counts derived from corpus size.

use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::index::Index;
use lancedb::DistanceType;
use tracing::info;

use patentdb_core::error::{Error, Result};

use crate::writer::DenseIndex;

/// Row count past which a trained approximate index pays for itself.
pub const APPROX_INDEX_THRESHOLD: usize = 100_000;

pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
    pub nbits: usize,
}

pub fn compute_ivfpq_params(total_rows: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (total_rows as f64).sqrt() as usize;
    let mut nlist = std::cmp::max(2048, 2 * sqrt_n);
    nlist = std::cmp::min(nlist, 65536);
    // Clamp nlist below the row count for tiny datasets
    if total_rows > 1 {
        nlist = std::cmp::min(nlist, total_rows - 1);
    } else {
        nlist = 1;
    }
    let m = if dim >= 1024 { 32 } else { 16 };
    IvfPqParams { nlist, m, nbits: 8 }
}

impl DenseIndex {
    /// Train an IVF_PQ index when the corpus is large enough to need one.
    /// A no-op below the threshold; searching is unaffected either way.
    pub async fn ensure_ann_index(&self) -> Result<()> {
        let rows = self.count().await?;
        if rows < APPROX_INDEX_THRESHOLD {
            return Ok(());
        }
        let params = compute_ivfpq_params(rows, self.dim);
        info!(
            rows,
            nlist = params.nlist,
            m = params.m,
            "training IVF_PQ index"
        );
        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(Error::op)?;
        table
            .create_index(
                &["vector"],
                Index::IvfPq(
                    IvfPqIndexBuilder::default()
                        .distance_type(DistanceType::Cosine)
                        .num_partitions(params.nlist as u32)
                        .num_sub_vectors(params.m as u32),
                ),
            )
            .execute()
            .await
            .map_err(Error::op)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_scale_with_corpus_size() {
        let small = compute_ivfpq_params(10, 768);
        assert_eq!(small.nlist, 9, "clamped below row count");

        let large = compute_ivfpq_params(10_000_000, 768);
        assert!(large.nlist >= 2048 && large.nlist <= 65536);
        assert_eq!(large.m, 16);
        assert_eq!(compute_ivfpq_params(10_000_000, 1024).m, 32);
    }
}
