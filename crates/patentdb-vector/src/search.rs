use std::collections::HashMap;

use arrow_array::{Array, Float32Array, Int32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;
use tracing::debug;

use patentdb_core::error::{Error, Result};
use patentdb_core::types::{Chunk, ChunkId, SearchHit, SourceKind};

use crate::writer::DenseIndex;

impl DenseIndex {
    /// Cosine top-k. Returns at most `min(k, rows)` hits ordered by
    /// descending similarity; an empty or missing table yields an empty
    /// list, not an error. `section` applies as a pre-filter.
    pub async fn search_vec(
        &self,
        query_vec: &[f32],
        k: usize,
        section: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 || !self.table_exists().await? {
            return Ok(vec![]);
        }
        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(Error::op)?;
        let mut query = table
            .vector_search(query_vec.to_vec())
            .map_err(Error::op)?
            .distance_type(DistanceType::Cosine)
            .limit(k);
        if let Some(section) = section {
            query = query.only_if(format!("source_section = '{}'", escape(section)));
        }
        let mut stream = query.execute().await.map_err(Error::op)?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::op)? {
            let ids = string_column(&batch, "id")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| Error::Operation("vector search returned no _distance".into()))?;
            for i in 0..batch.num_rows() {
                hits.push(SearchHit {
                    id: ids.value(i).to_string(),
                    // Cosine distance -> similarity in [-1, 1].
                    score: 1.0 - distances.value(i),
                    source: SourceKind::Dense,
                });
            }
        }
        debug!(hits = hits.len(), k, "dense search");
        Ok(hits)
    }

    /// Fetch full chunk records for a candidate set, keyed by id.
    pub async fn get_chunks(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, Chunk>> {
        if ids.is_empty() || !self.table_exists().await? {
            return Ok(HashMap::new());
        }
        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(Error::op)?;
        let id_list = ids
            .iter()
            .map(|id| format!("'{}'", escape(id)))
            .collect::<Vec<_>>()
            .join(",");
        let mut stream = table
            .query()
            .only_if(format!("id IN ({id_list})"))
            .execute()
            .await
            .map_err(Error::op)?;
        let mut out = HashMap::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::op)? {
            for chunk in chunks_from_batch(&batch)? {
                out.insert(chunk.id.clone(), chunk);
            }
        }
        Ok(out)
    }

    /// Every chunk of one source section, ordered by id. Bypasses ranking.
    pub async fn get_by_section(&self, section: &str) -> Result<Vec<Chunk>> {
        if !self.table_exists().await? {
            return Ok(vec![]);
        }
        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(Error::op)?;
        let mut stream = table
            .query()
            .only_if(format!("source_section = '{}'", escape(section)))
            .execute()
            .await
            .map_err(Error::op)?;
        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(Error::op)? {
            out.extend(chunks_from_batch(&batch)?);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    pub async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }
        let table = self
            .db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(Error::op)?;
        table.count_rows(None).await.map_err(Error::op)
    }
}

fn escape(s: &str) -> String {
    s.replace('\'', "''")
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Operation(format!("column '{name}' missing or not utf8")))
}

fn chunks_from_batch(batch: &RecordBatch) -> Result<Vec<Chunk>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let sections = string_column(batch, "source_section")?;
    let pages = batch
        .column_by_name("page")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| Error::Operation("column 'page' missing or not int32".into()))?;
    let metadata = string_column(batch, "metadata")?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let page = if pages.is_null(i) {
            None
        } else {
            Some(pages.value(i) as u32)
        };
        out.push(Chunk {
            id: ids.value(i).to_string(),
            text: texts.value(i).to_string(),
            source_section: sections.value(i).to_string(),
            page,
            metadata: serde_json::from_str(metadata.value(i)).unwrap_or_default(),
        });
    }
    Ok(out)
}
