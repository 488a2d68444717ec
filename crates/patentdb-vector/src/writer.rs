use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::{connect, Connection};
use tracing::{debug, info};

use patentdb_core::error::{Error, Result};
use patentdb_core::types::Chunk;

use crate::schema::{build_arrow_schema, CHUNKS_TABLE};

const INSERT_BATCH_SIZE: usize = 1000;

/// Handle over the lance database holding the chunk table.
pub struct DenseIndex {
    pub(crate) db: Connection,
    pub(crate) table_name: String,
    pub(crate) dim: usize,
}

impl DenseIndex {
    pub async fn open(db_path: &Path, dim: usize) -> Result<Self> {
        let db = connect(db_path.to_string_lossy().as_ref())
            .execute()
            .await
            .map_err(Error::op)?;
        Ok(Self {
            db,
            table_name: CHUNKS_TABLE.to_string(),
            dim,
        })
    }

    /// Append chunks with their embeddings. Vectors must already be
    /// L2-normalized and match the index dimension.
    pub async fn add_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.is_empty() {
            debug!("no chunks to index");
            return Ok(());
        }
        if chunks.len() != embeddings.len() {
            return Err(Error::Operation(format!(
                "chunks and embeddings length mismatch: {} vs {}",
                chunks.len(),
                embeddings.len()
            )));
        }
        for e in embeddings {
            if e.len() != self.dim {
                return Err(Error::Configuration(format!(
                    "embedding dimension mismatch: got {}, index expects {}",
                    e.len(),
                    self.dim
                )));
            }
        }

        let pb = ProgressBar::new(chunks.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")
                .map_err(Error::op)?
                .progress_chars("#>-"),
        );

        let mut written = 0usize;
        for (chunk_slice, emb_slice) in chunks
            .chunks(INSERT_BATCH_SIZE)
            .zip(embeddings.chunks(INSERT_BATCH_SIZE))
        {
            let batch = self.to_record_batch(chunk_slice, emb_slice)?;
            self.insert_batch(batch).await?;
            written += chunk_slice.len();
            pb.set_position(written as u64);
        }
        pb.finish_and_clear();
        info!(chunks = written, table = %self.table_name, "dense index write complete");
        Ok(())
    }

    async fn insert_batch(&self, batch: RecordBatch) -> Result<()> {
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let names = self.db.table_names().execute().await.map_err(Error::op)?;
        if names.contains(&self.table_name) {
            let table = self
                .db
                .open_table(&self.table_name)
                .execute()
                .await
                .map_err(Error::op)?;
            table.add(reader).execute().await.map_err(Error::op)?;
        } else {
            self.db
                .create_table(&self.table_name, reader)
                .execute()
                .await
                .map_err(Error::op)?;
        }
        Ok(())
    }

    fn to_record_batch(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
        let schema = build_arrow_schema(self.dim);
        let mut ids = Vec::with_capacity(chunks.len());
        let mut texts = Vec::with_capacity(chunks.len());
        let mut sections = Vec::with_capacity(chunks.len());
        let mut pages: Vec<Option<i32>> = Vec::with_capacity(chunks.len());
        let mut metadata = Vec::with_capacity(chunks.len());
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            ids.push(chunk.id.clone());
            texts.push(chunk.text.clone());
            sections.push(chunk.source_section.clone());
            pages.push(chunk.page.map(|p| p as i32));
            metadata.push(serde_json::to_string(&chunk.metadata).map_err(Error::op)?);
            vectors.push(Some(embedding.iter().map(|&x| Some(x)).collect()));
        }
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(sections)),
                Arc::new(Int32Array::from(pages)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(vectors.into_iter(), self.dim as i32)),
            ],
        )
        .map_err(Error::op)
    }

    pub(crate) async fn table_exists(&self) -> Result<bool> {
        let names = self.db.table_names().execute().await.map_err(Error::op)?;
        Ok(names.contains(&self.table_name))
    }
}
