use std::path::Path;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, TantivyDocument, Term};
use tracing::debug;

use patentdb_core::error::{Error, Result};
use patentdb_core::types::{Chunk, SearchHit, SourceKind};

use crate::tantivy_utils::{build_schema, register_tokenizer};

/// Keyword-statistics index over chunk text with BM25 scoring.
pub struct SparseIndex {
    index: Index,
    id_field: tantivy::schema::Field,
    section_field: tantivy::schema::Field,
    text_field: tantivy::schema::Field,
}

impl SparseIndex {
    /// Create a fresh index at `index_dir`, wiping any previous one.
    pub fn create(index_dir: &Path) -> Result<Self> {
        let schema = build_schema();
        if index_dir.exists() {
            std::fs::remove_dir_all(index_dir).map_err(Error::op)?;
        }
        std::fs::create_dir_all(index_dir).map_err(Error::op)?;
        let index = Index::create_in_dir(index_dir, schema).map_err(Error::op)?;
        register_tokenizer(&index);
        Self::from_index(index)
    }

    /// Open an existing index. A missing directory is reported as `NotBuilt`.
    pub fn open(index_dir: &Path) -> Result<Self> {
        if !index_dir.exists() {
            return Err(Error::NotBuilt(format!(
                "no sparse index at {}",
                index_dir.display()
            )));
        }
        let index = Index::open_in_dir(index_dir).map_err(Error::op)?;
        register_tokenizer(&index);
        Self::from_index(index)
    }

    fn from_index(index: Index) -> Result<Self> {
        let schema = index.schema();
        let id_field = schema.get_field("id").map_err(Error::op)?;
        let section_field = schema.get_field("source_section").map_err(Error::op)?;
        let text_field = schema.get_field("text").map_err(Error::op)?;
        Ok(Self {
            index,
            id_field,
            section_field,
            text_field,
        })
    }

    /// Append chunks. Term statistics update on commit; callers batch as
    /// they see fit.
    pub fn add_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut writer = self.index.writer(50_000_000).map_err(Error::op)?;
        for c in chunks {
            let document = doc!(
                self.id_field => c.id.clone(),
                self.section_field => c.source_section.clone(),
                self.text_field => c.text.clone(),
            );
            writer.add_document(document).map_err(Error::op)?;
        }
        writer.commit().map_err(Error::op)?;
        debug!(added = chunks.len(), "sparse index commit");
        Ok(())
    }

    /// BM25 top-k for `query`, optionally restricted to one source section
    /// before scoring. Chunks sharing no query term are absent (callers
    /// treat them as score 0). An empty index yields an empty list.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        section: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let reader = self.index.reader().map_err(Error::op)?;
        let searcher = reader.searcher();

        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let (text_query, _lenient_errors) = parser.parse_query_lenient(query);

        let effective: Box<dyn Query> = match section {
            Some(section) => {
                let term = Term::from_field_text(self.section_field, section);
                let filter = TermQuery::new(term, IndexRecordOption::Basic);
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, text_query),
                    (Occur::Must, Box::new(filter)),
                ]))
            }
            None => text_query,
        };

        let top_docs = searcher
            .search(&effective, &TopDocs::with_limit(k))
            .map_err(Error::op)?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let document: TantivyDocument = searcher.doc(addr).map_err(Error::op)?;
            let id = document
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            hits.push(SearchHit {
                id,
                score,
                source: SourceKind::Sparse,
            });
        }
        Ok(hits)
    }

    pub fn doc_count(&self) -> Result<usize> {
        let reader = self.index.reader().map_err(Error::op)?;
        Ok(reader.searcher().num_docs() as usize)
    }
}
