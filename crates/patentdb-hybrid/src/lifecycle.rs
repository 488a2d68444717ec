//! Index build orchestration and generation-scoped lifecycle.
//!
//! State machine: UNBUILT → BUILDING → READY, with READY → BUILDING on an
//! explicit rebuild and BUILDING → FAILED → UNBUILT on unrecoverable build
//! errors (partial artifacts discarded). Each build writes into a fresh
//! `gen-*` directory and the manifest is the single atomic pointer to the
//! live generation, so queries keep reading the last READY index while a
//! rebuild runs and a crash never corrupts it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use patentdb_core::config::RetrievalConfig;
use patentdb_core::error::{Error, Result};
use patentdb_core::traits::Embedder;
use patentdb_core::types::{Chunk, IndexStatus};
use patentdb_text::SparseIndex;
use patentdb_vector::DenseIndex;

use crate::manifest::{corpus_fingerprint, extend_fingerprint, IndexManifest};

/// Dense rows buffered between embedding batches and a lance write.
const WRITE_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Unbuilt,
    Building,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// A new generation was built and swapped in.
    Built,
    /// The manifest already matches this corpus and model; nothing changed.
    UpToDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Ready,
    NotBuilt,
}

/// Read-only handles over one index generation, shared by reference across
/// concurrent queries.
pub struct LoadedIndex {
    pub manifest: IndexManifest,
    pub dense: DenseIndex,
    /// `None` when the sparse artifacts failed to open; queries degrade to
    /// dense-only ranking.
    pub sparse: Option<SparseIndex>,
}

pub struct LifecycleManager {
    index_dir: PathBuf,
    cfg: RetrievalConfig,
    embedder: Arc<dyn Embedder>,
    /// Serializes builds and appends; a second request fails fast instead of
    /// interleaving.
    build_lock: Mutex<()>,
    state: RwLock<BuildState>,
    current: RwLock<Option<Arc<LoadedIndex>>>,
}

impl LifecycleManager {
    pub fn new(index_dir: PathBuf, cfg: RetrievalConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index_dir,
            cfg,
            embedder,
            build_lock: Mutex::new(()),
            state: RwLock::new(BuildState::Unbuilt),
            current: RwLock::new(None),
        }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn build_state(&self) -> BuildState {
        self.state.read().map(|s| *s).unwrap_or(BuildState::Failed)
    }

    fn set_state(&self, next: BuildState) {
        if let Ok(mut state) = self.state.write() {
            *state = next;
        }
    }

    /// The generation currently serving queries, if any.
    pub fn current(&self) -> Option<Arc<LoadedIndex>> {
        self.current.read().ok().and_then(|c| c.clone())
    }

    fn swap_current(&self, next: Arc<LoadedIndex>) {
        if let Ok(mut current) = self.current.write() {
            *current = Some(next);
        }
    }

    /// Read the manifest, validate model compatibility, and open the live
    /// generation. A missing manifest is a normal `NotBuilt` status for the
    /// caller to surface ("run setup first"), not an error.
    pub async fn load(&self) -> Result<LoadStatus> {
        let Some(manifest) = IndexManifest::load(&self.index_dir)? else {
            return Ok(LoadStatus::NotBuilt);
        };
        manifest.validate_model(self.embedder.as_ref())?;
        let loaded = self.open_generation(manifest).await?;
        self.swap_current(Arc::new(loaded));
        self.set_state(BuildState::Ready);
        Ok(LoadStatus::Ready)
    }

    async fn open_generation(&self, manifest: IndexManifest) -> Result<LoadedIndex> {
        let gen_dir = manifest.generation_dir(&self.index_dir);
        if !gen_dir.exists() {
            return Err(Error::Configuration(format!(
                "manifest points to missing generation {}",
                gen_dir.display()
            )));
        }
        let dense = DenseIndex::open(&gen_dir.join("lancedb"), manifest.embedding_dim).await?;
        let sparse = match SparseIndex::open(&gen_dir.join("tantivy")) {
            Ok(sparse) => Some(sparse),
            Err(e) => {
                warn!(error = %e, "sparse index unavailable, degrading to dense-only ranking");
                None
            }
        };
        Ok(LoadedIndex {
            manifest,
            dense,
            sparse,
        })
    }

    /// Build the index from a full corpus snapshot.
    ///
    /// With `force = false`, a manifest already matching this corpus and
    /// model makes the call a no-op. An empty corpus builds a valid, empty
    /// READY index. Build errors leave the previously READY generation
    /// serving queries.
    pub async fn build(&self, chunks: &[Chunk], force: bool) -> Result<BuildOutcome> {
        let _guard = self
            .build_lock
            .try_lock()
            .map_err(|_| Error::BuildInProgress)?;

        if let Some(bad) = chunks.iter().find(|c| c.text.trim().is_empty()) {
            return Err(Error::Configuration(format!(
                "chunk '{}' has empty text; fix the ingestion output and rebuild",
                bad.id
            )));
        }

        let fingerprint = corpus_fingerprint(chunks);
        if !force {
            // A corrupt manifest must not block the rebuild that replaces it.
            if let Some(existing) = IndexManifest::load(&self.index_dir).ok().flatten() {
                if existing.corpus_fingerprint == fingerprint
                    && existing.validate_model(self.embedder.as_ref()).is_ok()
                {
                    info!("index already matches corpus, skipping build");
                    if self.current().is_none() {
                        self.load().await?;
                    }
                    return Ok(BuildOutcome::UpToDate);
                }
            }
        }

        // Sweep generations left behind by failed or superseded builds.
        // The generation serving queries and the one named by the on-disk
        // manifest both stay: a failed build must leave last-known-good
        // loadable.
        let mut protected: Vec<String> = Vec::new();
        if let Some(current) = self.current() {
            protected.push(current.manifest.generation.clone());
        }
        if let Some(existing) = IndexManifest::load(&self.index_dir).ok().flatten() {
            protected.push(existing.generation);
        }
        self.sweep_stale_generations(&protected);

        self.set_state(BuildState::Building);
        if chunks.is_empty() {
            warn!("building an index over an empty corpus");
        }
        info!(chunks = chunks.len(), "index build started");

        // Unique per attempt so a rebuild of the same corpus never touches
        // the generation it is replacing.
        let generation = generation_name(&fingerprint);
        match self.build_generation(chunks, &fingerprint, &generation).await {
            Ok(manifest) => {
                let loaded = self.open_generation(manifest).await?;
                self.swap_current(Arc::new(loaded));
                self.set_state(BuildState::Ready);
                info!("index build complete");
                Ok(BuildOutcome::Built)
            }
            Err(e) => {
                self.set_state(BuildState::Failed);
                let gen_dir = self.index_dir.join(&generation);
                if gen_dir.exists() {
                    let _ = std::fs::remove_dir_all(&gen_dir);
                }
                // Last-known-good stays live; without one we are back to
                // unbuilt.
                self.set_state(if self.current().is_some() {
                    BuildState::Ready
                } else {
                    BuildState::Unbuilt
                });
                Err(e)
            }
        }
    }

    async fn build_generation(
        &self,
        chunks: &[Chunk],
        fingerprint: &str,
        generation: &str,
    ) -> Result<IndexManifest> {
        let gen_dir = self.index_dir.join(generation);
        if gen_dir.exists() {
            std::fs::remove_dir_all(&gen_dir).map_err(Error::op)?;
        }
        std::fs::create_dir_all(&gen_dir).map_err(Error::op)?;

        let sparse = SparseIndex::create(&gen_dir.join("tantivy"))?;
        let lance_dir = gen_dir.join("lancedb");
        std::fs::create_dir_all(&lance_dir).map_err(Error::op)?;
        let dense = DenseIndex::open(&lance_dir, self.cfg.embedding_dim).await?;

        self.embed_into(&dense, chunks).await?;
        sparse.add_chunks(chunks)?;
        dense.ensure_ann_index().await?;

        let manifest = IndexManifest {
            model_name: self.embedder.id().to_string(),
            embedding_dim: self.cfg.embedding_dim,
            chunk_count: chunks.len(),
            built_at: Utc::now(),
            corpus_fingerprint: fingerprint.to_string(),
            generation: generation.to_string(),
        };
        manifest.store(&self.index_dir)?;
        Ok(manifest)
    }

    /// Embed in model-sized batches and flush to lance in larger groups, so
    /// peak memory holds at most [`WRITE_BATCH_SIZE`] vectors regardless of
    /// corpus size.
    async fn embed_into(&self, dense: &DenseIndex, chunks: &[Chunk]) -> Result<()> {
        let mut pending_chunks: Vec<Chunk> = Vec::with_capacity(WRITE_BATCH_SIZE);
        let mut pending_vectors: Vec<Vec<f32>> = Vec::with_capacity(WRITE_BATCH_SIZE);
        for batch in chunks.chunks(self.cfg.embed_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedder = self.embedder.clone();
            let vectors = tokio::task::spawn_blocking(move || embedder.embed(&texts, false))
                .await
                .map_err(Error::op)??;
            pending_chunks.extend_from_slice(batch);
            pending_vectors.extend(vectors);
            if pending_chunks.len() >= WRITE_BATCH_SIZE {
                dense.add_chunks(&pending_chunks, &pending_vectors).await?;
                pending_chunks.clear();
                pending_vectors.clear();
            }
        }
        if !pending_chunks.is_empty() {
            dense.add_chunks(&pending_chunks, &pending_vectors).await?;
        }
        Ok(())
    }

    /// Incremental growth: embed and add new chunks to the live generation
    /// without a full recompute, then advance the manifest.
    pub async fn append(&self, chunks: &[Chunk]) -> Result<usize> {
        let _guard = self
            .build_lock
            .try_lock()
            .map_err(|_| Error::BuildInProgress)?;
        let loaded = self.current().ok_or_else(|| {
            Error::NotBuilt(format!("no index loaded from {}", self.index_dir.display()))
        })?;
        let Some(sparse) = loaded.sparse.as_ref() else {
            return Err(Error::Configuration(
                "sparse index unavailable; append needs a full rebuild".into(),
            ));
        };
        if chunks.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = chunks.iter().find(|c| c.text.trim().is_empty()) {
            return Err(Error::Configuration(format!(
                "chunk '{}' has empty text; fix the ingestion output and retry",
                bad.id
            )));
        }

        self.embed_into(&loaded.dense, chunks).await?;
        sparse.add_chunks(chunks)?;

        let mut manifest = loaded.manifest.clone();
        manifest.chunk_count += chunks.len();
        manifest.corpus_fingerprint = extend_fingerprint(&manifest.corpus_fingerprint, chunks);
        manifest.built_at = Utc::now();
        manifest.store(&self.index_dir)?;

        let reloaded = self.open_generation(manifest).await?;
        self.swap_current(Arc::new(reloaded));
        info!(appended = chunks.len(), "incremental append complete");
        Ok(chunks.len())
    }

    /// Health snapshot from the live index, falling back to the on-disk
    /// manifest when nothing is loaded yet.
    pub fn status(&self) -> IndexStatus {
        let manifest = self
            .current()
            .map(|c| c.manifest.clone())
            .or_else(|| IndexManifest::load(&self.index_dir).ok().flatten());
        match manifest {
            Some(m) => IndexStatus {
                built: true,
                chunk_count: m.chunk_count,
                model_name: m.model_name,
                embedding_dim: m.embedding_dim,
                built_at: Some(m.built_at.to_rfc3339()),
            },
            None => IndexStatus {
                built: false,
                chunk_count: 0,
                model_name: self.cfg.embedding_model.clone(),
                embedding_dim: self.cfg.embedding_dim,
                built_at: None,
            },
        }
    }

    fn sweep_stale_generations(&self, protected: &[String]) {
        let Ok(entries) = std::fs::read_dir(&self.index_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("gen-") || protected.iter().any(|p| p == &name) {
                continue;
            }
            debug!(generation = %name, "removing stale generation");
            let _ = std::fs::remove_dir_all(entry.path());
        }
    }
}

fn generation_name(fingerprint: &str) -> String {
    format!(
        "gen-{}-{}",
        &fingerprint[..12.min(fingerprint.len())],
        Utc::now().timestamp_millis()
    )
}
