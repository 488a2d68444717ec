//! Persisted build metadata — the single source of truth for compatibility.
//!
//! The manifest is written atomically (temp file, then rename) as the last
//! step of a successful build, so a crash mid-build can never leave a
//! half-written manifest observable as valid. Loading checks the recorded
//! model identity and dimension against the live embedder; a dimension
//! mismatch is fatal, never silently truncated.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use patentdb_core::error::{Error, Result};
use patentdb_core::traits::Embedder;
use patentdb_core::types::Chunk;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    /// The embedder's stable id (model identity + dimension), not the bare
    /// model name, so provider swaps are caught too.
    pub model_name: String,
    pub embedding_dim: usize,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
    pub corpus_fingerprint: String,
    /// Directory (relative to the index root) holding this build's
    /// artifacts.
    pub generation: String,
}

impl IndexManifest {
    pub fn path(index_dir: &Path) -> PathBuf {
        index_dir.join(MANIFEST_FILE)
    }

    /// Read the manifest if one exists. Absence is a normal "not built"
    /// state, not an error.
    pub fn load(index_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(index_dir);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(Error::op)?;
        let manifest = serde_json::from_str(&text)
            .map_err(|e| Error::Configuration(format!("corrupt manifest {}: {e}", path.display())))?;
        Ok(Some(manifest))
    }

    /// Atomic write: serialize to a temp file in the same directory, then
    /// rename over the final path.
    pub fn store(&self, index_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(index_dir).map_err(Error::op)?;
        let tmp = NamedTempFile::new_in(index_dir).map_err(Error::op)?;
        serde_json::to_writer_pretty(tmp.as_file(), self).map_err(Error::op)?;
        tmp.persist(Self::path(index_dir))
            .map_err(|e| Error::Operation(format!("failed to persist manifest: {e}")))?;
        Ok(())
    }

    /// Reject a loaded index whose embedding model does not match the live
    /// provider.
    pub fn validate_model(&self, embedder: &dyn Embedder) -> Result<()> {
        if self.embedding_dim != embedder.dim() {
            return Err(Error::Configuration(format!(
                "manifest dimension {} does not match embedder dimension {}",
                self.embedding_dim,
                embedder.dim()
            )));
        }
        if self.model_name != embedder.id() {
            return Err(Error::Configuration(format!(
                "manifest model '{}' does not match loaded embedder '{}'",
                self.model_name,
                embedder.id()
            )));
        }
        Ok(())
    }

    pub fn generation_dir(&self, index_dir: &Path) -> PathBuf {
        index_dir.join(&self.generation)
    }
}

/// Order-independent fingerprint of a corpus: blake3 over (id, text) pairs
/// sorted by id. Used for the idempotent-rebuild check.
pub fn corpus_fingerprint(chunks: &[Chunk]) -> String {
    let mut entries: Vec<(&str, &str)> = chunks
        .iter()
        .map(|c| (c.id.as_str(), c.text.as_str()))
        .collect();
    entries.sort_unstable();
    let mut hasher = blake3::Hasher::new();
    for (id, text) in entries {
        hasher.update(id.as_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Fingerprint after an incremental append: hash of the previous fingerprint
/// and the appended chunks, so growth is tracked without rereading the full
/// corpus.
pub fn extend_fingerprint(previous: &str, appended: &[Chunk]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(previous.as_bytes());
    hasher.update(&[0]);
    hasher.update(corpus_fingerprint(appended).as_bytes());
    hasher.finalize().to_hex().to_string()
}
