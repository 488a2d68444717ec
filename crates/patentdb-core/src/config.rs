//! Configuration loader and typed retrieval options.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env
//! vars, then extracts the explicit [`RetrievalConfig`] struct. Provides
//! helpers to expand `~` and `${VAR}` and to resolve relative paths against
//! a known base directory.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Query expansion behavior for the dense leg of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionMode {
    /// Embed the raw query as-is.
    None,
    /// Embed one hypothetical document in place of the raw query.
    Single,
    /// Fuse the raw query with every hypothetical document (raw weighted
    /// higher).
    Multiple,
}

/// Every recognized retrieval option, with defaults matching the shipped
/// models. Unknown keys in the config file are rejected by serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Embedding model identifier recorded in the manifest.
    pub embedding_model: String,
    pub embedding_dim: usize,
    /// Token budget per input; longer texts keep their first tokens.
    pub max_seq_len: usize,
    pub embed_batch_size: usize,
    pub rerank_batch_size: usize,
    /// RRF smoothing constant.
    pub rrf_k: u32,
    pub expansion_mode: ExpansionMode,
    /// Candidates retrieved from each index before fusion. 0 means
    /// auto: `min(top_k * 4, 50)`. Hard-capped at 100.
    pub top_n_per_source: usize,
    /// Fused candidates handed to the cross-encoder.
    pub rerank_top_m: usize,
    pub final_top_k: usize,
    pub index_dir: String,
    pub model_dir: String,
    pub reranker_dir: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_model: "BAAI/bge-base-en-v1.5".to_string(),
            embedding_dim: 768,
            max_seq_len: 512,
            embed_batch_size: 32,
            rerank_batch_size: 16,
            rrf_k: 60,
            expansion_mode: ExpansionMode::Single,
            top_n_per_source: 0,
            rerank_top_m: 20,
            final_top_k: 5,
            index_dir: "./data/index".to_string(),
            model_dir: "./models/bge-base-en-v1.5".to_string(),
            reranker_dir: "./models/ms-marco-minilm-l6-v2".to_string(),
        }
    }
}

impl RetrievalConfig {
    /// Effective pre-fusion pool size for a given `top_k`.
    pub fn effective_top_n(&self, top_k: usize) -> usize {
        if self.top_n_per_source == 0 {
            (top_k * 4).clamp(1, 50)
        } else {
            self.top_n_per_source.min(100)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(Error::Configuration("embedding_dim must be non-zero".into()));
        }
        if self.embed_batch_size == 0 || self.rerank_batch_size == 0 {
            return Err(Error::Configuration("batch sizes must be non-zero".into()));
        }
        if self.final_top_k == 0 {
            return Err(Error::Configuration("final_top_k must be non-zero".into()));
        }
        Ok(())
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Configuration(format!("failed to get '{key}': {e}")))
    }

    /// Extract the `[retrieval]` table, falling back to defaults when the
    /// table is absent entirely.
    pub fn retrieval(&self) -> Result<RetrievalConfig> {
        let cfg: RetrievalConfig = if self.figment.find_value("retrieval").is_ok() {
            self.figment
                .extract_inner("retrieval")
                .map_err(|e| Error::Configuration(format!("[retrieval]: {e}")))?
        } else {
            RetrievalConfig::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after
/// expansion. If `p` is absolute, it's returned as-is.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}
