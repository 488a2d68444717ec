//! Candle-based dense embedding provider.
//!
//! Loads a BGE-style BERT encoder from local files, batches inputs, pools the
//! [CLS] state, and L2-normalizes so inner-product search equals cosine
//! similarity. Queries are encoded with the model's asymmetric `"query: "`
//! prefix; passages take the identical path without it.

pub mod device;
pub mod fake;
pub mod pool;
pub mod tokenize;

pub use fake::FakeEmbedder;
pub use pool::Pooling;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use patentdb_core::config::{expand_path, RetrievalConfig};
use patentdb_core::error::{Error, Result};
use patentdb_core::traits::Embedder;

/// Query-side instruction prefix used by the BGE family.
const QUERY_PREFIX: &str = "query: ";

struct ModelState {
    model: BertModel,
    device: Device,
}

pub struct EmbeddingModel {
    state: RwLock<ModelState>,
    tokenizer: Tokenizer,
    bert_config: BertConfig,
    pooling: Pooling,
    dim: usize,
    max_len: usize,
    batch_size: usize,
    id: String,
    model_dir: PathBuf,
}

impl EmbeddingModel {
    /// Load model files from `model_dir`: `tokenizer.json`, `config.json`,
    /// and `model.safetensors` (or legacy `pytorch_model.bin`).
    pub fn load(model_dir: &Path, cfg: &RetrievalConfig) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            Error::Configuration(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let config_path = model_dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path).map_err(|e| {
            Error::Configuration(format!(
                "failed to read model config {}: {e}",
                config_path.display()
            ))
        })?;
        let bert_config: BertConfig = serde_json::from_str(&config_text)
            .map_err(|e| Error::Configuration(format!("invalid model config: {e}")))?;

        if bert_config.hidden_size != cfg.embedding_dim {
            return Err(Error::Configuration(format!(
                "embedding dimension mismatch: model has {}, config expects {}",
                bert_config.hidden_size, cfg.embedding_dim
            )));
        }

        let device = device::select_device();
        let model = build_model(model_dir, &bert_config, &device)?;
        info!(model = %cfg.embedding_model, dim = cfg.embedding_dim, "embedding model loaded");

        let id = format!("local:{}:d{}", cfg.embedding_model, cfg.embedding_dim);
        Ok(Self {
            state: RwLock::new(ModelState { model, device }),
            tokenizer,
            bert_config,
            pooling: Pooling::Cls,
            dim: cfg.embedding_dim,
            max_len: cfg.max_seq_len,
            batch_size: cfg.embed_batch_size,
            id,
            model_dir: model_dir.to_path_buf(),
        })
    }

    /// Override the pooling strategy for models that are not CLS-pooled.
    pub fn with_pooling(mut self, pooling: Pooling) -> Self {
        self.pooling = pooling;
        self
    }

    fn forward_batch(&self, state: &ModelState, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let (input_ids, token_type_ids, attention_mask) =
            tokenize::tokenize_batch(&self.tokenizer, texts, self.max_len, &state.device)?;
        let hidden = state
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| Error::TransientResource(format!("embedding forward pass: {e}")))?;
        let pooled = match self.pooling {
            Pooling::Cls => pool::cls_l2(&hidden)?,
            Pooling::MaskedMean => pool::masked_mean_l2(&hidden, &attention_mask)?,
        };
        pooled
            .to_device(&Device::Cpu)
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.to_vec2())
            .map_err(Error::op)
    }

    /// Drop the accelerator and rebuild the model on CPU. Called once when a
    /// batch fails on the accelerator; degrades throughput, not correctness.
    fn fall_back_to_cpu(&self) -> Result<()> {
        let model = build_model(&self.model_dir, &self.bert_config, &Device::Cpu)?;
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::Operation("embedding model lock poisoned".into()))?;
        state.model = model;
        state.device = Device::Cpu;
        Ok(())
    }

    fn embed_chunked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let attempt = {
                let state = self
                    .state
                    .read()
                    .map_err(|_| Error::Operation("embedding model lock poisoned".into()))?;
                let on_accelerator = !matches!(state.device, Device::Cpu);
                (self.forward_batch(&state, batch), on_accelerator)
            };
            match attempt {
                (Ok(vecs), _) => out.extend(vecs),
                (Err(e), true) => {
                    warn!(error = %e, "accelerator batch failed, retrying on CPU");
                    self.fall_back_to_cpu()?;
                    let state = self
                        .state
                        .read()
                        .map_err(|_| Error::Operation("embedding model lock poisoned".into()))?;
                    out.extend(self.forward_batch(&state, batch)?);
                }
                (Err(e), false) => return Err(e),
            }
        }
        Ok(out)
    }
}

impl Embedder for EmbeddingModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        self.max_len
    }

    fn embed(&self, texts: &[String], is_query: bool) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if is_query {
            let prefixed: Vec<String> =
                texts.iter().map(|t| format!("{QUERY_PREFIX}{t}")).collect();
            self.embed_chunked(&prefixed)
        } else {
            self.embed_chunked(texts)
        }
    }
}

fn build_model(model_dir: &Path, config: &BertConfig, device: &Device) -> Result<BertModel> {
    let weights = load_weights(model_dir, device)?;
    let vb = VarBuilder::from_tensors(weights, DType::F32, device);
    BertModel::load(vb, config)
        .map_err(|e| Error::Configuration(format!("failed to build embedding model: {e}")))
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return candle_core::safetensors::load(&safetensors, device).map_err(|e| {
            Error::Configuration(format!(
                "failed to load weights {}: {e}",
                safetensors.display()
            ))
        });
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let tensors = candle_core::pickle::read_all(&pickle).map_err(|e| {
            Error::Configuration(format!("failed to load weights {}: {e}", pickle.display()))
        })?;
        return Ok(tensors.into_iter().collect());
    }
    Err(Error::Configuration(format!(
        "no model weights under {} (expected model.safetensors or pytorch_model.bin)",
        model_dir.display()
    )))
}

/// Construct the process-wide embedder from configuration.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` switches to the deterministic fake for tests
/// and offline development.
pub fn get_default_embedder(cfg: &RetrievalConfig) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake {
        info!("using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(cfg.embedding_dim)));
    }
    let dir = expand_path(&cfg.model_dir);
    Ok(Arc::new(EmbeddingModel::load(&dir, cfg)?))
}
