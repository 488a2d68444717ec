//! Cross-encoder reranking.
//!
//! Jointly encodes (query, passage) pairs with an ms-marco-style BERT
//! classifier and returns one relevance logit per pair. Pairs are independent,
//! so batches are order-free. When no cross-encoder weights are available the
//! engine falls back to [`LexicalReranker`], a term-overlap scorer, so
//! reranking degrades rather than failing the query.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use patentdb_core::config::{expand_path, RetrievalConfig};
use patentdb_core::error::{Error, Result};
use patentdb_core::traits::Reranker;
use patentdb_embed::device::select_device;

struct CrossEncoderState {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    device: Device,
}

pub struct CrossEncoderModel {
    state: RwLock<CrossEncoderState>,
    tokenizer: Tokenizer,
    bert_config: BertConfig,
    max_len: usize,
    batch_size: usize,
    id: String,
    model_dir: PathBuf,
}

impl CrossEncoderModel {
    pub fn load(model_dir: &Path, cfg: &RetrievalConfig) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            Error::Configuration(format!(
                "failed to load reranker tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let config_path = model_dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path).map_err(|e| {
            Error::Configuration(format!(
                "failed to read reranker config {}: {e}",
                config_path.display()
            ))
        })?;
        let bert_config: BertConfig = serde_json::from_str(&config_text)
            .map_err(|e| Error::Configuration(format!("invalid reranker config: {e}")))?;

        let device = select_device();
        let state = build_state(model_dir, &bert_config, &device)?;
        info!(dir = %model_dir.display(), "cross-encoder reranker loaded");

        Ok(Self {
            state: RwLock::new(state),
            tokenizer,
            bert_config,
            max_len: cfg.max_seq_len,
            batch_size: cfg.rerank_batch_size,
            id: "cross-encoder:ms-marco".to_string(),
            model_dir: model_dir.to_path_buf(),
        })
    }

    fn forward_batch(&self, state: &CrossEncoderState, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        let encodings = self
            .tokenizer
            .encode_batch(pairs.to_vec(), true)
            .map_err(|e| Error::Operation(format!("pair tokenization failed: {e}")))?;

        let batch_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(self.max_len))
            .max()
            .unwrap_or(1)
            .max(1);

        let rows = encodings.len();
        let mut all_ids = Vec::with_capacity(rows * batch_len);
        let mut all_types = Vec::with_capacity(rows * batch_len);
        let mut all_mask = Vec::with_capacity(rows * batch_len);
        for enc in &encodings {
            let mut ids = enc.get_ids().to_vec();
            let mut types = enc.get_type_ids().to_vec();
            let mut mask = enc.get_attention_mask().to_vec();
            if ids.len() > batch_len {
                ids.truncate(batch_len);
                types.truncate(batch_len);
                mask.truncate(batch_len);
            }
            while ids.len() < batch_len {
                ids.push(0);
                types.push(0);
                mask.push(0);
            }
            all_ids.extend(ids);
            all_types.extend(types);
            all_mask.extend(mask);
        }

        let input_ids =
            Tensor::from_vec(all_ids, (rows, batch_len), &state.device).map_err(Error::op)?;
        let token_type_ids =
            Tensor::from_vec(all_types, (rows, batch_len), &state.device).map_err(Error::op)?;
        let attention_mask =
            Tensor::from_vec(all_mask, (rows, batch_len), &state.device).map_err(Error::op)?;

        let hidden = state
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| Error::TransientResource(format!("reranker forward pass: {e}")))?;
        // [CLS] state -> pooler (dense + tanh) -> 1-logit classifier
        let cls = hidden
            .narrow(1, 0, 1)
            .and_then(|t| t.squeeze(1))
            .map_err(Error::op)?;
        let pooled = state
            .pooler
            .forward(&cls)
            .and_then(|t| t.tanh())
            .map_err(Error::op)?;
        let logits = state.classifier.forward(&pooled).map_err(Error::op)?;
        logits
            .squeeze(1)
            .and_then(|t| t.to_device(&Device::Cpu))
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.to_vec1())
            .map_err(Error::op)
    }

    fn fall_back_to_cpu(&self) -> Result<()> {
        let fresh = build_state(&self.model_dir, &self.bert_config, &Device::Cpu)?;
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::Operation("reranker lock poisoned".into()))?;
        *state = fresh;
        Ok(())
    }
}

impl Reranker for CrossEncoderModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(vec![]);
        }
        let pairs: Vec<(String, String)> = passages
            .iter()
            .map(|p| (query.to_string(), p.clone()))
            .collect();
        let mut out = Vec::with_capacity(pairs.len());
        for batch in pairs.chunks(self.batch_size) {
            let attempt = {
                let state = self
                    .state
                    .read()
                    .map_err(|_| Error::Operation("reranker lock poisoned".into()))?;
                let on_accelerator = !matches!(state.device, Device::Cpu);
                (self.forward_batch(&state, batch), on_accelerator)
            };
            match attempt {
                (Ok(scores), _) => out.extend(scores),
                (Err(e), true) => {
                    warn!(error = %e, "accelerator rerank batch failed, retrying on CPU");
                    self.fall_back_to_cpu()?;
                    let state = self
                        .state
                        .read()
                        .map_err(|_| Error::Operation("reranker lock poisoned".into()))?;
                    out.extend(self.forward_batch(&state, batch)?);
                }
                (Err(e), false) => return Err(e),
            }
        }
        Ok(out)
    }
}

fn build_state(
    model_dir: &Path,
    config: &BertConfig,
    device: &Device,
) -> Result<CrossEncoderState> {
    let weights = load_weights(model_dir, device)?;
    let vb = VarBuilder::from_tensors(weights, DType::F32, device);
    let model = BertModel::load(vb.pp("bert"), config)
        .map_err(|e| Error::Configuration(format!("failed to build reranker: {e}")))?;
    let pooler = candle_nn::linear(
        config.hidden_size,
        config.hidden_size,
        vb.pp("bert.pooler.dense"),
    )
    .map_err(|e| Error::Configuration(format!("reranker pooler weights: {e}")))?;
    let classifier = candle_nn::linear(config.hidden_size, 1, vb.pp("classifier"))
        .map_err(|e| Error::Configuration(format!("reranker classifier weights: {e}")))?;
    Ok(CrossEncoderState {
        model,
        pooler,
        classifier,
        device: device.clone(),
    })
}

fn load_weights(
    model_dir: &Path,
    device: &Device,
) -> Result<std::collections::HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return candle_core::safetensors::load(&safetensors, device).map_err(|e| {
            Error::Configuration(format!(
                "failed to load reranker weights {}: {e}",
                safetensors.display()
            ))
        });
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let tensors = candle_core::pickle::read_all(&pickle).map_err(|e| {
            Error::Configuration(format!(
                "failed to load reranker weights {}: {e}",
                pickle.display()
            ))
        })?;
        return Ok(tensors.into_iter().collect());
    }
    Err(Error::Configuration(format!(
        "no reranker weights under {} (expected model.safetensors or pytorch_model.bin)",
        model_dir.display()
    )))
}

/// Term-overlap reranker used when no cross-encoder is available.
///
/// Scores each passage by the fraction of query tokens it contains. Exact
/// score ties preserve the incoming (fused) order, so this degrades toward
/// the RRF ordering rather than scrambling it.
pub struct LexicalReranker {
    id: String,
}

impl LexicalReranker {
    pub fn new() -> Self {
        Self {
            id: "lexical:term-overlap".to_string(),
        }
    }
}

impl Default for LexicalReranker {
    fn default() -> Self {
        Self::new()
    }
}

impl Reranker for LexicalReranker {
    fn id(&self) -> &str {
        &self.id
    }

    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let query_lower = query.to_lowercase();
        let query_words: Vec<&str> = query_lower.split_whitespace().collect();
        if query_words.is_empty() {
            return Ok(vec![0.0; passages.len()]);
        }
        let scores = passages
            .iter()
            .map(|p| {
                let content_lower = p.to_lowercase();
                let mut text_score = 0.0f32;
                for word in &query_words {
                    if content_lower.contains(word) {
                        text_score += 1.0;
                    }
                }
                text_score / query_words.len() as f32
            })
            .collect();
        Ok(scores)
    }
}

/// Construct the process-wide reranker from configuration.
///
/// `APP_USE_LEXICAL_RERANKER=1` forces the fallback; otherwise missing
/// cross-encoder weights degrade to it with a warning.
pub fn get_default_reranker(cfg: &RetrievalConfig) -> Arc<dyn Reranker> {
    let force_lexical = std::env::var("APP_USE_LEXICAL_RERANKER")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if force_lexical {
        info!("using lexical reranker");
        return Arc::new(LexicalReranker::new());
    }
    let dir = expand_path(&cfg.reranker_dir);
    match CrossEncoderModel::load(&dir, cfg) {
        Ok(model) => Arc::new(model),
        Err(e) => {
            warn!(error = %e, "cross-encoder unavailable, degrading to lexical reranker");
            Arc::new(LexicalReranker::new())
        }
    }
}
