use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use patentdb_core::error::{Error, Result};

/// Encode a batch, pad to the longest sequence (capped at `max_len`), and
/// place the id/type/mask tensors on `device`.
///
/// Inputs longer than `max_len` keep their first `max_len` tokens. BERT-style
/// pad id 0 is assumed.
pub fn tokenize_batch(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    device: &Device,
) -> Result<(Tensor, Tensor, Tensor)> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| Error::Operation(format!("tokenization failed: {e}")))?;

    let batch_len = encodings
        .iter()
        .map(|e| e.get_ids().len().min(max_len))
        .max()
        .unwrap_or(1)
        .max(1);

    let mut all_ids = Vec::with_capacity(encodings.len() * batch_len);
    let mut all_mask = Vec::with_capacity(encodings.len() * batch_len);
    for enc in &encodings {
        let mut ids = enc.get_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        if ids.len() > batch_len {
            ids.truncate(batch_len);
            mask.truncate(batch_len);
        }
        while ids.len() < batch_len {
            ids.push(0);
            mask.push(0);
        }
        all_ids.extend(ids);
        all_mask.extend(mask);
    }

    let rows = encodings.len();
    let input_ids = Tensor::from_vec(all_ids, (rows, batch_len), device).map_err(Error::op)?;
    let attention_mask =
        Tensor::from_vec(all_mask, (rows, batch_len), device).map_err(Error::op)?;
    let token_type_ids = input_ids.zeros_like().map_err(Error::op)?;
    Ok((input_ids, token_type_ids, attention_mask))
}
