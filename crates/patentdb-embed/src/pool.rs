use candle_core::{DType, Tensor};

use patentdb_core::error::{Error, Result};

/// How to collapse the [B,T,H] hidden states into one vector per input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    /// First-token ([CLS]) state. The BGE family is trained for this.
    Cls,
    /// Attention-masked mean over token states.
    MaskedMean,
}

/// Take the [CLS] state and L2-normalize, yielding [B,H].
pub fn cls_l2(hidden: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    if dims.len() != 3 {
        return Err(Error::Operation(format!(
            "hidden shape must be [B,T,H], got {dims:?}"
        )));
    }
    let cls = hidden
        .narrow(1, 0, 1)
        .and_then(|t| t.squeeze(1))
        .map_err(Error::op)?;
    l2_normalize(&cls)
}

/// Mean over unmasked token states, then L2-normalize, yielding [B,H].
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    if dims.len() != 3 {
        return Err(Error::Operation(format!(
            "hidden shape must be [B,T,H], got {dims:?}"
        )));
    }
    let hidden_dim = dims[2];

    let mask = attention_mask
        .to_device(hidden.device())
        .and_then(|m| m.to_dtype(hidden.dtype()))
        .map_err(Error::op)?;
    let mask_3d = mask.unsqueeze(2).map_err(Error::op)?;
    let mask_broadcast = mask_3d
        .broadcast_as(hidden.shape())
        .or_else(|_| mask_3d.repeat((1, 1, hidden_dim)))
        .map_err(Error::op)?;
    let masked = (hidden * &mask_broadcast).map_err(Error::op)?;
    let sum = masked.sum(1).map_err(Error::op)?;
    let lengths = mask
        .sum(1)
        .and_then(|l| l.unsqueeze(1))
        .and_then(|l| l.to_dtype(sum.dtype()))
        .map_err(Error::op)?;
    let mean = sum.broadcast_div(&lengths).map_err(Error::op)?;
    l2_normalize(&mean)
}

fn l2_normalize(v: &Tensor) -> Result<Tensor> {
    let eps_val = match v.dtype() {
        DType::F16 => 1e-6f32,
        _ => 1e-12f32,
    };
    let eps = Tensor::new(&[eps_val], v.device())
        .and_then(|t| t.to_dtype(v.dtype()))
        .and_then(|t| t.unsqueeze(0))
        .map_err(Error::op)?;
    let norm = v
        .sqr()
        .and_then(|t| t.sum_keepdim(1))
        .and_then(|t| t.sqrt())
        .map_err(Error::op)?;
    let norm = norm.broadcast_add(&eps).map_err(Error::op)?;
    v.broadcast_div(&norm).map_err(Error::op)
}
