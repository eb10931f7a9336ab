use anyhow::{ensure, Result};
use candle_core::{DType, Tensor, D};
use vecload_core::config::Pooling;

/// Pooling and normalization applied to every encoder call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub pooling: Pooling,
    pub normalize: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self { pooling: Pooling::Mean, normalize: true }
    }
}

/// `[B,T,H]` hidden states + `[B,T]` mask → `[B,H]` sentence vectors.
pub fn pool(hidden: &Tensor, attention_mask: &Tensor, options: EncodeOptions) -> Result<Tensor> {
    let pooled = match options.pooling {
        Pooling::Mean => masked_mean(hidden, attention_mask)?,
        Pooling::Cls => cls(hidden)?,
    };
    if options.normalize {
        l2_normalize(&pooled)
    } else {
        Ok(pooled)
    }
}

pub fn masked_mean(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    ensure!(dims.len() == 3, "hidden shape must be [B,T,H], got {:?}", dims);
    let (batch, hidden_dim) = (dims[0], dims[2]);

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_b = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let sum = (hidden * &mask_b)?.sum(1)?;
    // an all-zero mask row would divide by zero; clamp the token count at 1
    let lengths = mask.sum_keepdim(1)?.maximum(1f64)?;
    let mean = sum.broadcast_div(&lengths)?;
    ensure!(mean.dims() == [batch, hidden_dim].as_slice(), "pooled shape {:?}", mean.dims());
    Ok(mean)
}

pub fn cls(hidden: &Tensor) -> Result<Tensor> {
    ensure!(hidden.dims().len() == 3, "hidden shape must be [B,T,H], got {:?}", hidden.dims());
    Ok(hidden.narrow(1, 0, 1)?.squeeze(1)?)
}

pub fn l2_normalize(v: &Tensor) -> Result<Tensor> {
    let eps_val = match v.dtype() { DType::F16 | DType::BF16 => 1e-6f64, _ => 1e-12f64 };
    let norm = v.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?;
    let norm = (norm + eps_val)?;
    Ok(v.broadcast_div(&norm)?)
}
