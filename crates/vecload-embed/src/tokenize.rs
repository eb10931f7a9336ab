use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Tokenized single-sequence input: `[1, T]` ids, attention mask and token types.
pub struct EncodedInput {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

/// Tokenizes `text` with special tokens and truncates to `max_len` word pieces.
/// No padding: a single sequence is never padded, so the mask is all ones.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<EncodedInput> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    let mut types = enc.get_type_ids().to_vec();
    if ids.is_empty() {
        return Err(anyhow!("Tokenization produced no tokens"));
    }
    if ids.len() > max_len {
        // keep the trailing [SEP] so the model sees a well-formed sequence
        let sep = ids[ids.len() - 1];
        ids.truncate(max_len);
        mask.truncate(max_len);
        types.truncate(max_len);
        ids[max_len - 1] = sep;
    }
    let len = ids.len();
    let input_ids = Tensor::from_vec(ids, (1, len), device)?;
    let attention_mask = Tensor::from_vec(mask, (1, len), device)?;
    let token_type_ids = Tensor::from_vec(types, (1, len), device)?;
    Ok(EncodedInput { input_ids, attention_mask, token_type_ids })
}
