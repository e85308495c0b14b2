use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

const PAD_ID: u32 = 0;

/// Tokenize a batch, truncating at `max_len` and padding to the longest row.
/// Returns `(input_ids, attention_mask)`, both `[B, T]` u32 tensors.
pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let width = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0).max(1);
    let mut ids = Vec::with_capacity(encodings.len() * width);
    let mut mask = Vec::with_capacity(encodings.len() * width);
    for enc in &encodings {
        let row_ids = &enc.get_ids()[..enc.get_ids().len().min(max_len)];
        let row_mask = &enc.get_attention_mask()[..row_ids.len()];
        ids.extend_from_slice(row_ids);
        mask.extend_from_slice(row_mask);
        let pad = width - row_ids.len();
        ids.extend(std::iter::repeat(PAD_ID).take(pad));
        mask.extend(std::iter::repeat(0u32).take(pad));
    }
    let input_ids = Tensor::from_vec(ids, (encodings.len(), width), device)?;
    let attention_mask = Tensor::from_vec(mask, (encodings.len(), width), device)?;
    Ok((input_ids, attention_mask))
}
