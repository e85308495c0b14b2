use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use island_core::Embedder;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch;

/// Sentence embedder over a BERT-family checkpoint (e.g. all-MiniLM-L6-v2):
/// masked mean pooling followed by L2 normalization.
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_name: String,
    dim: usize,
    max_len: usize,
}

impl BertEmbedder {
    pub fn load(model_name: &str, model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!(model = model_name, dir = %model_dir.display(), "loading sentence embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&raw_config)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let safetensors = model_dir.join("model.safetensors");
        let vb = if safetensors.exists() {
            // SAFETY: the weights file is not modified while mapped.
            unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, &device)? }
        } else {
            let weights_path = model_dir.join("pytorch_model.bin");
            let weights = candle_core::pickle::read_all(&weights_path)
                .with_context(|| format!("reading {}", weights_path.display()))?;
            let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
            VarBuilder::from_tensors(weights_map, DType::F32, &device)
        };
        let model = BertModel::load(vb, &config)?;
        info!(model = model_name, dim, "embedding model loaded");
        Ok(Self { model, tokenizer, device, model_name: model_name.to_string(), dim, max_len })
    }
}

impl Embedder for BertEmbedder {
    fn model_name(&self) -> &str { &self.model_name }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        let elapsed = start.elapsed();
        debug!(batch = texts.len(), ms = elapsed.as_millis() as u64, "embedded batch");
        if elapsed.as_millis() > 100 * texts.len() as u128 {
            warn!(batch = texts.len(), ms = elapsed.as_millis() as u64, "slow embedding batch");
        }
        Ok(vectors)
    }
}
