//! Embedding capabilities for island builds and scoring.
//!
//! `BertEmbedder` runs a local BERT-family sentence model through candle;
//! `HashEmbedder` is a deterministic, model-free stand-in for tests and
//! offline development. `APP_USE_FAKE_EMBEDDINGS=1` forces the latter.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use island_core::config::{expand_path, EmbeddingConfig, EmbeddingProvider};
use island_core::Embedder;

pub mod bert;
pub mod device;
pub mod hash;
pub mod pool;
pub mod tokenize;

pub use bert::BertEmbedder;
pub use hash::HashEmbedder;
pub use pool::masked_mean_l2;

pub fn fake_embeddings_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn get_default_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    if fake_embeddings_forced() || config.provider == EmbeddingProvider::Hash {
        info!(dim = config.dim, "using HashEmbedder");
        return Ok(Arc::new(HashEmbedder::new(config.dim)));
    }
    let model_dir = resolve_model_dir(config)?;
    Ok(Arc::new(BertEmbedder::load(&config.model_name, &model_dir, config.max_len)?))
}

fn resolve_model_dir(config: &EmbeddingConfig) -> Result<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = &config.model_dir { candidates.push(expand_path(dir)); }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) { candidates.push(PathBuf::from(dir)); }
    }
    let short_name = config.model_name.rsplit('/').next().unwrap_or(&config.model_name);
    candidates.push(Path::new("models").join(short_name));
    candidates
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Could not locate model directory for {}", config.model_name))
}
