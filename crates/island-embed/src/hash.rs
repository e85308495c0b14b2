use std::hash::Hasher;
use twox_hash::XxHash64;

use island_core::Embedder;

/// Function words skipped by [`HashEmbedder`]; they would otherwise dominate
/// every bag and make unrelated sentences look alike.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he", "her", "his", "in",
    "is", "it", "its", "of", "on", "or", "she", "that", "the", "their", "them", "then", "there", "they", "this",
    "to", "was", "were", "while", "who", "with",
];

/// Deterministic bag-of-words embedder: each normalized token is hashed into
/// one of `dim` buckets with a hash-derived weight. No model files needed.
pub struct HashEmbedder {
    dim: usize,
    name: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, name: format!("hash-bow-d{dim}") }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for raw in text.split_whitespace() {
            let token = normalize_token(raw);
            if token.is_empty() || STOPWORDS.contains(&token.as_str()) {
                continue;
            }
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let weight = 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += weight;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

fn normalize_token(raw: &str) -> String {
    raw.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str { &self.name }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
