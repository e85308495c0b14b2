/// Text to fixed-length vector capability consumed by build and score paths.
///
/// Implementations must be deterministic for identical input. Output does not
/// need to be normalized; the engine L2-normalizes every vector it receives.
pub trait Embedder: Send + Sync {
    /// Stable model identifier recorded in every artifact.
    fn model_name(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// Maximum token length the model reads before truncating.
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}
