//! `IslandEngine`: build, score and status over injected collaborators.
//!
//! The engine owns no global state. The embedder, the in-memory
//! [`ArtifactStore`] and the optional durable [`IslandArchive`] are all passed
//! in, so independent engines (in tests, or one per tenant) never interfere.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use island_core::chunker::chunk_corpus;
use island_core::config::{IndexConfig, Settings};
use island_core::error::{BuildFailure, Error, Operation, Result};
use island_core::types::{BuildParams, BuildSummary, Chunk, CorpusDocument, ScoreResult, WorldStatus};
use island_core::Embedder;
use island_vector::calibrate::{calibrate, effective_k};
use island_vector::distance::{l2_normalize, EmbeddingMatrix};
use island_vector::{corpus_digest, ArtifactStore, IslandArchive, IslandArtifact, IslandMetadata, VectorIndex};

use crate::scorer::score_vector;

/// Rows sampled when measuring IVF recall after a build.
const RECALL_SAMPLE: usize = 64;
const RECALL_WARN_BELOW: f32 = 0.9;

/// Cooperative cancellation for an in-flight build. Checked between
/// embedding batches and once more before the new artifact is published.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Releases a world's build slot when dropped, whatever way the build ends.
struct BuildSlot<'a> {
    building: &'a Mutex<HashSet<String>>,
    world_id: String,
}

impl Drop for BuildSlot<'_> {
    fn drop(&mut self) {
        self.building.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.world_id);
    }
}

pub struct IslandEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<ArtifactStore>,
    archive: Option<Arc<IslandArchive>>,
    index_config: IndexConfig,
    embed_batch_size: usize,
    building: Mutex<HashSet<String>>,
}

impl IslandEngine {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            store: Arc::new(ArtifactStore::new()),
            archive: None,
            index_config: IndexConfig::default(),
            embed_batch_size: 32,
            building: Mutex::new(HashSet::new()),
        }
    }

    /// Engine configured from `[index]` and `[build]` settings.
    pub fn from_settings(embedder: Arc<dyn Embedder>, settings: &Settings) -> Self {
        Self::new(embedder).with_index_config(settings.index).with_embed_batch_size(settings.build.embed_batch_size)
    }

    pub fn with_store(mut self, store: Arc<ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_archive(mut self, archive: Arc<IslandArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_index_config(mut self, index_config: IndexConfig) -> Self {
        self.index_config = index_config;
        self
    }

    pub fn with_embed_batch_size(mut self, embed_batch_size: usize) -> Self {
        self.embed_batch_size = embed_batch_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub async fn build(&self, world_id: &str, corpus: &[CorpusDocument], params: &BuildParams) -> Result<BuildSummary> {
        self.build_with_cancel(world_id, corpus, params, &CancelFlag::new()).await
    }

    /// Build a world's island and atomically publish it.
    ///
    /// On any failure, including cancellation, the previously published
    /// artifact (if any) stays current and nothing partial is visible.
    pub async fn build_with_cancel(
        &self,
        world_id: &str,
        corpus: &[CorpusDocument],
        params: &BuildParams,
        cancel: &CancelFlag,
    ) -> Result<BuildSummary> {
        let fail = |failure: BuildFailure| Error::build(world_id, failure);
        params.validate().map_err(|reason| fail(BuildFailure::InvalidParams(reason)))?;
        let _slot = self.claim_build_slot(world_id)?;
        let started = Instant::now();

        let chunks: Vec<Chunk> = chunk_corpus(corpus, params.chunking())
            .map_err(|reason| fail(BuildFailure::InvalidParams(reason)))?
            .collect();
        // reject tiny corpora before paying for embeddings
        effective_k(params.k, chunks.len()).map_err(fail)?;
        info!(world_id, documents = corpus.len(), chunks = chunks.len(), "building island");
        let max_len = self.embedder.max_len();
        let oversized = oversized_chunks(&chunks, max_len);
        if oversized > 0 {
            warn!(world_id, oversized, max_len, "chunks longer than the embedder input window will be truncated");
        }

        let vectors = self.embed_chunks(world_id, &chunks, cancel).await?;

        let index_config = self.index_config;
        let (k, accept_pct, review_pct) = (params.k, params.accept_percentile, params.review_percentile);
        let (index, calibration) = tokio::task::spawn_blocking(move || {
            let index = VectorIndex::build(vectors, &index_config);
            let calibration = calibrate(&index, k, accept_pct, review_pct);
            (index, calibration)
        })
        .await
        .map_err(|e| fail(BuildFailure::Internal(format!("index build task failed: {e}"))))?;
        let calibration = calibration.map_err(fail)?;

        if index.centroids().is_some() {
            let recall = index.recall_at_k(RECALL_SAMPLE, calibration.thresholds.k);
            if recall < RECALL_WARN_BELOW {
                warn!(world_id, recall, nprobe = index.nprobe(), "IVF recall below target");
            } else {
                debug!(world_id, recall, "IVF recall");
            }
        }

        let manifold_version = self.previous_version(world_id).await.map_err(fail)?.map_or(1, |v| v + 1);
        let metadata = IslandMetadata {
            world_id: world_id.to_string(),
            model_name: self.embedder.model_name().to_string(),
            embedding_dim: self.embedder.dim(),
            chunk_count: chunks.len(),
            thresholds: calibration.thresholds,
            mean_distance: calibration.mean_distance,
            min_distance: calibration.min_distance,
            params: params.clone(),
            index_kind: index.kind(),
            nprobe: index.nprobe(),
            manifold_version,
            source_documents: corpus.iter().map(|d| d.id.clone()).collect(),
            corpus_digest: corpus_digest(corpus),
            built_at: Utc::now(),
        };
        let artifact = IslandArtifact::new(metadata, chunks, index).map_err(|e| fail(BuildFailure::Internal(e)))?;

        if cancel.is_cancelled() {
            info!(world_id, "build cancelled before publish");
            return Err(fail(BuildFailure::Cancelled));
        }
        if let Some(archive) = &self.archive {
            archive.save(&artifact).await.map_err(|e| fail(BuildFailure::Persist(format!("{e:#}"))))?;
        }
        let artifact = Arc::new(artifact);
        self.store.put(artifact.clone());

        let t = artifact.thresholds();
        info!(
            world_id,
            chunks = artifact.chunks().len(),
            k = t.k,
            accept = t.accept_distance,
            review = t.review_distance,
            max = t.max_distance,
            manifold_version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "island published"
        );
        let metadata = artifact.metadata();
        Ok(BuildSummary {
            world_id: world_id.to_string(),
            chunks_processed: artifact.chunks().len(),
            embedding_dim: metadata.embedding_dim,
            accept_distance: t.accept_distance,
            review_distance: t.review_distance,
            max_distance: t.max_distance,
            k: t.k,
            model_name: metadata.model_name.clone(),
            manifold_version,
            built_at: metadata.built_at,
        })
    }

    pub async fn score(&self, world_id: &str, text: &str) -> Result<ScoreResult> {
        let artifact = self.resolve(world_id).await?.ok_or_else(|| Error::not_found(world_id, Operation::Score))?;
        self.check_compatible(&artifact, Operation::Score)?;

        let embedder = self.embedder.clone();
        let owned = text.to_string();
        let embedded = tokio::task::spawn_blocking(move || embedder.embed(&owned)).await;
        let mut query = match embedded {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return Err(embedding_error(world_id, format!("{e:#}"))),
            Err(e) => return Err(embedding_error(world_id, e.to_string())),
        };
        if query.len() != artifact.metadata().embedding_dim {
            return Err(Error::Config {
                world_id: world_id.to_string(),
                op: Operation::Score,
                reason: format!("query has dimension {}, island expects {}", query.len(), artifact.metadata().embedding_dim),
            });
        }
        l2_normalize(&mut query);

        let result = score_vector(&artifact, text, &query);
        debug!(world_id, distance = result.distance, iw_score = result.iw_score, decision = %result.decision, "scored");
        Ok(result)
    }

    /// Status of a world; an unbuilt world reports `exists = false`.
    pub async fn status(&self, world_id: &str) -> Result<WorldStatus> {
        Ok(match self.resolve(world_id).await? {
            Some(artifact) => artifact.status(),
            None => WorldStatus::missing(world_id),
        })
    }

    /// Drop the cached copy of a world. A durable copy, if any, is reloaded on
    /// the next request.
    pub fn evict(&self, world_id: &str) -> bool {
        self.store.evict(world_id).is_some()
    }

    /// Worlds with a published island, in memory or in the archive.
    pub async fn worlds(&self) -> Result<Vec<String>> {
        let mut worlds = self.store.worlds();
        if let Some(archive) = &self.archive {
            let stored = archive.worlds().await.map_err(|e| Error::storage("*", Operation::Load, format!("{e:#}")))?;
            worlds.extend(stored);
        }
        worlds.sort();
        worlds.dedup();
        Ok(worlds)
    }

    fn claim_build_slot(&self, world_id: &str) -> Result<BuildSlot<'_>> {
        let mut building = self.building.lock().unwrap_or_else(PoisonError::into_inner);
        if !building.insert(world_id.to_string()) {
            warn!(world_id, "rejecting concurrent build");
            return Err(Error::build(world_id, BuildFailure::AlreadyBuilding));
        }
        Ok(BuildSlot { building: &self.building, world_id: world_id.to_string() })
    }

    async fn embed_chunks(&self, world_id: &str, chunks: &[Chunk], cancel: &CancelFlag) -> Result<EmbeddingMatrix> {
        let fail = |failure: BuildFailure| Error::build(world_id, failure);
        let dim = self.embedder.dim();
        let mut vectors = EmbeddingMatrix::with_capacity(dim, chunks.len());

        let pb = ProgressBar::new(chunks.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(format!("embedding {world_id}"));

        for batch in chunks.chunks(self.embed_batch_size) {
            if cancel.is_cancelled() {
                pb.abandon_with_message("cancelled");
                info!(world_id, embedded = vectors.len(), "build cancelled during embedding");
                return Err(fail(BuildFailure::Cancelled));
            }
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedder = self.embedder.clone();
            let embedded = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
                .await
                .map_err(|e| fail(BuildFailure::Embedding(e.to_string())))?
                .map_err(|e| fail(BuildFailure::Embedding(format!("{e:#}"))))?;
            if embedded.len() != batch.len() {
                return Err(fail(BuildFailure::Embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                ))));
            }
            for mut v in embedded {
                if v.len() != dim {
                    return Err(fail(BuildFailure::Embedding(format!("vector has dimension {}, expected {}", v.len(), dim))));
                }
                l2_normalize(&mut v);
                vectors.push(&v);
            }
            pb.inc(batch.len() as u64);
        }
        if cancel.is_cancelled() {
            pb.abandon_with_message("cancelled");
            return Err(fail(BuildFailure::Cancelled));
        }
        pb.finish_with_message(format!("embedded {world_id}"));
        Ok(vectors)
    }

    async fn previous_version(&self, world_id: &str) -> std::result::Result<Option<u32>, BuildFailure> {
        if let Some(current) = self.store.lookup(world_id) {
            return Ok(Some(current.metadata().manifold_version));
        }
        let Some(archive) = &self.archive else {
            return Ok(None);
        };
        let metadata = archive.active_metadata(world_id).await.map_err(|e| BuildFailure::Persist(format!("{e:#}")))?;
        Ok(metadata.map(|m| m.manifold_version))
    }

    /// Current artifact of a world: the cached copy, else the archived one.
    async fn resolve(&self, world_id: &str) -> Result<Option<Arc<IslandArtifact>>> {
        if let Some(artifact) = self.store.lookup(world_id) {
            return Ok(Some(artifact));
        }
        let Some(archive) = &self.archive else {
            return Ok(None);
        };
        let loaded = archive.load(world_id).await.map_err(|e| Error::storage(world_id, Operation::Load, format!("{e:#}")))?;
        let Some(artifact) = loaded else {
            return Ok(None);
        };
        // a build that published meanwhile keeps its slot
        let current = self.store.put_if_absent(Arc::new(artifact));
        info!(world_id, manifold_version = current.metadata().manifold_version, "loaded island from archive");
        Ok(Some(current))
    }

    fn check_compatible(&self, artifact: &IslandArtifact, op: Operation) -> Result<()> {
        let metadata = artifact.metadata();
        if metadata.embedding_dim != self.embedder.dim() {
            return Err(Error::Config {
                world_id: metadata.world_id.clone(),
                op,
                reason: format!(
                    "island was built with {}-dimensional '{}' embeddings; current embedder '{}' produces {}",
                    metadata.embedding_dim,
                    metadata.model_name,
                    self.embedder.model_name(),
                    self.embedder.dim()
                ),
            });
        }
        if metadata.model_name != self.embedder.model_name() {
            warn!(
                world_id = %metadata.world_id,
                built_with = %metadata.model_name,
                current = %self.embedder.model_name(),
                "embedding model changed since build"
            );
        }
        Ok(())
    }
}

/// Chunks whose word count alone exceeds the embedder's token window.
fn oversized_chunks(chunks: &[Chunk], max_len: usize) -> usize {
    chunks.iter().filter(|c| c.text.split_whitespace().count() > max_len).count()
}

fn embedding_error(world_id: &str, reason: String) -> Error {
    Error::Embedding { world_id: world_id.to_string(), op: Operation::Score, reason }
}
