//! The immutable island: chunks, their embeddings and index, thresholds and
//! build metadata. Rebuilding a world produces a new value; nothing here is
//! ever mutated after [`IslandArtifact::new`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use island_core::types::{BuildParams, Chunk, CorpusDocument, Thresholds, WorldId, WorldStatus};

use crate::distance::EmbeddingMatrix;
use crate::index::{IndexKind, VectorIndex};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IslandMetadata {
    pub world_id: WorldId,
    pub model_name: String,
    pub embedding_dim: usize,
    pub chunk_count: usize,
    pub thresholds: Thresholds,
    pub mean_distance: f32,
    pub min_distance: f32,
    pub params: BuildParams,
    pub index_kind: IndexKind,
    #[serde(default)]
    pub nprobe: usize,
    pub manifold_version: u32,
    pub source_documents: Vec<String>,
    pub corpus_digest: String,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IslandArtifact {
    metadata: IslandMetadata,
    chunks: Vec<Chunk>,
    index: VectorIndex,
}

impl IslandArtifact {
    /// Assemble an artifact, checking that chunks, vectors and metadata agree.
    pub fn new(metadata: IslandMetadata, chunks: Vec<Chunk>, index: VectorIndex) -> Result<Self, String> {
        if chunks.len() != index.len() {
            return Err(format!("{} chunks but {} embeddings", chunks.len(), index.len()));
        }
        if metadata.chunk_count != chunks.len() {
            return Err(format!("metadata records {} chunks, found {}", metadata.chunk_count, chunks.len()));
        }
        if metadata.embedding_dim != index.dim() {
            return Err(format!("metadata records dimension {}, index has {}", metadata.embedding_dim, index.dim()));
        }
        if metadata.index_kind != index.kind() {
            return Err(format!("metadata records a {:?} index, found {:?}", metadata.index_kind, index.kind()));
        }
        if !metadata.thresholds.is_ordered() {
            return Err(format!("thresholds out of order: {:?}", metadata.thresholds));
        }
        Ok(Self { metadata, chunks, index })
    }

    pub fn world_id(&self) -> &str { &self.metadata.world_id }

    pub fn metadata(&self) -> &IslandMetadata { &self.metadata }

    pub fn thresholds(&self) -> &Thresholds { &self.metadata.thresholds }

    pub fn chunks(&self) -> &[Chunk] { &self.chunks }

    pub fn chunk(&self, row: usize) -> Option<&Chunk> { self.chunks.get(row) }

    pub fn index(&self) -> &VectorIndex { &self.index }

    pub fn embeddings(&self) -> &EmbeddingMatrix { self.index.vectors() }

    pub fn status(&self) -> WorldStatus {
        let m = &self.metadata;
        WorldStatus {
            world_id: m.world_id.clone(),
            exists: true,
            chunk_count: Some(self.chunks.len()),
            embedding_dim: Some(m.embedding_dim),
            model_name: Some(m.model_name.clone()),
            accept_distance: Some(m.thresholds.accept_distance),
            review_distance: Some(m.thresholds.review_distance),
            max_distance: Some(m.thresholds.max_distance),
            mean_distance: Some(m.mean_distance),
            min_distance: Some(m.min_distance),
            k: Some(m.thresholds.k),
            manifold_version: Some(m.manifold_version),
            built_at: Some(m.built_at),
        }
    }
}

/// blake3 over document ids and texts in order; equal digests mean an
/// identical corpus.
pub fn corpus_digest(documents: &[CorpusDocument]) -> String {
    let mut hasher = blake3::Hasher::new();
    for doc in documents {
        hasher.update(doc.id.as_bytes());
        hasher.update(&[0]);
        hasher.update(doc.text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}
