//! Domain types shared by the chunker, index, calibrator and scorer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChunkId = String;
pub type WorldId = String;

/// One source document of a world's corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusDocument {
    pub id: String,
    pub text: String,
}

impl CorpusDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// A bounded segment of a corpus document. Immutable once created.
///
/// - `id`: `<source_document_id>:<n>`, `n` counting emitted chunks per document
/// - `start_offset`/`length`: position of the trimmed text, in characters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: ChunkId,
    pub source_document_id: String,
    pub text: String,
    pub start_offset: usize,
    pub length: usize,
}

/// Character-window chunking policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chunk_length: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 600, overlap: 120, min_chunk_length: 40 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be positive".into());
        }
        if self.overlap >= self.chunk_size {
            return Err(format!("overlap ({}) must be smaller than chunk_size ({})", self.overlap, self.chunk_size));
        }
        Ok(())
    }
}

/// Parameters of one island build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildParams {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chunk_length: usize,
    pub k: usize,
    pub accept_percentile: f64,
    pub review_percentile: f64,
}

impl Default for BuildParams {
    fn default() -> Self {
        let chunking = ChunkingConfig::default();
        Self {
            chunk_size: chunking.chunk_size,
            overlap: chunking.overlap,
            min_chunk_length: chunking.min_chunk_length,
            k: 8,
            accept_percentile: 0.95,
            review_percentile: 0.975,
        }
    }
}

impl BuildParams {
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig { chunk_size: self.chunk_size, overlap: self.overlap, min_chunk_length: self.min_chunk_length }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.chunking().validate()?;
        if self.k == 0 {
            return Err("k must be at least 1".into());
        }
        let in_range = |p: f64| p > 0.0 && p <= 1.0;
        if !in_range(self.accept_percentile) || !in_range(self.review_percentile) {
            return Err(format!(
                "percentiles must lie in (0, 1]; got accept={} review={}",
                self.accept_percentile, self.review_percentile
            ));
        }
        if self.accept_percentile >= self.review_percentile {
            return Err(format!(
                "accept_percentile ({}) must be below review_percentile ({})",
                self.accept_percentile, self.review_percentile
            ));
        }
        Ok(())
    }
}

/// Per-world distance thresholds derived from the corpus alone.
///
/// Invariant: `0 <= accept_distance < review_distance <= max_distance`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    pub accept_distance: f32,
    pub review_distance: f32,
    pub max_distance: f32,
    pub k: usize,
}

impl Thresholds {
    pub fn is_ordered(&self) -> bool {
        0.0 <= self.accept_distance
            && self.accept_distance < self.review_distance
            && self.review_distance <= self.max_distance
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Accept,
    Review,
    Reject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Accept => "ACCEPT",
            Decision::Review => "REVIEW",
            Decision::Reject => "REJECT",
        })
    }
}

/// A canon chunk matched by a query, with enough context to explain a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeighborMatch {
    pub row: usize,
    pub chunk_id: ChunkId,
    pub source_document_id: String,
    pub text: String,
    pub distance: f32,
}

/// Outcome of scoring one query against one world. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreResult {
    pub world_id: WorldId,
    pub query_text: String,
    /// Representative distance: mean of the k nearest distances.
    pub distance: f32,
    pub iw_score: f32,
    pub decision: Decision,
    pub confidence: f32,
    pub nearest_chunks: Vec<NeighborMatch>,
    pub thresholds: Thresholds,
    pub manifold_version: u32,
    pub model_name: String,
}

/// Returned by a successful build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildSummary {
    pub world_id: WorldId,
    pub chunks_processed: usize,
    pub embedding_dim: usize,
    pub accept_distance: f32,
    pub review_distance: f32,
    pub max_distance: f32,
    pub k: usize,
    pub model_name: String,
    pub manifold_version: u32,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorldStatus {
    pub world_id: WorldId,
    pub exists: bool,
    pub chunk_count: Option<usize>,
    pub embedding_dim: Option<usize>,
    pub model_name: Option<String>,
    pub accept_distance: Option<f32>,
    pub review_distance: Option<f32>,
    pub max_distance: Option<f32>,
    /// Mean and minimum of the calibration distribution.
    pub mean_distance: Option<f32>,
    pub min_distance: Option<f32>,
    pub k: Option<usize>,
    pub manifold_version: Option<u32>,
    pub built_at: Option<DateTime<Utc>>,
}

impl WorldStatus {
    pub fn missing(world_id: impl Into<String>) -> Self {
        Self { world_id: world_id.into(), ..Self::default() }
    }
}
