//! Durable island storage on LanceDB.
//!
//! Typical flow:
//! - `save` writes `<prefix>_chunks` (and `<prefix>_centroids` for IVF) under a
//!   fresh per-build prefix, then the metadata record `metadata:<prefix>`.
//! - Only after both succeed is `active:<world>` flipped to the new prefix.
//! - `load` follows the active pointer, so an interrupted save is invisible.
//!
//! Superseded builds stay on disk; nothing here drops old tables.

use anyhow::{anyhow, Context, Result};
use arrow_array::cast::AsArray;
use arrow_array::{FixedSizeListArray, Int32Array, Int64Array, RecordBatch, StringArray};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use island_core::types::Chunk;

use crate::artifact::{IslandArtifact, IslandMetadata};
use crate::distance::EmbeddingMatrix;
use crate::index::{IndexKind, VectorIndex};
use crate::schema::{build_centroids_schema, build_chunks_schema, META_TABLE};
use crate::table::{create_table_from_batch, get_meta, list_meta, open_db, read_all, set_meta};

const ACTIVE_PREFIX: &str = "active:";

pub struct IslandArchive {
    conn: Connection,
}

impl IslandArchive {
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let conn = open_db(dir.to_string_lossy().as_ref()).await?;
        Ok(Self { conn })
    }

    /// Persist `artifact` and make it the world's active island.
    pub async fn save(&self, artifact: &IslandArtifact) -> Result<()> {
        let meta = artifact.metadata();
        let prefix = table_prefix(&meta.world_id, meta.manifold_version, meta.built_at.timestamp_millis());
        let dim = i32::try_from(meta.embedding_dim).context("embedding dimension overflows i32")?;

        create_table_from_batch(&self.conn, &format!("{prefix}_chunks"), chunks_batch(artifact, dim)?).await?;
        if let Some(centroids) = artifact.index().centroids() {
            create_table_from_batch(&self.conn, &format!("{prefix}_centroids"), centroids_batch(centroids, dim)?).await?;
        }
        set_meta(&self.conn, META_TABLE, &format!("metadata:{prefix}"), &serde_json::to_string(meta)?).await?;
        set_meta(&self.conn, META_TABLE, &format!("{ACTIVE_PREFIX}{}", meta.world_id), &prefix).await?;
        info!(world_id = %meta.world_id, %prefix, "activated island tables");
        Ok(())
    }

    pub async fn active_metadata(&self, world_id: &str) -> Result<Option<IslandMetadata>> {
        Ok(self.active(world_id).await?.map(|(_, metadata)| metadata))
    }

    async fn active(&self, world_id: &str) -> Result<Option<(String, IslandMetadata)>> {
        let Some(prefix) = get_meta(&self.conn, META_TABLE, &format!("{ACTIVE_PREFIX}{world_id}")).await? else {
            return Ok(None);
        };
        let raw = get_meta(&self.conn, META_TABLE, &format!("metadata:{prefix}"))
            .await?
            .ok_or_else(|| anyhow!("metadata for {prefix} missing"))?;
        Ok(Some((prefix, serde_json::from_str(&raw)?)))
    }

    /// Load the active island of `world_id`, or `None` if it was never saved.
    pub async fn load(&self, world_id: &str) -> Result<Option<IslandArtifact>> {
        let Some((prefix, metadata)) = self.active(world_id).await? else {
            return Ok(None);
        };
        debug!(world_id, %prefix, "loading island tables");

        let rows = read_chunk_rows(&self.conn, &format!("{prefix}_chunks"), metadata.embedding_dim).await?;
        let mut vectors = EmbeddingMatrix::with_capacity(metadata.embedding_dim, rows.len());
        let mut chunks = Vec::with_capacity(rows.len());
        let mut assignments = Vec::with_capacity(rows.len());
        for (expected, row) in rows.into_iter().enumerate() {
            if row.position != expected {
                return Err(anyhow!("chunk table {prefix}_chunks has a gap at row {expected}"));
            }
            vectors.push(&row.vector);
            assignments.push(row.list_id);
            chunks.push(row.chunk);
        }

        let index = match metadata.index_kind {
            IndexKind::Flat => VectorIndex::flat(vectors),
            IndexKind::Ivf => {
                let centroids = read_centroids(&self.conn, &format!("{prefix}_centroids"), metadata.embedding_dim).await?;
                VectorIndex::from_layout(vectors, centroids, assignments, metadata.nprobe).map_err(|e| anyhow!(e))?
            }
        };
        let artifact = IslandArtifact::new(metadata, chunks, index).map_err(|e| anyhow!(e))?;
        Ok(Some(artifact))
    }

    /// Worlds with an active island, sorted.
    pub async fn worlds(&self) -> Result<Vec<String>> {
        Ok(list_meta(&self.conn, META_TABLE, ACTIVE_PREFIX)
            .await?
            .into_iter()
            .map(|(key, _)| key[ACTIVE_PREFIX.len()..].to_string())
            .collect())
    }
}

/// Table-name-safe prefix unique to one build of one world.
fn table_prefix(world_id: &str, manifold_version: u32, millis: i64) -> String {
    let digest = blake3::hash(world_id.as_bytes()).to_hex();
    format!("island_{}_v{}_{}", &digest[..16], manifold_version, millis)
}

fn chunks_batch(artifact: &IslandArtifact, dim: i32) -> Result<RecordBatch> {
    let chunks = artifact.chunks();
    let assignments = artifact.index().assignments();
    let mut positions = Vec::with_capacity(chunks.len());
    let mut list_ids = Vec::with_capacity(chunks.len());
    for row in 0..chunks.len() {
        positions.push(i32::try_from(row)?);
        list_ids.push(assignments.map_or(0, |a| a[row] as i32));
    }
    let vectors = artifact.embeddings().rows().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    Ok(RecordBatch::try_new(
        build_chunks_schema(dim),
        vec![
            Arc::new(Int32Array::from(positions)),
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.id.as_str()))),
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.source_document_id.as_str()))),
            Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.text.as_str()))),
            Arc::new(Int64Array::from_iter_values(chunks.iter().map(|c| c.start_offset as i64))),
            Arc::new(Int64Array::from_iter_values(chunks.iter().map(|c| c.length as i64))),
            Arc::new(Int32Array::from(list_ids)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim)),
        ],
    )?)
}

fn centroids_batch(centroids: &EmbeddingMatrix, dim: i32) -> Result<RecordBatch> {
    let positions = (0..centroids.len()).map(i32::try_from).collect::<std::result::Result<Vec<_>, _>>()?;
    let vectors = centroids.rows().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    Ok(RecordBatch::try_new(
        build_centroids_schema(dim),
        vec![
            Arc::new(Int32Array::from(positions)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim)),
        ],
    )?)
}

struct ChunkRow {
    position: usize,
    chunk: Chunk,
    list_id: u32,
    vector: Vec<f32>,
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("{name} column missing or mistyped"))
}

fn vector_at(vectors: &FixedSizeListArray, i: usize, dim: usize) -> Result<Vec<f32>> {
    let list = vectors.value(i);
    let vals = list.as_primitive::<arrow_array::types::Float32Type>().values().to_vec();
    if vals.len() != dim {
        return Err(anyhow!("stored vector has dimension {}, metadata says {}", vals.len(), dim));
    }
    Ok(vals)
}

async fn read_chunk_rows(conn: &Connection, table: &str, dim: usize) -> Result<Vec<ChunkRow>> {
    let mut rows = Vec::new();
    for batch in read_all(conn, table).await? {
        let position = column::<Int32Array>(&batch, "position")?;
        let chunk_id = column::<StringArray>(&batch, "chunk_id")?;
        let source = column::<StringArray>(&batch, "source_document_id")?;
        let text = column::<StringArray>(&batch, "text")?;
        let start = column::<Int64Array>(&batch, "start_offset")?;
        let length = column::<Int64Array>(&batch, "length")?;
        let list_id = column::<Int32Array>(&batch, "list_id")?;
        let vectors = column::<FixedSizeListArray>(&batch, "vector")?;
        for i in 0..batch.num_rows() {
            rows.push(ChunkRow {
                position: usize::try_from(position.value(i))?,
                chunk: Chunk {
                    id: chunk_id.value(i).to_string(),
                    source_document_id: source.value(i).to_string(),
                    text: text.value(i).to_string(),
                    start_offset: usize::try_from(start.value(i))?,
                    length: usize::try_from(length.value(i))?,
                },
                list_id: u32::try_from(list_id.value(i))?,
                vector: vector_at(vectors, i, dim)?,
            });
        }
    }
    rows.sort_by_key(|r| r.position);
    Ok(rows)
}

async fn read_centroids(conn: &Connection, table: &str, dim: usize) -> Result<EmbeddingMatrix> {
    let mut rows = Vec::new();
    for batch in read_all(conn, table).await? {
        let position = column::<Int32Array>(&batch, "position")?;
        let vectors = column::<FixedSizeListArray>(&batch, "vector")?;
        for i in 0..batch.num_rows() {
            rows.push((position.value(i), vector_at(vectors, i, dim)?));
        }
    }
    rows.sort_by_key(|(p, _)| *p);
    let mut centroids = EmbeddingMatrix::with_capacity(dim, rows.len());
    for (_, v) in &rows {
        centroids.push(v);
    }
    Ok(centroids)
}
