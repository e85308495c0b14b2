use std::sync::Arc;

use chrono::Utc;
use island_core::config::IndexConfig;
use island_core::types::{BuildParams, Chunk, CorpusDocument};
use island_core::{Error, Operation};
use island_embed::HashEmbedder;
use island_vector::{
    calibrate, corpus_digest, ArtifactStore, EmbeddingMatrix, IslandArchive, IslandArtifact, IslandMetadata, VectorIndex,
};

const LINES: &[&str] = &[
    "Zeus hurled thunderbolts from the summit of Olympus",
    "Hera queen of the gods watched over marriage",
    "Poseidon shook the earth and ruled the wine dark sea",
    "Athena sprang fully armed from the head of Zeus",
    "Hades kept the dead beneath the earth",
    "Apollo drove the chariot of the sun across the sky",
    "Artemis hunted by moonlight in the forests of Arcadia",
    "Hermes carried messages between Olympus and mortals",
];

fn artifact(world_id: &str, lines: &[&str], config: &IndexConfig, manifold_version: u32) -> IslandArtifact {
    let embedder = HashEmbedder::new(64);
    let chunks: Vec<Chunk> = lines
        .iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            id: format!("canon.txt:{i}"),
            source_document_id: "canon.txt".into(),
            text: text.to_string(),
            start_offset: i * 100,
            length: text.chars().count(),
        })
        .collect();
    let rows: Vec<Vec<f32>> = lines.iter().map(|t| embedder.embed_one(t)).collect();
    let index = VectorIndex::build(EmbeddingMatrix::from_rows(64, &rows).unwrap(), config);
    let cal = calibrate(&index, 3, 0.8, 0.9).unwrap();
    let docs = vec![CorpusDocument::new("canon.txt", lines.join("\n"))];
    let metadata = IslandMetadata {
        world_id: world_id.into(),
        model_name: "hash-bow-d64".into(),
        embedding_dim: 64,
        chunk_count: chunks.len(),
        thresholds: cal.thresholds,
        mean_distance: cal.mean_distance,
        min_distance: cal.min_distance,
        params: BuildParams { k: 3, accept_percentile: 0.8, review_percentile: 0.9, ..BuildParams::default() },
        index_kind: index.kind(),
        nprobe: index.nprobe(),
        manifold_version,
        source_documents: vec!["canon.txt".into()],
        corpus_digest: corpus_digest(&docs),
        built_at: Utc::now(),
    };
    IslandArtifact::new(metadata, chunks, index).unwrap()
}

#[test]
fn artifact_rejects_misaligned_parts() {
    let good = artifact("greek_myth", LINES, &IndexConfig::default(), 1);
    let mut chunks = good.chunks().to_vec();
    chunks.pop();
    let err = IslandArtifact::new(good.metadata().clone(), chunks, good.index().clone()).unwrap_err();
    assert!(err.contains("chunks"), "{err}");
}

#[test]
fn store_get_unknown_world_is_not_found() {
    let store = ArtifactStore::new();
    assert!(!store.exists("atlantis"));
    match store.get("atlantis", Operation::Status) {
        Err(Error::NotFound { world_id, op }) => {
            assert_eq!(world_id, "atlantis");
            assert_eq!(op, Operation::Status);
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn store_swap_keeps_old_snapshots_valid() {
    let store = ArtifactStore::new();
    assert!(store.put(Arc::new(artifact("greek_myth", LINES, &IndexConfig::default(), 1))).is_none());
    let before = store.get("greek_myth", Operation::Score).unwrap();

    let replaced = store.put(Arc::new(artifact("greek_myth", &LINES[..5], &IndexConfig::default(), 2)));
    assert_eq!(replaced.unwrap().metadata().manifold_version, 1);

    // the old snapshot still serves its own chunks
    assert_eq!(before.chunks().len(), 8);
    assert_eq!(before.index().len(), 8);
    let after = store.get("greek_myth", Operation::Score).unwrap();
    assert_eq!(after.chunks().len(), 5);
    assert_eq!(after.metadata().manifold_version, 2);

    assert_eq!(store.worlds(), vec!["greek_myth"]);
    assert!(store.evict("greek_myth").is_some());
    assert!(!store.exists("greek_myth"));
}

#[test]
fn put_if_absent_keeps_the_existing_island() {
    let store = ArtifactStore::new();
    let first = store.put_if_absent(Arc::new(artifact("greek_myth", LINES, &IndexConfig::default(), 1)));
    assert_eq!(first.metadata().manifold_version, 1);

    // a newer build already holds the slot; a late archive load must not replace it
    store.put(Arc::new(artifact("greek_myth", &LINES[..6], &IndexConfig::default(), 2)));
    let kept = store.put_if_absent(Arc::new(artifact("greek_myth", LINES, &IndexConfig::default(), 1)));
    assert_eq!(kept.metadata().manifold_version, 2);
    assert_eq!(store.get("greek_myth", Operation::Score).unwrap().chunks().len(), 6);
}

#[test]
fn corpus_digest_tracks_content() {
    let a = vec![CorpusDocument::new("a.txt", "Zeus"), CorpusDocument::new("b.txt", "Hera")];
    let b = vec![CorpusDocument::new("a.txt", "Zeus"), CorpusDocument::new("b.txt", "Hera!")];
    assert_eq!(corpus_digest(&a), corpus_digest(&a.clone()));
    assert_ne!(corpus_digest(&a), corpus_digest(&b));
}

#[tokio::test]
async fn archive_round_trips_flat_islands() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let archive = IslandArchive::open(tmp.path()).await?;
    assert!(archive.load("greek_myth").await?.is_none());

    let saved = artifact("greek_myth", LINES, &IndexConfig::default(), 1);
    archive.save(&saved).await?;

    let loaded = archive.load("greek_myth").await?.expect("active island");
    assert_eq!(loaded.metadata(), saved.metadata());
    assert_eq!(loaded.chunks(), saved.chunks());
    assert_eq!(loaded.embeddings(), saved.embeddings());
    let q = saved.embeddings().row(2).to_vec();
    assert_eq!(loaded.index().search(&q, 3), saved.index().search(&q, 3));
    assert_eq!(archive.worlds().await?, vec!["greek_myth"]);
    Ok(())
}

#[tokio::test]
async fn archive_round_trips_ivf_layout() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let archive = IslandArchive::open(tmp.path()).await?;
    let config = IndexConfig { flat_threshold: 1, ..IndexConfig::default() };

    let saved = artifact("greek_myth", LINES, &config, 1);
    assert_eq!(saved.index().kind(), island_vector::IndexKind::Ivf);
    archive.save(&saved).await?;

    let loaded = archive.load("greek_myth").await?.expect("active island");
    assert_eq!(loaded.index().centroids(), saved.index().centroids());
    assert_eq!(loaded.index().assignments(), saved.index().assignments());
    assert_eq!(loaded.index().nprobe(), saved.index().nprobe());
    Ok(())
}

#[tokio::test]
async fn archive_load_follows_latest_active_build() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let archive = IslandArchive::open(tmp.path()).await?;

    archive.save(&artifact("greek_myth", LINES, &IndexConfig::default(), 1)).await?;
    archive.save(&artifact("greek_myth", &LINES[..6], &IndexConfig::default(), 2)).await?;
    archive.save(&artifact("fantasy_realm", &LINES[2..], &IndexConfig::default(), 1)).await?;

    let greek = archive.load("greek_myth").await?.expect("greek");
    assert_eq!(greek.metadata().manifold_version, 2);
    assert_eq!(greek.chunks().len(), 6);
    assert_eq!(archive.active_metadata("fantasy_realm").await?.map(|m| m.chunk_count), Some(6));
    assert_eq!(archive.worlds().await?, vec!["fantasy_realm", "greek_myth"]);
    Ok(())
}
