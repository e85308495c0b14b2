//! Turning a query vector into a decision against one island.
//!
//! Scoring is a pure function of the artifact and the query: search the `k`
//! nearest chunks, reduce their distances to `d` the same way calibration
//! did, rescale `d` into `iw_score`, and classify on the raw `d`.

use island_core::types::{Decision, NeighborMatch, ScoreResult, Thresholds};
use island_vector::calibrate::reduce_distances;
use island_vector::distance::MAX_UNIT_DISTANCE;
use island_vector::IslandArtifact;

/// Classify a representative distance. Boundaries are inclusive on the
/// accepting side.
pub fn classify(d: f32, thresholds: &Thresholds) -> Decision {
    if d <= thresholds.accept_distance {
        Decision::Accept
    } else if d <= thresholds.review_distance {
        Decision::Review
    } else {
        Decision::Reject
    }
}

/// `1 - d / max_distance`, clamped to `[0, 1]`.
pub fn iw_score(d: f32, thresholds: &Thresholds) -> f32 {
    if thresholds.max_distance <= 0.0 {
        return if d <= 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - d / thresholds.max_distance).clamp(0.0, 1.0)
}

/// How far `d` sits inside its decision band. Explanatory only.
pub fn confidence(d: f32, decision: Decision, thresholds: &Thresholds) -> f32 {
    let Thresholds { accept_distance: accept, review_distance: review, .. } = *thresholds;
    let c = match decision {
        Decision::Accept if accept <= 0.0 => 1.0,
        Decision::Accept => (accept - d) / accept,
        Decision::Review => {
            let half_band = (review - accept) / 2.0;
            if half_band <= 0.0 { 0.0 } else { (d - accept).min(review - d) / half_band }
        }
        Decision::Reject if review >= MAX_UNIT_DISTANCE => 1.0,
        Decision::Reject => (d - review) / (MAX_UNIT_DISTANCE - review),
    };
    c.clamp(0.0, 1.0)
}

/// Score an L2-normalized query vector against `artifact`.
pub fn score_vector(artifact: &IslandArtifact, query_text: &str, query: &[f32]) -> ScoreResult {
    let thresholds = *artifact.thresholds();
    let hits = artifact.index().search(query, thresholds.k);
    let d = reduce_distances(&hits);
    let decision = classify(d, &thresholds);

    let nearest_chunks = hits
        .iter()
        .filter_map(|hit| {
            artifact.chunk(hit.row).map(|chunk| NeighborMatch {
                row: hit.row,
                chunk_id: chunk.id.clone(),
                source_document_id: chunk.source_document_id.clone(),
                text: chunk.text.clone(),
                distance: hit.distance,
            })
        })
        .collect();

    let metadata = artifact.metadata();
    ScoreResult {
        world_id: metadata.world_id.clone(),
        query_text: query_text.to_string(),
        distance: d,
        iw_score: iw_score(d, &thresholds),
        decision,
        confidence: confidence(d, decision, &thresholds),
        nearest_chunks,
        thresholds,
        manifold_version: metadata.manifold_version,
        model_name: metadata.model_name.clone(),
    }
}
