//! Per-world threshold calibration from leave-one-out k-NN distances.
//!
//! Every chunk is scored against its `k` nearest *other* chunks with the same
//! mean reduction the scorer applies to queries, so the accept/review
//! boundaries and query distances live on one scale.

use tracing::{debug, info};

use island_core::types::Thresholds;
use island_core::BuildFailure;

use crate::index::{Neighbor, VectorIndex};

/// Nearest-neighbour distance at or below which a query counts as a verbatim
/// canon match. Embedding a text alone and inside a padded batch agrees only
/// up to float rounding, which stays well below this bound.
pub const VERBATIM_DISTANCE: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub thresholds: Thresholds,
    pub mean_distance: f32,
    pub min_distance: f32,
    /// One reduced distance per chunk, in row order.
    pub samples: Vec<f32>,
}

/// Effective neighbour count for a corpus of `chunks` rows.
pub fn effective_k(requested: usize, chunks: usize) -> Result<usize, BuildFailure> {
    if chunks == 0 {
        return Err(BuildFailure::EmptyCorpus);
    }
    let k = requested.min(chunks - 1);
    if k < 1 {
        return Err(BuildFailure::TooFewChunks { chunks });
    }
    Ok(k)
}

/// Mean of the neighbour distances; a verbatim nearest match reduces to 0.
pub fn reduce_distances(neighbors: &[Neighbor]) -> f32 {
    match neighbors.first() {
        None => f32::INFINITY,
        Some(nearest) if nearest.distance <= VERBATIM_DISTANCE => 0.0,
        Some(_) => neighbors.iter().map(|n| n.distance).sum::<f32>() / neighbors.len() as f32,
    }
}

/// Linear interpolation between order statistics of an ascending slice.
pub fn percentile(sorted: &[f32], p: f64) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = (pos - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn calibrate(
    index: &VectorIndex,
    requested_k: usize,
    accept_percentile: f64,
    review_percentile: f64,
) -> Result<Calibration, BuildFailure> {
    let k = effective_k(requested_k, index.len())?;
    if k < requested_k {
        info!(requested_k, k, chunks = index.len(), "reduced k for small corpus");
    }

    let samples: Vec<f32> = (0..index.len())
        .map(|row| reduce_distances(&index.search_excluding(index.vectors().row(row), k, row)))
        .collect();

    let mut sorted = samples.clone();
    sorted.sort_by(f32::total_cmp);
    let max_distance = sorted[sorted.len() - 1];
    let accept_distance = percentile(&sorted, accept_percentile);
    let mut review_distance = percentile(&sorted, review_percentile);
    if review_distance <= accept_distance {
        if max_distance > accept_distance {
            debug!(accept_distance, max_distance, "review percentile collapsed onto accept; using max");
            review_distance = max_distance;
        } else {
            return Err(BuildFailure::DegenerateDistances);
        }
    }

    let thresholds = Thresholds { accept_distance, review_distance, max_distance, k };
    if !thresholds.is_ordered() {
        return Err(BuildFailure::DegenerateDistances);
    }
    let mean_distance = samples.iter().sum::<f32>() / samples.len() as f32;
    Ok(Calibration { thresholds, mean_distance, min_distance: sorted[0], samples })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates() {
        let s = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&s, 0.5), 2.0);
        assert!((percentile(&s, 0.95) - 3.8).abs() < 1e-6);
        assert_eq!(percentile(&s, 1.0), 4.0);
        assert_eq!(percentile(&[7.0], 0.3), 7.0);
    }

    #[test]
    fn k_is_reduced_then_rejected() {
        assert_eq!(effective_k(8, 100), Ok(8));
        assert_eq!(effective_k(8, 5), Ok(4));
        assert_eq!(effective_k(8, 1), Err(BuildFailure::TooFewChunks { chunks: 1 }));
        assert_eq!(effective_k(8, 0), Err(BuildFailure::EmptyCorpus));
    }

    #[test]
    fn verbatim_match_reduces_to_zero() {
        let hits = [Neighbor { row: 0, distance: 0.0 }, Neighbor { row: 1, distance: 0.8 }];
        assert_eq!(reduce_distances(&hits), 0.0);
        let hits = [Neighbor { row: 0, distance: 0.2 }, Neighbor { row: 1, distance: 0.6 }];
        assert!((reduce_distances(&hits) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn rounding_noise_on_a_verbatim_match_still_reduces_to_zero() {
        let hits = [Neighbor { row: 3, distance: 3e-5 }, Neighbor { row: 1, distance: 0.9 }];
        assert_eq!(reduce_distances(&hits), 0.0);
        let hits = [Neighbor { row: 3, distance: 2e-3 }, Neighbor { row: 1, distance: 0.9 }];
        assert!(reduce_distances(&hits) > 0.4);
    }
}
