//! Nearest-neighbour index over a world's chunk embeddings.
//!
//! Small worlds use exact (flat) search. Larger worlds use an inverted-file
//! (IVF) layout: spherical k-means partitions the vectors into `nlist` lists
//! and a query ranks only the lists behind its `nprobe` nearest centroids.
//! Build is one-shot; adding a chunk means rebuilding.
//!
//! Results are ascending by distance, ties broken by ascending row.

use serde::{Deserialize, Serialize};
use tracing::debug;

use island_core::config::IndexConfig;

use crate::distance::{l2_distance, l2_normalize, EmbeddingMatrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Flat,
    Ivf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfParams {
    pub nlist: usize,
    pub nprobe: usize,
    pub iterations: usize,
}

/// Derive IVF parameters from the corpus size; explicit config values win.
pub fn compute_ivf_params(total: usize, config: &IndexConfig) -> IvfParams {
    let auto_nlist = ((total as f64).sqrt().round() as usize).max(1);
    let nlist = if config.nlist > 0 { config.nlist } else { auto_nlist };
    // Clamp nlist to the number of vectors for tiny datasets
    let nlist = nlist.min(total).max(1);
    let auto_nprobe = ((nlist as f64).sqrt().ceil() as usize).max(1);
    let nprobe = if config.nprobe > 0 { config.nprobe } else { auto_nprobe }.min(nlist);
    IvfParams { nlist, nprobe, iterations: config.kmeans_iterations.max(1) }
}

#[derive(Debug, Clone)]
struct InvertedLists {
    centroids: EmbeddingMatrix,
    assignments: Vec<u32>,
    lists: Vec<Vec<usize>>,
    nprobe: usize,
}

impl InvertedLists {
    fn from_assignments(centroids: EmbeddingMatrix, assignments: Vec<u32>, nprobe: usize) -> Self {
        let mut lists = vec![Vec::new(); centroids.len()];
        for (row, &list) in assignments.iter().enumerate() {
            lists[list as usize].push(row);
        }
        Self { centroids, assignments, lists, nprobe }
    }
}

/// Immutable index that owns the normalized embedding matrix it searches.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    vectors: EmbeddingMatrix,
    ivf: Option<InvertedLists>,
}

impl VectorIndex {
    /// Exact search over every row.
    pub fn flat(vectors: EmbeddingMatrix) -> Self {
        Self { vectors, ivf: None }
    }

    /// Flat below `config.flat_threshold` rows, IVF otherwise.
    pub fn build(vectors: EmbeddingMatrix, config: &IndexConfig) -> Self {
        if vectors.len() < config.flat_threshold.max(1) {
            debug!(rows = vectors.len(), "building flat index");
            return Self::flat(vectors);
        }
        let params = compute_ivf_params(vectors.len(), config);
        debug!(rows = vectors.len(), nlist = params.nlist, nprobe = params.nprobe, "building IVF index");
        let centroids = train_centroids(&vectors, params.nlist, params.iterations);
        let assignments = vectors.rows().map(|v| nearest_centroid(&centroids, v)).collect();
        Self { ivf: Some(InvertedLists::from_assignments(centroids, assignments, params.nprobe)), vectors }
    }

    /// Reassemble a persisted IVF layout.
    pub fn from_layout(
        vectors: EmbeddingMatrix,
        centroids: EmbeddingMatrix,
        assignments: Vec<u32>,
        nprobe: usize,
    ) -> Result<Self, String> {
        if assignments.len() != vectors.len() {
            return Err(format!("{} assignments for {} vectors", assignments.len(), vectors.len()));
        }
        if centroids.dim() != vectors.dim() {
            return Err(format!("centroid dimension {} != vector dimension {}", centroids.dim(), vectors.dim()));
        }
        if let Some(bad) = assignments.iter().find(|&&a| a as usize >= centroids.len()) {
            return Err(format!("assignment {} out of range for {} lists", bad, centroids.len()));
        }
        let nprobe = nprobe.clamp(1, centroids.len().max(1));
        Ok(Self { ivf: Some(InvertedLists::from_assignments(centroids, assignments, nprobe)), vectors })
    }

    pub fn kind(&self) -> IndexKind {
        if self.ivf.is_some() { IndexKind::Ivf } else { IndexKind::Flat }
    }

    pub fn len(&self) -> usize { self.vectors.len() }

    pub fn is_empty(&self) -> bool { self.vectors.is_empty() }

    pub fn dim(&self) -> usize { self.vectors.dim() }

    pub fn vectors(&self) -> &EmbeddingMatrix { &self.vectors }

    pub fn centroids(&self) -> Option<&EmbeddingMatrix> {
        self.ivf.as_ref().map(|ivf| &ivf.centroids)
    }

    /// IVF list id per row, aligned with the vectors.
    pub fn assignments(&self) -> Option<&[u32]> {
        self.ivf.as_ref().map(|ivf| ivf.assignments.as_slice())
    }

    pub fn nprobe(&self) -> usize {
        self.ivf.as_ref().map_or(0, |ivf| ivf.nprobe)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        self.search_inner(query, k, None)
    }

    /// Like [`search`](Self::search) but never returns `exclude`; used for
    /// leave-one-out queries where a row must not be its own neighbour.
    pub fn search_excluding(&self, query: &[f32], k: usize, exclude: usize) -> Vec<Neighbor> {
        self.search_inner(query, k, Some(exclude))
    }

    /// Brute-force search regardless of layout. The correctness oracle.
    pub fn exact_search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let hits = (0..self.vectors.len())
            .map(|row| Neighbor { row, distance: l2_distance(query, self.vectors.row(row)) })
            .collect();
        rank(hits, k)
    }

    fn search_inner(&self, query: &[f32], k: usize, exclude: Option<usize>) -> Vec<Neighbor> {
        if k == 0 || self.vectors.is_empty() {
            return Vec::new();
        }
        let keep = |row: &usize| Some(*row) != exclude;
        let Some(ivf) = &self.ivf else {
            let hits = (0..self.vectors.len())
                .filter(keep)
                .map(|row| Neighbor { row, distance: l2_distance(query, self.vectors.row(row)) })
                .collect();
            return rank(hits, k);
        };
        let probes = rank(
            ivf.centroids
                .rows()
                .enumerate()
                .map(|(row, c)| Neighbor { row, distance: l2_distance(query, c) })
                .collect(),
            ivf.centroids.len(),
        );
        let mut candidates = Vec::new();
        for (probed, list) in probes.iter().enumerate() {
            // widen past nprobe until k candidates exist
            if probed >= ivf.nprobe && candidates.len() >= k {
                break;
            }
            candidates.extend(ivf.lists[list.row].iter().copied().filter(keep));
        }
        let hits = candidates
            .into_iter()
            .map(|row| Neighbor { row, distance: l2_distance(query, self.vectors.row(row)) })
            .collect();
        rank(hits, k)
    }

    /// Fraction of exact top-k rows the index returns, over `sample` evenly
    /// strided rows used as queries. Always 1.0 for a flat index.
    pub fn recall_at_k(&self, sample: usize, k: usize) -> f32 {
        if self.ivf.is_none() || self.vectors.is_empty() || sample == 0 || k == 0 {
            return 1.0;
        }
        let n = self.vectors.len();
        let sample = sample.min(n);
        let (mut found, mut expected) = (0usize, 0usize);
        for s in 0..sample {
            let query = self.vectors.row(s * n / sample);
            let truth = self.exact_search(query, k);
            let got = self.search(query, k);
            expected += truth.len();
            found += truth.iter().filter(|t| got.iter().any(|g| g.row == t.row)).count();
        }
        if expected == 0 { 1.0 } else { found as f32 / expected as f32 }
    }
}

fn rank(mut hits: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    let by_distance = |a: &Neighbor, b: &Neighbor| a.distance.total_cmp(&b.distance).then(a.row.cmp(&b.row));
    if hits.len() > k && k > 0 {
        hits.select_nth_unstable_by(k - 1, by_distance);
        hits.truncate(k);
    }
    hits.sort_by(by_distance);
    hits.truncate(k);
    hits
}

fn nearest_centroid(centroids: &EmbeddingMatrix, v: &[f32]) -> u32 {
    let mut best = (0u32, f32::INFINITY);
    for (i, c) in centroids.rows().enumerate() {
        let d = l2_distance(v, c);
        if d < best.1 {
            best = (i as u32, d);
        }
    }
    best.0
}

/// Spherical k-means with evenly strided initial centroids. Deterministic:
/// the same vectors always produce the same centroids.
fn train_centroids(vectors: &EmbeddingMatrix, nlist: usize, iterations: usize) -> EmbeddingMatrix {
    let (n, dim) = (vectors.len(), vectors.dim());
    let mut centroids = EmbeddingMatrix::with_capacity(dim, nlist);
    for c in 0..nlist {
        centroids.push(vectors.row(c * n / nlist));
    }
    for _ in 0..iterations {
        let mut sums = EmbeddingMatrix::zeros(dim, nlist);
        let mut counts = vec![0usize; nlist];
        for v in vectors.rows() {
            let c = nearest_centroid(&centroids, v) as usize;
            counts[c] += 1;
            for (s, x) in sums.row_mut(c).iter_mut().zip(v) {
                *s += x;
            }
        }
        for (c, &count) in counts.iter().enumerate() {
            // an emptied list keeps its previous centroid
            if count == 0 {
                continue;
            }
            let mean = sums.row_mut(c);
            l2_normalize(mean);
            centroids.row_mut(c).copy_from_slice(mean);
        }
    }
    centroids
}
