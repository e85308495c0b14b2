//! Row-major embedding storage and the distance primitives used everywhere.
//!
//! All stored and query vectors are L2-normalized, so Euclidean distance is a
//! monotonic transform of cosine distance and always lies in `[0, 2]`.

use serde::{Deserialize, Serialize};

/// Largest possible distance between two unit vectors.
pub const MAX_UNIT_DISTANCE: f32 = 2.0;

/// N×D matrix stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(dim: usize) -> Self {
        Self { dim, data: Vec::new() }
    }

    pub fn with_capacity(dim: usize, rows: usize) -> Self {
        Self { dim, data: Vec::with_capacity(dim * rows) }
    }

    /// `rows` all-zero rows.
    pub fn zeros(dim: usize, rows: usize) -> Self {
        Self { dim, data: vec![0.0; dim * rows] }
    }

    /// Build from rows, which must all have length `dim`.
    pub fn from_rows(dim: usize, rows: &[Vec<f32>]) -> Result<Self, String> {
        let mut m = Self::with_capacity(dim, rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(format!("row {} has dimension {}, expected {}", i, row.len(), dim));
            }
            m.data.extend_from_slice(row);
        }
        Ok(m)
    }

    pub fn push(&mut self, row: &[f32]) {
        debug_assert_eq!(row.len(), self.dim);
        self.data.extend_from_slice(row);
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.dim..(i + 1) * self.dim]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim.max(1))
    }
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn normalized(mut v: Vec<f32>) -> Vec<f32> {
    l2_normalize(&mut v);
    v
}

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_and_distance() {
        let a = normalized(vec![3.0, 4.0]);
        assert!((a[0] - 0.6).abs() < 1e-6 && (a[1] - 0.8).abs() < 1e-6);
        let b = normalized(vec![-3.0, -4.0]);
        assert!((l2_distance(&a, &b) - MAX_UNIT_DISTANCE).abs() < 1e-6);
        assert_eq!(normalized(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn matrix_rows_round_trip() {
        let m = EmbeddingMatrix::from_rows(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.row(1), &[0.0, 1.0]);
        assert!(EmbeddingMatrix::from_rows(3, &[vec![1.0]]).is_err());
    }

    #[test]
    fn zeros_has_writable_rows() {
        let mut m = EmbeddingMatrix::zeros(3, 2);
        assert_eq!(m.len(), 2);
        m.row_mut(1)[2] = 5.0;
        assert_eq!(m.row(0), &[0.0, 0.0, 0.0]);
        assert_eq!(m.row(1), &[0.0, 0.0, 5.0]);
    }
}
