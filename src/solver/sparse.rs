//! Compressed sparse row matrix with a fixed pattern.
//!
//! The pressure system couples each node to itself and its mesh-edge
//! neighbours, so the sparsity pattern is known before any assembly and
//! never changes between steps. The pattern (row pointers and column
//! indices) is allocated once; per-step assembly only rewrites the value
//! array.

use faer::Mat;

/// Square CSR matrix. Column indices are sorted within each row.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Build the pattern from node adjacency: every row holds the diagonal
    /// plus the node's neighbours.
    pub fn from_node_adjacency(neighbors: &[Vec<usize>]) -> Self {
        let n = neighbors.len();
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        row_ptr.push(0);
        for (i, adjacent) in neighbors.iter().enumerate() {
            let mut row: Vec<usize> = adjacent.clone();
            row.push(i);
            row.sort_unstable();
            col_idx.extend_from_slice(&row);
            row_ptr.push(col_idx.len());
        }
        let nnz = col_idx.len();
        Self {
            n,
            row_ptr,
            col_idx,
            values: vec![0.0; nnz],
        }
    }

    /// Matrix dimension.
    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    /// The fixed pattern (row pointers, column indices).
    pub fn pattern(&self) -> (&[usize], &[usize]) {
        (&self.row_ptr, &self.col_idx)
    }

    /// Reset all values to zero, keeping the pattern.
    pub fn set_zero(&mut self) {
        self.values.fill(0.0);
    }

    /// Position of entry (i, j) in the value array, if it is in the
    /// pattern.
    #[inline]
    pub fn position(&self, i: usize, j: usize) -> Option<usize> {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()]
            .binary_search(&j)
            .ok()
            .map(|offset| range.start + offset)
    }

    /// Add to entry (i, j). The entry must be in the pattern.
    #[inline]
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        let pos = self
            .position(i, j)
            .unwrap_or_else(|| panic!("entry ({i}, {j}) is not in the sparsity pattern"));
        self.values[pos] += value;
    }

    /// Value of entry (i, j), zero if outside the pattern.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.position(i, j).map_or(0.0, |pos| self.values[pos])
    }

    /// Column indices and values of row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_idx[range.clone()], &self.values[range])
    }

    /// Mutable values of row `i` with their column indices.
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> (&[usize], &mut [f64]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_idx[range.clone()], &mut self.values[range])
    }

    /// y = A x.
    pub fn matvec(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n);
        debug_assert_eq!(y.len(), self.n);
        for i in 0..self.n {
            let (cols, vals) = self.row(i);
            let mut sum = 0.0;
            for (&j, &v) in cols.iter().zip(vals) {
                sum += v * x[j];
            }
            y[i] = sum;
        }
    }

    /// Maximum absolute asymmetry ‖A − Aᵀ‖_∞ over the pattern.
    pub fn max_asymmetry(&self) -> f64 {
        let mut max = 0.0f64;
        for i in 0..self.n {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                max = max.max((v - self.get(j, i)).abs());
            }
        }
        max
    }

    /// Maximum absolute entry.
    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }

    /// Dense copy, for the dense direct backend.
    pub fn to_dense(&self) -> Mat<f64> {
        let mut dense = Mat::zeros(self.n, self.n);
        for i in 0..self.n {
            let (cols, vals) = self.row(i);
            for (&j, &v) in cols.iter().zip(vals) {
                dense[(i, j)] = v;
            }
        }
        dense
    }

    /// Diagonal entries.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.get(i, i)).collect()
    }

    /// All stored entries as (row, col, value).
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.n).flat_map(move |i| {
            let (cols, vals) = self.row(i);
            cols.iter()
                .zip(vals)
                .map(move |(&j, &v)| (i, j, v))
                .collect::<Vec<_>>()
        })
    }
}
