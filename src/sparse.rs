//! A minimal sparse matrix primitive implementing the contract the rest of this crate is built
//! on: construction from COO triples, multiplication with optional transpose, element-wise
//! arithmetic, shrinkage-style pruning, and dense export. Every basis node, and the optimizer
//! state that rides on top of it, goes through this type — nothing in [`crate::basis`] or
//! [`crate::optimizer`] touches raw `Vec<f64>` row/column storage directly.
//!
//! Values are always non-negative `f64`; rows are compressed (CSR: `row_ptr` / `col_idx` /
//! `values`), which matches the access pattern of both synthesis (row-major scan) and analysis
//! (via the cached transpose).

use crate::error::{Error, Result};
use std::mem;

/// A sparse matrix in compressed-row form, restricted to non-negative values.
///
/// Two square-brackets operations are deliberately absent: there is no `Index`/`IndexMut` by
/// `(row, col)`. Every basis node builds its `A` once, from COO triples, and afterwards only
/// multiplies, prunes, or exports it — per-entry mutation is not part of the contract (see
/// spec §6.1).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Builds a matrix of shape `rows x cols` from unordered COO triples `(row, col, value)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any value is negative, or if any index is out of
    /// bounds.
    pub fn from_coo(
        rows: usize,
        cols: usize,
        triples: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Result<Self> {
        let mut by_row: Vec<Vec<(usize, f64)>> = vec![Vec::new(); rows];

        for (r, c, v) in triples {
            if v < 0.0 {
                return Err(Error::Configuration(format!(
                    "sparse matrix entry ({r}, {c}) is negative: {v}"
                )));
            }
            if r >= rows || c >= cols {
                return Err(Error::Configuration(format!(
                    "sparse matrix entry ({r}, {c}) is out of bounds for a {rows}x{cols} matrix"
                )));
            }
            if v != 0.0 {
                by_row[r].push((c, v));
            }
        }

        let mut row_ptr = Vec::with_capacity(rows + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();

        row_ptr.push(0);
        for mut entries in by_row {
            entries.sort_unstable_by_key(|&(c, _)| c);
            for (c, v) in entries {
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }

        Ok(Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        })
    }

    /// Builds a matrix from a dense row-major slice, dropping zero entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any value is negative or `data.len() != rows * cols`.
    pub fn from_dense(rows: usize, cols: usize, data: &[f64]) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::Configuration(format!(
                "expected {} entries for a {rows}x{cols} matrix, got {}",
                rows * cols,
                data.len()
            )));
        }
        Self::from_coo(
            rows,
            cols,
            data.iter()
                .enumerate()
                .map(|(i, &v)| (i / cols, i % cols, v)),
        )
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the structurally non-zero entry count.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Approximate occupied bytes (values plus index overhead).
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.values.len() * mem::size_of::<f64>()
            + (self.col_idx.len() + self.row_ptr.len()) * mem::size_of::<usize>()
    }

    /// Returns an iterator over `(row, col, value)` triples in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.row_ptr
            .windows(2)
            .enumerate()
            .flat_map(move |(r, w)| {
                (w[0]..w[1]).map(move |k| (r, self.col_idx[k], self.values[k]))
            })
    }

    /// Returns an iterator over `(col, value)` pairs for a single row.
    pub fn row(&self, r: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (start, end) = (self.row_ptr[r], self.row_ptr[r + 1]);
        (start..end).map(move |k| (self.col_idx[k], self.values[k]))
    }

    /// Exports this matrix to a dense row-major vector.
    #[must_use]
    pub fn to_dense(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.rows * self.cols];
        for (r, c, v) in self.iter() {
            out[r * self.cols + c] = v;
        }
        out
    }

    /// Returns the transpose of this matrix.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut by_row: Vec<Vec<(usize, f64)>> = vec![Vec::new(); self.cols];
        for (r, c, v) in self.iter() {
            by_row[c].push((r, v));
        }

        let mut row_ptr = Vec::with_capacity(self.cols + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for mut entries in by_row {
            entries.sort_unstable_by_key(|&(c, _)| c);
            for (c, v) in entries {
                col_idx.push(c);
                values.push(v);
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            rows: self.cols,
            cols: self.rows,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Returns the element-wise square of this matrix (used for the L2 back-pressure term).
    #[must_use]
    pub fn squared(&self) -> Self {
        Self {
            values: self.values.iter().map(|v| v * v).collect(),
            ..self.clone()
        }
    }

    /// Adds `scalar` to every structurally stored entry, leaving implicit zeros untouched (the
    /// contract's "add-scalar": a dense add would densify the matrix, which no caller of this
    /// primitive needs).
    ///
    /// # Panics
    ///
    /// Panics if `scalar` is negative and would make a stored entry negative.
    #[must_use]
    pub fn add_scalar(&self, scalar: f64) -> Self {
        let values = self
            .values
            .iter()
            .map(|v| {
                let sum = v + scalar;
                assert!(sum >= 0.0, "add_scalar produced a negative entry");
                sum
            })
            .collect();
        Self {
            values,
            ..self.clone()
        }
    }

    /// Element-wise product of two matrices of identical shape. Entries are non-zero only where
    /// both operands are (multiplying by an implicit zero yields zero).
    ///
    /// # Panics
    ///
    /// Panics if `self` and `other` have different shapes.
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        assert_eq!((self.rows, self.cols), (other.rows, other.cols));
        let mut triples = Vec::new();
        for r in 0..self.rows {
            let mut rhs: Vec<(usize, f64)> = other.row(r).collect();
            rhs.sort_unstable_by_key(|&(c, _)| c);
            for (c, v) in self.row(r) {
                if let Ok(i) = rhs.binary_search_by_key(&c, |&(rc, _)| rc) {
                    triples.push((r, c, v * rhs[i].1));
                }
            }
        }
        Self::from_coo(self.rows, self.cols, triples)
            .expect("element-wise product of non-negative matrices is non-negative")
    }

    /// Element-wise quotient of two matrices of identical shape. Where the divisor has an
    /// implicit zero the quotient is taken to be zero rather than propagating a division by
    /// zero, matching the bin-space error ratio's zero-safe convention (spec.md §4.2 step 2).
    ///
    /// # Panics
    ///
    /// Panics if `self` and `other` have different shapes.
    #[must_use]
    pub fn divide(&self, other: &Self) -> Self {
        assert_eq!((self.rows, self.cols), (other.rows, other.cols));
        let mut triples = Vec::new();
        for r in 0..self.rows {
            let mut rhs: Vec<(usize, f64)> = other.row(r).collect();
            rhs.sort_unstable_by_key(|&(c, _)| c);
            for (c, v) in self.row(r) {
                if let Ok(i) = rhs.binary_search_by_key(&c, |&(rc, _)| rc) {
                    let denom = rhs[i].1;
                    if denom != 0.0 {
                        triples.push((r, c, v / denom));
                    }
                }
            }
        }
        Self::from_coo(self.rows, self.cols, triples)
            .expect("element-wise quotient of non-negative matrices is non-negative")
    }

    /// Structurally removes every entry whose value is below `threshold`, reclaiming its storage
    /// (spec.md's prune: "structural removal of sub-threshold coefficients to reclaim memory").
    #[must_use]
    pub fn prune(&self, threshold: f64) -> Self {
        let triples = self
            .iter()
            .filter(|&(_, _, v)| v >= threshold)
            .collect::<Vec<_>>();
        Self::from_coo(self.rows, self.cols, triples)
            .expect("pruning a non-negative matrix stays non-negative")
    }

    /// Dense matrix-vector product `self * x`, where `x` is a dense vector of length `self.cols`.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != self.cols()`.
    #[must_use]
    pub fn mul_dense(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.cols, "dimension mismatch in mul_dense");
        let mut out = vec![0.0; self.rows];
        for (r, c, v) in self.iter() {
            out[r] += v * x[c];
        }
        out
    }

    /// Dense matrix-vector product `self * x`, accumulating into `out` instead of overwriting.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != self.cols()` or `out.len() != self.rows()`.
    pub fn mul_dense_accumulate(&self, x: &[f64], out: &mut [f64]) {
        assert_eq!(x.len(), self.cols, "dimension mismatch in mul_dense_accumulate");
        assert_eq!(out.len(), self.rows, "output dimension mismatch");
        for (r, c, v) in self.iter() {
            out[r] += v * x[c];
        }
    }

    /// Column sums `A^T . 1`, used as the cached L1 back-pressure vector.
    #[must_use]
    pub fn column_sums(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.cols];
        for (_, c, v) in self.iter() {
            out[c] += v;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_coo_rejects_negative() {
        let err = SparseMatrix::from_coo(2, 2, [(0, 0, -1.0)]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn from_coo_rejects_out_of_bounds() {
        let err = SparseMatrix::from_coo(2, 2, [(2, 0, 1.0)]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn round_trip_dense() {
        let dense = vec![1.0, 0.0, 0.0, 2.0, 0.0, 3.0];
        let m = SparseMatrix::from_dense(2, 3, &dense).unwrap();
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.to_dense(), dense);
    }

    #[test]
    fn transpose_consistency() {
        let m = SparseMatrix::from_coo(2, 3, [(0, 0, 1.0), (0, 2, 2.0), (1, 1, 3.0)]).unwrap();
        let mt = m.transpose();
        assert_eq!(mt.rows(), 3);
        assert_eq!(mt.cols(), 2);
        assert_eq!(mt.to_dense(), vec![1.0, 0.0, 0.0, 3.0, 2.0, 0.0]);
    }

    #[test]
    fn mul_dense_matches_manual() {
        let m = SparseMatrix::from_coo(2, 2, [(0, 0, 1.0), (0, 1, 2.0), (1, 1, 3.0)]).unwrap();
        assert_eq!(m.mul_dense(&[1.0, 1.0]), vec![3.0, 3.0]);
    }

    #[test]
    fn column_sums_are_l1_vector() {
        let m = SparseMatrix::from_coo(2, 2, [(0, 0, 1.0), (1, 0, 2.0), (1, 1, 3.0)]).unwrap();
        assert_eq!(m.column_sums(), vec![3.0, 3.0]);
    }

    #[test]
    fn add_scalar_only_touches_stored_entries() {
        let m = SparseMatrix::from_coo(1, 3, [(0, 1, 2.0)]).unwrap();
        let out = m.add_scalar(1.0);
        assert_eq!(out.to_dense(), vec![0.0, 3.0, 0.0]);
        assert_eq!(out.nnz(), 1);
    }

    #[test]
    fn multiply_keeps_only_shared_entries() {
        let a = SparseMatrix::from_coo(1, 3, [(0, 0, 2.0), (0, 1, 3.0)]).unwrap();
        let b = SparseMatrix::from_coo(1, 3, [(0, 1, 4.0), (0, 2, 5.0)]).unwrap();
        assert_eq!(a.multiply(&b).to_dense(), vec![0.0, 12.0, 0.0]);
    }

    #[test]
    fn divide_treats_missing_divisor_entries_as_zero_ratio() {
        let a = SparseMatrix::from_coo(1, 2, [(0, 0, 4.0), (0, 1, 6.0)]).unwrap();
        let b = SparseMatrix::from_coo(1, 2, [(0, 0, 2.0)]).unwrap();
        assert_eq!(a.divide(&b).to_dense(), vec![2.0, 0.0]);
    }

    #[test]
    fn prune_removes_sub_threshold_entries() {
        let m = SparseMatrix::from_coo(1, 3, [(0, 0, 0.0005), (0, 1, 5.0), (0, 2, 0.1)]).unwrap();
        let pruned = m.prune(0.01);
        assert_eq!(pruned.nnz(), 2);
        assert_eq!(pruned.to_dense(), vec![0.0, 5.0, 0.1]);
    }
}
