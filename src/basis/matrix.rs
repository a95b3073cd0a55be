//! A basis node built directly from a caller-supplied sparse matrix, with no further
//! derivation. Used for the root of the pyramid when the ingester has already assembled the
//! bin-space dictionary (the `BasisMatrix` case of `original_source/asrl/Asrl.cpp`, built from
//! `input.aVs`/`aIs`/`aJs` COO triples).

use super::{BasisOp, NodeCore};
use crate::error::Result;
use crate::grid::GridInfo;
use crate::sparse::SparseMatrix;

/// A node whose synthesis matrix is supplied whole by the caller rather than derived.
#[derive(Clone, Debug)]
pub struct MatrixNode {
    core: NodeCore,
}

impl MatrixNode {
    /// Builds a node from COO triples `(row, col, value)` of shape `rows x cols`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Configuration`] if any entry is negative or out of
    /// bounds (see [`SparseMatrix::from_coo`]).
    pub fn new(
        rows: usize,
        cols: usize,
        triples: impl IntoIterator<Item = (usize, usize, f64)>,
        grid: GridInfo,
        parent: Option<usize>,
        transient: bool,
    ) -> Result<Self> {
        let a = SparseMatrix::from_coo(rows, cols, triples)?;
        Ok(Self {
            core: NodeCore::new(a, grid, parent, transient),
        })
    }
}

impl BasisOp for MatrixNode {
    fn grid_info(&self) -> &GridInfo {
        self.core.grid_info()
    }

    fn is_transient(&self) -> bool {
        self.core.is_transient()
    }

    fn parent(&self) -> Option<usize> {
        self.core.parent()
    }

    fn l1(&self) -> &[f64] {
        self.core.l1()
    }

    fn input_len(&self) -> usize {
        self.core.input_len()
    }

    fn output_len(&self) -> usize {
        self.core.output_len()
    }

    fn synthesize(&self, x: &[f64], accumulate: bool, f: &mut [f64]) {
        self.core.synthesize(x, accumulate, f);
    }

    fn analyze(&self, f_err: &[f64], squared: bool, x_err: &mut [f64]) {
        self.core.analyze(f_err, squared, x_err);
    }
}
