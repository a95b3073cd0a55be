//! The basis pyramid: a directed acyclic graph of nodes, each owning a fixed sparse synthesis
//! matrix `A` (and its transpose) and implementing forward synthesis and adjoint analysis.
//!
//! Node kinds are unified behind one dispatched trait with `enum_dispatch`, the same way
//! `pineappl::subgrid::SubgridEnum` unifies its several subgrid storage strategies — callers
//! hold a `BasisNode` and never match on which concrete kind they have.

mod group;
mod leaf;
mod matrix;
mod scale;

pub mod pyramid;

pub use group::{GroupNode, GroupReduction};
pub use leaf::BsplineLeafNode;
pub use matrix::MatrixNode;
pub use pyramid::Pyramid;
pub use scale::ScaleNode;

use crate::grid::GridInfo;
use crate::sparse::SparseMatrix;
use enum_dispatch::enum_dispatch;

/// Shared capability set every basis node exposes, dispatched over the concrete node kind.
#[enum_dispatch]
pub trait BasisOp {
    /// The grid descriptor of this node's own coefficient space.
    fn grid_info(&self) -> &GridInfo;

    /// Whether this node's coefficients are excluded from the shrinkage update and from the
    /// reported output (a pure pipeline stage).
    fn is_transient(&self) -> bool;

    /// Index of this node's parent in the owning [`Pyramid`], or `None` for the root.
    fn parent(&self) -> Option<usize>;

    /// Cached column sums of `A` (`A^T . 1`), the L1 back-pressure vector.
    fn l1(&self) -> &[f64];

    /// Size of this node's own coefficient space (columns of `A`).
    fn input_len(&self) -> usize;

    /// Size of the parent's coefficient space this node synthesizes into (rows of `A`).
    fn output_len(&self) -> usize;

    /// `f := A . x` if `accumulate` is false, else `f += A . x`.
    fn synthesize(&self, x: &[f64], accumulate: bool, f: &mut [f64]);

    /// `x_err := A^T . f_err`, using the element-wise square of `A` when `squared` is set.
    fn analyze(&self, f_err: &[f64], squared: bool, x_err: &mut [f64]);
}

/// Shared state and behavior common to every basis node kind: the matrix pair, cached L1
/// vector, grid descriptor, and parent link. Concrete node types hold one of these and
/// delegate their [`BasisOp`] methods to it.
#[derive(Clone, Debug)]
pub(crate) struct NodeCore {
    a: SparseMatrix,
    a_t: SparseMatrix,
    l1: Vec<f64>,
    grid: GridInfo,
    parent: Option<usize>,
    transient: bool,
}

impl NodeCore {
    pub(crate) fn new(a: SparseMatrix, grid: GridInfo, parent: Option<usize>, transient: bool) -> Self {
        let a_t = a.transpose();
        let l1 = a.column_sums();
        Self {
            a,
            a_t,
            l1,
            grid,
            parent,
            transient,
        }
    }

    pub(crate) fn a(&self) -> &SparseMatrix {
        &self.a
    }

    pub(crate) fn grid_info(&self) -> &GridInfo {
        &self.grid
    }

    pub(crate) fn is_transient(&self) -> bool {
        self.transient
    }

    pub(crate) fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub(crate) fn l1(&self) -> &[f64] {
        &self.l1
    }

    pub(crate) fn input_len(&self) -> usize {
        self.a.cols()
    }

    pub(crate) fn output_len(&self) -> usize {
        self.a.rows()
    }

    pub(crate) fn synthesize(&self, x: &[f64], accumulate: bool, f: &mut [f64]) {
        if accumulate {
            self.a.mul_dense_accumulate(x, f);
        } else {
            f.copy_from_slice(&self.a.mul_dense(x));
        }
    }

    pub(crate) fn analyze(&self, f_err: &[f64], squared: bool, x_err: &mut [f64]) {
        let out = if squared {
            self.a.squared().transpose().mul_dense(f_err)
        } else {
            self.a_t.mul_dense(f_err)
        };
        x_err.copy_from_slice(&out);
    }
}

/// Sum type over the four basis node kinds of spec.md's redesign note: a caller-supplied
/// sparse matrix, an m/z (or retention-time) B-spline leaf, a dyadic half-resolution scale
/// node, and a channel-aggregation group node.
#[enum_dispatch(BasisOp)]
#[derive(Clone, Debug)]
pub enum BasisNode {
    /// A node built directly from a caller-supplied sparse matrix (e.g. the ingester's
    /// already-assembled bin-space dictionary).
    Matrix(MatrixNode),
    /// An m/z or retention-time B-spline dictionary leaf.
    BsplineLeaf(BsplineLeafNode),
    /// A dyadic half-resolution refinement node.
    BsplineScale(ScaleNode),
    /// A channel-aggregation node.
    Group(GroupNode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_analyze_matches_manual_squared_transpose() {
        let a = SparseMatrix::from_coo(2, 2, [(0, 0, 2.0), (0, 1, 3.0), (1, 1, 4.0)]).unwrap();
        let grid = GridInfo::new(vec![0], vec![0], vec![2]);
        let node = MatrixNode::new(2, 2, a.iter(), grid, None, false).unwrap();

        let f_err = vec![1.0, 2.0];
        let mut x_err = vec![0.0; 2];
        node.analyze(&f_err, true, &mut x_err);

        let expected = a.squared().transpose().mul_dense(&f_err);
        assert_eq!(x_err, expected);
    }

    #[test]
    fn unsquared_analyze_is_plain_transpose_product() {
        let a = SparseMatrix::from_coo(2, 2, [(0, 0, 2.0), (1, 0, 1.0), (1, 1, 5.0)]).unwrap();
        let grid = GridInfo::new(vec![0], vec![0], vec![2]);
        let node = MatrixNode::new(2, 2, a.iter(), grid, None, false).unwrap();

        let f_err = vec![3.0, 1.0];
        let mut x_err = vec![0.0; 2];
        node.analyze(&f_err, false, &mut x_err);

        let expected = a.transpose().mul_dense(&f_err);
        assert_eq!(x_err, expected);
    }
}
