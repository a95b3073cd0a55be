//! Dyadic half-resolution scale node.
//!
//! Grounded line-for-line in `original_source/core/BasisBsplineScale.cpp`: the half-sample
//! refinement kernel of an order-`k` B-spline is the normalized binomial row
//! `h[i] = C(k + 1, i) / 2^k`, and column `j` of the child maps to rows
//! `2j + i - offset` of the parent (rows outside the parent's extent are skipped).

use super::{BasisOp, NodeCore};
use crate::error::Result;
use crate::grid::GridInfo;
use crate::sparse::SparseMatrix;

fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut result = 1.0_f64;
    for i in 0..k {
        result = result * (n - i) as f64 / (i + 1) as f64;
    }
    result
}

/// The half-sample refinement kernel `h[i] = C(order + 1, i) / 2^order`, `i` in `0..=order + 1`.
/// Unnormalized: the terms sum to `2^(order + 1) / 2^order = 2`, not 1, which is what makes each
/// interior row of the assembled `A` (two kernel copies overlapping per child column) sum to one.
fn refinement_kernel(order: usize) -> Vec<f64> {
    let n = order + 1;
    let denom = 2f64.powi(i32::try_from(order).unwrap());
    (0..=n).map(|i| binomial(n, i) / denom).collect()
}

/// A node one dyadic level coarser than its parent along a single dimension.
#[derive(Clone, Debug)]
pub struct ScaleNode {
    core: NodeCore,
    dimension: usize,
}

impl ScaleNode {
    /// Builds the scale node one level coarser than `parent_grid` along `dimension`, for a
    /// B-spline of the given `order`.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived child extent collapses to zero or the assembled matrix
    /// is otherwise invalid (see [`SparseMatrix::from_coo`]).
    pub fn new(
        parent_grid: &GridInfo,
        dimension: usize,
        order: usize,
        parent: usize,
        transient: bool,
    ) -> Result<Self> {
        let child_grid = parent_grid.coarsen(dimension, order);

        let kernel = refinement_kernel(order);
        let parent_extent = parent_grid.extent()[dimension];
        let child_extent = child_grid.extent()[dimension];

        let offset = i64::try_from(order).unwrap()
            + (i64::try_from(parent_grid.offset()[dimension]).unwrap() + 1).rem_euclid(2);

        let mut triples = Vec::new();
        for j in 0..child_extent {
            for (i, &h) in kernel.iter().enumerate() {
                let row = 2 * i64::try_from(j).unwrap() + i64::try_from(i).unwrap() - offset;
                if row < 0 || row >= i64::try_from(parent_extent).unwrap() {
                    continue;
                }
                triples.push((usize::try_from(row).unwrap(), j, h));
            }
        }

        let a = SparseMatrix::from_coo(parent_extent, child_extent, triples)?;

        Ok(Self {
            core: NodeCore::new(a, child_grid, Some(parent), transient),
            dimension,
        })
    }

    /// The dimension this node refines.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }
}

impl BasisOp for ScaleNode {
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

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn refinement_kernel_sums_to_two() {
        for order in 0..=4 {
            let kernel = refinement_kernel(order);
            let sum: f64 = kernel.iter().sum();
            assert_approx_eq!(f64, sum, 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn interior_rows_of_a_sum_to_one() {
        let parent = GridInfo::new(vec![3], vec![0], vec![40]);
        let node = ScaleNode::new(&parent, 0, 3, 0, false).unwrap();
        let a = node.core.a();
        let mut row_sums = vec![0.0; a.rows()];
        for (r, _, v) in a.iter() {
            row_sums[r] += v;
        }
        // boundary-clipped rows may sum to less than one; interior rows must sum to one.
        for (r, &sum) in row_sums.iter().enumerate() {
            if r > 4 && r < a.rows() - 4 && sum > 0.0 {
                assert_approx_eq!(f64, sum, 1.0, epsilon = 1e-6);
            }
        }
    }
}
