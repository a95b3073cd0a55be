//! m/z (and retention-time) B-spline dictionary leaf construction.
//!
//! Each bin becomes one row of `A`; column `j` is the order-`k` uniform B-spline basis
//! function, translated to node `j`, evaluated and integrated over the bin's extent. The
//! density of nodes per unit is derived from the dyadic scale via [`GridInfo::mz_nodes_per_th`]
//! for the leading (m/z) dimension, carrying the `60.0 / 1.0033548378` constant from the
//! original seaMass command line (`original_source/commandline/seamass.cpp`), and via the plain
//! [`GridInfo::dyadic_nodes_per_unit`] for any further (retention-time) dimension, which carries
//! no such conversion factor.
//!
//! A leaf may span more than one dimension (e.g. m/z and retention time together): `A` is then
//! the tensor (Kronecker) product of the per-dimension one-dimensional dictionaries, flattened
//! to a single sparse matrix over the flattened bin and coefficient index spaces, the same way
//! [`crate::grid::GridInfo`] already generalizes scale/offset/extent to arbitrary dimension
//! counts.

use super::{BasisOp, NodeCore};
use crate::error::{Error, Result};
use crate::grid::GridInfo;
use crate::sparse::SparseMatrix;
use itertools::Itertools;

/// Quadrature resolution used to integrate a B-spline segment over one bin. Fixed rather than
/// adaptive: bins are narrow relative to the spline's support at any scale in practice.
const QUADRATURE_POINTS: usize = 32;

/// Evaluates the order-`k` uniform (cardinal) B-spline at `t`, supported on `[0, k + 1)`.
///
/// Implements the standard Cox-de Boor recursion for uniform integer knots:
/// `B_0(t) = 1` on `[0, 1)`, `B_k(t) = (t / k) B_{k-1}(t) + ((k + 1 - t) / k) B_{k-1}(t - 1)`.
fn bspline_basis(order: usize, t: f64) -> f64 {
    if order == 0 {
        return if (0.0..1.0).contains(&t) { 1.0 } else { 0.0 };
    }
    if t < 0.0 || t >= (order + 1) as f64 {
        return 0.0;
    }
    let k = order as f64;
    let left = (t / k) * bspline_basis(order - 1, t);
    let right = ((k + 1.0 - t) / k) * bspline_basis(order - 1, t - 1.0);
    left + right
}

/// Integrates `B_k(u - j)` over `[u_lo, u_hi]` via composite midpoint quadrature.
fn integrate_basis(order: usize, j: i64, u_lo: f64, u_hi: f64) -> f64 {
    if u_hi <= u_lo {
        return 0.0;
    }
    let step = (u_hi - u_lo) / QUADRATURE_POINTS as f64;
    let mut sum = 0.0;
    for i in 0..QUADRATURE_POINTS {
        let u = u_lo + step * (i as f64 + 0.5);
        sum += bspline_basis(order, u - j as f64);
    }
    sum * step
}

/// Per-dimension layout derived while assembling a leaf: the node spacing, the bin count, the
/// first B-spline node index, and the total node extent.
struct DimLayout {
    nodes_per_unit: f64,
    bin_count: usize,
    first_node: i64,
    extent: usize,
}

fn dim_layout(edges: &[f64], nodes_per_unit: f64, order: usize) -> Result<DimLayout> {
    if edges.len() < 2 {
        return Err(Error::Configuration(
            "b-spline leaf requires at least one bin".into(),
        ));
    }
    if edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::Configuration(
            "b-spline leaf bin edges must be strictly increasing".into(),
        ));
    }

    let bin_count = edges.len() - 1;

    let u_lo_global = edges[0] * nodes_per_unit;
    let u_hi_global = edges[edges.len() - 1] * nodes_per_unit;
    let first_node = u_lo_global.floor() as i64 - i64::try_from(order).unwrap();
    let last_node = u_hi_global.ceil() as i64 + i64::try_from(order).unwrap();
    let extent = usize::try_from(last_node - first_node).unwrap();

    Ok(DimLayout {
        nodes_per_unit,
        bin_count,
        first_node,
        extent,
    })
}

/// Per-bin, per-dimension non-zero `(column, weight)` pairs for one dimension's 1-D dictionary.
fn dim_row_weights(edges: &[f64], layout: &DimLayout, order: usize) -> Vec<Vec<(usize, f64)>> {
    (0..layout.bin_count)
        .map(|bin| {
            let u_lo = edges[bin] * layout.nodes_per_unit;
            let u_hi = edges[bin + 1] * layout.nodes_per_unit;
            let lo_col = (u_lo.floor() as i64 - i64::try_from(order).unwrap()).max(layout.first_node);
            let hi_col = (u_hi.ceil() as i64 + 1).min(layout.first_node + i64::try_from(layout.extent).unwrap());
            (lo_col..hi_col)
                .filter_map(|col| {
                    let weight = integrate_basis(
                        order,
                        col - layout.first_node,
                        u_lo - layout.first_node as f64,
                        u_hi - layout.first_node as f64,
                    );
                    (weight > 0.0)
                        .then_some((usize::try_from(col - layout.first_node).unwrap(), weight))
                })
                .collect()
        })
        .collect()
}

/// An m/z, retention-time, or tensor-product m/z-by-retention-time B-spline dictionary leaf.
#[derive(Clone, Debug)]
pub struct BsplineLeafNode {
    core: NodeCore,
    order: usize,
}

impl BsplineLeafNode {
    /// Builds a single-dimension leaf from sorted, non-degenerate bin edges
    /// (`edges.len() == bin_count + 1`), a dyadic scale, and a B-spline order (fixed at 3 by the
    /// caller in the common case).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `edges` has fewer than two entries or is not
    /// strictly increasing.
    pub fn new(
        edges: &[f64],
        scale: i16,
        order: usize,
        parent: Option<usize>,
        transient: bool,
    ) -> Result<Self> {
        Self::new_nd(&[edges], &[scale], order, parent, transient)
    }

    /// Builds a tensor-product leaf over `edges.len()` dimensions (e.g. `[mz_edges, rt_edges]`),
    /// one dyadic scale per dimension, and a shared B-spline order. `A` is the Kronecker product
    /// of each dimension's 1-D dictionary, flattened row-major over bins and columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `edges` and `scales` have mismatched lengths, or any
    /// dimension's edges are degenerate or non-monotone.
    pub fn new_nd(
        edges: &[&[f64]],
        scales: &[i16],
        order: usize,
        parent: Option<usize>,
        transient: bool,
    ) -> Result<Self> {
        if edges.is_empty() || edges.len() != scales.len() {
            return Err(Error::Configuration(
                "b-spline leaf requires matching edges and scales per dimension".into(),
            ));
        }

        // Dimension 0 is always m/z (the `60/1.0033548378` bspline-per-Th density); any further
        // dimension is retention time, whose density is the plain dyadic `2^scale` per second
        // (spec.md §4.1; original_source/commandline/seamass.cpp's `st_scale` help text carries
        // no such conversion factor).
        let layouts = edges
            .iter()
            .zip(scales)
            .enumerate()
            .map(|(dim, (e, &s))| {
                let nodes_per_unit = if dim == 0 {
                    GridInfo::mz_nodes_per_th(s)
                } else {
                    GridInfo::dyadic_nodes_per_unit(s)
                };
                dim_layout(e, nodes_per_unit, order)
            })
            .collect::<Result<Vec<_>>>()?;
        let dim_weights = edges
            .iter()
            .zip(&layouts)
            .map(|(e, layout)| dim_row_weights(e, layout, order))
            .collect::<Vec<_>>();

        let bin_counts: Vec<usize> = layouts.iter().map(|l| l.bin_count).collect();
        let extents: Vec<usize> = layouts.iter().map(|l| l.extent).collect();
        let total_bins: usize = bin_counts.iter().product();
        let total_cols: usize = extents.iter().product();

        let mut triples = Vec::new();
        for bin_tuple in bin_counts.iter().map(|&n| 0..n).multi_cartesian_product() {
            let row = flatten_index(&bin_tuple, &bin_counts);
            let per_dim_entries: Vec<&[(usize, f64)]> = bin_tuple
                .iter()
                .zip(&dim_weights)
                .map(|(&b, w)| w[b].as_slice())
                .collect();
            for combo in per_dim_entries
                .iter()
                .map(|entries| entries.iter())
                .multi_cartesian_product()
            {
                let cols: Vec<usize> = combo.iter().map(|&&(c, _)| c).collect();
                let weight: f64 = combo.iter().map(|&&(_, w)| w).product();
                let col = flatten_index(&cols, &extents);
                triples.push((row, col, weight));
            }
        }

        let a = SparseMatrix::from_coo(total_bins, total_cols, triples)?;
        let grid = GridInfo::new(
            scales.to_vec(),
            layouts
                .iter()
                .map(|l| usize::try_from(l.first_node).unwrap_or(0))
                .collect(),
            extents,
        );

        Ok(Self {
            core: NodeCore::new(a, grid, parent, transient),
            order,
        })
    }

    /// The B-spline order used by this leaf.
    #[must_use]
    pub const fn order(&self) -> usize {
        self.order
    }
}

/// Row-major flattening of a multi-index `idx` with per-dimension sizes `sizes`.
fn flatten_index(idx: &[usize], sizes: &[usize]) -> usize {
    let mut flat = 0;
    for (i, &size) in idx.iter().zip(sizes) {
        flat = flat * size + i;
    }
    flat
}

impl BasisOp for BsplineLeafNode {
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
    fn rejects_non_monotone_edges() {
        let err = BsplineLeafNode::new(&[1.0, 0.5, 2.0], 1, 3, None, false).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn rejects_single_edge() {
        let err = BsplineLeafNode::new(&[1.0], 1, 3, None, false).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn row_weights_are_non_negative_and_cover_support() {
        let edges: Vec<f64> = (0..=20).map(|i| 400.0 + f64::from(i) * 0.05).collect();
        let leaf = BsplineLeafNode::new(&edges, 1, 3, None, false).unwrap();
        for (_, _, v) in leaf.core.a().iter() {
            assert!(v >= 0.0);
        }
        assert!(leaf.core.a().nnz() > 0);
    }

    #[test]
    fn cardinal_basis_integrates_to_one_over_full_support() {
        // Integral of B_3 over its full support [0, 4) is exactly 1 (it's a density).
        let total = integrate_basis(3, 0, 0.0, 4.0);
        assert_approx_eq!(f64, total, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn two_dimensional_leaf_row_count_is_product_of_bin_counts() {
        let mz_edges: Vec<f64> = (0..=10).map(|i| 400.0 + f64::from(i) * 0.1).collect();
        let rt_edges: Vec<f64> = (0..=4).map(f64::from).collect();
        let leaf = BsplineLeafNode::new_nd(
            &[&mz_edges, &rt_edges],
            &[1, 1],
            3,
            None,
            false,
        )
        .unwrap();
        assert_eq!(leaf.core.a().rows(), 10 * 4);
    }

    #[test]
    fn flatten_index_is_row_major() {
        assert_eq!(flatten_index(&[1, 2], &[3, 4]), 1 * 4 + 2);
        assert_eq!(flatten_index(&[0, 0], &[5, 5]), 0);
    }
}
