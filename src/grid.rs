//! Grid descriptors for a single dyadic scale level of a B-spline basis.
//!
//! Every node in the [`crate::basis`] pyramid owns a `GridInfo` describing, per dimension, the
//! scale (dyadic refinement level relative to the finest), the coefficient offset, and the
//! coefficient extent. The leaf-to-root (fine-to-coarse) derivation halves resolution and is
//! implemented once here as [`GridInfo::coarsen`] rather than duplicated in every basis
//! constructor.

use crate::convert::{f64_from_usize, usize_from_f64};

/// Per-dimension grid descriptor for one scale level of a basis pyramid.
///
/// `scale[d]` is the dyadic level of dimension `d` (larger is coarser), `offset[d]` is the index
/// of the first coefficient relative to scale zero, and `extent[d]` is the number of
/// coefficients along that dimension. `count` is always `extent.iter().product()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridInfo {
    scale: Vec<i16>,
    offset: Vec<usize>,
    extent: Vec<usize>,
}

impl GridInfo {
    /// Builds a grid descriptor directly from per-dimension scale, offset and extent.
    ///
    /// # Panics
    ///
    /// Panics if the three slices have different lengths.
    #[must_use]
    pub fn new(scale: Vec<i16>, offset: Vec<usize>, extent: Vec<usize>) -> Self {
        assert_eq!(scale.len(), offset.len());
        assert_eq!(scale.len(), extent.len());
        Self {
            scale,
            offset,
            extent,
        }
    }

    /// Number of dimensions.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.extent.len()
    }

    /// Dyadic scale of each dimension.
    #[must_use]
    pub fn scale(&self) -> &[i16] {
        &self.scale
    }

    /// Coefficient offset of each dimension.
    #[must_use]
    pub fn offset(&self) -> &[usize] {
        &self.offset
    }

    /// Coefficient extent of each dimension.
    #[must_use]
    pub fn extent(&self) -> &[usize] {
        &self.extent
    }

    /// Total coefficient count: the product of `extent` across all dimensions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.extent.iter().product()
    }

    /// Derives the descriptor one dyadic level coarser than `self` along `dimension` (scale
    /// decremented, extent roughly halved), given the B-spline `order` used for the refinement
    /// kernel.
    ///
    /// This mirrors the fine-to-coarse relationship used by every scale node in the pyramid:
    /// `offset_child = offset_parent / 2` and
    /// `extent_child = (offset_parent + extent_parent - 1 - order) / 2 + order + 1 - offset_child`.
    #[must_use]
    pub fn coarsen(&self, dimension: usize, order: usize) -> Self {
        let mut scale = self.scale.clone();
        let mut offset = self.offset.clone();
        let mut extent = self.extent.clone();

        scale[dimension] -= 1;

        let parent_offset = self.offset[dimension];
        let parent_extent = self.extent[dimension];

        let child_offset = parent_offset / 2;
        let child_extent =
            (parent_offset + parent_extent - 1 - order) / 2 + order + 1 - child_offset;

        offset[dimension] = child_offset;
        extent[dimension] = child_extent;

        Self {
            scale,
            offset,
            extent,
        }
    }

    /// Converts an m/z bin-per-Th resolution exponent (as used by the original seaMass command
    /// line) into a dyadic scale relative to a reference resolution.
    ///
    /// The constant `60.0 / 1.0033548378` is the number of B-spline nodes per Th at scale 0,
    /// chosen so that scale 0 resolves the nominal mass defect spacing of CHNO compounds.
    #[must_use]
    pub fn mz_nodes_per_th(mz_scale: i16) -> f64 {
        const BASE_NODES_PER_TH: f64 = 60.0 / 1.0033_548_378;
        BASE_NODES_PER_TH * 2f64.powi(i32::from(mz_scale))
    }

    /// Converts a dyadic scale into a plain node density, `2^scale` nodes per unit, with no
    /// further conversion factor. This is the formula the original seaMass command line uses for
    /// every non-m/z dimension (`"b-splines per second = 2^st_scale"` for retention time, per
    /// `original_source/commandline/seamass.cpp`'s `st_scale` help text) — unlike m/z, no
    /// chemistry-derived constant applies.
    #[must_use]
    pub fn dyadic_nodes_per_unit(scale: i16) -> f64 {
        2f64.powi(i32::from(scale))
    }

    /// Converts a continuous coordinate into the node index at this grid's scale, given the
    /// per-dimension node spacing (nodes per unit). Used to bracket raw observations into the
    /// leaf node index range during basis construction.
    #[must_use]
    pub fn index_for_coordinate(coordinate: f64, nodes_per_unit: f64) -> usize {
        usize_from_f64((coordinate * nodes_per_unit).floor())
    }

    /// Inverse of [`GridInfo::index_for_coordinate`]: the coordinate at the centre of node
    /// `index`.
    #[must_use]
    pub fn coordinate_for_index(index: usize, nodes_per_unit: f64) -> f64 {
        (f64_from_usize(index) + 0.5) / nodes_per_unit
    }
}

/// Row-major flattening of a multi-index `idx` with per-dimension sizes `sizes`, shared by every
/// tensor-product basis (leaf dictionaries, dyadic scale refinement) so the flattening
/// convention is defined exactly once.
#[must_use]
pub(crate) fn flatten_index(idx: &[usize], sizes: &[usize]) -> usize {
    let mut flat = 0;
    for (i, &size) in idx.iter().zip(sizes) {
        flat = flat * size + i;
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarsen_halves_offset_and_recomputes_extent() {
        let parent = GridInfo::new(vec![3], vec![10], vec![20]);
        let child = parent.coarsen(0, 3);
        assert_eq!(child.scale(), &[2]);
        assert_eq!(child.offset(), &[5]);
        // (10 + 20 - 1 - 3) / 2 + 3 + 1 - 5 = 13 + 4 - 5 = 12
        assert_eq!(child.extent(), &[12]);
    }

    #[test]
    fn count_is_product_of_extents() {
        let g = GridInfo::new(vec![0, 0], vec![0, 0], vec![4, 5]);
        assert_eq!(g.count(), 20);
    }

    #[test]
    fn mz_nodes_per_th_doubles_per_scale() {
        let base = GridInfo::mz_nodes_per_th(0);
        let next = GridInfo::mz_nodes_per_th(1);
        assert!((next - 2.0 * base).abs() < 1e-9);
    }

    #[test]
    fn dyadic_nodes_per_unit_has_no_mz_conversion_factor() {
        assert!((GridInfo::dyadic_nodes_per_unit(0) - 1.0).abs() < 1e-12);
        assert!((GridInfo::dyadic_nodes_per_unit(4) - 16.0).abs() < 1e-12);
    }

    #[test]
    fn coordinate_round_trips_through_its_node_index() {
        let nodes_per_unit = GridInfo::dyadic_nodes_per_unit(4);
        let index = GridInfo::index_for_coordinate(12.3, nodes_per_unit);
        let coordinate = GridInfo::coordinate_for_index(index, nodes_per_unit);
        assert!((coordinate - 12.3).abs() < 1.0 / nodes_per_unit);
    }
}
