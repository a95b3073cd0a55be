//! The pyramid container: an arena of [`BasisNode`]s in topological order (parent index always
//! less than child index), plus builders that assemble the m/z (and retention-time) leaf, its
//! dyadic scale chain(s), and an optional side-mounted group node from raw input descriptors.
//!
//! Per spec.md §9's "pyramid as arena + index" redesign note: nodes never hold a back-pointer to
//! their children; a child registers itself purely by recording its parent's integer index, and
//! the pyramid owns every node in one contiguous `Vec`. Destruction in reverse order falls out of
//! `Vec`'s own drop order for free.

use super::{BasisNode, BasisOp, BsplineLeafNode, GroupNode, GroupReduction, MatrixNode, ScaleNode};
use crate::error::{Error, Result};
use crate::grid::GridInfo;

/// An ordered arena of basis nodes, root at index 0, plus an optional side-mounted group node.
///
/// The group node (spec.md §4.1's channel-aggregation node) is not part of the main recursive
/// synthesis/analysis chain: in the original implementation (`BasisMatrixGroup::groupSynthesis`)
/// it is invoked only when producing output, not on every SRL iteration. We keep that shape
/// here rather than forcing it into the generic per-node loop.
#[derive(Clone, Debug)]
pub struct Pyramid {
    nodes: Vec<BasisNode>,
    group: Option<GroupNode>,
}

impl Pyramid {
    /// Builds a 1-D m/z-only pyramid: a B-spline leaf at the root, with `levels` dyadic
    /// half-resolution scale nodes chained above it (index 0 = leaf, index `levels` = coarsest).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `edges` is degenerate or any derived scale node
    /// collapses to an empty grid.
    pub fn build_mz(edges: &[f64], scale: i16, order: usize, levels: usize) -> Result<Self> {
        let leaf = BsplineLeafNode::new(edges, scale, order, None, false)?;
        let mut nodes = vec![BasisNode::from(leaf)];
        Self::chain_scale(&mut nodes, 0, 0, order, levels)?;
        Ok(Self { nodes, group: None })
    }

    /// Builds an m/z pyramid as [`Self::build_mz`], plus a side-mounted channel-aggregation node
    /// over the root's own coefficient space (spec.md §6.2: `input.gN != 0`).
    ///
    /// `gXs = A_group . x_root` (spec.md §3's "Output" paragraph), so the group node's column
    /// space must be the root's coefficient space exactly: `members[j]` is the group that root
    /// coefficient `j` belongs to, and `members.len()` must equal `root.input_len()` — mirroring
    /// `original_source/asrl/BasisMatrixGroup`, whose own matrix shares its column count `aN` with
    /// the root `BasisMatrix` it groups, and whose `groupSynthesis` is invoked directly on
    /// `optimizer_->xs()[0]` (`original_source/asrl/Asrl.cpp:171`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] propagated from leaf/scale construction, from
    /// [`GroupNode::new`] if `members`/`group_count` are inconsistent, or if `members.len()`
    /// does not equal the root's coefficient count.
    pub fn build_mz_group(
        edges: &[f64],
        scale: i16,
        order: usize,
        levels: usize,
        members: &[usize],
        group_count: usize,
        reduction: GroupReduction,
    ) -> Result<Self> {
        let pyramid = Self::build_mz(edges, scale, order, levels)?;
        let root_input_len = pyramid.nodes[0].input_len();
        if members.len() != root_input_len {
            return Err(Error::Configuration(format!(
                "group node must have one member per root coefficient: expected {root_input_len}, got {}",
                members.len()
            )));
        }

        let mut pyramid = pyramid;
        let root_grid = pyramid.nodes[0].grid_info().clone();
        let group_grid = GridInfo::new(
            root_grid.scale().to_vec(),
            vec![0; root_grid.dimensions()],
            vec![group_count],
        );
        let group = GroupNode::new(members, group_count, reduction, group_grid, 0, false)?;
        pyramid.group = Some(group);
        Ok(pyramid)
    }

    /// Builds a 2-D m/z-by-retention-time pyramid: a tensor-product leaf at the root, with
    /// independent dyadic scale chains above it per dimension (`mz_levels`/`rt_levels`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] propagated from leaf/scale construction.
    pub fn build_mz_rt(
        mz_edges: &[f64],
        rt_edges: &[f64],
        mz_scale: i16,
        rt_scale: i16,
        order: usize,
        mz_levels: usize,
        rt_levels: usize,
    ) -> Result<Self> {
        let leaf = BsplineLeafNode::new_nd(
            &[mz_edges, rt_edges],
            &[mz_scale, rt_scale],
            order,
            None,
            false,
        )?;
        let mut nodes = vec![BasisNode::from(leaf)];
        Self::chain_scale(&mut nodes, 0, 0, order, mz_levels)?;
        Self::chain_scale(&mut nodes, 0, 1, order, rt_levels)?;
        Ok(Self { nodes, group: None })
    }

    /// Constructs a single node from a caller-supplied sparse matrix at the root (the
    /// `BasisMatrix` case of `original_source/asrl/Asrl.cpp`: the ingester has already composed
    /// the full dictionary).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] propagated from [`MatrixNode::new`].
    pub fn build_matrix(
        rows: usize,
        cols: usize,
        triples: impl IntoIterator<Item = (usize, usize, f64)>,
        grid: GridInfo,
    ) -> Result<Self> {
        let node = MatrixNode::new(rows, cols, triples, grid, None, false)?;
        Ok(Self {
            nodes: vec![BasisNode::from(node)],
            group: None,
        })
    }

    /// Appends `levels` dyadic half-resolution scale nodes along `dimension`, each parented on
    /// the previous one (the first parented on `start`), halving resolution at every level per
    /// spec.md §4.1.
    fn chain_scale(
        nodes: &mut Vec<BasisNode>,
        start: usize,
        dimension: usize,
        order: usize,
        levels: usize,
    ) -> Result<()> {
        let mut parent = start;
        for _ in 0..levels {
            let parent_grid = nodes[parent].grid_info().clone();
            let node = ScaleNode::new(&parent_grid, dimension, order, parent, false)?;
            nodes.push(BasisNode::from(node));
            parent = nodes.len() - 1;
        }
        Ok(())
    }

    /// All nodes in topological order, root (no parent) first.
    #[must_use]
    pub fn nodes(&self) -> &[BasisNode] {
        &self.nodes
    }

    /// Number of nodes in the main recursive chain (excludes the side-mounted group node).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the pyramid holds no nodes. Never true for a successfully built pyramid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The root node (index 0), whose own `A` maps directly into measurement (bin) space.
    #[must_use]
    pub fn root(&self) -> &BasisNode {
        &self.nodes[0]
    }

    /// The side-mounted group node, if this pyramid was built with one.
    #[must_use]
    pub fn group(&self) -> Option<&GroupNode> {
        self.group.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(n: usize, start: f64, step: f64) -> Vec<f64> {
        (0..=n).map(|i| start + f64::from(i32::try_from(i).unwrap()) * step).collect()
    }

    #[test]
    fn build_mz_chains_scale_nodes_above_the_leaf() {
        let e = edges(200, 400.0, 0.01);
        let pyramid = Pyramid::build_mz(&e, 2, 3, 3).unwrap();
        assert_eq!(pyramid.len(), 4);
        assert_eq!(pyramid.root().parent(), None);
        for i in 1..pyramid.len() {
            assert!(pyramid.nodes()[i].parent().unwrap() < i);
        }
    }

    #[test]
    fn build_mz_group_attaches_side_group_node() {
        let e = edges(50, 400.0, 0.02);
        let root_len = BsplineLeafNode::new(&e, 1, 3, None, false).unwrap().input_len();
        let members: Vec<usize> = (0..root_len).map(|i| i % 2).collect();
        let pyramid =
            Pyramid::build_mz_group(&e, 1, 3, 1, &members, 2, GroupReduction::Sum).unwrap();
        assert!(pyramid.group().is_some());
    }

    #[test]
    fn build_mz_group_rejects_member_count_mismatched_to_root_coefficients() {
        let e = edges(50, 400.0, 0.02);
        let err =
            Pyramid::build_mz_group(&e, 1, 3, 1, &[0, 0, 1], 2, GroupReduction::Sum).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn build_mz_rt_has_two_independent_scale_chains() {
        let mz = edges(40, 400.0, 0.05);
        let rt = edges(10, 0.0, 1.0);
        let pyramid = Pyramid::build_mz_rt(&mz, &rt, 1, 1, 3, 2, 1).unwrap();
        // root + 2 mz-levels + 1 rt-level
        assert_eq!(pyramid.len(), 4);
    }
}
