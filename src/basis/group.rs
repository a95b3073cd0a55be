//! Channel-aggregation node: sums (or averages) child-channel coefficients along a declared
//! group axis. `A` is a tall sparse matrix mapping group members to aggregated rows.

use super::{BasisOp, NodeCore};
use crate::error::{Error, Result};
use crate::grid::GridInfo;
use crate::sparse::SparseMatrix;

/// How a group node combines its members.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum GroupReduction {
    /// Each group's aggregate is the sum of its members.
    Sum,
    /// Each group's aggregate is the mean of its members.
    Mean,
}

/// A channel-aggregation node mapping `members.len()` input channels to `group_count`
/// aggregated rows.
#[derive(Clone, Debug)]
pub struct GroupNode {
    core: NodeCore,
    reduction: GroupReduction,
}

impl GroupNode {
    /// Builds a group node from a `members` slice where `members[i]` is the group index of
    /// input channel `i`, spanning `group_count` groups.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `members` is empty or any entry is `>= group_count`.
    pub fn new(
        members: &[usize],
        group_count: usize,
        reduction: GroupReduction,
        grid: GridInfo,
        parent: usize,
        transient: bool,
    ) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::Configuration(
                "group node requires at least one member".into(),
            ));
        }
        if members.iter().any(|&g| g >= group_count) {
            return Err(Error::Configuration(
                "group node member references a group index out of range".into(),
            ));
        }

        let weight = match reduction {
            GroupReduction::Sum => 1.0,
            GroupReduction::Mean => {
                let mut counts = vec![0usize; group_count];
                for &g in members {
                    counts[g] += 1;
                }
                return Self::build(members, group_count, &counts, grid, parent, transient, reduction);
            }
        };

        let triples = members
            .iter()
            .enumerate()
            .map(|(member, &group)| (group, member, weight));
        let a = SparseMatrix::from_coo(group_count, members.len(), triples)?;

        Ok(Self {
            core: NodeCore::new(a, grid, Some(parent), transient),
            reduction,
        })
    }

    fn build(
        members: &[usize],
        group_count: usize,
        counts: &[usize],
        grid: GridInfo,
        parent: usize,
        transient: bool,
        reduction: GroupReduction,
    ) -> Result<Self> {
        let triples = members.iter().enumerate().map(|(member, &group)| {
            (group, member, 1.0 / crate::convert::f64_from_usize(counts[group]))
        });
        let a = SparseMatrix::from_coo(group_count, members.len(), triples)?;

        Ok(Self {
            core: NodeCore::new(a, grid, Some(parent), transient),
            reduction,
        })
    }

    /// The reduction this node performs.
    #[must_use]
    pub const fn reduction(&self) -> GroupReduction {
        self.reduction
    }
}

impl BasisOp for GroupNode {
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

    #[test]
    fn rejects_empty_members() {
        let grid = GridInfo::new(vec![0], vec![0], vec![1]);
        let err = GroupNode::new(&[], 1, GroupReduction::Sum, grid, 0, false).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn rejects_out_of_range_group() {
        let grid = GridInfo::new(vec![0], vec![0], vec![2]);
        let err = GroupNode::new(&[0, 2], 2, GroupReduction::Sum, grid, 0, false).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn sum_reduction_adds_members() {
        let grid = GridInfo::new(vec![0], vec![0], vec![2]);
        let node = GroupNode::new(&[0, 0, 1], 2, GroupReduction::Sum, grid, 0, false).unwrap();
        let out = node.core.a().mul_dense(&[2.0, 3.0, 4.0]);
        assert_eq!(out, vec![5.0, 4.0]);
    }

    #[test]
    fn mean_reduction_averages_members() {
        let grid = GridInfo::new(vec![0], vec![0], vec![2]);
        let node = GroupNode::new(&[0, 0, 1], 2, GroupReduction::Mean, grid, 0, false).unwrap();
        let out = node.core.a().mul_dense(&[2.0, 4.0, 8.0]);
        assert_eq!(out, vec![3.0, 8.0]);
    }
}
