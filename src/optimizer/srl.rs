//! The inner optimizer: one Sparse Richardson–Lucy (SRL) iteration over a whole
//! [`crate::basis::Pyramid`], with L1 shrinkage and dynamic pruning.
//!
//! Grounded in `original_source/core/Basis.cpp`'s `Basis::shrinkage`
//! (`t = l1 + lambda; t = x0 / t; x = xE * t`) for the multiplicative update, and in
//! `original_source/asrl/OptimizerSrl.hpp`'s per-node state shape (one coefficient vector, one
//! L1 back-pressure vector, one shrinkage weight, one iteration counter for the whole pyramid).
//!
//! A pyramid node's own `A` maps its coefficients into its *parent's* coefficient space (root
//! excepted: the root's `A` maps directly into measurement/bin space, since the root has no
//! parent). To synthesize the full measurement prediction we therefore fold each node's
//! contribution into its parent's "effective" coefficient vector before the parent's own `A` is
//! applied — conceptually a post-order traversal of the pyramid, implemented here as a single
//! descending pass over indices (every child has a strictly greater index than its parent, so by
//! the time a node is visited as a parent, all of its children have already folded their
//! contribution in). Analysis (back-projection of the error) needs the reverse: a node's error
//! depends on its parent's already-computed error, so that pass runs ascending from the root.

use crate::basis::{BasisOp, Pyramid};
use crate::error::{Error, Result};
use crate::optimizer::eve1::MutableState;
use crate::optimizer::Optimizer;

/// Guards the error-ratio division; bins reconstructed to exactly zero produce a zero ratio
/// rather than a division by zero (spec.md §4.2 step 2).
const EPS: f64 = 1e-12;

/// Tunable parameters of the inner SRL iteration, both exposed per spec.md §9's Open Questions
/// ("the prune threshold default is hard-coded... implementers should expose it").
#[derive(Clone, Copy, Debug, serde::Deserialize, serde::Serialize)]
pub struct SrlConfig {
    /// Coefficients below `prune_threshold * max(x_n)` are structurally zeroed every iteration.
    pub prune_threshold: f64,
}

impl Default for SrlConfig {
    fn default() -> Self {
        Self {
            prune_threshold: 0.001,
        }
    }
}

/// One Sparse Richardson–Lucy solver over an entire pyramid: every node's coefficient vector is
/// updated in lockstep each [`Srl::step`].
#[derive(Clone, Debug)]
pub struct Srl {
    pyramid: Pyramid,
    b: Vec<f64>,
    config: SrlConfig,
    lambda: f64,
    iteration: usize,
    xs: Vec<Vec<f64>>,
}

impl Srl {
    /// Builds an SRL optimizer over `pyramid` with observed bin vector `b` (dense, one entry per
    /// row of the root's `A`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `b` has the wrong length or contains a negative
    /// entry (spec.md §4.2's failure semantics: construction must fail on a negative bin).
    pub fn new(pyramid: Pyramid, b: Vec<f64>, config: SrlConfig) -> Result<Self> {
        if b.len() != pyramid.root().output_len() {
            return Err(Error::Configuration(format!(
                "bin vector has {} entries, root basis expects {}",
                b.len(),
                pyramid.root().output_len()
            )));
        }
        if b.iter().any(|&v| v < 0.0) {
            return Err(Error::Configuration(
                "bin vector contains a negative intensity".into(),
            ));
        }

        let xs = pyramid
            .nodes()
            .iter()
            .map(|n| vec![1.0; n.input_len()])
            .collect();

        Ok(Self {
            pyramid,
            b,
            config,
            lambda: 0.0,
            iteration: 0,
            xs,
        })
    }

    /// The pyramid this optimizer owns.
    #[must_use]
    pub fn pyramid(&self) -> &Pyramid {
        &self.pyramid
    }

    /// Current L1 shrinkage weight.
    #[must_use]
    pub const fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Number of [`Srl::step`] calls since the last [`Optimizer::init`].
    #[must_use]
    pub const fn iteration(&self) -> usize {
        self.iteration
    }

    /// Synthesizes the full pyramid into measurement (bin) space from per-node coefficient
    /// vectors `xs` (one per node, in the same order as [`Pyramid::nodes`]). Returns the
    /// per-node "effective" vectors (each node's own coefficients plus every descendant's
    /// folded-in contribution) alongside the final bin-space prediction.
    fn synthesize(&self, xs: &[Vec<f64>]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let nodes = self.pyramid.nodes();
        let mut eff: Vec<Vec<f64>> = xs.to_vec();
        for i in (1..nodes.len()).rev() {
            let parent = nodes[i].parent().expect("non-root node has a parent");
            let contribution = eff[i].clone();
            nodes[i].synthesize(&contribution, true, &mut eff[parent]);
        }
        let mut f = vec![0.0; nodes[0].output_len()];
        nodes[0].synthesize(&eff[0], false, &mut f);
        (eff, f)
    }

    /// Back-projects the bin-space error ratio `f_err` down through the pyramid, root first
    /// (every non-root node's error depends on its parent's, already computed).
    fn analyze(&self, f_err: &[f64]) -> Vec<Vec<f64>> {
        let nodes = self.pyramid.nodes();
        let mut x_err = vec![Vec::new(); nodes.len()];
        x_err[0] = vec![0.0; nodes[0].input_len()];
        nodes[0].analyze(f_err, false, &mut x_err[0]);
        for i in 1..nodes.len() {
            let parent = nodes[i].parent().expect("non-root node has a parent");
            let mut out = vec![0.0; nodes[i].input_len()];
            nodes[i].analyze(&x_err[parent], false, &mut out);
            x_err[i] = out;
        }
        x_err
    }
}

impl Optimizer for Srl {
    fn init(&mut self, lambda: f64) {
        self.lambda = lambda;
        self.iteration = 0;
        for (n, x) in self.xs.iter_mut().enumerate() {
            x.clear();
            x.resize(self.pyramid.nodes()[n].input_len(), 1.0);
        }
    }

    fn step(&mut self) -> f64 {
        self.iteration += 1;

        let (_, f) = self.synthesize(&self.xs);
        if f.iter().any(|v| !v.is_finite()) {
            return f64::NAN;
        }

        let f_err: Vec<f64> = self
            .b
            .iter()
            .zip(&f)
            .map(|(&b, &f)| b / f.max(EPS))
            .collect();
        if f_err.iter().any(|v| !v.is_finite()) {
            return f64::NAN;
        }

        let x_err = self.analyze(&f_err);

        let old = self.xs.clone();
        for (n, node) in self.pyramid.nodes().iter().enumerate() {
            let l1 = node.l1();
            for j in 0..self.xs[n].len() {
                let denom = l1[j] + self.lambda;
                let updated = if denom > 0.0 {
                    old[n][j] * x_err[n][j] / denom
                } else {
                    0.0
                };
                self.xs[n][j] = updated.max(0.0);
            }
        }

        for x in &mut self.xs {
            let max_x = x.iter().copied().fold(0.0_f64, f64::max);
            let threshold = self.config.prune_threshold * max_x;
            for v in x.iter_mut() {
                if *v < threshold {
                    *v = 0.0;
                }
            }
        }

        let mut sum = 0.0;
        let mut count = 0usize;
        for n in 0..self.xs.len() {
            for j in 0..self.xs[n].len() {
                if old[n][j] > 0.0 && self.xs[n][j] > 0.0 {
                    let ratio = (self.xs[n][j] / old[n][j]).ln();
                    if !ratio.is_finite() {
                        return f64::NAN;
                    }
                    sum += ratio * ratio;
                    count += 1;
                }
            }
        }

        if count == 0 {
            0.0
        } else {
            (sum / count as f64).sqrt()
        }
    }

    fn xs(&self) -> &[Vec<f64>] {
        &self.xs
    }
}

impl MutableState for Srl {
    fn set_xs(&mut self, xs: Vec<Vec<f64>>) {
        self.xs = xs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::Pyramid;

    fn gaussian_bins(n: usize, center: f64, sigma: f64, area: f64, lo: f64, hi: f64) -> Vec<f64> {
        let step = (hi - lo) / n as f64;
        (0..n)
            .map(|i| {
                let x = lo + step * (i as f64 + 0.5);
                let z = (x - center) / sigma;
                area * (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt()) * step
            })
            .collect()
    }

    #[test]
    fn step_keeps_non_negativity() {
        let edges: Vec<f64> = (0..=200).map(|i| 400.0 + f64::from(i) * 0.005).collect();
        let pyramid = Pyramid::build_mz(&edges, 1, 3, 2).unwrap();
        let b = gaussian_bins(200, 400.5, 0.01, 1000.0, 400.0, 401.0);
        let mut srl = Srl::new(pyramid, b, SrlConfig::default()).unwrap();
        srl.init(1.0);
        for _ in 0..20 {
            srl.step();
            for x in srl.xs() {
                assert!(x.iter().all(|&v| v >= 0.0));
            }
        }
    }

    #[test]
    fn zero_input_converges_immediately() {
        let edges: Vec<f64> = (0..=50).map(|i| 400.0 + f64::from(i) * 0.02).collect();
        let pyramid = Pyramid::build_mz(&edges, 1, 3, 1).unwrap();
        let b = vec![0.0; 50];
        let mut srl = Srl::new(pyramid, b, SrlConfig::default()).unwrap();
        srl.init(1.0);
        let g = srl.step();
        assert_eq!(g, 0.0);
        for x in srl.xs() {
            assert!(x.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn rejects_negative_bin() {
        let edges: Vec<f64> = (0..=10).map(f64::from).collect();
        let pyramid = Pyramid::build_mz(&edges, 1, 3, 0).unwrap();
        let err = Srl::new(pyramid, vec![-1.0; 10], SrlConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn prune_never_increases_nonzero_count() {
        let edges: Vec<f64> = (0..=200).map(|i| 400.0 + f64::from(i) * 0.005).collect();
        let pyramid = Pyramid::build_mz(&edges, 1, 3, 2).unwrap();
        let b = gaussian_bins(200, 400.5, 0.01, 1000.0, 400.0, 401.0);
        let mut srl = Srl::new(pyramid, b, SrlConfig::default()).unwrap();
        srl.init(1.0);
        let mut prev_nnz: Option<usize> = None;
        for _ in 0..30 {
            srl.step();
            let nnz: usize = srl
                .xs()
                .iter()
                .map(|x| x.iter().filter(|&&v| v > 0.0).count())
                .sum();
            if let Some(p) = prev_nnz {
                assert!(nnz <= p);
            }
            prev_nnz = Some(nnz);
        }
    }
}
