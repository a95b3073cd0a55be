//! The driver: shrinkage tapering, termination, and the public core API (spec.md §6.2).
//!
//! Grounded line-for-line in `original_source/asrl/Asrl.cpp`'s `step()` body — in particular the
//! taper schedule `shrinkage_ *= (shrinkage_ > 0.0625 ? 0.5 : 0.0)` and the NaN-abort check
//! (`if (grad != grad) return false;`). The per-iteration stdout block that original printed
//! becomes the optional `on_step` callback below (spec.md §9's "no implicit process-wide
//! state... an explicit field on the driver").

use crate::basis::{BasisOp, GroupReduction, Pyramid};
use crate::error::{Error, Result};
use crate::optimizer::{Eve1, Optimizer, Srl, SrlConfig};

/// Everything needed to build a pyramid and seed the solve: bin edges, observed intensities,
/// and the scale/grouping choices the (out-of-scope) ingester has already decided.
///
/// `rt_edges.is_some()` builds a 2-D m/z-by-retention-time pyramid (spec.md §8's "2-D" scenario);
/// `group_count > 0` attaches a channel-aggregation node (spec.md §6.2: `input.gN == 0` routes to
/// an m/z-only pyramid, otherwise m/z + group). The two are mutually exclusive in this crate: a
/// 2-D input with grouping is out of scope for the reference scenarios in spec.md §8.
#[derive(Clone, Debug)]
pub struct Input {
    /// m/z bin edges, strictly increasing, length `mz_bins + 1`.
    pub mz_edges: Vec<f64>,
    /// Dyadic m/z scale at the finest (leaf) level.
    pub mz_scale: i16,
    /// Number of dyadic half-resolution levels chained above the m/z leaf.
    pub mz_levels: usize,
    /// Retention-time bin edges, if this is a 2-D input.
    pub rt_edges: Option<Vec<f64>>,
    /// Dyadic retention-time scale at the finest level (ignored if `rt_edges` is `None`).
    pub rt_scale: i16,
    /// Number of dyadic half-resolution levels chained above the retention-time leaf.
    pub rt_levels: usize,
    /// Observed, non-negative intensities, one per bin (flattened row-major if 2-D).
    pub bin_counts: Vec<f64>,
    /// Group index (`0..group_count`) of each root coefficient; length must equal the built
    /// root's coefficient count. Empty if `group_count == 0`.
    pub group_members: Vec<usize>,
    /// Number of groups (spec.md's `gN`). `0` builds an m/z-only pyramid.
    pub group_count: usize,
    /// How the group node combines its members.
    pub group_reduction: GroupReduction,
    /// B-spline order (fixed at 3 in the common case, spec.md §4.1).
    pub order: usize,
    /// Coefficients below `prune_threshold * max(x_n)` are structurally zeroed every iteration.
    pub prune_threshold: f64,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            mz_edges: Vec::new(),
            mz_scale: 0,
            mz_levels: 0,
            rt_edges: None,
            rt_scale: 0,
            rt_levels: 0,
            bin_counts: Vec::new(),
            group_members: Vec::new(),
            group_count: 0,
            group_reduction: GroupReduction::Sum,
            order: 3,
            prune_threshold: SrlConfig::default().prune_threshold,
        }
    }
}

/// Result of a converged (or last accepted) solve (spec.md §3's "Output").
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct Output {
    /// Root-level coefficients, dense.
    pub xs: Vec<f64>,
    /// Synthesized bins at the root: `A_root . xs`.
    pub a_xs: Vec<f64>,
    /// Synthesized group aggregates, if the pyramid has a group node.
    pub g_xs: Option<Vec<f64>>,
}

/// Per-iteration diagnostics, passed to [`Solver`]'s optional `on_step` callback. Carries the
/// data the original printed to stdout (`Asrl::step()`), without a printing mechanism baked
/// into the core (spec.md scopes "progress logging" as an external collaborator's job).
#[derive(Clone, Copy, Debug)]
pub struct StepReport {
    /// Number of completed outer iterations.
    pub iteration: usize,
    /// Current L1 shrinkage weight.
    pub shrinkage: f64,
    /// Total structurally non-zero coefficients across every pyramid node.
    pub nnz: usize,
    /// Gradient norm returned by this iteration's outer step.
    pub gradient: f64,
}

/// Tunable shrinkage-taper schedule (spec.md §9's Open Questions: "recommended... but an
/// implementer may expose it as a parameter").
#[derive(Clone, Copy, Debug)]
pub struct DriverConfig {
    /// Multiplier applied to `shrinkage` at each taper step while it exceeds `taper_floor`.
    pub taper_halving: f64,
    /// Below this, `shrinkage` jumps directly to zero instead of continuing to halve.
    pub taper_floor: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            taper_halving: 0.5,
            taper_floor: 1.0 / 16.0,
        }
    }
}

/// The public core API (spec.md §6.2): builds a pyramid from [`Input`], then repeatedly steps
/// the outer optimizer while tapering shrinkage toward zero.
pub struct Solver {
    outer: Eve1<Srl>,
    shrinkage: f64,
    taper: bool,
    tolerance: f64,
    config: DriverConfig,
    iteration: usize,
    last_error: Option<Error>,
    on_step: Option<Box<dyn FnMut(&StepReport)>>,
}

impl Solver {
    /// Builds the basis pyramid from `input` and seeds both optimizers with `shrinkage`
    /// (spec.md §6.2). `taper` enables the shrinkage-halving schedule once the gradient first
    /// falls below `tolerance`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unsupported scale/order, empty input, non-monotone
    /// bin edges, or a negative bin count — construction-time errors abort the solve before it
    /// starts (spec.md §7).
    pub fn init(input: Input, shrinkage: f64, taper: bool, tolerance: f64) -> Result<Self> {
        Self::init_with_config(input, shrinkage, taper, tolerance, DriverConfig::default())
    }

    /// As [`Solver::init`], with an explicit taper schedule.
    ///
    /// # Errors
    ///
    /// See [`Solver::init`].
    pub fn init_with_config(
        input: Input,
        shrinkage: f64,
        taper: bool,
        tolerance: f64,
        config: DriverConfig,
    ) -> Result<Self> {
        let pyramid = if let Some(rt_edges) = &input.rt_edges {
            Pyramid::build_mz_rt(
                &input.mz_edges,
                rt_edges,
                input.mz_scale,
                input.rt_scale,
                input.order,
                input.mz_levels,
                input.rt_levels,
            )?
        } else if input.group_count == 0 {
            Pyramid::build_mz(&input.mz_edges, input.mz_scale, input.order, input.mz_levels)?
        } else {
            Pyramid::build_mz_group(
                &input.mz_edges,
                input.mz_scale,
                input.order,
                input.mz_levels,
                &input.group_members,
                input.group_count,
                input.group_reduction,
            )?
        };

        let srl = Srl::new(
            pyramid,
            input.bin_counts,
            SrlConfig {
                prune_threshold: input.prune_threshold,
            },
        )?;
        let mut outer = Eve1::new(srl);
        outer.init(shrinkage);

        Ok(Self {
            outer,
            shrinkage,
            taper,
            tolerance,
            config,
            iteration: 0,
            last_error: None,
            on_step: None,
        })
    }

    /// Installs a callback invoked with per-iteration diagnostics after every [`Solver::step`].
    pub fn set_on_step(&mut self, callback: Box<dyn FnMut(&StepReport)>) {
        self.on_step = Some(callback);
    }

    /// Performs one outer iteration. Returns `true` to continue, `false` on convergence or fatal
    /// numerical failure (spec.md §6.2). On failure, [`Solver::last_error`] carries the
    /// diagnostic.
    pub fn step(&mut self) -> bool {
        self.iteration += 1;
        let gradient = self.outer.step();

        if let Some(callback) = &mut self.on_step {
            let nnz = self.outer.xs().iter().flatten().filter(|&&v| v > 0.0).count();
            callback(&StepReport {
                iteration: self.iteration,
                shrinkage: self.shrinkage,
                nnz,
                gradient,
            });
        }

        if gradient.is_nan() {
            self.last_error = Some(Error::NumericBreakdown(
                "gradient became NaN during iteration".into(),
            ));
            return false;
        }

        if gradient <= self.tolerance {
            if self.shrinkage == 0.0 || !self.taper {
                return false;
            }
            self.shrinkage = if self.shrinkage > self.config.taper_floor {
                self.shrinkage * self.config.taper_halving
            } else {
                0.0
            };
            self.outer.init(self.shrinkage);
        }

        true
    }

    /// Number of completed [`Solver::step`] calls.
    #[must_use]
    pub const fn iteration(&self) -> usize {
        self.iteration
    }

    /// Diagnostic recorded by the most recent failing [`Solver::step`], if any.
    #[must_use]
    pub const fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Current shrinkage weight (reflects tapering already applied).
    #[must_use]
    pub const fn shrinkage(&self) -> f64 {
        self.shrinkage
    }

    /// Reads the current solver state: root coefficients, their bin-space synthesis, and (if
    /// the pyramid has a group node) the group aggregate. Callable between steps, or after a
    /// solve has converged (spec.md §6.2/§6.3).
    #[must_use]
    pub fn output(&self) -> Output {
        let pyramid = self.outer.inner().pyramid();
        let root = pyramid.root();
        let xs = self.outer.inner().xs()[0].clone();

        let mut a_xs = vec![0.0; root.output_len()];
        root.synthesize(&xs, false, &mut a_xs);

        let g_xs = pyramid.group().map(|group| {
            let mut out = vec![0.0; group.output_len()];
            group.synthesize(&xs, false, &mut out);
            out
        });

        Output { xs, a_xs, g_xs }
    }

    /// The full per-node coefficient state across the whole pyramid (root plus every scale
    /// node), beyond what spec.md §3's `Output` reports for the root alone. Useful for callers
    /// that want the fully-refined multi-resolution representation rather than just the most
    /// compressed (root) level.
    #[must_use]
    pub fn coefficients(&self) -> &[Vec<f64>] {
        self.outer.inner().xs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn single_peak_input() -> Input {
        let mz_edges: Vec<f64> = (0..=1000).map(|i| 400.0 + f64::from(i) * 0.001).collect();
        let bin_counts = gaussian_bins(1000, 400.5, 0.002, 1000.0, 400.0, 401.0);
        Input {
            mz_edges,
            mz_scale: 1,
            mz_levels: 2,
            bin_counts,
            ..Input::default()
        }
    }

    #[test]
    fn single_gaussian_peak_converges_with_sparse_root() {
        let mut solver = Solver::init(single_peak_input(), 1.0, true, 2f64.powi(-10)).unwrap();
        let mut iterations = 0;
        while solver.step() && iterations < 200 {
            iterations += 1;
        }
        assert!(solver.last_error().is_none());
        let output = solver.output();
        let rmse = {
            let b = gaussian_bins(1000, 400.5, 0.002, 1000.0, 400.0, 401.0);
            let sse: f64 = output
                .a_xs
                .iter()
                .zip(&b)
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            (sse / b.len() as f64).sqrt()
        };
        let peak_height = output.a_xs.iter().copied().fold(0.0_f64, f64::max);
        assert!(rmse <= 0.05 * peak_height.max(1.0));
    }

    #[test]
    fn output_gxs_synthesizes_group_aggregate_over_root_coefficients() {
        let mz_edges: Vec<f64> = (0..=200).map(|i| 400.0 + f64::from(i) * 0.01).collect();
        let bin_counts = gaussian_bins(200, 401.0, 0.05, 100.0, 400.0, 402.0);
        let root_len = crate::basis::BsplineLeafNode::new(&mz_edges, 1, 3, None, false)
            .unwrap()
            .input_len();
        let group_members: Vec<usize> = (0..root_len).map(|i| i % 2).collect();
        let input = Input {
            mz_edges,
            mz_scale: 1,
            mz_levels: 1,
            bin_counts,
            group_members,
            group_count: 2,
            ..Input::default()
        };
        let mut solver = Solver::init(input, 1.0, false, 2f64.powi(-10)).unwrap();
        for _ in 0..20 {
            if !solver.step() {
                break;
            }
        }
        let output = solver.output();
        let g_xs = output.g_xs.expect("group node should produce g_xs");
        assert_eq!(g_xs.len(), 2);
        let expected_total: f64 = output.xs.iter().sum();
        let actual_total: f64 = g_xs.iter().sum();
        assert!((actual_total - expected_total).abs() < 1e-6);
    }

    #[test]
    fn zero_input_terminates_on_first_step() {
        let input = Input {
            mz_edges: (0..=100).map(f64::from).collect(),
            bin_counts: vec![0.0; 100],
            ..Input::default()
        };
        let mut solver = Solver::init(input, 1.0, false, 2f64.powi(-10)).unwrap();
        assert!(!solver.step());
        assert!(solver.last_error().is_none());
    }

    #[test]
    fn negative_bin_aborts_construction() {
        let input = Input {
            mz_edges: (0..=10).map(f64::from).collect(),
            bin_counts: vec![-1.0; 10],
            ..Input::default()
        };
        let err = Solver::init(input, 1.0, false, 2f64.powi(-10)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn taper_schedule_visits_expected_shrinkage_values() {
        let mut visited = vec![8.0];
        let input = single_peak_input();
        let mut solver = Solver::init(input, 8.0, true, 2f64.powi(-10)).unwrap();
        let mut last_shrinkage = 8.0;
        for _ in 0..500 {
            if !solver.step() {
                break;
            }
            if (solver.shrinkage() - last_shrinkage).abs() > 1e-12 {
                visited.push(solver.shrinkage());
                last_shrinkage = solver.shrinkage();
            }
        }
        let expected = [8.0, 4.0, 2.0, 1.0, 0.5, 0.25, 0.125, 0.0];
        assert_eq!(visited.len(), expected.len());
        for (v, e) in visited.iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-9, "{v} != {e}");
        }
    }
}
