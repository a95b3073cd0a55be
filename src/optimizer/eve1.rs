//! The outer optimizer: Nesterov-style (EVE1) momentum acceleration wrapping an inner
//! [`Optimizer`], with a monotonicity restart.
//!
//! Grounded in `original_source/asrl/Asrl.cpp`'s composition of `OptimizerAccelerationEve1`
//! around `OptimizerSrl` (spec.md §9: "preserve this composition... the accelerator holding the
//! inner by owning reference"). Here the inner optimizer is a generic parameter rather than a
//! pointer-to-abstract-base, since the crate never needs to swap optimizers at runtime.

use crate::optimizer::Optimizer;

/// Extends [`Optimizer`] with the ability to overwrite the full coefficient state. [`Eve1`]
/// needs this to commit an extrapolated iterate between steps; a plain [`Optimizer`] only
/// exposes read access to its state via `xs`.
pub trait MutableState: Optimizer {
    /// Overwrites every node's coefficient vector.
    fn set_xs(&mut self, xs: Vec<Vec<f64>>);
}

/// Nesterov-style extrapolation with monotonicity restart (spec.md §4.3), generic over the
/// wrapped inner optimizer.
#[derive(Clone, Debug)]
pub struct Eve1<O> {
    inner: O,
    prev: Vec<Vec<f64>>,
    t: f64,
    last_gradient: f64,
}

impl<O: Optimizer> Eve1<O> {
    /// Wraps `inner`. Call [`Optimizer::init`] before stepping.
    pub fn new(inner: O) -> Self {
        let prev = inner.xs().to_vec();
        Self {
            inner,
            prev,
            t: 1.0,
            last_gradient: f64::INFINITY,
        }
    }

    /// The wrapped inner optimizer.
    pub const fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: MutableState> Optimizer for Eve1<O> {
    fn init(&mut self, lambda: f64) {
        self.inner.init(lambda);
        self.prev = self.inner.xs().to_vec();
        self.t = 1.0;
        self.last_gradient = f64::INFINITY;
    }

    fn step(&mut self) -> f64 {
        // (1) raw iterate from the inner optimizer.
        let gradient = self.inner.step();
        if !gradient.is_finite() {
            return gradient;
        }
        let y = self.inner.xs().to_vec();

        // (2) momentum update.
        let t_next = (1.0 + (1.0 + 4.0 * self.t * self.t).sqrt()) / 2.0;

        // (5) monotonicity restart: a worse gradient than last accepted discards the
        // extrapolation and resets momentum, but the gradient from step (1) is still returned.
        if gradient > self.last_gradient {
            self.t = 1.0;
            self.prev = y;
            self.last_gradient = gradient;
            return gradient;
        }

        // (3) extrapolate, (4) clamp to non-negative.
        let beta = (self.t - 1.0) / t_next;
        let extrapolated: Vec<Vec<f64>> = y
            .iter()
            .zip(&self.prev)
            .map(|(yn, prev_n)| {
                yn.iter()
                    .zip(prev_n)
                    .map(|(&yv, &pv)| (yv + beta * (yv - pv)).max(0.0))
                    .collect()
            })
            .collect();

        self.prev = y;
        self.t = t_next;
        self.last_gradient = gradient;
        self.inner.set_xs(extrapolated);

        gradient
    }

    fn xs(&self) -> &[Vec<f64>] {
        self.inner.xs()
    }
}
