//! Optimizers riding on top of a [`crate::basis::Pyramid`]: the inner Sparse Richardson–Lucy
//! (SRL) iteration ([`srl::Srl`]) and the outer Nesterov-style EVE1 accelerator
//! ([`eve1::Eve1`]) that wraps it, both implementing the shared [`Optimizer`] trait so the
//! accelerator's only coupling to the inner optimizer is `init`/`step`/`xs`/the gradient it
//! returns — mirroring `OptimizerAccelerationEve1`'s composition of `OptimizerSrl` in
//! `original_source/asrl/Asrl.cpp`, generalized to a generic parameter rather than a
//! pointer-to-abstract-base (spec.md §9 permits either).

pub mod eve1;
pub mod srl;

pub use eve1::{Eve1, MutableState};
pub use srl::{Srl, SrlConfig};

/// Shared contract between the inner (SRL) and outer (EVE1) optimizer: seed with a shrinkage
/// weight, advance one iteration returning a convergence metric, and expose the current
/// per-node coefficient state.
pub trait Optimizer {
    /// Resets every node's coefficient vector to a uniform positive seed within its support,
    /// sets the L1 shrinkage weight to `lambda`, and clears any iteration history.
    fn init(&mut self, lambda: f64);

    /// Performs one outer iteration and returns the convergence metric (spec.md §4.2 step 6):
    /// monotone non-increasing under reasonable conditions, `0` at the fixed point, `NaN` on
    /// numeric breakdown.
    fn step(&mut self) -> f64;

    /// Current per-node coefficient state, one dense vector per pyramid node in topological
    /// order.
    fn xs(&self) -> &[Vec<f64>];
}
