#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! Sparse Richardson–Lucy optimizer with Nesterov-style (EVE1) acceleration over a composed
//! multi-resolution B-spline basis.
//!
//! This crate is the reconstruction core of seaMass: given a dense per-bin intensity histogram
//! (already binned and scale-decided by an external ingester) it solves for a small, sparse set
//! of B-spline coefficients whose synthesis reproduces the observed data while suppressing
//! noise. It does not read MS files, does not pick peaks from the solved coefficients, and does
//! not format output — those are the caller's job. See [`driver::Solver`] for the entry point.

pub mod basis;
pub mod convert;
pub mod driver;
pub mod error;
pub mod grid;
pub mod optimizer;
pub mod sparse;

pub use driver::{DriverConfig, Input, Output, Solver, StepReport};
pub use error::{Error, Result};
