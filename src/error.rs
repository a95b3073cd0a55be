//! Crate-wide error type.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// A configuration error detected at construction time: an unsupported scale or B-spline
    /// order, an empty input, or non-monotone bin edges. Construction-time errors are surfaced
    /// immediately and the solve never starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Numeric breakdown during iteration: the gradient became NaN or infinite. This kind is
    /// never returned from a fallible constructor; instead it is recorded on the solver and
    /// observed through `Solver::last_error` after `step` returns `false`.
    #[error("numeric breakdown: {0}")]
    NumericBreakdown(String),

    /// A sparse matrix could not be built or allocated (negative entries, mismatched dimensions).
    /// Propagated as a fatal error; any partial state is dropped by the caller.
    #[error("resource error: {0}")]
    ResourceExhaustion(String),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
