//! Small numeric conversions shared across the crate, kept in one place so the truncation and
//! sign-loss lint exceptions are granted exactly once.

/// Truncates a non-negative floating point value to `usize`, clamping any negative input to
/// zero rather than panicking or wrapping.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn usize_from_f64(x: f64) -> usize {
    x.max(0.0) as usize
}

/// Widens a `usize` count into `f64`.
///
/// # Panics
///
/// Panics if `x` does not fit in a `u32` — no grid or matrix dimension in this crate is expected
/// to approach that size.
#[must_use]
pub fn f64_from_usize(x: usize) -> f64 {
    f64::from(u32::try_from(x).unwrap())
}
