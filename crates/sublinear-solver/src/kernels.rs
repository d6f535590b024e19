//! Allocation-free dense vector kernels.
//!
//! Every kernel works on caller-supplied buffers and returns
//! [`SolverError::InvalidDimensions`] when lengths disagree. Reductions use a
//! 4-wide accumulator to shorten the dependency chain.

use crate::error::SolverError;

#[inline]
fn check_len(op: &str, a: usize, b: usize) -> Result<(), SolverError> {
    if a != b {
        return Err(SolverError::InvalidDimensions(format!(
            "{op}: length mismatch ({a} != {b})"
        )));
    }
    Ok(())
}

/// Unchecked 4-wide dot product. Callers guarantee equal lengths.
#[inline]
pub(crate) fn dot_unchecked(a: &[f64], b: &[f64]) -> f64 {
    let mut acc0 = 0.0f64;
    let mut acc1 = 0.0f64;
    let mut acc2 = 0.0f64;
    let mut acc3 = 0.0f64;

    let mut ca = a.chunks_exact(4);
    let mut cb = b.chunks_exact(4);
    for (x, y) in (&mut ca).zip(&mut cb) {
        acc0 += x[0] * y[0];
        acc1 += x[1] * y[1];
        acc2 += x[2] * y[2];
        acc3 += x[3] * y[3];
    }
    for (x, y) in ca.remainder().iter().zip(cb.remainder()) {
        acc0 += x * y;
    }

    (acc0 + acc1) + (acc2 + acc3)
}

/// Inner product `a . b`.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> Result<f64, SolverError> {
    check_len("dot", a.len(), b.len())?;
    Ok(dot_unchecked(a, b))
}

/// `y = alpha * x + y`.
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) -> Result<(), SolverError> {
    check_len("axpy", x.len(), y.len())?;
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
    Ok(())
}

/// Euclidean norm `||x||_2`.
#[inline]
pub fn norm(x: &[f64]) -> f64 {
    dot_unchecked(x, x).sqrt()
}

/// `dst = src`.
#[inline]
pub fn copy(src: &[f64], dst: &mut [f64]) -> Result<(), SolverError> {
    check_len("copy", src.len(), dst.len())?;
    dst.copy_from_slice(src);
    Ok(())
}

/// `x = alpha * x`.
#[inline]
pub fn scale(alpha: f64, x: &mut [f64]) {
    for xi in x.iter_mut() {
        *xi *= alpha;
    }
}

/// `true` when every entry is finite.
#[inline]
pub fn all_finite(x: &[f64]) -> bool {
    x.iter().all(|v| v.is_finite())
}
