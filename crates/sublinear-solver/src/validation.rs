//! Input validation for solver operations.
//!
//! All validation functions run eagerly before any computation begins, so
//! callers receive clear diagnostics instead of numerical failures deep inside
//! an iteration. Every public function returns [`ValidationError`] on failure,
//! which folds into [`SolverError`](crate::error::SolverError) via `From`.
//!
//! # Limits
//!
//! | Resource      | Limit       | Constant           |
//! |---------------|-------------|--------------------|
//! | Rows / cols   | 10,000,000  | [`MAX_NODES`]      |
//! | Non-zeros     | 100,000,000 | [`MAX_EDGES`]      |
//! | Iterations    | 1,000,000   | [`MAX_ITERATIONS`] |
//! | Sketch `k * n`| 50,000,000  | [`MAX_SKETCH_ENTRIES`] |

use crate::error::ValidationError;
use crate::types::CsrMatrix;

// ---------------------------------------------------------------------------
// Resource limits
// ---------------------------------------------------------------------------

/// Maximum number of rows or columns.
pub const MAX_NODES: usize = 10_000_000;

/// Maximum number of stored entries.
pub const MAX_EDGES: usize = 100_000_000;

/// Maximum iteration budget accepted by any solver.
pub const MAX_ITERATIONS: usize = 1_000_000;

/// Maximum entry count `k * n` of a dense JL projection (400 MB of `f64`).
pub const MAX_SKETCH_ENTRIES: usize = 50_000_000;

// ---------------------------------------------------------------------------
// CSR validation
// ---------------------------------------------------------------------------

/// Reject a `k x n` projection with more than [`MAX_SKETCH_ENTRIES`] entries.
pub fn validate_sketch_size(n: usize, k: usize) -> Result<(), ValidationError> {
    match k.checked_mul(n) {
        Some(entries) if entries <= MAX_SKETCH_ENTRIES => Ok(()),
        _ => Err(ValidationError::ParameterOutOfRange {
            name: "target_dimension".into(),
            value: k.to_string(),
            expected: format!("k * n <= {MAX_SKETCH_ENTRIES} for n = {n}"),
        }),
    }
}

/// Reject a stored-entry count above [`MAX_EDGES`].
pub(crate) fn check_entry_count(nnz: usize) -> Result<(), ValidationError> {
    if nnz > MAX_EDGES {
        return Err(ValidationError::TooManyEntries {
            nnz,
            max_nnz: MAX_EDGES,
        });
    }
    Ok(())
}

/// Validate raw CSR arrays before they are assembled into a [`CsrMatrix`].
///
/// Checks, in order:
///
/// 1. `rows` and `cols` are within [`MAX_NODES`].
/// 2. `nnz` is within [`MAX_EDGES`].
/// 3. `row_ptr.len() == rows + 1`.
/// 4. `row_ptr` is non-decreasing.
/// 5. `row_ptr[0] == 0` and `row_ptr[rows] == nnz`.
/// 6. `col_indices.len() == values.len()`.
/// 7. Column indices are `< cols` and strictly increasing within each row.
/// 8. No `NaN` or `Inf` in `values`.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first violation found.
pub fn validate_csr_parts(
    rows: usize,
    cols: usize,
    row_ptr: &[u32],
    col_indices: &[u32],
    values: &[f64],
) -> Result<(), ValidationError> {
    if rows > MAX_NODES || cols > MAX_NODES {
        return Err(ValidationError::MatrixTooLarge {
            rows,
            cols,
            max_dim: MAX_NODES,
        });
    }

    let nnz = values.len();
    check_entry_count(nnz)?;

    if row_ptr.len() != rows + 1 {
        return Err(ValidationError::DimensionMismatch(format!(
            "row_ptr length {} does not equal rows + 1 = {}",
            row_ptr.len(),
            rows + 1,
        )));
    }

    for i in 1..row_ptr.len() {
        if row_ptr[i] < row_ptr[i - 1] {
            return Err(ValidationError::NonMonotonicRowPtrs { position: i });
        }
    }

    if row_ptr[0] != 0 {
        return Err(ValidationError::DimensionMismatch(format!(
            "row_ptr[0] = {} (expected 0)",
            row_ptr[0],
        )));
    }
    if row_ptr[rows] as usize != nnz {
        return Err(ValidationError::DimensionMismatch(format!(
            "values length {nnz} does not match row_ptr[rows] = {}",
            row_ptr[rows],
        )));
    }

    if col_indices.len() != nnz {
        return Err(ValidationError::DimensionMismatch(format!(
            "col_indices length {} does not match values length {nnz}",
            col_indices.len(),
        )));
    }

    for row in 0..rows {
        let start = row_ptr[row] as usize;
        let end = row_ptr[row + 1] as usize;

        let mut prev_col: Option<usize> = None;
        for idx in start..end {
            let col = col_indices[idx] as usize;
            if col >= cols {
                return Err(ValidationError::IndexOutOfBounds {
                    row,
                    col,
                    rows,
                    cols,
                });
            }
            if let Some(pc) = prev_col {
                if col <= pc {
                    return Err(ValidationError::DimensionMismatch(format!(
                        "row {row}: column {col} follows {pc}; indices must be strictly increasing",
                    )));
                }
            }
            prev_col = Some(col);

            let val = values[idx];
            if !val.is_finite() {
                return Err(ValidationError::NonFiniteValue(format!(
                    "matrix[{row}, {col}] = {val}"
                )));
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// RHS validation
// ---------------------------------------------------------------------------

/// Validate a right-hand-side vector for a linear solve.
///
/// Checks that `rhs.len() == expected_len` and that every entry is finite.
/// An all-zero `rhs` is valid but emits a [`tracing::warn`].
pub fn validate_rhs(rhs: &[f64], expected_len: usize) -> Result<(), ValidationError> {
    if rhs.len() != expected_len {
        return Err(ValidationError::DimensionMismatch(format!(
            "rhs length {} does not match matrix rows {expected_len}",
            rhs.len(),
        )));
    }

    let mut all_zero = true;
    for (i, &v) in rhs.iter().enumerate() {
        if !v.is_finite() {
            return Err(ValidationError::NonFiniteValue(format!("rhs[{i}] = {v}")));
        }
        if v != 0.0 {
            all_zero = false;
        }
    }

    if all_zero && !rhs.is_empty() {
        tracing::warn!("rhs vector is all zeros; solution will be trivially zero");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Parameter validation
// ---------------------------------------------------------------------------

/// Validate convergence parameters.
///
/// - `tolerance` must be finite and `> 0`.
/// - `max_iterations` must be in `[1, MAX_ITERATIONS]`.
pub fn validate_params(tolerance: f64, max_iterations: usize) -> Result<(), ValidationError> {
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(ValidationError::ParameterOutOfRange {
            name: "tolerance".into(),
            value: format!("{tolerance:e}"),
            expected: "finite value > 0".into(),
        });
    }

    if max_iterations == 0 || max_iterations > MAX_ITERATIONS {
        return Err(ValidationError::ParameterOutOfRange {
            name: "max_iterations".into(),
            value: max_iterations.to_string(),
            expected: format!("[1, {MAX_ITERATIONS}]"),
        });
    }

    Ok(())
}

/// Validate a `(matrix, rhs)` pair: the matrix must be square and `rhs` must
/// match its row count and be finite.
pub fn validate_solver_input(matrix: &CsrMatrix, rhs: &[f64]) -> Result<(), ValidationError> {
    if !matrix.is_square() {
        return Err(ValidationError::DimensionMismatch(format!(
            "solver requires a square matrix but got {}x{}",
            matrix.rows(),
            matrix.cols(),
        )));
    }
    validate_rhs(rhs, matrix.rows())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
