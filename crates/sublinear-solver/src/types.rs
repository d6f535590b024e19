//! Core types for sparse linear solves.
//!
//! Provides [`CsrMatrix`] for compressed sparse row storage and the value
//! objects returned by every solve: [`SolverResult`], [`ComplexityBound`],
//! [`SolutionPayload`] and friends.

use serde::{Deserialize, Serialize};

use crate::error::{SolverError, ValidationError};
use crate::profile::PerformanceStats;
use crate::validation::MAX_NODES;

// ---------------------------------------------------------------------------
// CsrMatrix
// ---------------------------------------------------------------------------

/// Compressed Sparse Row (CSR) matrix of `f64` values.
///
/// Stores only non-zero entries for sparse matrix-vector multiplication in
/// O(nnz) time.
///
/// # Layout
///
/// For a matrix with `m` rows and `nnz` non-zeros:
/// - `row_ptr` has length `m + 1`, is non-decreasing, and `row_ptr[m] == nnz`
/// - `col_indices` and `values` each have length `nnz`
/// - Row `i` spans indices `row_ptr[i]..row_ptr[i+1]`, with strictly
///   increasing (hence unique) column indices
///
/// The matrix is immutable once built, so a single instance can be shared by
/// reference across concurrent solves.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    row_ptr: Vec<u32>,
    col_indices: Vec<u32>,
    values: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl CsrMatrix {
    /// Build a CSR matrix from COO `(row, col, value)` triplets.
    ///
    /// Entries are sorted by `(row, col)` and duplicate positions are summed.
    ///
    /// # Errors
    ///
    /// - [`SolverError::InvalidDimensions`] if any index falls outside
    ///   `[0, rows) x [0, cols)` or the shape exceeds the crate limits.
    /// - [`SolverError::InvalidParameters`] if any value is NaN or infinite.
    pub fn from_triplets(
        rows: usize,
        cols: usize,
        entries: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Result<Self, SolverError> {
        if rows > MAX_NODES || cols > MAX_NODES {
            return Err(ValidationError::MatrixTooLarge {
                rows,
                cols,
                max_dim: MAX_NODES,
            }
            .into());
        }

        let mut sorted: Vec<(usize, usize, f64)> = entries.into_iter().collect();
        for &(r, c, v) in &sorted {
            if r >= rows || c >= cols {
                return Err(ValidationError::IndexOutOfBounds {
                    row: r,
                    col: c,
                    rows,
                    cols,
                }
                .into());
            }
            if !v.is_finite() {
                return Err(ValidationError::NonFiniteValue(format!(
                    "triplet ({r}, {c}) has value {v}"
                ))
                .into());
            }
        }
        sorted.sort_unstable_by_key(|&(r, c, _)| (r, c));

        // Merge duplicates in one pass over the sorted triplets.
        let mut merged: Vec<(usize, usize, f64)> = Vec::with_capacity(sorted.len());
        for (r, c, v) in sorted {
            match merged.last_mut() {
                Some(last) if last.0 == r && last.1 == c => last.2 += v,
                _ => merged.push((r, c, v)),
            }
        }

        let nnz = merged.len();
        crate::validation::check_entry_count(nnz)?;

        let mut row_ptr = vec![0u32; rows + 1];
        let mut col_indices = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);

        for &(r, c, v) in &merged {
            row_ptr[r + 1] += 1;
            col_indices.push(c as u32);
            values.push(v);
        }
        for i in 1..=rows {
            row_ptr[i] += row_ptr[i - 1];
        }

        Ok(Self {
            row_ptr,
            col_indices,
            values,
            rows,
            cols,
        })
    }

    /// Assemble a matrix from raw CSR arrays, validating every structural
    /// invariant (see [`validate_csr_parts`](crate::validation::validate_csr_parts)).
    pub fn from_raw_parts(
        rows: usize,
        cols: usize,
        row_ptr: Vec<u32>,
        col_indices: Vec<u32>,
        values: Vec<f64>,
    ) -> Result<Self, SolverError> {
        crate::validation::validate_csr_parts(rows, cols, &row_ptr, &col_indices, &values)?;
        Ok(Self {
            row_ptr,
            col_indices,
            values,
            rows,
            cols,
        })
    }

    /// Square identity matrix of dimension `n`.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidDimensions`] if `n` exceeds
    /// [`MAX_NODES`](crate::validation::MAX_NODES).
    pub fn identity(n: usize) -> Result<Self, SolverError> {
        if n > MAX_NODES {
            return Err(ValidationError::MatrixTooLarge {
                rows: n,
                cols: n,
                max_dim: MAX_NODES,
            }
            .into());
        }
        // MAX_NODES < u32::MAX, so the index casts below are exact.
        let dim = n as u32;
        Ok(Self {
            row_ptr: (0..=dim).collect(),
            col_indices: (0..dim).collect(),
            values: vec![1.0; n],
            rows: n,
            cols: n,
        })
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// `true` when `rows == cols`.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Row pointer array (`rows + 1` entries).
    #[inline]
    pub fn row_ptr(&self) -> &[u32] {
        &self.row_ptr
    }

    /// Column index of every stored entry.
    #[inline]
    pub fn col_indices(&self) -> &[u32] {
        &self.col_indices
    }

    /// Value of every stored entry.
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of stored entries in `row`.
    #[inline]
    pub fn row_degree(&self, row: usize) -> usize {
        (self.row_ptr[row + 1] - self.row_ptr[row]) as usize
    }

    /// Iterate over `(col, value)` pairs of the given row.
    #[inline]
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.row_ptr[row] as usize;
        let end = self.row_ptr[row + 1] as usize;
        self.col_indices[start..end]
            .iter()
            .map(|&c| c as usize)
            .zip(self.values[start..end].iter().copied())
    }

    /// Entry at `(row, col)`, or `0.0` when it is not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.rows || col >= self.cols {
            return 0.0;
        }
        let start = self.row_ptr[row] as usize;
        let end = self.row_ptr[row + 1] as usize;
        match self.col_indices[start..end].binary_search(&(col as u32)) {
            Ok(pos) => self.values[start + pos],
            Err(_) => 0.0,
        }
    }

    /// `true` when `(row, col)` is a stored entry.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        let start = self.row_ptr[row] as usize;
        let end = self.row_ptr[row + 1] as usize;
        self.col_indices[start..end].binary_search(&(col as u32)).is_ok()
    }

    /// Main diagonal; missing entries read as `0.0`.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols)).map(|i| self.get(i, i)).collect()
    }

    /// Sparse matrix-vector multiply: `y = A * x`.
    ///
    /// The inner loop processes four non-zeros per step into independent
    /// accumulators. For a given `(A, x)` the result is bit-identical across
    /// calls.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidDimensions`] unless `x.len() == cols` and
    /// `y.len() == rows`.
    pub fn multiply_vector(&self, x: &[f64], y: &mut [f64]) -> Result<(), SolverError> {
        if x.len() != self.cols || y.len() != self.rows {
            return Err(SolverError::InvalidDimensions(format!(
                "spmv on {}x{} matrix needs x.len() = {} and y.len() = {}, got {} and {}",
                self.rows,
                self.cols,
                self.cols,
                self.rows,
                x.len(),
                y.len(),
            )));
        }
        self.spmv(x, y);
        Ok(())
    }

    /// Fused residual: writes `r = b - A*x` and returns `||r||_2`.
    ///
    /// Saves a separate subtraction and norm pass over the vectors.
    pub fn residual_into(&self, x: &[f64], b: &[f64], r: &mut [f64]) -> Result<f64, SolverError> {
        if b.len() != self.rows || r.len() != self.rows {
            return Err(SolverError::InvalidDimensions(format!(
                "residual needs b and r of length {}, got {} and {}",
                self.rows,
                b.len(),
                r.len(),
            )));
        }
        self.multiply_vector(x, r)?;
        let mut norm_sq = 0.0f64;
        for (ri, &bi) in r.iter_mut().zip(b) {
            *ri = bi - *ri;
            norm_sq += *ri * *ri;
        }
        Ok(norm_sq.sqrt())
    }

    /// Unchecked SpMV core. Callers guarantee the slice lengths.
    #[inline]
    fn spmv(&self, x: &[f64], y: &mut [f64]) {
        for (i, yi) in y.iter_mut().enumerate().take(self.rows) {
            let start = self.row_ptr[i] as usize;
            let end = self.row_ptr[i + 1] as usize;
            let vals = &self.values[start..end];
            let cols = &self.col_indices[start..end];

            let mut acc0 = 0.0f64;
            let mut acc1 = 0.0f64;
            let mut acc2 = 0.0f64;
            let mut acc3 = 0.0f64;

            let mut v_chunks = vals.chunks_exact(4);
            let mut c_chunks = cols.chunks_exact(4);
            for (v, c) in (&mut v_chunks).zip(&mut c_chunks) {
                acc0 += v[0] * x[c[0] as usize];
                acc1 += v[1] * x[c[1] as usize];
                acc2 += v[2] * x[c[2] as usize];
                acc3 += v[3] * x[c[3] as usize];
            }
            for (v, &c) in v_chunks.remainder().iter().zip(c_chunks.remainder()) {
                acc0 += v * x[c as usize];
            }

            *yi = (acc0 + acc1) + (acc2 + acc3);
        }
    }
}

/// Build a `rows x cols` matrix from COO triplets.
///
/// Shorthand for [`CsrMatrix::from_triplets`]; duplicates are summed.
pub fn build_matrix(
    triplets: &[(usize, usize, f64)],
    rows: usize,
    cols: usize,
) -> Result<CsrMatrix, SolverError> {
    CsrMatrix::from_triplets(rows, cols, triplets.iter().copied())
}

// ---------------------------------------------------------------------------
// Method and complexity claims
// ---------------------------------------------------------------------------

/// Solve strategy chosen by the analyzer or forced by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Preconditioned Conjugate Gradient.
    Exact,
    /// JL sketch + truncated Neumann series + Richardson correction.
    Sublinear,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Exact => write!(f, "exact"),
            Method::Sublinear => write!(f, "sublinear"),
        }
    }
}

/// Asymptotic class named by a [`ComplexityBound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplexityKind {
    /// O(log n)-type work in the reduced space (JL sketch path).
    Logarithmic,
    /// O(sqrt(kappa) * nnz) -- Conjugate Gradient.
    Sqrt,
    /// O(nnz * log(1/eps)) -- descriptive bound for exact iterative methods.
    Sublinear,
}

/// A declared, auditable claim about the guarantee the chosen method gives
/// for this input. It is attached to every result; it is not a proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityBound {
    /// Asymptotic class.
    pub kind: ComplexityKind,
    /// Problem dimension.
    pub n: usize,
    /// JL distortion used, for the sketch path.
    pub eps: Option<f64>,
    /// Human-readable statement of the bound.
    pub description: String,
}

impl ComplexityBound {
    /// Bound for the JL + Neumann path with sketch dimension `k`.
    pub fn logarithmic(n: usize, eps: f64, k: usize) -> Self {
        Self {
            kind: ComplexityKind::Logarithmic,
            n,
            eps: Some(eps),
            description: format!(
                "O(log n / eps^2) reduced dimension: k = {k} for n = {n}, eps = {eps}; \
                 valid only for diagonally dominant systems"
            ),
        }
    }

    /// Bound for Conjugate Gradient scaled by `nnz` and the condition estimate.
    pub fn sqrt(n: usize, nnz: usize, condition_estimate: f64) -> Self {
        let sqrt_kappa = if condition_estimate.is_finite() {
            format!("{:.2}", condition_estimate.sqrt())
        } else {
            "inf".to_string()
        };
        Self {
            kind: ComplexityKind::Sqrt,
            n,
            eps: None,
            description: format!(
                "O(sqrt(kappa) * nnz * log(1/tol)) with nnz = {nnz}, sqrt(kappa) ~ {sqrt_kappa} \
                 (diagonal-ratio proxy)"
            ),
        }
    }

    /// Bound for the sketch path when `n` is at or below the base-case
    /// size: the projection is skipped, so `k = n` and the series runs on
    /// `A` itself.
    pub fn unprojected(n: usize, eps: f64, nnz: usize, terms: usize) -> Self {
        Self {
            kind: ComplexityKind::Logarithmic,
            n,
            eps: Some(eps),
            description: format!(
                "projection skipped below base-case size: k = n = {n}, eps = {eps}; \
                 O(nnz * T) with nnz = {nnz}, T = {terms} Neumann terms"
            ),
        }
    }
}

/// Cost prediction produced without running a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityEstimate {
    /// Engine the estimate is for.
    pub method: Method,
    /// Estimated floating-point operations.
    pub estimated_flops: u64,
    /// Estimated iterations (CG steps, or series terms plus correction passes).
    pub estimated_iterations: usize,
    /// Estimated peak scratch memory in bytes.
    pub estimated_memory_bytes: usize,
    /// Asymptotic class the engine would declare.
    pub kind: ComplexityKind,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Why a solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Residual fell to or below the tolerance.
    Converged,
    /// Iteration budget exhausted; the result holds the best-so-far iterate.
    MaxIterationsReached,
    /// Wall-clock budget exhausted; the result holds the best-so-far iterate.
    TimeBudgetExhausted,
}

/// Per-iteration convergence snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceInfo {
    /// Iteration index (0-based).
    pub iteration: usize,
    /// Residual L2 norm at this iteration.
    pub residual_norm: f64,
}

/// How the reduced (or base-case) system was scaled before the Neumann series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesScaling {
    /// `N = I - D^{-1} A`; used when `A` is diagonally dominant.
    Jacobi,
    /// `N = I - omega A` with `omega = 1 / max_i sum_j |a_ij|`.
    Gershgorin,
}

/// Bounded summary of a large solution vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionSample {
    /// First `head` entries.
    pub head: Vec<f64>,
    /// Full length of the solution.
    pub len: usize,
    /// Smallest entry.
    pub min: f64,
    /// Largest entry.
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// L2 norm.
    pub l2_norm: f64,
}

impl SolutionSample {
    /// Summarise `x`, keeping at most `head` leading entries.
    pub fn summarize(x: &[f64], head: usize) -> Self {
        let (min, max, sum, sq) = x.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0f64, 0.0f64),
            |(lo, hi, s, q), &v| (lo.min(v), hi.max(v), s + v, q + v * v),
        );
        let len = x.len();
        Self {
            head: x[..head.min(len)].to_vec(),
            len,
            min: if len == 0 { 0.0 } else { min },
            max: if len == 0 { 0.0 } else { max },
            mean: if len == 0 { 0.0 } else { sum / len as f64 },
            l2_norm: sq.sqrt(),
        }
    }
}

/// Solution carried by a [`SolverResult`], in the mode the caller asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolutionPayload {
    /// The complete solution vector.
    Full(Vec<f64>),
    /// First-K entries plus summary statistics.
    Sampled(SolutionSample),
}

impl SolutionPayload {
    /// The full vector, if this payload carries one.
    pub fn as_full(&self) -> Option<&[f64]> {
        match self {
            SolutionPayload::Full(x) => Some(x),
            SolutionPayload::Sampled(_) => None,
        }
    }

    /// Length of the underlying solution.
    pub fn len(&self) -> usize {
        match self {
            SolutionPayload::Full(x) => x.len(),
            SolutionPayload::Sampled(s) => s.len,
        }
    }

    /// `true` for a zero-dimensional solution.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` when only a sample was kept.
    pub fn is_sampled(&self) -> bool {
        matches!(self, SolutionPayload::Sampled(_))
    }
}

/// Audit data for the approximate path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproximationReport {
    /// Sketch dimension `k` (equal to `n` in the base case).
    pub target_dimension: usize,
    /// JL distortion parameter.
    pub eps: f64,
    /// Seed of the projection.
    pub seed: u64,
    /// Neumann terms actually summed.
    pub series_terms_used: usize,
    /// Scaling applied before the series.
    pub series_scaling: SeriesScaling,
    /// True residual `||b - A x0||` right after reconstruction.
    pub reconstruction_error: f64,
    /// Richardson passes executed.
    pub correction_passes: usize,
    /// True residual after each correction pass.
    pub correction_residuals: Vec<f64>,
    /// `true` when projection was skipped because `n <= base_case_threshold`.
    pub base_case: bool,
    /// `true` when the reduced matrix was sparsified.
    pub sparsified: bool,
}

/// Result of one solve call. Created once, never mutated by the library
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverResult {
    /// Solution, full or sampled.
    pub solution: SolutionPayload,
    /// Iterations performed (CG steps, or series terms plus correction
    /// passes on the approximate path).
    pub iterations: usize,
    /// Final true residual L2 norm `||b - A x||`.
    pub residual_norm: f64,
    /// `true` iff `termination == Converged`.
    pub converged: bool,
    /// Why the solve stopped.
    pub termination: Termination,
    /// Method that produced the solution.
    pub method: Method,
    /// Declared complexity claim for this input.
    pub complexity_bound: ComplexityBound,
    /// Operation counters and timing.
    pub performance: PerformanceStats,
    /// Residual trace.
    pub convergence_history: Vec<ConvergenceInfo>,
    /// Present on the approximate path only.
    pub approximation: Option<ApproximationReport>,
    /// Set when the facade fell back from the routed method to CG.
    pub fallback: Option<String>,
}

impl SolverResult {
    /// The full solution vector, if the result was produced in full mode.
    pub fn full_solution(&self) -> Option<&[f64]> {
        self.solution.as_full()
    }
}
