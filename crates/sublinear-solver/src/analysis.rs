//! Structural and spectral inspection of a matrix before a solve.
//!
//! [`MatrixAnalyzer`] answers the questions the facade needs to pick a
//! backend: is the matrix diagonally dominant, how large is it, and what
//! guarantee can each method honestly claim for it.
//!
//! The condition-number and spectral-radius figures are cheap heuristics:
//!
//! - `condition_number_estimate` is `max |a_ii| / min |a_ii|`, a diagonal
//!   proxy and not the 2-norm condition number.
//! - `spectral_radius_estimate` is a short power iteration on the Jacobi
//!   iteration matrix `I - D^{-1} A`, not a certified bound.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::jl::derive_target_dimension;
use crate::kernels;
use crate::types::{ComplexityBound, CsrMatrix, Method};
use crate::validation::validate_sketch_size;

/// Read-only summary of a matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixAnalysis {
    /// Row count (equal to the column count).
    pub rows: usize,
    /// Stored entries.
    pub nnz: usize,
    /// `|a_ii| >= sum_{j != i} |a_ij|` for every row, with a non-zero diagonal.
    pub is_diagonally_dominant: bool,
    /// Largest `sum_{j != i} |a_ij| / |a_ii|` over all rows (`INFINITY` for a
    /// zero diagonal).
    pub max_dominance_ratio: f64,
    /// Diagonal magnitude ratio; see the module docs.
    pub condition_number_estimate: f64,
    /// `1 - nnz / n^2`.
    pub sparsity_ratio: f64,
    /// Power-iteration estimate of `rho(I - D^{-1} A)`.
    pub spectral_radius_estimate: f64,
    /// Mean stored entries per row.
    pub avg_nnz_per_row: f64,
    /// Largest row degree.
    pub max_nnz_per_row: usize,
    /// Sparsity pattern is symmetric.
    pub is_symmetric_structure: bool,
    /// Values are symmetric (implies a symmetric pattern).
    pub is_symmetric: bool,
    /// Backend the facade should use in automatic mode.
    pub recommended_method: Method,
    /// Claim for the recommended backend.
    pub complexity_bound: ComplexityBound,
}

/// Configurable matrix inspector.
#[derive(Debug, Clone)]
pub struct MatrixAnalyzer {
    jl_distortion: f64,
    target_dimension: Option<usize>,
    max_target_dimension: usize,
    sublinear_min_rows: usize,
    power_iterations: usize,
    seed: u64,
}

impl Default for MatrixAnalyzer {
    fn default() -> Self {
        Self::from_config(&SolverConfig::default())
    }
}

impl MatrixAnalyzer {
    /// Analyzer with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzer using the thresholds of a solve configuration.
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            jl_distortion: config.jl_distortion,
            target_dimension: config.target_dimension,
            max_target_dimension: config.max_target_dimension,
            sublinear_min_rows: config.sublinear_min_rows,
            power_iterations: config.power_iterations,
            seed: config.seed,
        }
    }

    /// Rows a dominant matrix must exceed before the sketch path is
    /// recommended.
    pub fn with_sublinear_min_rows(mut self, rows: usize) -> Self {
        self.sublinear_min_rows = rows;
        self
    }

    /// Power-iteration steps.
    pub fn with_power_iterations(mut self, steps: usize) -> Self {
        self.power_iterations = steps;
        self
    }

    /// Inspect `matrix`.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidDimensions`] if the matrix is not square.
    #[instrument(skip(self, matrix), fields(n = matrix.rows(), nnz = matrix.nnz()))]
    pub fn analyze(&self, matrix: &CsrMatrix) -> Result<MatrixAnalysis, SolverError> {
        if !matrix.is_square() {
            return Err(SolverError::InvalidDimensions(format!(
                "analysis requires a square matrix, got {}x{}",
                matrix.rows(),
                matrix.cols(),
            )));
        }

        let n = matrix.rows();
        let nnz = matrix.nnz();
        let diag = matrix.diagonal();

        let (is_dd, max_ratio) = dominance(matrix, &diag);
        let condition = diagonal_condition(&diag);
        let sparsity_ratio = if n == 0 {
            1.0
        } else {
            1.0 - nnz as f64 / (n as f64 * n as f64)
        };
        let spectral = self.spectral_radius(matrix, &diag)?;
        let max_nnz_per_row = (0..n).map(|i| matrix.row_degree(i)).max().unwrap_or(0);
        let (symmetric_structure, symmetric) = symmetry(matrix);

        let k = self
            .target_dimension
            .unwrap_or_else(|| {
                derive_target_dimension(n, self.jl_distortion, self.max_target_dimension)
            })
            .min(n.max(1));
        let sketch_fits = validate_sketch_size(n, k).is_ok();
        if is_dd && !sketch_fits {
            debug!(n, k, "dense sketch exceeds the size limit, keeping exact");
        }
        let recommended_method = if is_dd && sketch_fits && n > self.sublinear_min_rows {
            Method::Sublinear
        } else {
            Method::Exact
        };
        let complexity_bound = match recommended_method {
            Method::Sublinear => ComplexityBound::logarithmic(n, self.jl_distortion, k),
            Method::Exact => ComplexityBound::sqrt(n, nnz, condition),
        };

        debug!(
            dominant = is_dd,
            spectral_radius = spectral,
            condition_estimate = condition,
            method = %recommended_method,
            "matrix analysed"
        );

        Ok(MatrixAnalysis {
            rows: n,
            nnz,
            is_diagonally_dominant: is_dd,
            max_dominance_ratio: max_ratio,
            condition_number_estimate: condition,
            sparsity_ratio,
            spectral_radius_estimate: spectral,
            avg_nnz_per_row: if n == 0 { 0.0 } else { nnz as f64 / n as f64 },
            max_nnz_per_row,
            is_symmetric_structure: symmetric_structure,
            is_symmetric: symmetric,
            recommended_method,
            complexity_bound,
        })
    }

    /// Power iteration on `N = I - D^{-1} A` from a seeded random unit vector.
    fn spectral_radius(&self, matrix: &CsrMatrix, diag: &[f64]) -> Result<f64, SolverError> {
        let n = matrix.rows();
        if n == 0 {
            return Ok(0.0);
        }
        if diag.iter().any(|&d| d == 0.0) {
            return Ok(f64::INFINITY);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut v: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let v_norm = kernels::norm(&v);
        if v_norm == 0.0 {
            return Ok(0.0);
        }
        kernels::scale(1.0 / v_norm, &mut v);

        let mut av = vec![0.0; n];
        let mut estimate = 0.0;
        for _ in 0..self.power_iterations {
            matrix.multiply_vector(&v, &mut av)?;
            for i in 0..n {
                av[i] = v[i] - av[i] / diag[i];
            }
            let w_norm = kernels::norm(&av);
            if !w_norm.is_finite() {
                return Ok(f64::INFINITY);
            }
            estimate = w_norm;
            if w_norm == 0.0 {
                break;
            }
            for i in 0..n {
                v[i] = av[i] / w_norm;
            }
        }
        Ok(estimate)
    }
}

/// Row-wise dominance test and the worst off-diagonal/diagonal ratio.
pub(crate) fn dominance(matrix: &CsrMatrix, diag: &[f64]) -> (bool, f64) {
    let mut dominant = true;
    let mut max_ratio = 0.0f64;
    for (i, &d) in diag.iter().enumerate() {
        let off: f64 = matrix
            .row_entries(i)
            .filter(|&(j, _)| j != i)
            .map(|(_, v)| v.abs())
            .sum();
        let d = d.abs();
        if d == 0.0 {
            dominant = false;
            max_ratio = f64::INFINITY;
            continue;
        }
        if d < off {
            dominant = false;
        }
        max_ratio = max_ratio.max(off / d);
    }
    (dominant, max_ratio)
}

pub(crate) fn diagonal_condition(diag: &[f64]) -> f64 {
    if diag.is_empty() {
        return 1.0;
    }
    let (lo, hi) = diag
        .iter()
        .map(|d| d.abs())
        .fold((f64::INFINITY, 0.0f64), |(lo, hi), d| (lo.min(d), hi.max(d)));
    if lo == 0.0 {
        f64::INFINITY
    } else {
        hi / lo
    }
}

/// `(pattern symmetric, values symmetric)`.
fn symmetry(matrix: &CsrMatrix) -> (bool, bool) {
    let mut values_match = true;
    for i in 0..matrix.rows() {
        for (j, v) in matrix.row_entries(i) {
            if j == i {
                continue;
            }
            if !matrix.contains(j, i) {
                return (false, false);
            }
            let mirrored = matrix.get(j, i);
            if (v - mirrored).abs() > 1e-12 * v.abs().max(mirrored.abs()).max(1.0) {
                values_match = false;
            }
        }
    }
    (true, values_match)
}

/// Analyse with default thresholds.
pub fn analyze(matrix: &CsrMatrix) -> Result<MatrixAnalysis, SolverError> {
    MatrixAnalyzer::default().analyze(matrix)
}
