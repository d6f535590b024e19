//! Truncated Neumann series.
//!
//! Approximates `M^{-1} c` for a square `M` by splitting `S M = I - N` with a
//! positive diagonal scaling `S` and summing
//!
//! ```text
//! x = sum_{i=0}^{T} N^i S c
//! ```
//!
//! term by term: `t_0 = S c`, `t_{i+1} = t_i - S (M t_i)`. Each term costs one
//! sparse matrix-vector product. Two scalings are supported:
//!
//! - [`SeriesScaling::Jacobi`]: `S = D^{-1}`. Converges when `M` is strictly
//!   diagonally dominant.
//! - [`SeriesScaling::Gershgorin`]: `S = omega I` with
//!   `omega = 1 / max_i sum_j |m_ij|`, so every eigenvalue of `omega M` lies in
//!   the unit disc around the origin. Used for sketched matrices that lost
//!   dominance.
//!
//! A term whose norm exceeds twice the previous one means the series is
//! diverging; the solve aborts with [`SolverError::NumericalInstability`].

use tracing::{debug, trace, warn};

use crate::analysis::dominance;
use crate::budget::BudgetEnforcer;
use crate::error::{SolveStage, SolverError};
use crate::pool::VectorPool;
use crate::profile::OpCounter;
use crate::types::{CsrMatrix, SeriesScaling, Termination};

/// If a term grows by more than this factor over the previous one, the series
/// is declared divergent.
pub const INSTABILITY_GROWTH_FACTOR: f64 = 2.0;

/// Diagonal magnitudes below this are treated as zero.
pub const DIAGONAL_EPSILON: f64 = 1e-14;

/// Outcome of summing the series.
#[derive(Debug, Clone)]
pub struct SeriesOutcome {
    /// Partial sum.
    pub solution: Vec<f64>,
    /// Terms summed, including `t_0`.
    pub terms_used: usize,
    /// `||t_i||` for every summed term.
    pub term_norms: Vec<f64>,
    /// Scaling that was applied.
    pub scaling: SeriesScaling,
    /// Set when the wall-clock budget cut the series short.
    pub termination: Option<Termination>,
}

/// Truncated Neumann series with a fixed number of terms.
#[derive(Debug, Clone)]
pub struct NeumannSeries {
    terms: usize,
    scaling: SeriesScaling,
    stage: SolveStage,
}

impl NeumannSeries {
    /// Series summing `t_0 ..= t_terms`, reporting failures as `stage`.
    pub fn new(terms: usize, scaling: SeriesScaling, stage: SolveStage) -> Self {
        Self {
            terms,
            scaling,
            stage,
        }
    }

    /// Jacobi when `m` is diagonally dominant, Gershgorin otherwise.
    pub fn choose_scaling(m: &CsrMatrix) -> SeriesScaling {
        let (dominant, _) = dominance(m, &m.diagonal());
        if dominant {
            SeriesScaling::Jacobi
        } else {
            SeriesScaling::Gershgorin
        }
    }

    /// `T = ceil(ln(1 / tolerance))`, clamped to `[1, max_iterations]`.
    pub fn terms_for_tolerance(tolerance: f64, max_iterations: usize) -> usize {
        let t = (1.0 / tolerance).ln().ceil();
        let cap = max_iterations.max(1);
        if t.is_finite() && t >= 1.0 {
            (t as usize).min(cap)
        } else {
            1
        }
    }

    /// Number of terms after `t_0`.
    pub fn terms(&self) -> usize {
        self.terms
    }

    /// Scaling used by [`sum`](Self::sum).
    pub fn scaling(&self) -> SeriesScaling {
        self.scaling
    }

    /// Per-row scale factors `S`.
    fn scale_vector(&self, m: &CsrMatrix) -> Result<Vec<f64>, SolverError> {
        match self.scaling {
            SeriesScaling::Jacobi => {
                let diag = m.diagonal();
                if let Some((i, d)) = diag
                    .iter()
                    .enumerate()
                    .find(|(_, d)| d.abs() < DIAGONAL_EPSILON)
                {
                    return Err(SolverError::instability(
                        self.stage,
                        0,
                        format!("diagonal entry a[{i},{i}] = {d:e} is too small for Jacobi scaling"),
                        &[],
                        f64::INFINITY,
                    ));
                }
                Ok(diag.iter().map(|d| 1.0 / d).collect())
            }
            SeriesScaling::Gershgorin => {
                let max_row_sum = (0..m.rows())
                    .map(|i| m.row_entries(i).map(|(_, v)| v.abs()).sum::<f64>())
                    .fold(0.0f64, f64::max);
                if max_row_sum < DIAGONAL_EPSILON {
                    return Err(SolverError::instability(
                        self.stage,
                        0,
                        "matrix has no entries of usable magnitude",
                        &[],
                        f64::INFINITY,
                    ));
                }
                Ok(vec![1.0 / max_row_sum; m.rows()])
            }
        }
    }

    /// Sum the series for `M x = c`.
    ///
    /// `budget` is consulted for wall-clock exhaustion before every term.
    ///
    /// # Errors
    ///
    /// - [`SolverError::InvalidDimensions`] if `c.len() != m.rows()` or `m` is
    ///   not square.
    /// - [`SolverError::NumericalInstability`] on a near-zero Jacobi diagonal,
    ///   a non-finite term, or a term growing by more than
    ///   [`INSTABILITY_GROWTH_FACTOR`]. The report carries the partial sum
    ///   accumulated before the failing term.
    pub fn sum(
        &self,
        m: &CsrMatrix,
        c: &[f64],
        counter: &mut OpCounter,
        budget: &BudgetEnforcer,
        pool: &VectorPool,
    ) -> Result<SeriesOutcome, SolverError> {
        let n = m.rows();
        if !m.is_square() || c.len() != n {
            return Err(SolverError::InvalidDimensions(format!(
                "neumann series on {}x{} matrix with rhs of length {}",
                m.rows(),
                m.cols(),
                c.len(),
            )));
        }

        let scale = self.scale_vector(m)?;
        debug!(n, terms = self.terms, scaling = ?self.scaling, stage = %self.stage, "neumann series");

        let mut term = pool.acquire(n);
        let mut m_term = pool.acquire(n);
        let mut x = vec![0.0f64; n];

        for ((t, &s), &ci) in term.iter_mut().zip(&scale).zip(c) {
            *t = s * ci;
        }
        counter.axpy(1.0, &term, &mut x)?;
        let mut prev_norm = counter.norm(&term);
        let mut term_norms = vec![prev_norm];
        let mut termination = None;

        for i in 1..=self.terms {
            if prev_norm == 0.0 {
                break;
            }
            if budget.time_exhausted() {
                warn!(term = i, "time budget exhausted during neumann series");
                termination = Some(Termination::TimeBudgetExhausted);
                break;
            }

            counter.matvec(m, &term, &mut m_term)?;
            for ((t, &s), &mt) in term.iter_mut().zip(&scale).zip(m_term.iter()) {
                *t -= s * mt;
            }
            let norm = counter.norm(&term);
            trace!(term = i, norm, "neumann term");

            if !norm.is_finite() || norm > INSTABILITY_GROWTH_FACTOR * prev_norm {
                warn!(term = i, norm, prev_norm, "neumann series diverging");
                return Err(SolverError::instability(
                    self.stage,
                    i,
                    format!(
                        "term norm grew from {prev_norm:e} to {norm:e}; series is diverging"
                    ),
                    &x,
                    f64::INFINITY,
                ));
            }

            counter.axpy(1.0, &term, &mut x)?;
            term_norms.push(norm);
            prev_norm = norm;
        }

        Ok(SeriesOutcome {
            solution: x,
            terms_used: term_norms.len(),
            term_norms,
            scaling: self.scaling,
            termination,
        })
    }
}
