//! Solver strategy interface.
//!
//! Both backends implement [`SolverEngine`]. The facade picks an engine by
//! [`Method`] at call time; nothing is cached process-wide.

use crate::analysis::MatrixAnalysis;
use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::pool::VectorPool;
use crate::types::{ComplexityEstimate, CsrMatrix, Method, SolverResult};

/// Core trait that every solver backend implements.
///
/// A `SolverEngine` accepts a sparse system, a configuration and a scratch
/// pool, returning either a [`SolverResult`] or a [`SolverError`]. Engines
/// always return the full solution vector; output shaping is the facade's job.
pub trait SolverEngine: Send + Sync {
    /// Solve `A x = b`.
    ///
    /// # Arguments
    ///
    /// * `matrix` - square sparse coefficient matrix.
    /// * `rhs` - right-hand side `b`, `rhs.len() == matrix.rows()`.
    /// * `config` - validated solve configuration.
    /// * `pool` - scratch buffers; every buffer checked out is returned before
    ///   this call ends, on success and on error.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidDimensions`] on shape mismatch and
    /// [`SolverError::NumericalInstability`] on breakdown. Exhausted budgets
    /// are reported through [`SolverResult::termination`].
    fn solve(
        &self,
        matrix: &CsrMatrix,
        rhs: &[f64],
        config: &SolverConfig,
        pool: &VectorPool,
    ) -> Result<SolverResult, SolverError>;

    /// Predict the cost of solving a system with the given analysis, without
    /// solving it.
    fn estimate_complexity(
        &self,
        analysis: &MatrixAnalysis,
        config: &SolverConfig,
    ) -> ComplexityEstimate;

    /// Method identifier for this engine.
    fn method(&self) -> Method;
}
