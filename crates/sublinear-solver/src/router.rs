//! Method routing and the solver facade.
//!
//! [`SolverRouter`] turns a [`MatrixAnalysis`] and the caller's [`SolveMode`]
//! into a [`Route`] and hands out the matching [`SolverEngine`].
//! [`SolverFacade`] is the external boundary: it validates the request,
//! analyses the matrix, dispatches, optionally falls back, and shapes the
//! result.
//!
//! # Routing table
//!
//! | Mode | Condition | Method |
//! |------|-----------|--------|
//! | `Auto` | analyzer recommends sublinear | Sublinear |
//! | `Auto` | otherwise | Exact |
//! | `ForceExact` | always | Exact |
//! | `ForceSublinear` | diagonally dominant | Sublinear |
//! | `ForceSublinear` | not diagonally dominant | Exact (recorded fallback) |
//!
//! # Fallback
//!
//! With [`SolverConfig::fallback_to_exact`] set, a
//! [`SolverError::NumericalInstability`] from the sketch path is retried once
//! with Conjugate Gradient. Any other error is returned unchanged.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::analysis::{MatrixAnalysis, MatrixAnalyzer};
use crate::audit::{AuditBuilder, SolverAuditEntry};
use crate::cg::ConjugateGradientSolver;
use crate::config::{OutputMode, SolveMode, SolverConfig};
use crate::error::SolverError;
use crate::pool::VectorPool;
use crate::profile::PerformanceStats;
use crate::sublinear::SublinearSolver;
use crate::traits::SolverEngine;
use crate::types::{ComplexityEstimate, CsrMatrix, Method, SolutionPayload, SolutionSample, SolverResult};
use crate::validation::validate_solver_input;

// ---------------------------------------------------------------------------
// SolverRouter
// ---------------------------------------------------------------------------

/// Routing decision for one solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Engine to run.
    pub method: Method,
    /// Why the requested method was replaced, if it was.
    pub fallback: Option<String>,
}

/// Picks a backend per call. Holds one instance of each engine; both are
/// stateless, so the router carries no per-solve state.
///
/// # Example
///
/// ```rust
/// use sublinear_solver::analysis::analyze;
/// use sublinear_solver::config::SolveMode;
/// use sublinear_solver::router::SolverRouter;
/// use sublinear_solver::types::{CsrMatrix, Method};
///
/// let router = SolverRouter::new();
/// let analysis = analyze(&CsrMatrix::identity(4).unwrap()).unwrap();
/// let route = router.select(&analysis, SolveMode::ForceExact);
/// assert_eq!(route.method, Method::Exact);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SolverRouter {
    exact: ConjugateGradientSolver,
    sublinear: SublinearSolver,
}

impl SolverRouter {
    /// Router over the two built-in engines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose a method for `analysis` under `mode`.
    ///
    /// Pure function of its inputs; it never touches matrix data.
    pub fn select(&self, analysis: &MatrixAnalysis, mode: SolveMode) -> Route {
        match mode {
            SolveMode::ForceExact => {
                debug!("routing to exact (forced)");
                Route {
                    method: Method::Exact,
                    fallback: None,
                }
            }
            SolveMode::Auto => {
                debug!(
                    method = %analysis.recommended_method,
                    dominant = analysis.is_diagonally_dominant,
                    rows = analysis.rows,
                    "routing to analyzer recommendation"
                );
                Route {
                    method: analysis.recommended_method,
                    fallback: None,
                }
            }
            SolveMode::ForceSublinear if analysis.is_diagonally_dominant => {
                debug!("routing to sublinear (forced)");
                Route {
                    method: Method::Sublinear,
                    fallback: None,
                }
            }
            SolveMode::ForceSublinear => {
                let reason = format!(
                    "matrix is not diagonally dominant (max off-diagonal/diagonal ratio {:.3e}); \
                     solved with conjugate gradient instead of the sketch path",
                    analysis.max_dominance_ratio
                );
                warn!(ratio = analysis.max_dominance_ratio, "sublinear mode refused, falling back to exact");
                Route {
                    method: Method::Exact,
                    fallback: Some(reason),
                }
            }
        }
    }

    /// Engine implementing `method`.
    pub fn engine(&self, method: Method) -> &dyn SolverEngine {
        match method {
            Method::Exact => &self.exact,
            Method::Sublinear => &self.sublinear,
        }
    }
}

// ---------------------------------------------------------------------------
// SolverFacade
// ---------------------------------------------------------------------------

/// Single entry point for solving `A x = b`.
///
/// Owns a [`SolverConfig`], a [`SolverRouter`] and a [`VectorPool`]. The pool
/// is not shared across threads: give each worker its own facade.
///
/// # Example
///
/// ```rust
/// use sublinear_solver::config::SolverConfig;
/// use sublinear_solver::router::SolverFacade;
/// use sublinear_solver::types::{build_matrix, Method};
///
/// let a = build_matrix(
///     &[(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)],
///     2,
///     2,
/// )
/// .unwrap();
/// let facade = SolverFacade::new(SolverConfig::default());
/// let result = facade.solve(&a, &[1.0, 2.0]).unwrap();
/// assert!(result.converged);
/// assert_eq!(result.method, Method::Exact);
/// ```
#[derive(Debug, Default)]
pub struct SolverFacade {
    config: SolverConfig,
    router: SolverRouter,
    pool: VectorPool,
}

impl SolverFacade {
    /// Facade with the given default configuration.
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            router: SolverRouter::new(),
            pool: VectorPool::new(),
        }
    }

    /// Configuration used by [`solve`](Self::solve).
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The router.
    pub fn router(&self) -> &SolverRouter {
        &self.router
    }

    /// Scratch pool shared by every solve on this facade.
    pub fn pool(&self) -> &VectorPool {
        &self.pool
    }

    /// Analyse `matrix` with this facade's thresholds.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidDimensions`] for a non-square matrix.
    pub fn analyze(&self, matrix: &CsrMatrix) -> Result<MatrixAnalysis, SolverError> {
        MatrixAnalyzer::from_config(&self.config).analyze(matrix)
    }

    /// Solve `A x = b` with the facade's configuration.
    ///
    /// # Errors
    ///
    /// See [`solve_with`](Self::solve_with).
    pub fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<SolverResult, SolverError> {
        self.solve_with(matrix, rhs, &self.config)
    }

    /// Solve `A x = b` with an explicit configuration.
    ///
    /// Parameters and dimensions are checked before any work is done.
    ///
    /// # Errors
    ///
    /// - [`SolverError::InvalidParameters`] for an invalid config or a
    ///   non-finite right-hand side.
    /// - [`SolverError::InvalidDimensions`] for a non-square matrix or a
    ///   right-hand side of the wrong length.
    /// - [`SolverError::NumericalInstability`] when the chosen backend breaks
    ///   down and no fallback applies.
    #[instrument(skip(self, matrix, rhs, config), fields(n = matrix.rows(), nnz = matrix.nnz(), mode = ?config.mode))]
    pub fn solve_with(
        &self,
        matrix: &CsrMatrix,
        rhs: &[f64],
        config: &SolverConfig,
    ) -> Result<SolverResult, SolverError> {
        config.validate()?;
        validate_solver_input(matrix, rhs)?;

        let analysis = MatrixAnalyzer::from_config(config).analyze(matrix)?;
        let route = self.router.select(&analysis, config.mode);
        info!(method = %route.method, n = matrix.rows(), "dispatching solve");

        let started = Instant::now();
        let mut result = match self.router.engine(route.method).solve(matrix, rhs, config, &self.pool) {
            Ok(result) => result,
            Err(SolverError::NumericalInstability(report))
                if route.method == Method::Sublinear && config.fallback_to_exact =>
            {
                warn!(
                    stage = %report.stage,
                    iteration = report.iteration,
                    detail = %report.detail,
                    "sublinear path unstable, retrying with conjugate gradient"
                );
                let failed = PerformanceStats {
                    wall_time_ms: started.elapsed().as_secs_f64() * 1e3,
                    ..Default::default()
                };
                let mut result = self
                    .router
                    .engine(Method::Exact)
                    .solve(matrix, rhs, config, &self.pool)?;
                let mut performance = failed;
                performance.accumulate(&result.performance);
                result.performance = performance;
                result.fallback = Some(format!(
                    "sublinear path unstable at {} (iteration {}): {}; retried with conjugate gradient",
                    report.stage, report.iteration, report.detail
                ));
                result
            }
            Err(e) => return Err(e),
        };

        if result.fallback.is_none() {
            result.fallback = route.fallback;
        }
        info!(
            method = %result.method,
            converged = result.converged,
            iterations = result.iterations,
            residual = result.residual_norm,
            "solve finished"
        );
        Ok(shape_output(result, config.output))
    }

    /// Solve and produce an audit record alongside the result.
    ///
    /// # Errors
    ///
    /// Same as [`solve`](Self::solve); no record is produced for a failed
    /// solve.
    pub fn solve_audited(
        &self,
        request_id: impl Into<String>,
        matrix: &CsrMatrix,
        rhs: &[f64],
    ) -> Result<(SolverResult, SolverAuditEntry), SolverError> {
        let audit = AuditBuilder::start(request_id, matrix, rhs);
        let result = self.solve(matrix, rhs)?;
        let entry = audit.finish(&result);
        debug!(request_id = %entry.request_id, wall_time_us = entry.wall_time_us, "audit entry recorded");
        Ok((result, entry))
    }

    /// Predict the cost of [`solve`](Self::solve) on `matrix` without
    /// solving it.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidParameters`] for an invalid config and
    /// [`SolverError::InvalidDimensions`] for a non-square matrix.
    pub fn estimate_complexity(&self, matrix: &CsrMatrix) -> Result<ComplexityEstimate, SolverError> {
        self.config.validate()?;
        let analysis = self.analyze(matrix)?;
        let route = self.router.select(&analysis, self.config.mode);
        Ok(self
            .router
            .engine(route.method)
            .estimate_complexity(&analysis, &self.config))
    }

    /// Release every cached scratch buffer.
    pub fn dispose(&mut self) {
        dispose(&mut self.pool);
    }
}

fn shape_output(mut result: SolverResult, output: OutputMode) -> SolverResult {
    if let OutputMode::Sampled { head } = output {
        if let SolutionPayload::Full(x) = &result.solution {
            result.solution = SolutionPayload::Sampled(SolutionSample::summarize(x, head));
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Solve `A x = b` once with `config` (or the defaults).
///
/// Builds a throwaway [`SolverFacade`]; keep a facade around to reuse its
/// pool across calls.
///
/// # Errors
///
/// See [`SolverFacade::solve_with`].
pub fn solve(
    matrix: &CsrMatrix,
    rhs: &[f64],
    config: Option<&SolverConfig>,
) -> Result<SolverResult, SolverError> {
    let config = config.cloned().unwrap_or_default();
    SolverFacade::new(config).solve(matrix, rhs)
}

/// Release every buffer cached by `pool`.
pub fn dispose(pool: &mut VectorPool) {
    let cached = pool.cached();
    pool.dispose();
    debug!(cached, "vector pool disposed");
}
