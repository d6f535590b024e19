//! Conjugate Gradient solver for symmetric positive-definite systems.
//!
//! Solves `Ax = b` where `A` is a symmetric positive-definite (SPD) sparse
//! matrix in CSR format. Converges in `O(sqrt(kappa) * log(1/eps))`
//! iterations where `kappa = cond(A)`.
//!
//! # Algorithm
//!
//! ```text
//! r = b            (x_0 = 0)
//! z = M^{-1} r     (Jacobi preconditioner; z = r when disabled)
//! p = z
//! rz = r . z
//!
//! loop while within budget:
//!     Ap = A p
//!     if p . Ap <= 0: NumericalInstability
//!     alpha = rz / (p . Ap)
//!     x = x + alpha p
//!     r = r - alpha Ap
//!     if ||r||_2 <= tolerance: confirm with the true residual; done
//!     z = M^{-1} r
//!     beta = (r . z) / rz
//!     p = z + beta p
//! ```
//!
//! Convergence is absolute: `||b - A x||_2 <= tolerance`. When the recurrence
//! residual claims convergence but the true residual disagrees, the true
//! residual replaces the recurrence one and the iteration restarts from the
//! current `x`.
//!
//! Exhausting the iteration or wall-clock budget is not an error: the result
//! carries `converged = false` and the best-so-far iterate.

use tracing::{debug, info, instrument, trace, warn};

use crate::analysis::{diagonal_condition, MatrixAnalysis};
use crate::budget::BudgetEnforcer;
use crate::config::SolverConfig;
use crate::error::{SolveStage, SolverError};
use crate::neumann::DIAGONAL_EPSILON;
use crate::pool::VectorPool;
use crate::profile::OpCounter;
use crate::traits::SolverEngine;
use crate::types::{
    ComplexityBound, ComplexityEstimate, ComplexityKind, ConvergenceInfo, CsrMatrix, Method,
    SolutionPayload, SolverResult, Termination,
};
use crate::validation::validate_solver_input;

/// Preconditioned Conjugate Gradient.
///
/// Stateless: all parameters come from the [`SolverConfig`] passed to each
/// call, so one instance may serve concurrent solves on different pools.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConjugateGradientSolver;

impl ConjugateGradientSolver {
    /// Create a CG engine.
    pub fn new() -> Self {
        Self
    }

    // -------------------------------------------------------------------
    // Jacobi preconditioner
    // -------------------------------------------------------------------

    /// `inv_diag[i] = 1 / a_ii`.
    ///
    /// # Errors
    ///
    /// [`SolverError::NumericalInstability`] at stage `Preconditioner` if any
    /// `|a_ii| < DIAGONAL_EPSILON`.
    fn jacobi_preconditioner(matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>, SolverError> {
        let diag = matrix.diagonal();
        if let Some((i, &d)) = diag
            .iter()
            .enumerate()
            .find(|(_, d)| d.abs() < DIAGONAL_EPSILON)
        {
            warn!(row = i, diag = d, "jacobi preconditioner hit a zero diagonal");
            return Err(SolverError::instability(
                SolveStage::Preconditioner,
                0,
                format!("diagonal entry a[{i},{i}] = {d:e} cannot be inverted"),
                &vec![0.0; rhs.len()],
                crate::kernels::norm(rhs),
            ));
        }
        Ok(diag.iter().map(|d| 1.0 / d).collect())
    }

    /// `z = M^{-1} r`, or a copy of `r` without preconditioning.
    #[inline]
    fn precondition(inv_diag: Option<&[f64]>, r: &[f64], z: &mut [f64]) {
        match inv_diag {
            Some(d) => {
                for ((zi, &ri), &di) in z.iter_mut().zip(r).zip(d) {
                    *zi = ri * di;
                }
            }
            None => z.copy_from_slice(r),
        }
    }

    // -------------------------------------------------------------------
    // Core CG algorithm
    // -------------------------------------------------------------------

    fn solve_inner(
        &self,
        matrix: &CsrMatrix,
        rhs: &[f64],
        config: &SolverConfig,
        pool: &VectorPool,
    ) -> Result<SolverResult, SolverError> {
        let n = matrix.rows();
        let tol = config.tolerance;
        let mut counter = OpCounter::new(config.enable_profiling);
        let mut budget = BudgetEnforcer::from_millis(config.max_iterations, config.max_wall_time_ms);
        let diag = matrix.diagonal();
        let complexity_bound = ComplexityBound::sqrt(n, matrix.nnz(), diagonal_condition(&diag));

        let inv_diag = if config.use_preconditioning {
            Some(Self::jacobi_preconditioner(matrix, rhs)?)
        } else {
            None
        };
        let inv_diag = inv_diag.as_deref();

        let mut x = pool.acquire(n);
        let mut r = pool.acquire(n);
        let mut z = pool.acquire(n);
        let mut p = pool.acquire(n);
        let mut ap = pool.acquire(n);

        // x_0 = 0, so r_0 = b.
        r.copy_from_slice(rhs);
        let mut r_norm = counter.norm(&r);

        debug!(
            n,
            nnz = matrix.nnz(),
            tol,
            max_iter = config.max_iterations,
            precond = config.use_preconditioning,
            "CG start"
        );

        let mut history = Vec::with_capacity(config.max_iterations.min(256));
        let mut termination = None;

        if r_norm <= tol {
            termination = Some(Termination::Converged);
        }

        Self::precondition(inv_diag, &r, &mut z);
        p.copy_from_slice(&z);
        let mut rz = counter.dot(&r, &z)?;

        // ===============================================================
        // Main loop
        // ===============================================================
        while termination.is_none() {
            if let Some(reason) = budget.check_iteration() {
                termination = Some(reason);
                break;
            }
            let k = budget.iterations_used() - 1;

            counter.matvec(matrix, &p, &mut ap)?;
            let p_ap = counter.dot(&p, &ap)?;
            if !p_ap.is_finite() || p_ap <= 0.0 {
                warn!(iteration = k, p_ap, "CG: non-positive curvature");
                return Err(SolverError::instability(
                    SolveStage::ConjugateGradient,
                    k,
                    format!("p.Ap = {p_ap:e} <= 0; matrix is not positive definite"),
                    &x,
                    r_norm,
                ));
            }

            let alpha = rz / p_ap;
            if !alpha.is_finite() {
                return Err(SolverError::instability(
                    SolveStage::ConjugateGradient,
                    k,
                    format!("step size alpha = {alpha} is not finite"),
                    &x,
                    r_norm,
                ));
            }

            counter.axpy(alpha, &p, &mut x)?;
            counter.axpy(-alpha, &ap, &mut r)?;
            r_norm = counter.norm(&r);

            if !r_norm.is_finite() {
                return Err(SolverError::instability(
                    SolveStage::ConjugateGradient,
                    k,
                    "residual norm became non-finite",
                    &x,
                    f64::INFINITY,
                ));
            }

            history.push(ConvergenceInfo {
                iteration: k,
                residual_norm: r_norm,
            });
            trace!(iteration = k, residual_norm = r_norm, "CG iteration");

            if r_norm <= tol {
                // Confirm against the true residual; restart on drift.
                let true_norm = counter.residual(matrix, &x, rhs, &mut r)?;
                if true_norm <= tol {
                    r_norm = true_norm;
                    termination = Some(Termination::Converged);
                    break;
                }
                debug!(iteration = k, r_norm, true_norm, "CG: residual drift, restarting");
                r_norm = true_norm;
                Self::precondition(inv_diag, &r, &mut z);
                p.copy_from_slice(&z);
                rz = counter.dot(&r, &z)?;
                continue;
            }

            Self::precondition(inv_diag, &r, &mut z);
            let rz_new = counter.dot(&r, &z)?;
            let beta = rz_new / rz;
            if !beta.is_finite() {
                return Err(SolverError::instability(
                    SolveStage::ConjugateGradient,
                    k,
                    format!("r.z = {rz:e} collapsed; preconditioned recurrence broke down"),
                    &x,
                    r_norm,
                ));
            }
            for (pi, &zi) in p.iter_mut().zip(z.iter()) {
                *pi = zi + beta * *pi;
            }
            rz = rz_new;
        }

        let termination = termination.unwrap_or(Termination::MaxIterationsReached);
        let converged = termination == Termination::Converged;
        if !converged {
            r_norm = counter.residual(matrix, &x, rhs, &mut r)?;
            warn!(
                ?termination,
                iterations = budget.iterations_used(),
                residual_norm = r_norm,
                "CG stopped before convergence"
            );
        } else {
            info!(
                iterations = budget.iterations_used(),
                residual_norm = r_norm,
                "CG converged"
            );
        }

        Ok(SolverResult {
            solution: SolutionPayload::Full(x.to_owned_vec()),
            iterations: budget.iterations_used(),
            residual_norm: r_norm,
            converged,
            termination,
            method: Method::Exact,
            complexity_bound,
            performance: counter.snapshot(),
            convergence_history: history,
            approximation: None,
            fallback: None,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SolverEngine trait implementation
// ═══════════════════════════════════════════════════════════════════════════

impl SolverEngine for ConjugateGradientSolver {
    /// Solve `Ax = b` with preconditioned CG.
    ///
    /// # Errors
    ///
    /// * [`SolverError::InvalidDimensions`] -- non-square matrix or rhs length
    ///   mismatch.
    /// * [`SolverError::InvalidParameters`] -- invalid config or non-finite rhs.
    /// * [`SolverError::NumericalInstability`] -- zero diagonal with
    ///   preconditioning, `p.Ap <= 0`, or non-finite intermediates.
    #[instrument(skip(self, matrix, rhs, config, pool), fields(n = matrix.rows(), nnz = matrix.nnz()))]
    fn solve(
        &self,
        matrix: &CsrMatrix,
        rhs: &[f64],
        config: &SolverConfig,
        pool: &VectorPool,
    ) -> Result<SolverResult, SolverError> {
        validate_solver_input(matrix, rhs)?;
        config.validate()?;
        self.solve_inner(matrix, rhs, config, pool)
    }

    /// CG needs `O(sqrt(kappa))` iterations, each an SpMV plus `O(n)` vector
    /// work.
    fn estimate_complexity(
        &self,
        analysis: &MatrixAnalysis,
        config: &SolverConfig,
    ) -> ComplexityEstimate {
        let n = analysis.rows;
        let kappa = analysis.condition_number_estimate;
        let est_iters = if kappa.is_finite() {
            (kappa.sqrt().ceil() as usize).clamp(1, config.max_iterations.max(1))
        } else {
            config.max_iterations
        };

        // SpMV + two dots + three axpy-like updates + preconditioning.
        let flops_per_iter = 2 * analysis.nnz as u64 + 12 * n as u64;

        // x, r, z, p, Ap plus the inverse diagonal.
        let vec_bytes = n * std::mem::size_of::<f64>();
        let precond_bytes = if config.use_preconditioning { vec_bytes } else { 0 };

        ComplexityEstimate {
            method: Method::Exact,
            estimated_flops: est_iters as u64 * flops_per_iter,
            estimated_iterations: est_iters,
            estimated_memory_bytes: 5 * vec_bytes + precond_bytes,
            kind: ComplexityKind::Sqrt,
        }
    }

    fn method(&self) -> Method {
        Method::Exact
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
