//! Sketch-and-correct approximate solver.
//!
//! For a diagonally dominant `A` the solve runs in four phases:
//!
//! 1. **Projection** -- draw a Gaussian JL matrix `P` (`k x n`) and form
//!    `A' = P A P^T`, `b' = P b`. Optionally sparsify `A'` by uniform
//!    sampling with `1/p` reweighting.
//! 2. **Reduced solve** -- truncated Neumann series on `A' x' = b'` with
//!    Jacobi scaling when `A'` is dominant, Gershgorin scaling otherwise.
//! 3. **Reconstruction** -- `x_0 = s * P^T x'`, where `s` minimises
//!    `||b - s A P^T x'||`, so `x_0` is never worse than the zero vector.
//! 4. **Error correction** -- diagonal-normalised Richardson passes
//!    `x <- x + D^{-1}(b - A x)` in the original space until the residual
//!    reaches the tolerance or `max_recursion_depth` passes have run.
//!
//! Systems with `n <= base_case_threshold` skip phases 1-3 and run the
//! Neumann series directly on `A`.
//!
//! There is no convergence guarantee outside the diagonally dominant regime:
//! divergence of the series or of a correction pass aborts with
//! [`SolverError::NumericalInstability`], naming the failing stage.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument, trace, warn};

use crate::analysis::MatrixAnalysis;
use crate::budget::BudgetEnforcer;
use crate::config::SolverConfig;
use crate::error::{SolveStage, SolverError};
use crate::jl::{derive_target_dimension, JlEmbedding};
use crate::neumann::{NeumannSeries, SeriesOutcome, DIAGONAL_EPSILON, INSTABILITY_GROWTH_FACTOR};
use crate::pool::VectorPool;
use crate::profile::OpCounter;
use crate::traits::SolverEngine;
use crate::types::{
    ApproximationReport, ComplexityBound, ComplexityEstimate, ComplexityKind, ConvergenceInfo,
    CsrMatrix, Method, SolutionPayload, SolverResult, Termination,
};
use crate::validation::validate_solver_input;

/// JL sketch + truncated Neumann series + Richardson correction.
///
/// Stateless; every parameter comes from the per-call [`SolverConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SublinearSolver;

/// State after phases 1-3.
struct Initial {
    x0: Vec<f64>,
    k: usize,
    series: SeriesOutcome,
    sparsified: bool,
    base_case: bool,
    complexity_bound: ComplexityBound,
}

impl SublinearSolver {
    /// Create a sketch-path engine.
    pub fn new() -> Self {
        Self
    }

    /// Sketch dimension used for an `n x n` system under `config`.
    pub fn target_dimension(n: usize, config: &SolverConfig) -> usize {
        config
            .target_dimension
            .unwrap_or_else(|| {
                derive_target_dimension(n, config.jl_distortion, config.max_target_dimension)
            })
            .clamp(1, n.max(1))
    }

    /// Neumann terms used under `config`.
    pub fn series_terms(config: &SolverConfig) -> usize {
        config
            .series_terms
            .unwrap_or_else(|| {
                NeumannSeries::terms_for_tolerance(config.tolerance, config.max_iterations)
            })
            .min(config.max_iterations)
    }

    // -----------------------------------------------------------------------
    // Sparsification
    // -----------------------------------------------------------------------

    /// Uniformly sample off-diagonal entries, reweighting kept ones by `1/p`.
    ///
    /// Targets `ceil(k ln k / eps^2)` entries. Symmetric pairs `(i, j)` and
    /// `(j, i)` are kept or dropped together; the diagonal is always kept.
    /// Returns `None` when the target already covers every entry.
    pub fn sparsify(matrix: &CsrMatrix, eps: f64, seed: u64) -> Result<Option<CsrMatrix>, SolverError> {
        let k = matrix.rows();
        let nnz = matrix.nnz();
        if k == 0 || nnz == 0 {
            return Ok(None);
        }

        let target = ((k as f64) * (k as f64).ln().max(1.0) / (eps * eps)).ceil();
        if !target.is_finite() || target >= nnz as f64 {
            return Ok(None);
        }
        let keep_prob = target / nnz as f64;
        let reweight = 1.0 / keep_prob;

        let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed_5a11);
        let mut entries = Vec::with_capacity(target as usize + k);
        for i in 0..k {
            for (j, v) in matrix.row_entries(i) {
                if i == j {
                    entries.push((i, j, v));
                    continue;
                }
                // Pairs are decided once, from the upper triangle; a lower
                // entry without an upper mirror gets its own draw.
                let mirrored = matrix.get(j, i);
                let has_mirror = matrix.contains(j, i);
                if j < i && has_mirror {
                    continue;
                }
                if rng.gen::<f64>() < keep_prob {
                    entries.push((i, j, v * reweight));
                    if has_mirror {
                        entries.push((j, i, mirrored * reweight));
                    }
                }
            }
        }

        debug!(k, nnz, kept = entries.len(), keep_prob, "sparsified reduced matrix");
        CsrMatrix::from_triplets(k, k, entries).map(Some)
    }

    // -----------------------------------------------------------------------
    // Phases 1-3
    // -----------------------------------------------------------------------

    fn base_case(
        matrix: &CsrMatrix,
        rhs: &[f64],
        config: &SolverConfig,
        counter: &mut OpCounter,
        budget: &BudgetEnforcer,
        pool: &VectorPool,
    ) -> Result<Initial, SolverError> {
        let n = matrix.rows();
        let terms = Self::series_terms(config);
        let scaling = NeumannSeries::choose_scaling(matrix);
        debug!(n, terms, ?scaling, "base case: neumann series in the original space");

        let series = NeumannSeries::new(terms, scaling, SolveStage::BaseCase)
            .sum(matrix, rhs, counter, budget, pool)?;

        Ok(Initial {
            x0: series.solution.clone(),
            k: n,
            complexity_bound: ComplexityBound::unprojected(
                n,
                config.jl_distortion,
                matrix.nnz(),
                series.terms_used,
            ),
            series,
            sparsified: false,
            base_case: true,
        })
    }

    fn sketch(
        matrix: &CsrMatrix,
        rhs: &[f64],
        config: &SolverConfig,
        counter: &mut OpCounter,
        budget: &BudgetEnforcer,
        pool: &VectorPool,
    ) -> Result<Initial, SolverError> {
        let n = matrix.rows();
        let k = Self::target_dimension(n, config);
        let eps = config.jl_distortion;

        // Phase 1: projection.
        let embedding = JlEmbedding::new(n, k, eps, config.seed)?;
        let mut reduced = embedding.project_matrix(matrix)?;
        counter.add_flops(embedding.projection_flops(matrix.nnz()));

        let mut sparsified = false;
        if let Some(s_eps) = config.sparsification_eps {
            if let Some(sparse) = Self::sparsify(&reduced, s_eps, config.seed)? {
                reduced = sparse;
                sparsified = true;
            }
        }

        let mut b_reduced = vec![0.0; k];
        embedding.project(rhs, &mut b_reduced)?;
        counter.add_flops(2 * (k * n) as u64);

        // Phase 2: reduced solve.
        let terms = Self::series_terms(config);
        let scaling = NeumannSeries::choose_scaling(&reduced);
        debug!(n, k, eps, terms, ?scaling, sparsified, "reduced system built");

        let series = NeumannSeries::new(terms, scaling, SolveStage::ReducedSeries)
            .sum(&reduced, &b_reduced, counter, budget, pool)
            .map_err(|err| Self::lift_failure(err, &embedding, matrix, rhs))?;

        // Phase 3: reconstruction.
        let mut x0 = vec![0.0; n];
        embedding.lift(&series.solution, &mut x0)?;
        counter.add_flops(2 * (k * n) as u64);

        let mut ax0 = pool.acquire(n);
        counter.matvec(matrix, &x0, &mut ax0)?;
        let denom = counter.dot(&ax0, &ax0)?;
        let numer = counter.dot(&ax0, rhs)?;
        let step = if denom > 0.0 { numer / denom } else { 0.0 };
        if !step.is_finite() {
            return Err(SolverError::instability(
                SolveStage::Reconstruction,
                0,
                format!("line-search step {numer:e} / {denom:e} is not finite"),
                &vec![0.0; n],
                crate::kernels::norm(rhs),
            ));
        }
        crate::kernels::scale(step, &mut x0);
        trace!(step, "reconstruction line search");

        Ok(Initial {
            x0,
            k,
            series,
            sparsified,
            base_case: false,
            complexity_bound: ComplexityBound::logarithmic(n, eps, k),
        })
    }

    /// Map a reduced-space failure to the original space so the report
    /// carries a usable iterate and its true residual.
    fn lift_failure(
        err: SolverError,
        embedding: &JlEmbedding,
        matrix: &CsrMatrix,
        rhs: &[f64],
    ) -> SolverError {
        let report = match err {
            SolverError::NumericalInstability(report) => report,
            other => return other,
        };
        let n = matrix.rows();
        let mut lifted = vec![0.0; n];
        let mut r = vec![0.0; n];
        let residual = if report.last_valid_solution.len() == embedding.target_dimension()
            && embedding.lift(&report.last_valid_solution, &mut lifted).is_ok()
        {
            matrix
                .residual_into(&lifted, rhs, &mut r)
                .unwrap_or(f64::INFINITY)
        } else {
            lifted.fill(0.0);
            crate::kernels::norm(rhs)
        };
        SolverError::instability(report.stage, report.iteration, report.detail, &lifted, residual)
    }

    // -----------------------------------------------------------------------
    // Full pipeline
    // -----------------------------------------------------------------------

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
        let budget = BudgetEnforcer::from_millis(config.max_iterations, config.max_wall_time_ms);

        let initial = if n <= config.base_case_threshold {
            Self::base_case(matrix, rhs, config, &mut counter, &budget, pool)?
        } else {
            Self::sketch(matrix, rhs, config, &mut counter, &budget, pool)?
        };

        // Phase 4: error correction.
        let diag = matrix.diagonal();
        let mut x = initial.x0;
        let mut r = pool.acquire(n);
        let mut x_prev = pool.acquire(n);

        let reconstruction_error = counter.residual(matrix, &x, rhs, &mut r)?;
        if !reconstruction_error.is_finite() {
            return Err(SolverError::instability(
                SolveStage::Reconstruction,
                0,
                "reconstructed solution has a non-finite residual",
                &[],
                f64::INFINITY,
            ));
        }
        let mut residual = reconstruction_error;
        let mut history = vec![ConvergenceInfo {
            iteration: 0,
            residual_norm: residual,
        }];
        let mut correction_residuals = Vec::new();
        let mut time_exhausted = initial.series.termination == Some(Termination::TimeBudgetExhausted);

        let inv_diag: Vec<f64> = if residual > tol && config.max_recursion_depth > 0 {
            if let Some((i, d)) = diag
                .iter()
                .enumerate()
                .find(|(_, d)| d.abs() < DIAGONAL_EPSILON)
            {
                return Err(SolverError::instability(
                    SolveStage::ErrorCorrection,
                    0,
                    format!("diagonal entry a[{i},{i}] = {d:e} cannot be inverted"),
                    &x,
                    residual,
                ));
            }
            diag.iter().map(|d| 1.0 / d).collect()
        } else {
            Vec::new()
        };

        for pass in 1..=config.max_recursion_depth {
            if residual <= tol {
                break;
            }
            // Series terms and correction passes share one iteration cap.
            if initial.series.terms_used + pass > config.max_iterations {
                break;
            }
            if time_exhausted || budget.time_exhausted() {
                time_exhausted = true;
                break;
            }

            x_prev.copy_from_slice(&x);
            for ((xi, &ri), &di) in x.iter_mut().zip(r.iter()).zip(&inv_diag) {
                *xi += di * ri;
            }
            let next = counter.residual(matrix, &x, rhs, &mut r)?;
            trace!(pass, residual = next, "correction pass");

            if !next.is_finite() || next > INSTABILITY_GROWTH_FACTOR * residual {
                warn!(pass, residual, next, "correction pass diverged");
                return Err(SolverError::instability(
                    SolveStage::ErrorCorrection,
                    pass,
                    format!("residual grew from {residual:e} to {next:e}"),
                    &x_prev,
                    residual,
                ));
            }

            residual = next;
            correction_residuals.push(residual);
            history.push(ConvergenceInfo {
                iteration: pass,
                residual_norm: residual,
            });
        }

        let converged = residual <= tol;
        let termination = if converged {
            Termination::Converged
        } else if time_exhausted {
            Termination::TimeBudgetExhausted
        } else {
            Termination::MaxIterationsReached
        };

        let correction_passes = correction_residuals.len();
        if converged {
            info!(
                k = initial.k,
                terms = initial.series.terms_used,
                correction_passes,
                residual_norm = residual,
                "sublinear solve converged"
            );
        } else {
            warn!(
                ?termination,
                k = initial.k,
                correction_passes,
                residual_norm = residual,
                "sublinear solve stopped above tolerance"
            );
        }

        Ok(SolverResult {
            solution: SolutionPayload::Full(x),
            iterations: initial.series.terms_used + correction_passes,
            residual_norm: residual,
            converged,
            termination,
            method: Method::Sublinear,
            complexity_bound: initial.complexity_bound,
            performance: counter.snapshot(),
            convergence_history: history,
            approximation: Some(ApproximationReport {
                target_dimension: initial.k,
                eps: config.jl_distortion,
                seed: config.seed,
                series_terms_used: initial.series.terms_used,
                series_scaling: initial.series.scaling,
                reconstruction_error,
                correction_passes,
                correction_residuals,
                base_case: initial.base_case,
                sparsified: initial.sparsified,
            }),
            fallback: None,
        })
    }
}

impl SolverEngine for SublinearSolver {
    /// Run the sketch-and-correct pipeline.
    ///
    /// The caller is expected to have checked diagonal dominance; outside
    /// that regime the result is only as good as the correction passes make
    /// it, and divergence is reported as an error.
    ///
    /// # Errors
    ///
    /// * [`SolverError::InvalidDimensions`] -- shape mismatch.
    /// * [`SolverError::InvalidParameters`] -- invalid config or non-finite rhs.
    /// * [`SolverError::NumericalInstability`] -- series or correction
    ///   divergence, zero diagonal, non-finite intermediates.
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

    /// Projection `O(k nnz + k^2 n)`, series `O(T k^2)`, correction
    /// `O(depth * nnz)`.
    fn estimate_complexity(
        &self,
        analysis: &MatrixAnalysis,
        config: &SolverConfig,
    ) -> ComplexityEstimate {
        let n = analysis.rows as u64;
        let nnz = analysis.nnz as u64;
        let terms = Self::series_terms(config);
        let depth = config.max_recursion_depth as u64;
        let vec_bytes = analysis.rows * std::mem::size_of::<f64>();

        if analysis.rows <= config.base_case_threshold {
            return ComplexityEstimate {
                method: Method::Sublinear,
                estimated_flops: (terms as u64 + depth) * (2 * nnz + 4 * n),
                estimated_iterations: terms + config.max_recursion_depth,
                estimated_memory_bytes: 5 * vec_bytes,
                kind: ComplexityKind::Logarithmic,
            };
        }

        let k = Self::target_dimension(analysis.rows, config) as u64;
        let projection = 2 * k * nnz + 2 * k * k * n;
        let series = terms as u64 * 2 * k * k;
        let correction = depth * (2 * nnz + 4 * n);
        let f64_bytes = std::mem::size_of::<f64>();

        ComplexityEstimate {
            method: Method::Sublinear,
            estimated_flops: projection + series + correction,
            estimated_iterations: terms + config.max_recursion_depth,
            // P is dense k x n; A' is at most k x k.
            estimated_memory_bytes: (k * n) as usize * f64_bytes
                + (k * k) as usize * f64_bytes
                + 6 * vec_bytes,
            kind: ComplexityKind::Logarithmic,
        }
    }

    fn method(&self) -> Method {
        Method::Sublinear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiagonal(n: usize) -> CsrMatrix {
        let mut e = Vec::new();
        for i in 0..n {
            e.push((i, i, 4.0));
            if i > 0 {
                e.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                e.push((i, i + 1, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, n, e).unwrap()
    }

    fn run(m: &CsrMatrix, b: &[f64], cfg: &SolverConfig) -> Result<SolverResult, SolverError> {
        let pool = VectorPool::new();
        let out = SublinearSolver::new().solve(m, b, cfg, &pool);
        assert_eq!(pool.outstanding(), 0);
        out
    }

    #[test]
    fn base_case_converges_directly() {
        let a = tridiagonal(20);
        let b = vec![1.0; 20];
        let cfg = SolverConfig::default().with_tolerance(1e-8).with_series_terms(60);
        let r = run(&a, &b, &cfg).unwrap();
        let report = r.approximation.as_ref().unwrap();
        assert!(report.base_case);
        assert_eq!(report.target_dimension, 20);
        assert_eq!(r.complexity_bound.kind, ComplexityKind::Logarithmic);
        assert_eq!(r.complexity_bound.eps, Some(cfg.jl_distortion));
        assert!(r.converged, "residual {}", r.residual_norm);
        assert!(r.residual_norm <= 1e-8);
    }

    #[test]
    fn sketch_path_reports_its_parameters() {
        let n = 120;
        let a = tridiagonal(n);
        let b: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).sin()).collect();
        let cfg = SolverConfig::default()
            .with_base_case_threshold(16)
            .with_target_dimension(24)
            .with_jl_distortion(0.3)
            .with_tolerance(1e-6)
            .with_max_recursion_depth(60);
        let r = run(&a, &b, &cfg).unwrap();
        let report = r.approximation.as_ref().unwrap();
        assert!(!report.base_case);
        assert_eq!(report.target_dimension, 24);
        assert_eq!(report.eps, 0.3);
        assert_eq!(r.complexity_bound.kind, ComplexityKind::Logarithmic);
        assert_eq!(r.complexity_bound.eps, Some(0.3));
        assert!(report.reconstruction_error <= crate::kernels::norm(&b) + 1e-12);
        assert!(r.converged, "residual {}", r.residual_norm);
        assert_eq!(r.iterations, report.series_terms_used + report.correction_passes);
    }

    #[test]
    fn correction_never_increases_residual_on_uniform_tridiagonal() {
        let n = 100;
        let a = tridiagonal(n);
        let b = vec![1.0; n];
        let cfg = SolverConfig::default()
            .with_base_case_threshold(8)
            .with_target_dimension(10)
            .with_max_recursion_depth(10);
        let r = run(&a, &b, &cfg).unwrap();
        let report = r.approximation.unwrap();
        let mut prev = report.reconstruction_error;
        for &res in &report.correction_residuals {
            assert!(res <= prev, "{res} > {prev}");
            prev = res;
        }
    }

    #[test]
    fn correction_passes_respect_iteration_cap() {
        let a = tridiagonal(200);
        let cfg = SolverConfig::default()
            .with_base_case_threshold(16)
            .with_target_dimension(16)
            .with_max_iterations(3);
        let r = run(&a, &vec![1.0; 200], &cfg).unwrap();
        assert!(r.iterations <= 3, "iterations {}", r.iterations);
        let report = r.approximation.unwrap();
        assert_eq!(report.series_terms_used + report.correction_passes, r.iterations);
        if !r.converged {
            assert_eq!(r.termination, Termination::MaxIterationsReached);
        }
    }

    #[test]
    fn depth_zero_reports_max_iterations() {
        let a = tridiagonal(100);
        let cfg = SolverConfig::default()
            .with_base_case_threshold(8)
            .with_target_dimension(8)
            .with_max_recursion_depth(0);
        let r = run(&a, &vec![1.0; 100], &cfg).unwrap();
        assert!(!r.converged);
        assert_eq!(r.termination, Termination::MaxIterationsReached);
        assert_eq!(r.approximation.unwrap().correction_passes, 0);
    }

    #[test]
    fn sparsify_keeps_diagonal_and_symmetry() {
        let n = 30;
        let e: Vec<_> = (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j, if i == j { 50.0 } else { 1.0 })))
            .collect();
        let dense = CsrMatrix::from_triplets(n, n, e).unwrap();
        let sparse = SublinearSolver::sparsify(&dense, 0.9, 7).unwrap().unwrap();
        assert!(sparse.nnz() < dense.nnz());
        for i in 0..n {
            assert_eq!(sparse.get(i, i), 50.0);
            for j in 0..n {
                assert_eq!(sparse.get(i, j), sparse.get(j, i));
            }
        }
        // Nothing to drop when the target exceeds nnz.
        assert!(SublinearSolver::sparsify(&CsrMatrix::identity(4).unwrap(), 0.1, 7)
            .unwrap()
            .is_none());
    }

    #[test]
    fn divergent_base_case_is_reported() {
        // Not dominant and indefinite: Gershgorin scaling still diverges.
        let a = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 1.0), (0, 1, 3.0), (1, 0, 3.0), (1, 1, 1.0)])
            .unwrap();
        let err = run(&a, &[1.0, 0.0], &SolverConfig::default().with_series_terms(50)).unwrap_err();
        let report = err.instability_report().unwrap();
        assert!(matches!(
            report.stage,
            SolveStage::BaseCase | SolveStage::ErrorCorrection
        ));
    }

    #[test]
    fn estimate_distinguishes_base_case() {
        let small = crate::analysis::analyze(&tridiagonal(10)).unwrap();
        let big = crate::analysis::analyze(&tridiagonal(300)).unwrap();
        let cfg = SolverConfig::default();
        let s = SublinearSolver.estimate_complexity(&small, &cfg);
        let b = SublinearSolver.estimate_complexity(&big, &cfg);
        assert_eq!(s.kind, ComplexityKind::Logarithmic);
        assert_eq!(b.kind, ComplexityKind::Logarithmic);
        assert!(b.estimated_flops > s.estimated_flops);
    }
}
