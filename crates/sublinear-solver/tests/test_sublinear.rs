//! Integration tests for the sketch-and-correct solver.
//!
//! Covers the projected path and the base case, the monotone effect of the
//! correction passes, determinism under a fixed seed, budget handling,
//! sparsification of the reduced matrix and divergence reporting.

mod helpers;

use sublinear_solver::analysis::analyze;
use sublinear_solver::config::SolverConfig;
use sublinear_solver::error::{SolveStage, SolverError};
use sublinear_solver::pool::VectorPool;
use sublinear_solver::sublinear::SublinearSolver;
use sublinear_solver::traits::SolverEngine;
use sublinear_solver::types::{ComplexityKind, CsrMatrix, Method, SeriesScaling, SolverResult, Termination};

use helpers::{l2_norm, random_diag_dominant_csr, random_vector, residual_norm, tridiagonal_csr};

fn run(matrix: &CsrMatrix, rhs: &[f64], config: &SolverConfig) -> Result<SolverResult, SolverError> {
    let pool = VectorPool::new();
    let result = SublinearSolver::new().solve(matrix, rhs, config, &pool);
    assert_eq!(pool.outstanding(), 0, "every scratch buffer must be returned");
    result
}

/// Small sketch so the projected path stays cheap in debug builds.
fn sketch_config() -> SolverConfig {
    SolverConfig::default()
        .with_target_dimension(48)
        .with_jl_distortion(0.3)
        .with_tolerance(1e-8)
}

// ---------------------------------------------------------------------------
// Projected path
// ---------------------------------------------------------------------------

#[test]
fn test_correction_passes_reduce_residual_monotonically() {
    let n = 400;
    let matrix = tridiagonal_csr(n, 4.0, -1.0);
    let rhs = random_vector(n, 21);

    let result = run(&matrix, &rhs, &sketch_config().with_max_recursion_depth(8)).unwrap();
    let report = result.approximation.as_ref().expect("approximation report");
    assert!(!report.base_case);
    assert_eq!(report.correction_passes, 8);

    let mut previous = report.reconstruction_error;
    for &r in &report.correction_residuals {
        assert!(r < previous, "correction pass increased the residual: {previous} -> {r}");
        previous = r;
    }
    assert!(result.residual_norm < report.reconstruction_error);
}

#[test]
fn test_reconstruction_is_never_worse_than_zero_vector() {
    let n = 300;
    let matrix = random_diag_dominant_csr(n, 4, 5);
    let rhs = random_vector(n, 6);
    let result = run(&matrix, &rhs, &sketch_config().with_max_recursion_depth(0)).unwrap();
    let report = result.approximation.unwrap();
    assert!(report.reconstruction_error <= l2_norm(&rhs) * (1.0 + 1e-12));
    assert_eq!(report.correction_passes, 0);
}

#[test]
fn test_enough_passes_reach_tolerance() {
    let n = 400;
    let matrix = tridiagonal_csr(n, 4.0, -1.0);
    let rhs = random_vector(n, 22);

    let result = run(&matrix, &rhs, &sketch_config().with_max_recursion_depth(80)).unwrap();
    assert!(result.converged);
    assert_eq!(result.termination, Termination::Converged);
    let x = result.full_solution().unwrap();
    assert!(residual_norm(&matrix, x, &rhs) <= 1e-8);
    assert_eq!(
        result.iterations,
        result.approximation.as_ref().map_or(0, |a| a.series_terms_used + a.correction_passes)
    );
}

#[test]
fn test_too_few_passes_is_reported_not_failed() {
    let n = 300;
    let matrix = tridiagonal_csr(n, 4.0, -1.0);
    let rhs = random_vector(n, 23);
    let result = run(&matrix, &rhs, &sketch_config().with_max_recursion_depth(1)).unwrap();
    assert!(!result.converged);
    assert_eq!(result.termination, Termination::MaxIterationsReached);
    assert!(result.full_solution().unwrap().iter().all(|v| v.is_finite()));
}

#[test]
fn test_iteration_cap_bounds_terms_and_passes() {
    let n = 200;
    let matrix = tridiagonal_csr(n, 4.0, -1.0);
    let rhs = random_vector(n, 24);
    let cfg = sketch_config()
        .with_series_terms(2)
        .with_max_iterations(5)
        .with_max_recursion_depth(20);

    let result = run(&matrix, &rhs, &cfg).unwrap();
    let report = result.approximation.as_ref().unwrap();
    assert!(report.series_terms_used <= 2);
    assert!(report.series_terms_used + report.correction_passes <= 5);
    assert!(result.iterations <= 5, "iterations {}", result.iterations);
    if !result.converged {
        assert_eq!(result.termination, Termination::MaxIterationsReached);
    }
}

#[test]
fn test_report_describes_the_sketch() {
    let n = 200;
    let matrix = random_diag_dominant_csr(n, 6, 8);
    let rhs = random_vector(n, 9);
    let cfg = sketch_config().with_seed(1234);

    let result = run(&matrix, &rhs, &cfg).unwrap();
    assert_eq!(result.method, Method::Sublinear);
    assert_eq!(result.complexity_bound.kind, ComplexityKind::Logarithmic);
    assert_eq!(result.complexity_bound.eps, Some(0.3));
    assert_eq!(result.complexity_bound.n, n);

    let report = result.approximation.unwrap();
    assert_eq!(report.target_dimension, 48);
    assert_eq!(report.eps, 0.3);
    assert_eq!(report.seed, 1234);
    assert!(report.series_terms_used >= 1);
    assert!(!report.sparsified);
    assert!(report.reconstruction_error.is_finite());
    assert_eq!(result.convergence_history[0].residual_norm, report.reconstruction_error);
}

#[test]
fn test_same_seed_same_answer() {
    let n = 150;
    let matrix = random_diag_dominant_csr(n, 4, 13);
    let rhs = random_vector(n, 14);
    let cfg = sketch_config().with_max_recursion_depth(2);

    let a = run(&matrix, &rhs, &cfg).unwrap();
    let b = run(&matrix, &rhs, &cfg).unwrap();
    assert_eq!(a.solution, b.solution);
    assert_eq!(a.residual_norm, b.residual_norm);

    let c = run(&matrix, &rhs, &cfg.clone().with_seed(cfg.seed + 1)).unwrap();
    assert_ne!(
        a.approximation.unwrap().reconstruction_error,
        c.approximation.unwrap().reconstruction_error
    );
}

#[test]
fn test_zero_time_budget_returns_partial_result() {
    let n = 200;
    let matrix = tridiagonal_csr(n, 4.0, -1.0);
    let rhs = vec![1.0; n];
    let result = run(&matrix, &rhs, &sketch_config().with_max_wall_time_ms(0)).unwrap();
    assert!(!result.converged);
    assert_eq!(result.termination, Termination::TimeBudgetExhausted);
    assert_eq!(result.approximation.as_ref().unwrap().correction_passes, 0);
    assert!(result.full_solution().unwrap().iter().all(|v| v.is_finite()));
}

#[test]
fn test_zero_rhs_gives_zero_solution() {
    let n = 120;
    let matrix = tridiagonal_csr(n, 4.0, -1.0);
    let result = run(&matrix, &vec![0.0; n], &sketch_config()).unwrap();
    assert!(result.converged);
    assert!(result.full_solution().unwrap().iter().all(|&v| v == 0.0));
}

// ---------------------------------------------------------------------------
// Base case
// ---------------------------------------------------------------------------

#[test]
fn test_base_case_skips_projection() {
    let n = 30;
    let matrix = tridiagonal_csr(n, 4.0, -1.0);
    let rhs = random_vector(n, 31);
    let cfg = SolverConfig::default()
        .with_tolerance(1e-6)
        .with_max_recursion_depth(20);

    let result = run(&matrix, &rhs, &cfg).unwrap();
    assert!(result.converged);
    assert!(residual_norm(&matrix, result.full_solution().unwrap(), &rhs) <= 1e-6);
    assert_eq!(result.complexity_bound.kind, ComplexityKind::Logarithmic);
    assert_eq!(result.complexity_bound.eps, Some(cfg.jl_distortion));
    assert!(result.complexity_bound.description.contains("projection skipped"));

    let report = result.approximation.unwrap();
    assert!(report.base_case);
    assert_eq!(report.target_dimension, n);
    assert_eq!(report.series_scaling, SeriesScaling::Jacobi);
}

#[test]
fn test_non_dominant_system_reports_instability() {
    let matrix = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 1.0), (0, 1, 3.0), (1, 0, 3.0), (1, 1, 1.0)])
        .unwrap();
    let err = run(&matrix, &[1.0, 0.0], &SolverConfig::default()).unwrap_err();
    let report = err.instability_report().expect("instability report");
    assert!(
        matches!(report.stage, SolveStage::BaseCase | SolveStage::ErrorCorrection),
        "unexpected stage {}",
        report.stage
    );
    assert!(report.last_valid_solution.iter().all(|v| v.is_finite()));
}

// ---------------------------------------------------------------------------
// Sparsification
// ---------------------------------------------------------------------------

#[test]
fn test_sparsify_keeps_diagonal_and_symmetry() {
    let k = 40;
    let mut entries = Vec::new();
    for i in 0..k {
        for j in 0..k {
            let v = if i == j { 50.0 } else { 1.0 / (1 + i + j) as f64 };
            entries.push((i, j, v));
        }
    }
    let dense = CsrMatrix::from_triplets(k, k, entries).unwrap();

    let sparse = SublinearSolver::sparsify(&dense, 0.9, 7).unwrap().expect("target below nnz");
    assert!(sparse.nnz() < dense.nnz());
    for i in 0..k {
        assert_eq!(sparse.get(i, i), 50.0);
        for j in 0..k {
            assert_eq!(sparse.contains(i, j), sparse.contains(j, i));
            if i != j && sparse.contains(i, j) {
                // Kept entries are reweighted upwards.
                assert!(sparse.get(i, j) > dense.get(i, j));
            }
        }
    }

    // A loose target covers everything: nothing to do.
    assert!(SublinearSolver::sparsify(&dense, 0.01, 7).unwrap().is_none());
}

#[test]
fn test_sparsified_solve_is_flagged() {
    let n = 300;
    let matrix = tridiagonal_csr(n, 4.0, -1.0);
    let rhs = random_vector(n, 40);
    let cfg = sketch_config().with_sparsification(1.0).with_max_recursion_depth(80);

    match run(&matrix, &rhs, &cfg) {
        Ok(result) => {
            let report = result.approximation.unwrap();
            assert!(report.sparsified);
            assert!(report.reconstruction_error <= l2_norm(&rhs) * (1.0 + 1e-12));
        }
        // Sampling can cost the reduced matrix its definiteness.
        Err(err) => assert_eq!(
            err.instability_report().map(|r| r.stage),
            Some(SolveStage::ReducedSeries)
        ),
    }
}

// ---------------------------------------------------------------------------
// Estimates and errors
// ---------------------------------------------------------------------------

#[test]
fn test_estimate_complexity_kind_follows_size() {
    let cfg = SolverConfig::default();
    let small = analyze(&tridiagonal_csr(10, 4.0, -1.0)).unwrap();
    let large = analyze(&tridiagonal_csr(500, 4.0, -1.0)).unwrap();

    let engine = SublinearSolver::new();
    assert_eq!(engine.estimate_complexity(&small, &cfg).kind, ComplexityKind::Logarithmic);
    let est = engine.estimate_complexity(&large, &cfg);
    assert_eq!(est.kind, ComplexityKind::Logarithmic);
    assert_eq!(est.method, Method::Sublinear);
    assert!(est.estimated_flops > 0);
    assert!(est.estimated_memory_bytes > 0);
}

#[test]
fn test_dimension_mismatch_is_rejected() {
    let matrix = tridiagonal_csr(5, 4.0, -1.0);
    let err = run(&matrix, &[1.0; 4], &SolverConfig::default()).unwrap_err();
    assert!(matches!(err, SolverError::InvalidDimensions(_)));
}
