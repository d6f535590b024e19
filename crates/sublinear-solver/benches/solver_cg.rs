//! Benchmarks for the Conjugate Gradient solver.
//!
//! These measure scaling with `n` and the effect of Jacobi preconditioning
//! on a badly scaled system.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sublinear_solver::cg::ConjugateGradientSolver;
use sublinear_solver::config::SolverConfig;
use sublinear_solver::pool::VectorPool;
use sublinear_solver::traits::SolverEngine;
use sublinear_solver::types::CsrMatrix;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Sparse SPD matrix: symmetric random off-diagonals with
/// `a_ii = sum_j |a_ij| + diag_shift`.
fn spd_csr_matrix(n: usize, density: f64, diag_shift: f64, seed: u64) -> CsrMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut entries: Vec<(usize, usize, f64)> = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            if rng.gen::<f64>() < density {
                let val: f64 = rng.gen_range(-0.3..0.3);
                entries.push((i, j, val));
                entries.push((j, i, val));
            }
        }
    }

    let mut row_abs_sums = vec![0.0f64; n];
    for &(r, _c, v) in &entries {
        row_abs_sums[r] += v.abs();
    }
    for (i, s) in row_abs_sums.iter().enumerate() {
        entries.push((i, i, s + diag_shift));
    }

    CsrMatrix::from_triplets(n, n, entries).expect("valid benchmark matrix")
}

/// Random vector with deterministic seed.
fn random_vector(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

// ---------------------------------------------------------------------------
// Benchmark: scaling with n
// ---------------------------------------------------------------------------

fn cg_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("cg_scaling");
    group.warm_up_time(Duration::from_secs(3));

    let solver = ConjugateGradientSolver::new();
    let config = SolverConfig::default().with_tolerance(1e-8);
    let pool = VectorPool::new();

    for &n in &[100, 1000, 10_000] {
        let density = if n <= 1000 { 0.02 } else { 0.0005 };
        let matrix = spd_csr_matrix(n, density, 1.0, 42);
        let rhs = random_vector(n, 43);

        group.sample_size(if n >= 10_000 { 20 } else { 100 });
        group.throughput(Throughput::Elements(matrix.nnz() as u64));

        group.bench_with_input(BenchmarkId::new("n", n), &n, |b, _| {
            b.iter(|| {
                solver
                    .solve(black_box(&matrix), black_box(&rhs), &config, &pool)
                    .expect("cg solve")
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: preconditioned vs plain
// ---------------------------------------------------------------------------

fn cg_preconditioning(c: &mut Criterion) {
    let mut group = c.benchmark_group("cg_preconditioning");
    group.warm_up_time(Duration::from_secs(3));
    group.sample_size(50);

    let n = 1000;
    // Diagonal spread over four orders of magnitude.
    let mut entries = Vec::new();
    for i in 0..n {
        entries.push((i, i, 10f64.powf(4.0 * i as f64 / n as f64)));
        if i + 1 < n {
            entries.push((i, i + 1, 0.1));
            entries.push((i + 1, i, 0.1));
        }
    }
    let matrix = CsrMatrix::from_triplets(n, n, entries).expect("valid benchmark matrix");
    let rhs = random_vector(n, 7);

    let solver = ConjugateGradientSolver::new();
    let pool = VectorPool::new();

    for (label, enabled) in [("jacobi", true), ("plain", false)] {
        let config = SolverConfig::default()
            .with_tolerance(1e-8)
            .with_preconditioning(enabled);
        group.bench_function(label, |b| {
            b.iter(|| {
                solver
                    .solve(black_box(&matrix), black_box(&rhs), &config, &pool)
                    .expect("cg solve")
            });
        });
    }
    group.finish();
}

criterion_group!(cg, cg_scaling, cg_preconditioning);
criterion_main!(cg);
