//! Shared test helpers for the sublinear-solver integration test suite.
//!
//! Provides deterministic random matrix generators, a dense reference solver,
//! and residual/norm utilities used across the test modules.

#![allow(dead_code)]

use sublinear_solver::types::CsrMatrix;

// ---------------------------------------------------------------------------
// Random number generator (simple LCG for deterministic reproducibility)
// ---------------------------------------------------------------------------

/// A minimal linear congruential generator for deterministic test data.
pub struct Lcg {
    state: u64,
}

impl Lcg {
    /// Create a new LCG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next u64 value.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.state
    }

    /// Generate a uniform f64 in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform f64 in [lo, hi).
    pub fn next_f64_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Generate a uniform index in [0, n).
    pub fn next_index(&mut self, n: usize) -> usize {
        (self.next_u64() >> 33) as usize % n
    }
}

// ---------------------------------------------------------------------------
// Matrix generators
// ---------------------------------------------------------------------------

/// Random strictly diagonally dominant matrix with about `per_row`
/// off-diagonal entries per row.
///
/// The pattern is symmetric and so are the values; the diagonal is
/// `1 + sum |off-diagonal|`, so the matrix is also SPD.
pub fn random_diag_dominant_csr(n: usize, per_row: usize, seed: u64) -> CsrMatrix {
    let mut rng = Lcg::new(seed);
    let mut off = vec![0.0f64; n];
    let mut entries: Vec<(usize, usize, f64)> = Vec::with_capacity(n * (2 * per_row + 1));

    if n > 1 {
        for i in 0..n {
            for _ in 0..per_row.div_ceil(2) {
                let j = rng.next_index(n);
                if j == i {
                    continue;
                }
                let v = rng.next_f64_range(-1.0, 1.0);
                entries.push((i, j, v));
                entries.push((j, i, v));
                off[i] += v.abs();
                off[j] += v.abs();
            }
        }
    }

    for (i, s) in off.iter().enumerate() {
        entries.push((i, i, s + 1.0 + rng.next_f64()));
    }

    CsrMatrix::from_triplets(n, n, entries).unwrap()
}

/// Tridiagonal `(off, diag, off)` matrix.
pub fn tridiagonal_csr(n: usize, diag: f64, off: f64) -> CsrMatrix {
    let mut entries = Vec::with_capacity(3 * n);
    for i in 0..n {
        if i > 0 {
            entries.push((i, i - 1, off));
        }
        entries.push((i, i, diag));
        if i + 1 < n {
            entries.push((i, i + 1, off));
        }
    }
    CsrMatrix::from_triplets(n, n, entries).unwrap()
}

/// Random connected graph Laplacian `L = D - W` plus `shift * I`.
///
/// With `shift > 0` the result is SPD and weakly diagonally dominant.
pub fn random_laplacian_csr(n: usize, density: f64, shift: f64, seed: u64) -> CsrMatrix {
    let mut rng = Lcg::new(seed);
    let mut adj = vec![vec![0.0f64; n]; n];

    for i in 0..n {
        for j in (i + 1)..n {
            if rng.next_f64() < density {
                let w = rng.next_f64_range(0.1, 2.0);
                adj[i][j] = w;
                adj[j][i] = w;
            }
        }
    }
    // Path 0-1-...-n-1 keeps the graph connected.
    for i in 0..n.saturating_sub(1) {
        if adj[i][i + 1] == 0.0 {
            let w = rng.next_f64_range(0.1, 1.0);
            adj[i][i + 1] = w;
            adj[i + 1][i] = w;
        }
    }

    let mut entries = Vec::new();
    for (i, row) in adj.iter().enumerate() {
        let mut degree = 0.0f64;
        for (j, &w) in row.iter().enumerate() {
            if i != j && w != 0.0 {
                entries.push((i, j, -w));
                degree += w;
            }
        }
        entries.push((i, i, degree + shift));
    }
    CsrMatrix::from_triplets(n, n, entries).unwrap()
}

/// Random SPD matrix `M^T M + I` from a sparse symmetric `M`.
pub fn random_spd_csr(n: usize, density: f64, seed: u64) -> CsrMatrix {
    let mut rng = Lcg::new(seed);
    let mut m = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in i..n {
            if i == j || rng.next_f64() < density {
                let v = rng.next_f64_range(-1.0, 1.0);
                m[i][j] += v;
                if i != j {
                    m[j][i] += v;
                }
            }
        }
    }

    let mut entries = Vec::new();
    for i in 0..n {
        for j in 0..n {
            let mut sum: f64 = (0..n).map(|k| m[k][i] * m[k][j]).sum();
            if i == j {
                sum += 1.0;
            }
            if sum.abs() > 1e-15 {
                entries.push((i, j, sum));
            }
        }
    }
    CsrMatrix::from_triplets(n, n, entries).unwrap()
}

/// Dense `n x n` matrix with every entry set, not diagonally dominant.
pub fn dense_non_dominant(n: usize, seed: u64) -> CsrMatrix {
    let mut rng = Lcg::new(seed);
    let mut entries = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let v = if i == j {
                rng.next_f64_range(0.5, 1.0)
            } else {
                rng.next_f64_range(0.5, 2.0)
            };
            entries.push((i, j, v));
        }
    }
    CsrMatrix::from_triplets(n, n, entries).unwrap()
}

/// Deterministic random vector of length `n` in [-1, 1).
pub fn random_vector(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = Lcg::new(seed);
    (0..n).map(|_| rng.next_f64_range(-1.0, 1.0)).collect()
}

// ---------------------------------------------------------------------------
// Dense reference solver
// ---------------------------------------------------------------------------

/// Solve `Ax = b` by dense Gaussian elimination with partial pivoting.
///
/// # Panics
///
/// Panics if the matrix is singular or the shapes are inconsistent.
pub fn dense_solve(matrix: &CsrMatrix, rhs: &[f64]) -> Vec<f64> {
    let n = matrix.rows();
    assert_eq!(n, matrix.cols(), "dense_solve requires a square matrix");
    assert_eq!(rhs.len(), n, "rhs length must match matrix dimension");

    let mut aug = vec![vec![0.0f64; n + 1]; n];
    for (i, row) in aug.iter_mut().enumerate() {
        row[n] = rhs[i];
        for (j, v) in matrix.row_entries(i) {
            row[j] = v;
        }
    }

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for (row, r) in aug.iter().enumerate().skip(col + 1) {
            if r[col].abs() > max_val {
                max_val = r[col].abs();
                max_row = row;
            }
        }
        assert!(max_val > 1e-15, "matrix is singular or near-singular");
        aug.swap(col, max_row);

        let pivot_row = aug[col].clone();
        for r in aug.iter_mut().skip(col + 1) {
            let factor = r[col] / pivot_row[col];
            for j in col..=n {
                r[j] -= factor * pivot_row[j];
            }
        }
    }

    let mut x = vec![0.0f64; n];
    for i in (0..n).rev() {
        let mut sum = aug[i][n];
        for j in (i + 1)..n {
            sum -= aug[i][j] * x[j];
        }
        x[i] = sum / aug[i][i];
    }
    x
}

// ---------------------------------------------------------------------------
// Norms and residuals
// ---------------------------------------------------------------------------

/// L2 norm.
pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// L2 distance between two vectors.
pub fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "vectors must have same length");
    a.iter().zip(b).map(|(&ai, &bi)| (ai - bi) * (ai - bi)).sum::<f64>().sqrt()
}

/// `||approx - exact|| / ||exact||`, or the absolute error for a zero `exact`.
pub fn relative_error(approx: &[f64], exact: &[f64]) -> f64 {
    let exact_norm = l2_norm(exact);
    let error = l2_distance(approx, exact);
    if exact_norm > 1e-15 {
        error / exact_norm
    } else {
        error
    }
}

/// `b - A x`, computed independently of the solver kernels.
pub fn compute_residual(matrix: &CsrMatrix, x: &[f64], rhs: &[f64]) -> Vec<f64> {
    (0..matrix.rows())
        .map(|i| rhs[i] - matrix.row_entries(i).map(|(j, v)| v * x[j]).sum::<f64>())
        .collect()
}

/// `||b - A x||`.
pub fn residual_norm(matrix: &CsrMatrix, x: &[f64], rhs: &[f64]) -> f64 {
    l2_norm(&compute_residual(matrix, x, rhs))
}
