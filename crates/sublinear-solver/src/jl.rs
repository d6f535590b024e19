//! Johnson-Lindenstrauss random projection.
//!
//! [`JlEmbedding`] holds a dense `k x n` Gaussian matrix `P` with entries
//! `N(0, 1) / sqrt(k)`, drawn by Box-Muller from a seeded [`StdRng`]. For
//! `k = O(log n / eps^2)` pairwise distances survive the projection within a
//! factor `1 +/- eps` with high probability.
//!
//! The same seed always produces the same `P`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::SolverError;
use crate::types::CsrMatrix;
use crate::validation::validate_sketch_size;

/// Constant `c` in `k = ceil(c * ln n / eps^2)`.
pub const JL_CONSTANT: f64 = 4.0;

/// Relative magnitude below which entries of a projected matrix are dropped.
const PROJECTED_DROP_TOL: f64 = 1e-14;

/// Default sketch dimension for `n` points at distortion `eps`.
///
/// `ceil(4 ln n / eps^2)`, clamped to `[1, min(n, cap)]`.
pub fn derive_target_dimension(n: usize, eps: f64, cap: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    let raw = (JL_CONSTANT * (n as f64).ln() / (eps * eps)).ceil();
    let upper = n.min(cap).max(1);
    if raw.is_finite() {
        (raw as usize).clamp(1, upper)
    } else {
        upper
    }
}

/// Dense Gaussian projection `P: R^n -> R^k`.
#[derive(Debug, Clone)]
pub struct JlEmbedding {
    /// Row-major `k x n`.
    p: Vec<f64>,
    k: usize,
    n: usize,
    eps: f64,
    seed: u64,
}

impl JlEmbedding {
    /// Draw a `k x n` projection.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidParameters`] if `k == 0`, `n == 0` or `k * n`
    /// exceeds [`MAX_SKETCH_ENTRIES`](crate::validation::MAX_SKETCH_ENTRIES).
    /// The check runs before anything is allocated.
    pub fn new(n: usize, k: usize, eps: f64, seed: u64) -> Result<Self, SolverError> {
        if n == 0 {
            return Err(SolverError::invalid_parameter("n", n, ">= 1"));
        }
        if k == 0 {
            return Err(SolverError::invalid_parameter("target_dimension", k, ">= 1"));
        }
        validate_sketch_size(n, k)?;

        let mut rng = StdRng::seed_from_u64(seed);
        let scale = 1.0 / (k as f64).sqrt();
        let len = k * n;
        let mut p = Vec::with_capacity(len);
        while p.len() < len {
            let (z0, z1) = box_muller(&mut rng);
            p.push(z0 * scale);
            if p.len() < len {
                p.push(z1 * scale);
            }
        }

        debug!(n, k, eps, seed, "JL projection drawn");
        Ok(Self { p, k, n, eps, seed })
    }

    /// Draw a projection with `k` derived from `eps` (see
    /// [`derive_target_dimension`]).
    pub fn with_distortion(n: usize, eps: f64, cap: usize, seed: u64) -> Result<Self, SolverError> {
        Self::new(n, derive_target_dimension(n, eps, cap), eps, seed)
    }

    /// Sketch dimension `k`.
    #[inline]
    pub fn target_dimension(&self) -> usize {
        self.k
    }

    /// Original dimension `n`.
    #[inline]
    pub fn source_dimension(&self) -> usize {
        self.n
    }

    /// Distortion parameter the projection was drawn for.
    #[inline]
    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Seed used to draw `P`.
    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Row `r` of `P`.
    #[inline]
    pub fn row(&self, r: usize) -> &[f64] {
        &self.p[r * self.n..(r + 1) * self.n]
    }

    /// `out = P x`.
    pub fn project(&self, x: &[f64], out: &mut [f64]) -> Result<(), SolverError> {
        if x.len() != self.n || out.len() != self.k {
            return Err(SolverError::InvalidDimensions(format!(
                "project: expected x of length {} and out of length {}, got {} and {}",
                self.n,
                self.k,
                x.len(),
                out.len(),
            )));
        }
        for (r, o) in out.iter_mut().enumerate() {
            *o = crate::kernels::dot_unchecked(self.row(r), x);
        }
        Ok(())
    }

    /// `out = P^T y`.
    pub fn lift(&self, y: &[f64], out: &mut [f64]) -> Result<(), SolverError> {
        if y.len() != self.k || out.len() != self.n {
            return Err(SolverError::InvalidDimensions(format!(
                "lift: expected y of length {} and out of length {}, got {} and {}",
                self.k,
                self.n,
                y.len(),
                out.len(),
            )));
        }
        out.fill(0.0);
        for (r, &yr) in y.iter().enumerate() {
            if yr == 0.0 {
                continue;
            }
            for (o, &pij) in out.iter_mut().zip(self.row(r)) {
                *o += yr * pij;
            }
        }
        Ok(())
    }

    /// Reduced operator `P A P^T` as a `k x k` CSR matrix.
    ///
    /// Column `s` is `P (A p_s)` where `p_s` is row `s` of `P`, so the work
    /// is `k` SpMVs plus `k^2` dot products of length `n`, with `O(n)`
    /// scratch. Entries below `1e-14` times the largest magnitude are
    /// dropped.
    pub fn project_matrix(&self, a: &CsrMatrix) -> Result<CsrMatrix, SolverError> {
        if a.rows() != self.n || a.cols() != self.n {
            return Err(SolverError::InvalidDimensions(format!(
                "project_matrix: expected {}x{} matrix, got {}x{}",
                self.n,
                self.n,
                a.rows(),
                a.cols(),
            )));
        }
        let k = self.k;

        let mut ap = vec![0.0f64; self.n];
        let mut dense = vec![0.0f64; k * k];
        let mut max_abs = 0.0f64;
        for s in 0..k {
            a.multiply_vector(self.row(s), &mut ap)?;
            for r in 0..k {
                let v = crate::kernels::dot_unchecked(self.row(r), &ap);
                dense[r * k + s] = v;
                max_abs = max_abs.max(v.abs());
            }
        }
        if !max_abs.is_finite() {
            return Err(SolverError::instability(
                crate::error::SolveStage::Projection,
                0,
                "projected matrix contains non-finite entries",
                &[],
                f64::INFINITY,
            ));
        }

        let cutoff = max_abs * PROJECTED_DROP_TOL;
        let triplets = dense
            .iter()
            .enumerate()
            .filter(|(_, v)| v.abs() > cutoff)
            .map(|(idx, &v)| (idx / k, idx % k, v));
        CsrMatrix::from_triplets(k, k, triplets)
    }

    /// Flops spent by [`project_matrix`](Self::project_matrix) on a matrix
    /// with `nnz` stored entries.
    pub fn projection_flops(&self, nnz: usize) -> u64 {
        let (k, n) = (self.k as u64, self.n as u64);
        2 * k * nnz as u64 + 2 * k * k * n
    }
}

/// Two independent standard normals from two uniforms.
#[inline]
fn box_muller(rng: &mut StdRng) -> (f64, f64) {
    // u1 in (0, 1] keeps ln(u1) finite.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    let radius = (-2.0 * u1.ln()).sqrt();
    let theta = std::f64::consts::TAU * u2;
    (radius * theta.cos(), radius * theta.sin())
}
