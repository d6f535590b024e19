//! Operation counters and timing for a single solve.
//!
//! [`OpCounter`] wraps the vector kernels and sparse matrix-vector product.
//! When profiling is enabled each call bumps a plain integer counter and adds
//! its flop count; when disabled the wrappers only forward. Wall time is always
//! recorded.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::SolverError;
use crate::kernels;
use crate::types::CsrMatrix;

/// Counters reported on every [`SolverResult`](crate::types::SolverResult).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Sparse matrix-vector products.
    pub matvec_count: u64,
    /// Dot products and norms.
    pub dot_product_count: u64,
    /// AXPY updates.
    pub axpy_count: u64,
    /// Floating-point operations counted by the wrappers.
    pub total_flops: u64,
    /// Elapsed wall time in milliseconds.
    pub wall_time_ms: f64,
    /// `total_flops / wall_time`, in GFLOP/s. Zero when unmeasurable.
    pub gflops: f64,
}

impl PerformanceStats {
    /// Add another solve's counters into this one (used when a facade
    /// fallback runs two backends for one call).
    pub fn accumulate(&mut self, other: &PerformanceStats) {
        self.matvec_count += other.matvec_count;
        self.dot_product_count += other.dot_product_count;
        self.axpy_count += other.axpy_count;
        self.total_flops += other.total_flops;
        self.wall_time_ms += other.wall_time_ms;
        self.gflops = gflops(self.total_flops, self.wall_time_ms);
    }
}

fn gflops(flops: u64, wall_time_ms: f64) -> f64 {
    if wall_time_ms > 0.0 {
        flops as f64 / (wall_time_ms * 1e6)
    } else {
        0.0
    }
}

/// Counting wrapper over the kernels used by the iterative loops.
#[derive(Debug)]
pub struct OpCounter {
    enabled: bool,
    stats: PerformanceStats,
    start: Instant,
}

impl OpCounter {
    /// Start a counter. The wall clock starts immediately.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            stats: PerformanceStats::default(),
            start: Instant::now(),
        }
    }

    /// Whether counts are being recorded.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// `y = A x`.
    #[inline]
    pub fn matvec(&mut self, a: &CsrMatrix, x: &[f64], y: &mut [f64]) -> Result<(), SolverError> {
        a.multiply_vector(x, y)?;
        if self.enabled {
            self.stats.matvec_count += 1;
            self.stats.total_flops += 2 * a.nnz() as u64;
        }
        Ok(())
    }

    /// `r = b - A x`, returning `||r||`. Counted as one matvec and one dot.
    #[inline]
    pub fn residual(
        &mut self,
        a: &CsrMatrix,
        x: &[f64],
        b: &[f64],
        r: &mut [f64],
    ) -> Result<f64, SolverError> {
        let norm = a.residual_into(x, b, r)?;
        if self.enabled {
            self.stats.matvec_count += 1;
            self.stats.dot_product_count += 1;
            self.stats.total_flops += 2 * a.nnz() as u64 + 3 * b.len() as u64;
        }
        Ok(norm)
    }

    /// `a . b`.
    #[inline]
    pub fn dot(&mut self, a: &[f64], b: &[f64]) -> Result<f64, SolverError> {
        let d = kernels::dot(a, b)?;
        self.count_dot(a.len());
        Ok(d)
    }

    /// `||x||_2`. Counted as a dot product.
    #[inline]
    pub fn norm(&mut self, x: &[f64]) -> f64 {
        self.count_dot(x.len());
        kernels::norm(x)
    }

    /// `y = alpha x + y`.
    #[inline]
    pub fn axpy(&mut self, alpha: f64, x: &[f64], y: &mut [f64]) -> Result<(), SolverError> {
        kernels::axpy(alpha, x, y)?;
        if self.enabled {
            self.stats.axpy_count += 1;
            self.stats.total_flops += 2 * x.len() as u64;
        }
        Ok(())
    }

    /// Record `flops` operations done outside the wrappers (e.g. the dense
    /// projection products).
    #[inline]
    pub fn add_flops(&mut self, flops: u64) {
        if self.enabled {
            self.stats.total_flops += flops;
        }
    }

    #[inline]
    fn count_dot(&mut self, n: usize) {
        if self.enabled {
            self.stats.dot_product_count += 1;
            self.stats.total_flops += 2 * n as u64;
        }
    }

    /// Milliseconds since the counter was created.
    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1e3
    }

    /// Snapshot of the counters with the current wall time filled in.
    pub fn snapshot(&self) -> PerformanceStats {
        let wall_time_ms = self.elapsed_ms();
        PerformanceStats {
            wall_time_ms,
            gflops: gflops(self.stats.total_flops, wall_time_ms),
            ..self.stats
        }
    }
}
