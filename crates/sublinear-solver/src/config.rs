//! Per-call solver configuration.
//!
//! [`SolverConfig`] is a plain value object. It derives serde with
//! `#[serde(default)]`, so any subset of fields can be supplied by a config
//! source and the rest take their defaults.

use serde::{Deserialize, Serialize};

use crate::error::{SolverError, ValidationError};
use crate::validation::{validate_params, MAX_ITERATIONS};

/// Upper bound on analyzer power-iteration steps.
pub const MAX_POWER_ITERATIONS: usize = 10_000;

/// How the facade picks a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMode {
    /// Follow the analyzer's recommendation.
    #[default]
    Auto,
    /// Always run Conjugate Gradient.
    ForceExact,
    /// Run the sketch path whenever the matrix is diagonally dominant; fall
    /// back to CG otherwise.
    ForceSublinear,
}

/// Shape of the solution carried by the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputMode {
    /// Return the whole vector.
    #[default]
    Full,
    /// Return the first `head` entries plus summary statistics.
    Sampled {
        /// Number of leading entries kept.
        head: usize,
    },
}

/// Configuration for one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Iteration cap for CG and for the Neumann series.
    pub max_iterations: usize,
    /// Absolute residual target `||b - A x||_2 <= tolerance`.
    pub tolerance: f64,
    /// Apply the Jacobi preconditioner in CG.
    pub use_preconditioning: bool,
    /// Count kernel calls and flops.
    pub enable_profiling: bool,
    /// Sketch dimension `k`; derived from `n` and `jl_distortion` when unset.
    pub target_dimension: Option<usize>,
    /// JL distortion `eps` in `(0, 1)`.
    pub jl_distortion: f64,
    /// Keep-probability control for sparsifying the reduced matrix.
    pub sparsification_eps: Option<f64>,
    /// Maximum Richardson correction passes.
    pub max_recursion_depth: usize,
    /// Systems with `n <= base_case_threshold` skip the projection.
    pub base_case_threshold: usize,
    /// Optional wall-clock budget in milliseconds.
    pub max_wall_time_ms: Option<u64>,
    /// Cap on the derived sketch dimension.
    pub max_target_dimension: usize,
    /// Fixed number of Neumann terms; derived from `tolerance` when unset.
    pub series_terms: Option<usize>,
    /// Minimum rows before the analyzer recommends the sketch path.
    pub sublinear_min_rows: usize,
    /// Power-iteration steps for the spectral radius estimate.
    pub power_iterations: usize,
    /// Seed for every random draw (projection, sampling, power iteration).
    pub seed: u64,
    /// Backend selection.
    pub mode: SolveMode,
    /// Result payload shape.
    pub output: OutputMode,
    /// Retry with CG when the sketch path reports numerical instability.
    pub fallback_to_exact: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-10,
            use_preconditioning: true,
            enable_profiling: false,
            target_dimension: None,
            jl_distortion: 0.1,
            sparsification_eps: None,
            max_recursion_depth: 5,
            base_case_threshold: 64,
            max_wall_time_ms: None,
            max_target_dimension: 512,
            series_terms: None,
            sublinear_min_rows: 256,
            power_iterations: 20,
            seed: 42,
            mode: SolveMode::Auto,
            output: OutputMode::Full,
            fallback_to_exact: false,
        }
    }
}

fn out_of_range(name: &str, value: impl ToString, expected: &str) -> SolverError {
    ValidationError::ParameterOutOfRange {
        name: name.into(),
        value: value.to_string(),
        expected: expected.into(),
    }
    .into()
}

impl SolverConfig {
    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the residual tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Toggle Jacobi preconditioning.
    pub fn with_preconditioning(mut self, enabled: bool) -> Self {
        self.use_preconditioning = enabled;
        self
    }

    /// Toggle kernel counters.
    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.enable_profiling = enabled;
        self
    }

    /// Fix the sketch dimension.
    pub fn with_target_dimension(mut self, k: usize) -> Self {
        self.target_dimension = Some(k);
        self
    }

    /// Set the JL distortion.
    pub fn with_jl_distortion(mut self, eps: f64) -> Self {
        self.jl_distortion = eps;
        self
    }

    /// Enable reduced-matrix sparsification.
    pub fn with_sparsification(mut self, eps: f64) -> Self {
        self.sparsification_eps = Some(eps);
        self
    }

    /// Set the Richardson pass cap.
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Set the base-case size.
    pub fn with_base_case_threshold(mut self, n: usize) -> Self {
        self.base_case_threshold = n;
        self
    }

    /// Set a wall-clock budget.
    pub fn with_max_wall_time_ms(mut self, ms: u64) -> Self {
        self.max_wall_time_ms = Some(ms);
        self
    }

    /// Fix the number of Neumann terms.
    pub fn with_series_terms(mut self, terms: usize) -> Self {
        self.series_terms = Some(terms);
        self
    }

    /// Set the analyzer's row threshold for the sketch path.
    pub fn with_sublinear_min_rows(mut self, rows: usize) -> Self {
        self.sublinear_min_rows = rows;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the backend selection mode.
    pub fn with_mode(mut self, mode: SolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the output mode.
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Toggle CG retry on sketch-path instability.
    pub fn with_fallback_to_exact(mut self, enabled: bool) -> Self {
        self.fallback_to_exact = enabled;
        self
    }

    /// Check every numeric field.
    ///
    /// # Errors
    ///
    /// [`SolverError::InvalidParameters`] naming the first offending field.
    pub fn validate(&self) -> Result<(), SolverError> {
        validate_params(self.tolerance, self.max_iterations)?;

        if !self.jl_distortion.is_finite() || self.jl_distortion <= 0.0 || self.jl_distortion >= 1.0
        {
            return Err(out_of_range("jl_distortion", self.jl_distortion, "(0, 1)"));
        }
        if self.target_dimension == Some(0) {
            return Err(out_of_range("target_dimension", 0, ">= 1"));
        }
        if let Some(eps) = self.sparsification_eps {
            if !eps.is_finite() || eps <= 0.0 || eps > 1.0 {
                return Err(out_of_range("sparsification_eps", eps, "(0, 1]"));
            }
        }
        if self.max_recursion_depth > MAX_ITERATIONS {
            return Err(out_of_range(
                "max_recursion_depth",
                self.max_recursion_depth,
                &format!("<= {MAX_ITERATIONS}"),
            ));
        }
        if self.max_target_dimension == 0 {
            return Err(out_of_range("max_target_dimension", 0, ">= 1"));
        }
        if let Some(t) = self.series_terms {
            if t == 0 || t > MAX_ITERATIONS {
                return Err(out_of_range(
                    "series_terms",
                    t,
                    &format!("[1, {MAX_ITERATIONS}]"),
                ));
            }
        }
        if self.power_iterations == 0 || self.power_iterations > MAX_POWER_ITERATIONS {
            return Err(out_of_range(
                "power_iterations",
                self.power_iterations,
                &format!("[1, {MAX_POWER_ITERATIONS}]"),
            ));
        }
        Ok(())
    }
}
