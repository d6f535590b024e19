//! Error types for the solver crate.
//!
//! [`SolverError`] is the only error shape that crosses the public API. Its
//! three variants mirror the failure classes of a solve: bad shapes, bad
//! parameters, and numerical breakdown. Exhausted iteration or time budgets are
//! *not* errors; they are reported through
//! [`Termination`](crate::types::Termination) on a normal result.
//!
//! Structural checks in [`validation`](crate::validation) produce the finer
//! grained [`ValidationError`], which folds into [`SolverError`] via `From`.

use std::fmt;

/// Primary error type for solver operations.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// Shapes do not line up (vector length vs matrix rows, non-square
    /// matrix, index outside the declared dimensions, malformed CSR arrays).
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// A configuration value or input value is non-finite or out of range.
    #[error("invalid parameter: {name} = {value} (expected {expected})")]
    InvalidParameters {
        /// Name of the parameter.
        name: String,
        /// The invalid value, rendered as a string.
        value: String,
        /// Human-readable description of the valid range.
        expected: String,
    },

    /// The solve broke down numerically. The boxed report carries the stage,
    /// the last valid iterate, and its residual.
    #[error("numerical instability during {} at iteration {}: {}", .0.stage, .0.iteration, .0.detail)]
    NumericalInstability(Box<InstabilityReport>),
}

impl SolverError {
    /// Shorthand for an [`InvalidParameters`](Self::InvalidParameters) error.
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        expected: impl Into<String>,
    ) -> Self {
        SolverError::InvalidParameters {
            name: name.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Build a [`NumericalInstability`](Self::NumericalInstability) error.
    ///
    /// `last_valid` is copied into the report only if every entry is finite;
    /// otherwise the report carries an empty vector so that no non-finite
    /// value ever leaves the solver.
    pub(crate) fn instability(
        stage: SolveStage,
        iteration: usize,
        detail: impl Into<String>,
        last_valid: &[f64],
        residual_norm: f64,
    ) -> Self {
        let finite = last_valid.iter().all(|v| v.is_finite());
        SolverError::NumericalInstability(Box::new(InstabilityReport {
            stage,
            iteration,
            detail: detail.into(),
            last_valid_solution: if finite { last_valid.to_vec() } else { Vec::new() },
            residual_norm: if residual_norm.is_finite() {
                residual_norm
            } else {
                f64::INFINITY
            },
        }))
    }

    /// The instability report, if this is a numerical failure.
    pub fn instability_report(&self) -> Option<&InstabilityReport> {
        match self {
            SolverError::NumericalInstability(report) => Some(report),
            _ => None,
        }
    }
}

/// Diagnostics attached to [`SolverError::NumericalInstability`].
#[derive(Debug, Clone)]
pub struct InstabilityReport {
    /// Pipeline stage that detected the breakdown.
    pub stage: SolveStage,
    /// Iteration (or series term / correction pass) index at detection.
    pub iteration: usize,
    /// Human-readable explanation.
    pub detail: String,
    /// Last iterate known to be finite. Empty when none was available.
    pub last_valid_solution: Vec<f64>,
    /// True residual norm of `last_valid_solution`, or `INFINITY` if unknown.
    pub residual_norm: f64,
}

/// Stage of a solve at which a numerical failure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SolveStage {
    /// Building the Jacobi preconditioner.
    Preconditioner,
    /// Inside the conjugate-gradient recurrence.
    ConjugateGradient,
    /// Projecting the system into the sketch space.
    Projection,
    /// Truncated Neumann series in the reduced space.
    ReducedSeries,
    /// Mapping the reduced solution back to the original space.
    Reconstruction,
    /// Richardson error-correction passes in the original space.
    ErrorCorrection,
    /// Direct Neumann solve used below the base-case threshold.
    BaseCase,
}

impl fmt::Display for SolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolveStage::Preconditioner => "preconditioner",
            SolveStage::ConjugateGradient => "conjugate-gradient",
            SolveStage::Projection => "projection",
            SolveStage::ReducedSeries => "reduced-series",
            SolveStage::Reconstruction => "reconstruction",
            SolveStage::ErrorCorrection => "error-correction",
            SolveStage::BaseCase => "base-case",
        };
        f.write_str(name)
    }
}

/// Validation errors for solver inputs.
///
/// These are raised eagerly before any computation begins so that callers get
/// clear diagnostics rather than mysterious numerical failures.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Matrix or vector dimensions are inconsistent.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A value is NaN or infinite where a finite number is required.
    #[error("non-finite value detected: {0}")]
    NonFiniteValue(String),

    /// A row or column index is out of bounds for the declared shape.
    #[error("index ({row}, {col}) out of bounds for a {rows}x{cols} matrix")]
    IndexOutOfBounds {
        /// Offending row index.
        row: usize,
        /// Offending column index.
        col: usize,
        /// Declared row count.
        rows: usize,
        /// Declared column count.
        cols: usize,
    },

    /// The `row_ptr` array is not monotonically non-decreasing.
    #[error("row_ptr is not monotonically non-decreasing at position {position}")]
    NonMonotonicRowPtrs {
        /// Position in `row_ptr` where the violation was detected.
        position: usize,
    },

    /// A parameter is outside its valid range.
    #[error("parameter out of range: {name} = {value} (expected {expected})")]
    ParameterOutOfRange {
        /// Name of the parameter.
        name: String,
        /// The invalid value (as a string for flexibility).
        value: String,
        /// Human-readable description of the valid range.
        expected: String,
    },

    /// Matrix size exceeds the implementation limit.
    #[error("matrix size {rows}x{cols} exceeds maximum supported {max_dim}x{max_dim}")]
    MatrixTooLarge {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
        /// Maximum supported dimension.
        max_dim: usize,
    },

    /// Stored-entry count exceeds the implementation limit.
    #[error("{nnz} stored entries exceed maximum supported {max_nnz}")]
    TooManyEntries {
        /// Number of stored entries.
        nnz: usize,
        /// Maximum supported entry count.
        max_nnz: usize,
    },
}

impl From<ValidationError> for SolverError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::ParameterOutOfRange {
                name,
                value,
                expected,
            } => SolverError::InvalidParameters {
                name,
                value,
                expected,
            },
            ValidationError::NonFiniteValue(detail) => SolverError::InvalidParameters {
                name: "input".into(),
                value: detail,
                expected: "finite values".into(),
            },
            other => SolverError::InvalidDimensions(other.to_string()),
        }
    }
}
