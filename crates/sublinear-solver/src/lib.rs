//! Sparse linear-system solvers with a sublinear sketch path.
//!
//! This crate solves `Ax = b` for a square sparse `A` stored in CSR format.
//! Two backends sit behind one facade:
//!
//! | Backend | Module | Applies to | Declared bound |
//! |---------|--------|------------|----------------|
//! | [`ConjugateGradientSolver`](cg::ConjugateGradientSolver) | [`cg`] | symmetric positive definite | `O(sqrt(kappa) nnz)` |
//! | [`SublinearSolver`](sublinear::SublinearSolver) | [`sublinear`] | diagonally dominant | `O(log n / eps^2)` reduced dimension |
//!
//! [`SolverFacade`](router::SolverFacade) validates the request, runs the
//! [`MatrixAnalyzer`](analysis::MatrixAnalyzer), picks a backend and returns a
//! [`SolverResult`](types::SolverResult) carrying the solution, the residual,
//! the reason the solve stopped and the complexity claim for the input.
//! Exhausted budgets are not errors; the result comes back with
//! `converged = false`.
//!
//! # Example
//!
//! ```rust
//! use sublinear_solver::{build_matrix, solve, SolverConfig};
//!
//! let a = build_matrix(
//!     &[
//!         (0, 0, 4.0), (0, 1, -1.0),
//!         (1, 0, -1.0), (1, 1, 4.0), (1, 2, -1.0),
//!         (2, 1, -1.0), (2, 2, 4.0),
//!     ],
//!     3,
//!     3,
//! )
//! .unwrap();
//! let b = [1.0, 2.0, 3.0];
//!
//! let result = solve(&a, &b, Some(&SolverConfig::default().with_tolerance(1e-8))).unwrap();
//! assert!(result.converged);
//! assert!(result.residual_norm <= 1e-8);
//! ```

pub mod analysis;
pub mod audit;
pub mod budget;
pub mod cg;
pub mod config;
pub mod error;
pub mod jl;
pub mod kernels;
pub mod neumann;
pub mod pool;
pub mod profile;
pub mod router;
pub mod sublinear;
pub mod traits;
pub mod types;
pub mod validation;

pub use analysis::{analyze, MatrixAnalysis, MatrixAnalyzer};
pub use config::{OutputMode, SolveMode, SolverConfig};
pub use error::{InstabilityReport, SolveStage, SolverError, ValidationError};
pub use pool::VectorPool;
pub use router::{dispose, solve, SolverFacade, SolverRouter};
pub use traits::SolverEngine;
pub use types::{build_matrix, CsrMatrix, Method, SolverResult, Termination};
