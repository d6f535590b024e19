//! Iteration and wall-clock budgets for solver loops.
//!
//! [`BudgetEnforcer`] tracks the iteration count and elapsed time of one
//! solve. Every loop (CG steps, Neumann terms, correction passes) calls
//! [`check_iteration`](BudgetEnforcer::check_iteration) at the top of its
//! body. An exhausted budget is not an error: the enforcer hands back the
//! [`Termination`] the solver should report alongside its best-so-far iterate.

use std::time::{Duration, Instant};

use crate::types::Termination;

/// Enforces iteration and wall-time limits during a solve.
///
/// Create one at the start of a solve. Intentionally non-`Clone` so that each
/// solve owns exactly one.
///
/// # Example
///
/// ```
/// use sublinear_solver::budget::BudgetEnforcer;
/// use sublinear_solver::types::Termination;
///
/// let mut enforcer = BudgetEnforcer::new(2, None);
/// assert_eq!(enforcer.check_iteration(), None);
/// assert_eq!(enforcer.check_iteration(), None);
/// assert_eq!(enforcer.check_iteration(), Some(Termination::MaxIterationsReached));
/// ```
#[derive(Debug)]
pub struct BudgetEnforcer {
    start_time: Instant,
    max_iterations: usize,
    max_time: Option<Duration>,
    iterations_used: usize,
}

impl BudgetEnforcer {
    /// Create an enforcer. The wall-clock timer starts immediately.
    pub fn new(max_iterations: usize, max_time: Option<Duration>) -> Self {
        Self {
            start_time: Instant::now(),
            max_iterations,
            max_time,
            iterations_used: 0,
        }
    }

    /// Build from a millisecond budget as stored in
    /// [`SolverConfig`](crate::config::SolverConfig).
    pub fn from_millis(max_iterations: usize, max_wall_time_ms: Option<u64>) -> Self {
        Self::new(max_iterations, max_wall_time_ms.map(Duration::from_millis))
    }

    /// Check whether another iteration may run.
    ///
    /// Must be called **once per iteration**, at the top of the loop body.
    /// Returns `None` and counts the iteration when within budget; otherwise
    /// returns the termination reason without counting.
    pub fn check_iteration(&mut self) -> Option<Termination> {
        if self.iterations_used >= self.max_iterations {
            return Some(Termination::MaxIterationsReached);
        }
        if self.time_exhausted() {
            return Some(Termination::TimeBudgetExhausted);
        }
        self.iterations_used += 1;
        None
    }

    /// `true` once the wall-clock limit (if any) has passed.
    #[inline]
    pub fn time_exhausted(&self) -> bool {
        self.max_time
            .is_some_and(|limit| self.start_time.elapsed() >= limit)
    }

    /// Wall-clock duration since the enforcer was created.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Iterations granted so far.
    #[inline]
    pub fn iterations_used(&self) -> usize {
        self.iterations_used
    }

    /// Iteration limit.
    #[inline]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
