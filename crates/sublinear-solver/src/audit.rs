//! Audit trail for solver invocations.
//!
//! Every facade solve can produce a [`SolverAuditEntry`] that captures a
//! fingerprint of the input and output, the method and complexity class that
//! were claimed, convergence metrics and timing. Entries are plain serde
//! values and can be streamed to any log sink.
//!
//! # Hashing
//!
//! Fingerprints use [`std::hash::DefaultHasher`], not a cryptographic hash.
//! They are good for deduplication and for spotting that two runs saw
//! different inputs; they are not tamper proofing.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::{ComplexityKind, CsrMatrix, Method, SolutionPayload, SolverResult, Termination};

/// A single audit record for one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverAuditEntry {
    /// Caller-supplied identifier for this solve request.
    pub request_id: String,

    /// Method that produced the result.
    pub method: Method,

    /// Complexity class the result claims.
    pub complexity: ComplexityKind,

    /// Fingerprint of the matrix and right-hand side. See [`hash_input`].
    pub input_hash: [u8; 8],

    /// Fingerprint of the returned solution payload. See [`hash_output`].
    pub output_hash: [u8; 8],

    /// Iterations reported by the result.
    pub iterations: usize,

    /// Wall-clock time of the whole facade call, in microseconds.
    pub wall_time_us: u64,

    /// Converged flag copied from the result.
    pub converged: bool,

    /// Why the solve stopped.
    pub termination: Termination,

    /// Final true residual norm.
    pub residual: f64,

    /// `true` when the facade fell back to CG.
    pub fell_back: bool,

    /// Start time as nanoseconds since the Unix epoch.
    pub timestamp_ns: u128,

    /// Rows of the input matrix.
    pub matrix_rows: usize,

    /// Columns of the input matrix.
    pub matrix_cols: usize,

    /// Stored entries of the input matrix.
    pub matrix_nnz: usize,
}

// ---------------------------------------------------------------------------
// Hash helpers
// ---------------------------------------------------------------------------

/// Deterministic 8-byte fingerprint of a solve input.
///
/// Covers the shape, the structural arrays, the value bits and the
/// right-hand side bits.
pub fn hash_input(matrix: &CsrMatrix, rhs: &[f64]) -> [u8; 8] {
    let mut h = DefaultHasher::new();

    matrix.rows().hash(&mut h);
    matrix.cols().hash(&mut h);
    matrix.row_ptr().hash(&mut h);
    matrix.col_indices().hash(&mut h);
    for &v in matrix.values() {
        v.to_bits().hash(&mut h);
    }

    rhs.len().hash(&mut h);
    for &v in rhs {
        v.to_bits().hash(&mut h);
    }

    h.finish().to_le_bytes()
}

/// Deterministic 8-byte fingerprint of a solution payload.
///
/// A sampled payload hashes its head and summary statistics, so it differs
/// from the full payload of the same solve.
pub fn hash_output(solution: &SolutionPayload) -> [u8; 8] {
    let mut h = DefaultHasher::new();
    match solution {
        SolutionPayload::Full(x) => {
            0u8.hash(&mut h);
            hash_floats(x, &mut h);
        }
        SolutionPayload::Sampled(s) => {
            1u8.hash(&mut h);
            s.len.hash(&mut h);
            hash_floats(&s.head, &mut h);
            hash_floats(&[s.min, s.max, s.mean, s.l2_norm], &mut h);
        }
    }
    h.finish().to_le_bytes()
}

fn hash_floats(values: &[f64], h: &mut DefaultHasher) {
    values.len().hash(h);
    for &v in values {
        v.to_bits().hash(h);
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects the input side of an audit record when a solve starts and turns
/// it into a [`SolverAuditEntry`] when the result is available.
///
/// # Example
///
/// ```rust
/// use sublinear_solver::audit::AuditBuilder;
/// use sublinear_solver::types::CsrMatrix;
/// use sublinear_solver::router::solve;
///
/// let a = CsrMatrix::identity(3).unwrap();
/// let b = [1.0, 2.0, 3.0];
/// let audit = AuditBuilder::start("req-42", &a, &b);
/// let result = solve(&a, &b, None).unwrap();
/// let entry = audit.finish(&result);
/// assert!(entry.converged);
/// ```
#[derive(Debug)]
pub struct AuditBuilder {
    request_id: String,
    input_hash: [u8; 8],
    matrix_rows: usize,
    matrix_cols: usize,
    matrix_nnz: usize,
    start: Instant,
    timestamp_ns: u128,
}

impl AuditBuilder {
    /// Begin an audit record. The input hash is taken eagerly.
    pub fn start(request_id: impl Into<String>, matrix: &CsrMatrix, rhs: &[f64]) -> Self {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_nanos();

        Self {
            request_id: request_id.into(),
            input_hash: hash_input(matrix, rhs),
            matrix_rows: matrix.rows(),
            matrix_cols: matrix.cols(),
            matrix_nnz: matrix.nnz(),
            start: Instant::now(),
            timestamp_ns,
        }
    }

    /// Finalize the record from the solver's result.
    pub fn finish(self, result: &SolverResult) -> SolverAuditEntry {
        let elapsed = self.start.elapsed();

        SolverAuditEntry {
            request_id: self.request_id,
            method: result.method,
            complexity: result.complexity_bound.kind,
            input_hash: self.input_hash,
            output_hash: hash_output(&result.solution),
            iterations: result.iterations,
            wall_time_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            converged: result.converged,
            termination: result.termination,
            residual: result.residual_norm,
            fell_back: result.fallback.is_some(),
            timestamp_ns: self.timestamp_ns,
            matrix_rows: self.matrix_rows,
            matrix_cols: self.matrix_cols,
            matrix_nnz: self.matrix_nnz,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::PerformanceStats;
    use crate::types::{ComplexityBound, ConvergenceInfo, SolutionSample};

    fn sample_matrix() -> CsrMatrix {
        CsrMatrix::from_triplets(2, 2, vec![(0, 0, 2.0), (0, 1, -0.5), (1, 0, -0.5), (1, 1, 2.0)])
            .unwrap()
    }

    fn sample_result() -> SolverResult {
        SolverResult {
            solution: SolutionPayload::Full(vec![0.5, 0.5]),
            iterations: 10,
            residual_norm: 1e-11,
            converged: true,
            termination: Termination::Converged,
            method: Method::Exact,
            complexity_bound: ComplexityBound::sqrt(2, 4, 1.0),
            performance: PerformanceStats::default(),
            convergence_history: vec![ConvergenceInfo {
                iteration: 9,
                residual_norm: 1e-11,
            }],
            approximation: None,
            fallback: None,
        }
    }

    #[test]
    fn hash_input_deterministic() {
        let m = sample_matrix();
        let rhs = [1.0, 1.0];
        assert_eq!(hash_input(&m, &rhs), hash_input(&m, &rhs));
    }

    #[test]
    fn hash_input_changes_with_values() {
        let m1 = sample_matrix();
        let m2 = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 3.0), (0, 1, -0.5), (1, 0, -0.5), (1, 1, 2.0)])
            .unwrap();
        let rhs = [1.0, 1.0];
        assert_ne!(hash_input(&m1, &rhs), hash_input(&m2, &rhs));
    }

    #[test]
    fn hash_input_changes_with_rhs() {
        let m = sample_matrix();
        assert_ne!(hash_input(&m, &[1.0, 1.0]), hash_input(&m, &[1.0, 2.0]));
    }

    #[test]
    fn hash_output_distinguishes_payloads() {
        let full = SolutionPayload::Full(vec![0.5, 0.5]);
        let other = SolutionPayload::Full(vec![0.5, 0.6]);
        let sampled = SolutionPayload::Sampled(SolutionSample::summarize(&[0.5, 0.5], 2));
        assert_eq!(hash_output(&full), hash_output(&full));
        assert_ne!(hash_output(&full), hash_output(&other));
        assert_ne!(hash_output(&full), hash_output(&sampled));
    }

    #[test]
    fn builder_produces_entry() {
        let m = sample_matrix();
        let entry = AuditBuilder::start("req-1", &m, &[1.0, 1.0]).finish(&sample_result());

        assert_eq!(entry.request_id, "req-1");
        assert_eq!(entry.method, Method::Exact);
        assert_eq!(entry.complexity, ComplexityKind::Sqrt);
        assert_eq!(entry.iterations, 10);
        assert!(entry.converged);
        assert!(!entry.fell_back);
        assert_eq!((entry.matrix_rows, entry.matrix_cols, entry.matrix_nnz), (2, 2, 4));
        assert!(entry.timestamp_ns > 0);
    }

    #[test]
    fn fallback_and_non_convergence_are_recorded() {
        let mut result = sample_result();
        result.converged = false;
        result.termination = Termination::MaxIterationsReached;
        result.fallback = Some("sketch path unstable".into());
        let entry = AuditBuilder::start("req-2", &sample_matrix(), &[1.0, 1.0]).finish(&result);
        assert!(!entry.converged);
        assert!(entry.fell_back);
        assert_eq!(entry.termination, Termination::MaxIterationsReached);
    }

    #[test]
    fn entry_round_trips_through_json() {
        let entry = AuditBuilder::start("ser", &sample_matrix(), &[1.0, 1.0]).finish(&sample_result());
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"request_id\":\"ser\""));
        let back: SolverAuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.request_id, entry.request_id);
        assert_eq!(back.input_hash, entry.input_hash);
        assert_eq!(back.output_hash, entry.output_hash);
        assert_eq!(back.timestamp_ns, entry.timestamp_ns);
        assert_eq!(back.method, entry.method);
    }
}
