//! Reusable scratch-buffer pool for iterative solves.
//!
//! [`VectorPool`] hands out zeroed `f64` buffers wrapped in [`PooledVector`]
//! guards. A guard returns its buffer to the pool when dropped, so every exit
//! path of a solve (success, budget exhaustion, or `?` on an error) releases
//! what it checked out.
//!
//! Buffers are created lazily the first time a given length is requested and
//! kept until [`dispose`](VectorPool::dispose). The pool is `Send` but not
//! `Sync`: give each concurrent solver its own pool.
//!
//! # Example
//!
//! ```
//! use sublinear_solver::pool::VectorPool;
//!
//! let pool = VectorPool::new();
//! {
//!     let mut r = pool.acquire(4);
//!     r[0] = 1.0;
//!     assert_eq!(pool.outstanding(), 1);
//! }
//! assert_eq!(pool.outstanding(), 0);
//! assert_eq!(&*pool.acquire(4), &[0.0; 4]);
//! assert_eq!(pool.allocations(), 1);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Length-keyed free lists of scratch vectors.
#[derive(Debug, Default)]
pub struct VectorPool {
    free: RefCell<HashMap<usize, Vec<Vec<f64>>>>,
    outstanding: Cell<usize>,
    allocations: Cell<usize>,
}

impl VectorPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a zero-filled buffer of length `len`.
    ///
    /// Reuses a returned buffer of the same length when one is available,
    /// otherwise allocates.
    pub fn acquire(&self, len: usize) -> PooledVector<'_> {
        let reused = self.free.borrow_mut().get_mut(&len).and_then(Vec::pop);
        let buf = match reused {
            Some(mut buf) => {
                buf.fill(0.0);
                buf
            }
            None => {
                self.allocations.set(self.allocations.get() + 1);
                vec![0.0; len]
            }
        };
        self.outstanding.set(self.outstanding.get() + 1);
        PooledVector {
            buf: Some(buf),
            pool: self,
        }
    }

    /// Buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    /// Buffers allocated over the pool's lifetime.
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// Buffers sitting in the free lists.
    pub fn cached(&self) -> usize {
        self.free.borrow().values().map(Vec::len).sum()
    }

    /// Release every cached buffer.
    ///
    /// Takes `&mut self`, so no [`PooledVector`] can still be alive.
    pub fn dispose(&mut self) {
        self.free.get_mut().clear();
    }

    fn release(&self, buf: Vec<f64>) {
        self.outstanding.set(self.outstanding.get().saturating_sub(1));
        self.free.borrow_mut().entry(buf.len()).or_default().push(buf);
    }
}

/// RAII guard over a pooled buffer. Dereferences to `[f64]`.
#[derive(Debug)]
pub struct PooledVector<'a> {
    buf: Option<Vec<f64>>,
    pool: &'a VectorPool,
}

impl PooledVector<'_> {
    /// Copy the contents out into an owned vector.
    pub fn to_owned_vec(&self) -> Vec<f64> {
        self.deref().to_vec()
    }
}

impl Deref for PooledVector<'_> {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledVector<'_> {
    fn deref_mut(&mut self) -> &mut [f64] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledVector<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
