//! Reusable scratch matrices for allocation-free hot paths.
//!
//! Buffers are pooled in power-of-two size classes. The engine routes
//! through a thread-local instance, so no locking is needed and pooled
//! state never crosses threads; a [`Pool`] can also be constructed
//! directly, which keeps its lifecycle explicit and testable in isolation.
//!
//! Pooling is purely a performance concern: a workspace obtained here is
//! indistinguishable from a freshly allocated matrix.

use std::cell::RefCell;
use std::rc::Rc;

use crate::matrix::{Buffer, Dense};

const BUCKETS: usize = 64;

/// Free lists of recycled buffers, one per power-of-two size class.
pub struct Pool {
    buckets: Vec<Vec<Buffer>>,
}

impl Pool {
    pub fn new() -> Pool {
        Pool {
            buckets: (0..BUCKETS).map(|_| Vec::new()).collect(),
        }
    }

    /// Drops every pooled buffer.
    pub fn clear(&mut self) {
        for b in &mut self.buckets {
            b.clear();
        }
    }

    /// Hands out an `r`x`c` workspace. The elements are zeroed only when
    /// `zero_fill` is set; callers that overwrite every element skip the
    /// wasted pass.
    pub fn acquire(&mut self, r: usize, c: usize, zero_fill: bool) -> Dense {
        let need = r * c;
        let class = size_class(need).min(BUCKETS - 1);
        let buf = loop {
            match self.buckets[class].pop() {
                Some(buf) => {
                    // A handle that escaped its workspace is left alone.
                    if Rc::strong_count(&buf) != 1 {
                        continue;
                    }
                    {
                        let mut v = buf.borrow_mut();
                        v.resize(need, 0.0);
                        if zero_fill {
                            v.fill(0.0);
                        }
                    }
                    break buf;
                }
                None => {
                    let mut v = Vec::with_capacity(1 << class);
                    v.resize(need, 0.0);
                    break Rc::new(RefCell::new(v));
                }
            }
        };
        Dense::from_pooled(buf, r, c)
    }

    /// Returns a workspace to the pool. The caller must not use the matrix
    /// value after releasing it; views taken of it keep their storage
    /// alive but the buffer will not be reissued while they exist.
    pub fn release(&mut self, m: Dense) {
        if let Some(buf) = m.take_buffer() {
            let cap = buf.borrow().capacity();
            if cap == 0 {
                return;
            }
            let class = size_class(cap).min(BUCKETS - 1);
            // Keep the invariant that bucket k holds buffers of capacity
            // >= 2^k.
            let class = if (1usize << class) > cap { class - 1 } else { class };
            self.buckets[class].push(buf);
        }
    }
}

impl Default for Pool {
    fn default() -> Pool {
        Pool::new()
    }
}

fn size_class(len: usize) -> usize {
    let len = len.max(1);
    (usize::BITS - (len - 1).leading_zeros()) as usize
}

thread_local! {
    static POOL: RefCell<Pool> = RefCell::new(Pool::new());
}

/// Fetches an `r`x`c` scratch matrix from the calling thread's pool.
pub(crate) fn get_workspace(r: usize, c: usize, zero_fill: bool) -> Dense {
    POOL.with(|p| p.borrow_mut().acquire(r, c, zero_fill))
}

/// Returns a scratch matrix to the calling thread's pool.
pub(crate) fn put_workspace(m: Dense) {
    POOL.with(|p| p.borrow_mut().release(m));
}
