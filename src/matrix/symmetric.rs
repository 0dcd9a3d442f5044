//! Symmetric matrix stored by its upper triangle.

use std::cell::{Ref, RefMut};

use crate::error::{ERR_SHAPE, ERR_SQUARE, ERR_ZERO_LENGTH};
use crate::matrix::{new_buffer, Buffer, Matrix, MatrixKind, Vector};

/// Symmetric matrix of order n.
///
/// Storage is a full n x n row-major buffer of which only the upper
/// triangle is referenced, so `at(i, j)` and `at(j, i)` always agree by
/// construction.
#[derive(Default)]
pub struct SymDense {
    data: Option<Buffer>,
    off: usize,
    n: usize,
    stride: usize,
}

impl SymDense {
    /// Creates a zero n x n symmetric matrix.
    pub fn new(n: usize) -> SymDense {
        if n == 0 {
            panic!("{}", ERR_ZERO_LENGTH);
        }
        SymDense {
            data: Some(new_buffer(n * n)),
            off: 0,
            n,
            stride: n,
        }
    }

    /// Creates an n x n symmetric matrix backed by `data`, of which only
    /// the upper triangle is referenced. `data.len()` must equal `n*n`.
    pub fn with_data(n: usize, data: Vec<f64>) -> SymDense {
        if n == 0 {
            panic!("{}", ERR_ZERO_LENGTH);
        }
        if data.len() != n * n {
            panic!("{}", ERR_SHAPE);
        }
        SymDense {
            data: Some(Buffer::new(data.into())),
            off: 0,
            n,
            stride: n,
        }
    }

    /// Builds a symmetric matrix from any square matrix, averaging nothing:
    /// the upper triangle of `a` is taken as authoritative.
    pub fn from_upper_of(a: &dyn Matrix) -> SymDense {
        let (r, c) = a.dims();
        if r != c {
            panic!("{}", ERR_SQUARE);
        }
        let mut s = SymDense::new(r);
        for i in 0..r {
            for j in i..r {
                s.set_sym(i, j, a.at(i, j));
            }
        }
        s
    }

    /// The order of the matrix.
    pub fn order(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.stride == 0
    }

    pub fn reset(&mut self) {
        self.data = None;
        self.off = 0;
        self.n = 0;
        self.stride = 0;
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Sets both `(i, j)` and `(j, i)` to `v` by writing the upper-triangle
    /// element.
    pub fn set_sym(&mut self, i: usize, j: usize, v: f64) {
        self.check_access(i, j);
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        let idx = self.off + i * self.stride + j;
        self.buf_mut()[idx] = v;
    }

    fn check_access(&self, i: usize, j: usize) {
        if i >= self.n {
            panic!("{}", crate::error::ERR_ROW_ACCESS);
        }
        if j >= self.n {
            panic!("{}", crate::error::ERR_COL_ACCESS);
        }
    }

    /// Resizes an empty receiver to order n, or checks the existing order.
    pub(crate) fn reuse_as(&mut self, n: usize) {
        if self.is_empty() {
            *self = SymDense::new(n);
            return;
        }
        if self.n != n {
            panic!("{}", ERR_SHAPE);
        }
    }

    /// Stores `alpha * a * a^T` into the receiver.
    pub fn sym_outer_k(&mut self, alpha: f64, a: &dyn Matrix) {
        let (r, c) = a.dims();
        self.reuse_as(r);
        for i in 0..r {
            for j in i..r {
                let mut acc = 0.0;
                for k in 0..c {
                    acc += a.at(i, k) * a.at(j, k);
                }
                self.set_sym(i, j, alpha * acc);
            }
        }
    }

    /// Stores `a + alpha * x * x^T` into the receiver.
    pub fn sym_rank_one(&mut self, a: &SymDense, alpha: f64, x: &Vector) {
        let n = a.order();
        if x.len() != n {
            panic!("{}", ERR_SHAPE);
        }
        self.reuse_as(n);
        let xs = x.to_vec();
        for i in 0..n {
            for j in i..n {
                self.set_sym(i, j, a.at(i, j) + alpha * xs[i] * xs[j]);
            }
        }
    }

    /// The 1-norm (maximum absolute column sum), which for a symmetric
    /// matrix coincides with the infinity norm.
    pub fn norm1(&self) -> f64 {
        let mut max = 0.0_f64;
        for j in 0..self.n {
            let mut acc = 0.0;
            for i in 0..self.n {
                acc += self.at(i, j).abs();
            }
            max = max.max(acc);
        }
        max
    }

    pub(crate) fn buf(&self) -> Ref<'_, Vec<f64>> {
        self.data.as_ref().expect("access to empty matrix").borrow()
    }

    pub(crate) fn buf_mut(&self) -> RefMut<'_, Vec<f64>> {
        self.data.as_ref().expect("access to empty matrix").borrow_mut()
    }

    pub(crate) fn handle(&self) -> Option<&Buffer> {
        self.data.as_ref()
    }

    pub(crate) fn offset(&self) -> usize {
        self.off
    }
}

impl Matrix for SymDense {
    fn dims(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    fn at(&self, i: usize, j: usize) -> f64 {
        self.check_access(i, j);
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        self.buf()[self.off + i * self.stride + j]
    }

    fn kind(&self) -> MatrixKind<'_> {
        MatrixKind::Sym(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_reads_agree() {
        let mut s = SymDense::new(3);
        s.set_sym(0, 2, 5.0);
        s.set_sym(2, 1, -2.0);
        assert_eq!(s.at(0, 2), 5.0);
        assert_eq!(s.at(2, 0), 5.0);
        assert_eq!(s.at(1, 2), -2.0);
        assert_eq!(s.at(2, 1), -2.0);
    }

    #[test]
    fn lower_triangle_of_backing_data_is_ignored() {
        let s = SymDense::with_data(2, vec![1.0, 2.0, 99.0, 3.0]);
        assert_eq!(s.at(1, 0), 2.0);
    }

    #[test]
    fn outer_k_is_gram() {
        let a = crate::matrix::Dense::with_data(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut s = SymDense::default();
        s.sym_outer_k(1.0, &a);
        assert_eq!(s.at(0, 0), 14.0);
        assert_eq!(s.at(0, 1), 32.0);
        assert_eq!(s.at(1, 1), 77.0);
    }

    #[test]
    fn rank_one_matches_elementwise() {
        let a = SymDense::with_data(2, vec![2.0, 1.0, 0.0, 3.0]);
        let x = Vector::with_data(vec![1.0, -2.0]);
        let mut s = SymDense::default();
        s.sym_rank_one(&a, 0.5, &x);
        assert_eq!(s.at(0, 0), 2.5);
        assert_eq!(s.at(0, 1), 0.0);
        assert_eq!(s.at(1, 1), 5.0);
    }
}
