//! Triangular matrix with an explicit upper/lower kind tag.

use std::cell::{Ref, RefMut};

use crate::error::{Error, CONDITION_TOLERANCE, ERR_SHAPE, ERR_TRIANGLE_SET, ERR_ZERO_LENGTH};
use crate::kernel;
use crate::matrix::shadow;
use crate::matrix::{new_buffer, Buffer, Matrix, MatrixKind, Transpose};

/// Which triangle of a [`TriDense`] carries data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uplo {
    Upper,
    Lower,
}

/// Triangular matrix of order n.
///
/// Elements on the wrong side of the diagonal read as zero and cannot be
/// set; attempting to set one panics.
#[derive(Default)]
pub struct TriDense {
    data: Option<Buffer>,
    off: usize,
    n: usize,
    stride: usize,
    uplo: Uplo,
}

impl Default for Uplo {
    fn default() -> Uplo {
        Uplo::Upper
    }
}

impl TriDense {
    /// Creates a zero triangular matrix of order n.
    pub fn new(n: usize, uplo: Uplo) -> TriDense {
        if n == 0 {
            panic!("{}", ERR_ZERO_LENGTH);
        }
        TriDense {
            data: Some(new_buffer(n * n)),
            off: 0,
            n,
            stride: n,
            uplo,
        }
    }

    /// Creates a triangular matrix backed by `data`, of which only the
    /// tagged triangle is referenced. `data.len()` must equal `n*n`.
    pub fn with_data(n: usize, uplo: Uplo, data: Vec<f64>) -> TriDense {
        if n == 0 {
            panic!("{}", ERR_ZERO_LENGTH);
        }
        if data.len() != n * n {
            panic!("{}", ERR_SHAPE);
        }
        TriDense {
            data: Some(Buffer::new(data.into())),
            off: 0,
            n,
            stride: n,
            uplo,
        }
    }

    /// The order and kind of the matrix.
    pub fn triangle(&self) -> (usize, Uplo) {
        (self.n, self.uplo)
    }

    pub fn order(&self) -> usize {
        self.n
    }

    pub fn uplo(&self) -> Uplo {
        self.uplo
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

    fn in_triangle(&self, i: usize, j: usize) -> bool {
        match self.uplo {
            Uplo::Upper => j >= i,
            Uplo::Lower => j <= i,
        }
    }

    /// Sets the element at `(i, j)`. Panics with `ERR_TRIANGLE_SET` when
    /// the position lies outside the tagged triangle.
    pub fn set_tri(&mut self, i: usize, j: usize, v: f64) {
        self.check_access(i, j);
        if !self.in_triangle(i, j) {
            panic!("{}", ERR_TRIANGLE_SET);
        }
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

    /// Resizes an empty receiver, or checks that the existing order and
    /// kind match.
    pub(crate) fn reuse_as(&mut self, n: usize, uplo: Uplo) {
        if self.is_empty() {
            *self = TriDense::new(n, uplo);
            return;
        }
        if self.n != n || self.uplo != uplo {
            panic!("{}", ERR_SHAPE);
        }
    }

    /// A new view sharing this matrix's storage, shape and kind.
    pub fn view(&self) -> TriDense {
        TriDense {
            data: self.data.clone(),
            ..*self
        }
    }

    /// Copies `t` into the receiver. Orders and kinds must match; a
    /// partial storage overlap between the two panics.
    pub fn copy_from_tri(&mut self, t: &TriDense) {
        self.reuse_as(t.n, t.uplo);
        let shares = match (&self.data, &t.data) {
            (Some(a), Some(b)) => std::rc::Rc::ptr_eq(a, b),
            _ => false,
        };
        if shares {
            match shadow::classify_tri(
                (self.off, self.n, self.stride, self.uplo == Uplo::Upper),
                (t.off, t.n, t.stride, t.uplo == Uplo::Upper),
            ) {
                shadow::Overlap::Partial => panic!("{}", crate::error::REGION_OVERLAP),
                shadow::Overlap::Strides => panic!("{}", crate::error::MISMATCHED_STRIDES),
                shadow::Overlap::Identity | shadow::Overlap::Disjoint => {}
            }
        }
        let snapshot: Vec<f64> = {
            let src = t.buf();
            (0..t.n * t.n)
                .map(|k| {
                    let (i, j) = (k / t.n, k % t.n);
                    if t.in_triangle(i, j) {
                        src[t.off + i * t.stride + j]
                    } else {
                        0.0
                    }
                })
                .collect()
        };
        let (off, stride, n) = (self.off, self.stride, self.n);
        let mut dst = self.buf_mut();
        for i in 0..n {
            dst[off + i * stride..off + i * stride + n].copy_from_slice(&snapshot[i * n..(i + 1) * n]);
        }
    }

    /// The transpose of the receiver as an independent matrix with the
    /// opposite kind tag.
    pub fn transposed(&self) -> TriDense {
        let flipped = match self.uplo {
            Uplo::Upper => Uplo::Lower,
            Uplo::Lower => Uplo::Upper,
        };
        let mut t = TriDense::new(self.n, flipped);
        for i in 0..self.n {
            for j in 0..self.n {
                if t.in_triangle(j, i) && self.in_triangle(i, j) {
                    t.set_tri(j, i, self.at(i, j));
                }
            }
        }
        t
    }

    /// The transpose of the receiver, without copying.
    pub fn t(&self) -> Transpose<'_> {
        Transpose(self)
    }

    /// The 1-norm (maximum absolute column sum).
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

    /// The infinity norm (maximum absolute row sum).
    pub fn norm_inf(&self) -> f64 {
        let mut max = 0.0_f64;
        for i in 0..self.n {
            let mut acc = 0.0;
            for j in 0..self.n {
                acc += self.at(i, j).abs();
            }
            max = max.max(acc);
        }
        max
    }

    /// Computes the inverse of `a` into the receiver. For an
    /// ill-conditioned `a` the inverse is still stored and a
    /// [`Error::Condition`] diagnostic is returned alongside it; an exactly
    /// singular `a` yields `Condition(inf)` and the receiver contents are
    /// unspecified.
    pub fn inverse_from_tri(&mut self, a: &TriDense) -> Result<(), Error> {
        let n = a.n;
        self.reuse_as(n, a.uplo);
        for i in 0..n {
            if a.at(i, i) == 0.0 {
                return Err(Error::Condition(f64::INFINITY));
            }
        }
        {
            let src = a.buf();
            let asl = &src[a.off..];
            let (doff, dstr) = (self.off, self.stride);
            let mut dst = self.buf_mut();
            let mut col = vec![0.0; n];
            for j in 0..n {
                col.fill(0.0);
                col[j] = 1.0;
                kernel::trsv(a.uplo == Uplo::Upper, false, false, n, asl, a.stride, &mut col, 1);
                for (i, &v) in col.iter().enumerate() {
                    if inv_in_triangle(a.uplo, i, j) {
                        dst[doff + i * dstr + j] = v;
                    }
                }
            }
        }
        let cond = a.norm1() * self.norm1();
        if cond > CONDITION_TOLERANCE {
            return Err(Error::Condition(cond));
        }
        Ok(())
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

fn inv_in_triangle(uplo: Uplo, i: usize, j: usize) -> bool {
    match uplo {
        Uplo::Upper => j >= i,
        Uplo::Lower => j <= i,
    }
}

impl Matrix for TriDense {
    fn dims(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    fn at(&self, i: usize, j: usize) -> f64 {
        self.check_access(i, j);
        if !self.in_triangle(i, j) {
            return 0.0;
        }
        self.buf()[self.off + i * self.stride + j]
    }

    fn kind(&self) -> MatrixKind<'_> {
        MatrixKind::Tri(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn wrong_side_reads_zero_and_rejects_writes() {
        let mut t = TriDense::new(3, Uplo::Upper);
        t.set_tri(0, 2, 4.0);
        assert_eq!(t.at(0, 2), 4.0);
        assert_eq!(t.at(2, 0), 0.0);
        let got = catch_unwind(AssertUnwindSafe(|| t.set_tri(2, 0, 1.0))).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), ERR_TRIANGLE_SET);
    }

    #[test]
    fn transpose_flips_kind() {
        let mut t = TriDense::new(2, Uplo::Upper);
        t.set_tri(0, 1, 3.0);
        t.set_tri(0, 0, 1.0);
        t.set_tri(1, 1, 2.0);
        let l = t.transposed();
        assert_eq!(l.uplo(), Uplo::Lower);
        assert_eq!(l.at(1, 0), 3.0);
        assert_eq!(l.at(0, 1), 0.0);
    }

    #[test]
    fn inverse_of_upper() {
        let mut t = TriDense::new(2, Uplo::Upper);
        t.set_tri(0, 0, 2.0);
        t.set_tri(0, 1, 1.0);
        t.set_tri(1, 1, 4.0);
        let mut inv = TriDense::default();
        inv.inverse_from_tri(&t).unwrap();
        // T * T^-1 = I
        for i in 0..2 {
            for j in 0..2 {
                let mut acc = 0.0;
                for k in 0..2 {
                    acc += t.at(i, k) * inv.at(k, j);
                }
                let want = if i == j { 1.0 } else { 0.0 };
                assert!((acc - want).abs() < 1e-15);
            }
        }
    }

    #[test]
    fn singular_inverse_is_condition_inf() {
        let t = TriDense::new(2, Uplo::Lower);
        let mut inv = TriDense::default();
        match inv.inverse_from_tri(&t) {
            Err(Error::Condition(c)) => assert!(c.is_infinite()),
            other => panic!("expected Condition(inf), got {other:?}"),
        }
    }
}
