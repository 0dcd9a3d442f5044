//! Strided vector sharing the dense storage model.

use std::cell::{Ref, RefMut};
use std::rc::Rc;

use crate::error::{ERR_INDEX_OUT_OF_RANGE, ERR_SHAPE, ERR_ZERO_LENGTH};
use crate::matrix::{new_buffer, Buffer, Dense, Matrix, MatrixKind, Transpose};

/// Column vector with an explicit element increment.
///
/// The increment is always positive; strided sub-vector views share the
/// parent's storage without copying, the same way [`Dense`] views do.
#[derive(Default)]
pub struct Vector {
    data: Option<Buffer>,
    off: usize,
    n: usize,
    inc: usize,
}

impl Vector {
    /// Creates a zero-filled vector of length `n`.
    pub fn new(n: usize) -> Vector {
        if n == 0 {
            panic!("{}", ERR_ZERO_LENGTH);
        }
        Vector {
            data: Some(new_buffer(n)),
            off: 0,
            n,
            inc: 1,
        }
    }

    /// Creates a vector backed by `data`.
    pub fn with_data(data: Vec<f64>) -> Vector {
        if data.is_empty() {
            panic!("{}", ERR_ZERO_LENGTH);
        }
        let n = data.len();
        Vector {
            data: Some(Buffer::new(data.into())),
            off: 0,
            n,
            inc: 1,
        }
    }

    pub(crate) fn from_raw(data: Buffer, off: usize, n: usize, inc: usize) -> Vector {
        Vector {
            data: Some(data),
            off,
            n,
            inc,
        }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.inc == 0
    }

    /// The element increment of the underlying storage.
    pub fn inc(&self) -> usize {
        self.inc
    }

    /// Returns the receiver to the empty state.
    pub fn reset(&mut self) {
        self.data = None;
        self.off = 0;
        self.n = 0;
        self.inc = 0;
    }

    /// A new view sharing this vector's storage.
    pub fn view(&self) -> Vector {
        Vector {
            data: self.data.clone(),
            ..*self
        }
    }

    /// The transpose of the receiver (a row vector), without copying.
    pub fn t(&self) -> Transpose<'_> {
        Transpose(self)
    }

    /// The element at index `i`.
    pub fn at_vec(&self, i: usize) -> f64 {
        if i >= self.n {
            panic!("{}", ERR_INDEX_OUT_OF_RANGE);
        }
        self.buf()[self.off + i * self.inc]
    }

    /// Sets the element at index `i`.
    pub fn set_vec(&mut self, i: usize, v: f64) {
        if i >= self.n {
            panic!("{}", ERR_INDEX_OUT_OF_RANGE);
        }
        let idx = self.off + i * self.inc;
        self.buf_mut()[idx] = v;
    }

    /// Returns a view of the elements `i0..i1`, sharing storage and
    /// increment with the receiver.
    pub fn slice_vec(&self, i0: usize, i1: usize) -> Vector {
        if i0 > i1 || i1 > self.n {
            panic!("{}", ERR_INDEX_OUT_OF_RANGE);
        }
        Vector {
            data: self.data.clone(),
            off: self.off + i0 * self.inc,
            n: i1 - i0,
            inc: self.inc,
        }
    }

    /// Resizes an empty receiver to length `n`, or checks the existing
    /// length, panicking with `ERR_SHAPE` on mismatch.
    pub(crate) fn reuse_as(&mut self, n: usize) {
        if self.is_empty() {
            *self = Vector::new(n);
            return;
        }
        if self.n != n {
            panic!("{}", ERR_SHAPE);
        }
    }

    /// Copies the elements of `b` into the receiver. The lengths must
    /// match.
    pub fn copy_vec(&mut self, b: &Vector) {
        if self.n != b.n {
            panic!("{}", ERR_SHAPE);
        }
        let snapshot = b.to_vec();
        let (off, inc) = (self.off, self.inc);
        let mut buf = self.buf_mut();
        for (i, v) in snapshot.into_iter().enumerate() {
            buf[off + i * inc] = v;
        }
    }

    /// The elements as a contiguous owned `Vec`.
    pub fn to_vec(&self) -> Vec<f64> {
        let buf = self.buf();
        (0..self.n).map(|i| buf[self.off + i * self.inc]).collect()
    }

    /// The dot product with `b`.
    pub fn dot(&self, b: &Vector) -> f64 {
        if self.n != b.n {
            panic!("{}", ERR_SHAPE);
        }
        let xs = self.buf();
        let ys = b.buf();
        let mut acc = 0.0;
        for i in 0..self.n {
            acc += xs[self.off + i * self.inc] * ys[b.off + i * b.inc];
        }
        acc
    }

    /// The Euclidean norm of the receiver.
    pub fn norm2(&self) -> f64 {
        let buf = self.buf();
        let mut acc = 0.0;
        for i in 0..self.n {
            let v = buf[self.off + i * self.inc];
            acc += v * v;
        }
        acc.sqrt()
    }

    /// Stores `a + b` into the receiver.
    pub fn add_vec(&mut self, a: &Vector, b: &Vector) {
        if a.n != b.n {
            panic!("{}", ERR_SHAPE);
        }
        self.reuse_as(a.n);
        let (xs, ys) = (a.to_vec(), b.to_vec());
        let (off, inc) = (self.off, self.inc);
        let mut buf = self.buf_mut();
        for i in 0..xs.len() {
            buf[off + i * inc] = xs[i] + ys[i];
        }
    }

    /// Stores `a - b` into the receiver.
    pub fn sub_vec(&mut self, a: &Vector, b: &Vector) {
        if a.n != b.n {
            panic!("{}", ERR_SHAPE);
        }
        self.reuse_as(a.n);
        let (xs, ys) = (a.to_vec(), b.to_vec());
        let (off, inc) = (self.off, self.inc);
        let mut buf = self.buf_mut();
        for i in 0..xs.len() {
            buf[off + i * inc] = xs[i] - ys[i];
        }
    }

    /// Stores `alpha * a` into the receiver.
    pub fn scale_vec(&mut self, alpha: f64, a: &Vector) {
        self.reuse_as(a.n);
        let xs = a.to_vec();
        let (off, inc) = (self.off, self.inc);
        let mut buf = self.buf_mut();
        for (i, v) in xs.into_iter().enumerate() {
            buf[off + i * inc] = alpha * v;
        }
    }

    /// Stores `a*x + y` into the receiver.
    pub fn axpy_vec(&mut self, alpha: f64, x: &Vector, y: &Vector) {
        if x.n != y.n {
            panic!("{}", ERR_SHAPE);
        }
        self.reuse_as(x.n);
        let (xs, ys) = (x.to_vec(), y.to_vec());
        let (off, inc) = (self.off, self.inc);
        let mut buf = self.buf_mut();
        for i in 0..xs.len() {
            buf[off + i * inc] = alpha * xs[i] + ys[i];
        }
    }

    /// Reinterprets the receiver as an n x 1 dense matrix. The result is a
    /// copy; strided vector storage cannot generally be viewed as a dense
    /// column without one.
    pub fn as_dense(&self) -> Dense {
        let mut m = Dense::new(self.n, 1);
        {
            let src = self.buf();
            let mut dst = m.buf_mut();
            for i in 0..self.n {
                dst[i] = src[self.off + i * self.inc];
            }
        }
        m
    }

    pub(crate) fn buf(&self) -> Ref<'_, Vec<f64>> {
        self.data.as_ref().expect("access to empty vector").borrow()
    }

    pub(crate) fn buf_mut(&self) -> RefMut<'_, Vec<f64>> {
        self.data.as_ref().expect("access to empty vector").borrow_mut()
    }

    pub(crate) fn offset(&self) -> usize {
        self.off
    }

    pub(crate) fn handle(&self) -> Option<&Buffer> {
        self.data.as_ref()
    }

    pub(crate) fn shares_storage_with(&self, handle: Option<&Buffer>) -> bool {
        match (&self.data, handle) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Matrix for Vector {
    fn dims(&self) -> (usize, usize) {
        (self.n, 1)
    }

    fn at(&self, i: usize, j: usize) -> f64 {
        if j != 0 {
            panic!("{}", crate::error::ERR_COL_ACCESS);
        }
        if i >= self.n {
            panic!("{}", crate::error::ERR_ROW_ACCESS);
        }
        self.buf()[self.off + i * self.inc]
    }

    fn kind(&self) -> MatrixKind<'_> {
        MatrixKind::Vector(self)
    }
}
