//! Row-major dense matrix with stride, capacity bounds and storage-sharing
//! views.

use std::cell::{Ref, RefMut};
use std::rc::Rc;

use crate::error::{
    ERR_COL_ACCESS, ERR_INDEX_OUT_OF_RANGE, ERR_ROW_ACCESS, ERR_SHAPE, ERR_ZERO_LENGTH,
};
use crate::matrix::{new_buffer, Buffer, Matrix, MatrixKind, Transpose};

/// Dense matrix of `f64` values in row-major order.
///
/// A `Dense` is a view over a shared backing buffer: [`Dense::slice`] and
/// [`Dense::view`] return values that alias the same storage, and mutation
/// through any of them is visible to all. The capacity bounds `cap_rows`
/// and `cap_cols` are distinct from the logical shape so a view can be
/// grown in place (see [`Dense::grow`]).
///
/// The zero value `Dense::default()` is an empty matrix ready for use as
/// the receiver of a shape-restricted operation or a decoder.
#[derive(Default, Debug)]
pub struct Dense {
    data: Option<Buffer>,
    off: usize,
    rows: usize,
    cols: usize,
    stride: usize,
    cap_rows: usize,
    cap_cols: usize,
}

impl Dense {
    /// Creates a zero-filled `r`x`c` matrix.
    ///
    /// Panics with `ERR_ZERO_LENGTH` if either dimension is zero.
    pub fn new(r: usize, c: usize) -> Dense {
        if r == 0 || c == 0 {
            panic!("{}", ERR_ZERO_LENGTH);
        }
        Dense {
            data: Some(new_buffer(r * c)),
            off: 0,
            rows: r,
            cols: c,
            stride: c,
            cap_rows: r,
            cap_cols: c,
        }
    }

    /// Creates an `r`x`c` matrix backed by `data` in row-major order.
    ///
    /// Panics with `ERR_SHAPE` unless `data.len() == r*c`.
    pub fn with_data(r: usize, c: usize, data: Vec<f64>) -> Dense {
        if r == 0 || c == 0 {
            panic!("{}", ERR_ZERO_LENGTH);
        }
        if data.len() != r * c {
            panic!("{}", ERR_SHAPE);
        }
        Dense {
            data: Some(Buffer::new(data.into())),
            off: 0,
            rows: r,
            cols: c,
            stride: c,
            cap_rows: r,
            cap_cols: c,
        }
    }

    /// Creates an independent copy of any matrix.
    pub fn copy_of(a: &dyn Matrix) -> Dense {
        let (r, c) = a.dims();
        let mut m = Dense::new(r, c);
        m.copy_from(a);
        m
    }

    /// Whether the receiver is the empty zero value.
    pub fn is_empty(&self) -> bool {
        self.stride == 0
    }

    /// Returns the receiver to the empty state so it can be reused as the
    /// receiver of a dimensionally restricted operation.
    pub fn reset(&mut self) {
        self.data = None;
        self.off = 0;
        self.rows = 0;
        self.cols = 0;
        self.stride = 0;
        self.cap_rows = 0;
        self.cap_cols = 0;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The distance in elements between vertically adjacent entries.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The row and column capacity of the backing store visible to this
    /// view.
    pub fn caps(&self) -> (usize, usize) {
        (self.cap_rows, self.cap_cols)
    }

    /// A new view sharing this matrix's storage, shape and capacity.
    pub fn view(&self) -> Dense {
        Dense {
            data: self.data.clone(),
            ..*self
        }
    }

    /// The transpose of the receiver, without copying.
    pub fn t(&self) -> Transpose<'_> {
        Transpose(self)
    }

    /// Sets the element at row `i`, column `j`.
    pub fn set(&mut self, i: usize, j: usize, v: f64) {
        self.check_access(i, j);
        let idx = self.off + i * self.stride + j;
        self.buf_mut()[idx] = v;
    }

    fn check_access(&self, i: usize, j: usize) {
        if i >= self.rows {
            panic!("{}", ERR_ROW_ACCESS);
        }
        if j >= self.cols {
            panic!("{}", ERR_COL_ACCESS);
        }
    }

    /// Returns a view of the rows `i0..i1` and columns `j0..j1` sharing
    /// storage (and stride) with the receiver. Panics with
    /// `ERR_INDEX_OUT_OF_RANGE` when the range leaves the receiver's
    /// capacity.
    pub fn slice(&self, i0: usize, i1: usize, j0: usize, j1: usize) -> Dense {
        if i0 > i1 || i1 > self.cap_rows || j0 > j1 || j1 > self.cap_cols {
            panic!("{}", ERR_INDEX_OUT_OF_RANGE);
        }
        Dense {
            data: self.data.clone(),
            off: self.off + i0 * self.stride + j0,
            rows: i1 - i0,
            cols: j1 - j0,
            stride: self.stride,
            cap_rows: self.cap_rows - i0,
            cap_cols: self.cap_cols - j0,
        }
    }

    /// Returns the receiver expanded by `extra_rows` and `extra_cols`. The
    /// result shares storage with the receiver when it fits inside the
    /// existing capacity (exposing whatever the backing buffer holds
    /// there) and is freshly allocated, zero-padded, otherwise; callers
    /// must not rely on which occurred.
    pub fn grow(&self, extra_rows: usize, extra_cols: usize) -> Dense {
        let r = self.rows + extra_rows;
        let c = self.cols + extra_cols;
        if r <= self.cap_rows && c <= self.cap_cols {
            return Dense {
                data: self.data.clone(),
                off: self.off,
                rows: r,
                cols: c,
                stride: self.stride,
                cap_rows: self.cap_rows,
                cap_cols: self.cap_cols,
            };
        }
        let mut grown = Dense::new(r.max(1), c.max(1));
        {
            let src = self.buf();
            let mut dst = grown.buf_mut();
            for i in 0..self.rows {
                let s = self.off + i * self.stride;
                let d = i * c;
                dst[d..d + self.cols].copy_from_slice(&src[s..s + self.cols]);
            }
        }
        grown
    }

    /// A view of column `j` as a vector with increment equal to the
    /// receiver's stride.
    pub fn col_view(&self, j: usize) -> super::Vector {
        if j >= self.cols {
            panic!("{}", ERR_COL_ACCESS);
        }
        super::Vector::from_raw(
            self.data.clone().expect("column view of empty matrix"),
            self.off + j,
            self.rows,
            self.stride,
        )
    }

    /// A view of row `i` as a unit-increment vector.
    pub fn row_view(&self, i: usize) -> super::Vector {
        if i >= self.rows {
            panic!("{}", ERR_ROW_ACCESS);
        }
        super::Vector::from_raw(
            self.data.clone().expect("row view of empty matrix"),
            self.off + i * self.stride,
            self.cols,
            1,
        )
    }

    /// Resizes an empty receiver to `r`x`c`, or checks that a non-empty
    /// receiver already has that shape, panicking with `ERR_SHAPE`
    /// otherwise. Reused contents are left as-is.
    pub(crate) fn reuse_as(&mut self, r: usize, c: usize) {
        if self.is_empty() {
            *self = Dense::new(r, c);
            return;
        }
        if self.rows != r || self.cols != c {
            panic!("{}", ERR_SHAPE);
        }
    }

    /// Like [`Dense::reuse_as`] but guarantees all elements are zero.
    pub(crate) fn reuse_as_zeroed(&mut self, r: usize, c: usize) {
        if self.is_empty() {
            *self = Dense::new(r, c);
            return;
        }
        if self.rows != r || self.cols != c {
            panic!("{}", ERR_SHAPE);
        }
        let (off, stride) = (self.off, self.stride);
        let mut buf = self.buf_mut();
        for i in 0..r {
            let s = off + i * stride;
            buf[s..s + c].fill(0.0);
        }
    }

    pub(crate) fn buf(&self) -> Ref<'_, Vec<f64>> {
        self.data.as_ref().expect("access to empty matrix").borrow()
    }

    pub(crate) fn buf_mut(&self) -> RefMut<'_, Vec<f64>> {
        self.data.as_ref().expect("access to empty matrix").borrow_mut()
    }

    pub(crate) fn offset(&self) -> usize {
        self.off
    }

    /// Whether `other` is backed by the same buffer as the receiver.
    pub(crate) fn shares_storage_with(&self, handle: Option<&Buffer>) -> bool {
        match (&self.data, handle) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn handle(&self) -> Option<&Buffer> {
        self.data.as_ref()
    }

    /// Element access without the public bounds panic; used by kernels
    /// that have already validated their ranges.
    pub(crate) fn get(&self, i: usize, j: usize) -> f64 {
        self.buf()[self.off + i * self.stride + j]
    }

    pub fn put(&mut self, i: usize, j: usize, v: f64) {
        let idx = self.off + i * self.stride + j;
        self.buf_mut()[idx] = v;
    }

    /// Construction used by the workspace pool, which hands out matrices
    /// over recycled buffers.
    pub(crate) fn from_pooled(data: Buffer, r: usize, c: usize) -> Dense {
        Dense {
            data: Some(data),
            off: 0,
            rows: r,
            cols: c,
            stride: c,
            cap_rows: r,
            cap_cols: c,
        }
    }

    pub(crate) fn take_buffer(self) -> Option<Buffer> {
        self.data
    }
}

impl Matrix for Dense {
    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn at(&self, i: usize, j: usize) -> f64 {
        self.check_access(i, j);
        self.get(i, j)
    }

    fn kind(&self) -> MatrixKind<'_> {
        MatrixKind::Dense(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_data_rejects_wrong_length() {
        let got = std::panic::catch_unwind(|| Dense::with_data(2, 2, vec![1.0, 2.0, 3.0]));
        assert_eq!(*got.unwrap_err().downcast_ref::<String>().unwrap(), ERR_SHAPE);
    }

    #[test]
    fn at_distinguishes_axes() {
        use std::panic::{catch_unwind, AssertUnwindSafe};
        let m = Dense::new(2, 3);
        let row = catch_unwind(AssertUnwindSafe(|| m.at(2, 0))).unwrap_err();
        assert_eq!(*row.downcast_ref::<String>().unwrap(), ERR_ROW_ACCESS);
        let col = catch_unwind(AssertUnwindSafe(|| m.at(0, 3))).unwrap_err();
        assert_eq!(*col.downcast_ref::<String>().unwrap(), ERR_COL_ACCESS);
    }

    #[test]
    fn slice_shares_storage() {
        let mut m = Dense::with_data(3, 3, (1..=9).map(f64::from).collect());
        let v = m.slice(1, 3, 1, 3);
        assert_eq!(v.dims(), (2, 2));
        assert_eq!(v.at(0, 0), 5.0);
        m.set(1, 1, -1.0);
        assert_eq!(v.at(0, 0), -1.0, "mutation must be visible through the view");
    }

    #[test]
    fn slice_out_of_capacity_panics() {
        use std::panic::{catch_unwind, AssertUnwindSafe};
        let m = Dense::new(3, 3);
        let got = catch_unwind(AssertUnwindSafe(|| m.slice(0, 4, 0, 3))).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), ERR_INDEX_OUT_OF_RANGE);
    }

    #[test]
    fn grow_within_capacity_shares() {
        let parent = Dense::with_data(3, 3, (1..=9).map(f64::from).collect());
        let small = parent.slice(0, 2, 0, 2);
        let grown = small.grow(1, 1);
        assert_eq!(grown.dims(), (3, 3));
        // Same backing store: parent data shows through.
        assert_eq!(grown.at(2, 2), 9.0);
    }

    #[test]
    fn grow_beyond_capacity_reallocates() {
        let m = Dense::with_data(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let grown = m.grow(1, 0);
        assert_eq!(grown.dims(), (3, 2));
        assert_eq!(grown.at(0, 1), 2.0);
        assert_eq!(grown.at(2, 0), 0.0);
    }

    #[test]
    fn col_view_strides_through_storage() {
        let m = Dense::with_data(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let c = m.col_view(1);
        assert_eq!(c.len(), 3);
        assert_eq!(c.at_vec(0), 2.0);
        assert_eq!(c.at_vec(2), 6.0);
    }
}
