//! Receiver-style arithmetic on [`Dense`] with kind-dispatched fast paths.
//!
//! Every destructive operation resolves aliasing before writing: an
//! operand backed by the receiver's own buffer is either rejected (partial
//! overlap is a caller bug) or staged through a pooled scratch copy, so an
//! in-place update like `c.add(&c2, &b)` over the identical region always
//! computes the same values as the fully-independent form.

use crate::error::{Error, ERR_SHAPE, ERR_SQUARE, MISMATCHED_STRIDES, REGION_OVERLAP};
use crate::factor::Lu;
use crate::matrix::pool::{get_workspace, put_workspace};
use crate::matrix::shadow::{self, Overlap, Region};
use crate::matrix::{untranspose, Dense, Matrix, MatrixKind, SymDense, TriDense, Uplo, Vector};

/// A source operand guaranteed not to share storage with the destination.
pub(crate) enum Staged<'a> {
    Borrowed(&'a dyn Matrix),
    Copied(Option<Dense>),
}

impl<'a> Staged<'a> {
    pub(crate) fn mat(&self) -> &dyn Matrix {
        match self {
            Staged::Borrowed(m) => *m,
            Staged::Copied(d) => d.as_ref().expect("staged copy already released"),
        }
    }
}

impl Drop for Staged<'_> {
    fn drop(&mut self) {
        if let Staged::Copied(d) = self {
            if let Some(d) = d.take() {
                put_workspace(d);
            }
        }
    }
}

/// Prepares `a` for use while `dest` is being written. A partial overlap
/// between two dense regions panics; identity and disjoint sharing are
/// staged through the workspace pool.
pub(crate) fn stage<'a>(dest: &Dense, a: &'a dyn Matrix) -> Staged<'a> {
    let (inner, _) = untranspose(a);
    let shares = match inner.kind() {
        MatrixKind::Dense(d) => d.shares_storage_with(dest.handle()),
        MatrixKind::Vector(v) => v.shares_storage_with(dest.handle()),
        MatrixKind::Sym(s) => match (s.handle(), dest.handle()) {
            (Some(x), Some(y)) => std::rc::Rc::ptr_eq(x, y),
            _ => false,
        },
        MatrixKind::Tri(t) => match (t.handle(), dest.handle()) {
            (Some(x), Some(y)) => std::rc::Rc::ptr_eq(x, y),
            _ => false,
        },
        MatrixKind::Transpose(_) => unreachable!("untranspose left a wrapper"),
    };
    if !shares {
        return Staged::Borrowed(a);
    }
    if let MatrixKind::Dense(d) = inner.kind() {
        match shadow::classify(&Region::of_dense(dest), &Region::of_dense(d)) {
            Overlap::Partial => panic!("{}", REGION_OVERLAP),
            Overlap::Strides => panic!("{}", MISMATCHED_STRIDES),
            Overlap::Identity | Overlap::Disjoint => {}
        }
    }
    let (r, c) = a.dims();
    let mut w = get_workspace(r, c, false);
    w.copy_from(a);
    Staged::Copied(Some(w))
}

impl Dense {
    /// An n x n identity matrix.
    pub fn identity(n: usize) -> Dense {
        let mut m = Dense::new(n, n);
        {
            let mut buf = m.buf_mut();
            for i in 0..n {
                buf[i * n + i] = 1.0;
            }
        }
        m
    }

    /// Copies the overlapping extent of `a` into the receiver, returning
    /// the number of rows and columns copied. Shapes need not match; the
    /// copy is clipped to the smaller of each dimension.
    pub fn copy_from(&mut self, a: &dyn Matrix) -> (usize, usize) {
        let (ar, ac) = a.dims();
        let r = ar.min(self.rows());
        let c = ac.min(self.cols());
        if r == 0 || c == 0 {
            return (0, 0);
        }
        let (inner, trans) = untranspose(a);
        if let MatrixKind::Dense(src) = inner.kind() {
            if !trans && !src.shares_storage_with(self.handle()) {
                let (soff, sstr) = (src.offset(), src.stride());
                let (doff, dstr) = (self.offset(), self.stride());
                let sbuf = src.buf();
                let mut dbuf = self.buf_mut();
                for i in 0..r {
                    let s = soff + i * sstr;
                    let d = doff + i * dstr;
                    dbuf[d..d + c].copy_from_slice(&sbuf[s..s + c]);
                }
                return (r, c);
            }
        }
        let snapshot: Vec<f64> = (0..r)
            .flat_map(|i| (0..c).map(move |j| (i, j)))
            .map(|(i, j)| a.at(i, j))
            .collect();
        let (doff, dstr) = (self.offset(), self.stride());
        let mut dbuf = self.buf_mut();
        for i in 0..r {
            let d = doff + i * dstr;
            dbuf[d..d + c].copy_from_slice(&snapshot[i * c..(i + 1) * c]);
        }
        (r, c)
    }

    fn elementwise(&mut self, a: &dyn Matrix, b: &dyn Matrix, f: impl Fn(f64, f64) -> f64) {
        let (ar, ac) = a.dims();
        let (br, bc) = b.dims();
        if ar != br || ac != bc {
            panic!("{}", ERR_SHAPE);
        }
        self.reuse_as(ar, ac);
        let sa = stage(self, a);
        let sb = stage(self, b);
        let (am, bm) = (sa.mat(), sb.mat());
        let (doff, dstr) = (self.offset(), self.stride());
        for i in 0..ar {
            let row: Vec<f64> = (0..ac).map(|j| f(am.at(i, j), bm.at(i, j))).collect();
            let d = doff + i * dstr;
            self.buf_mut()[d..d + ac].copy_from_slice(&row);
        }
    }

    /// Stores `a + b` into the receiver.
    pub fn add(&mut self, a: &dyn Matrix, b: &dyn Matrix) {
        self.elementwise(a, b, |x, y| x + y);
    }

    /// Stores `a - b` into the receiver.
    pub fn sub(&mut self, a: &dyn Matrix, b: &dyn Matrix) {
        self.elementwise(a, b, |x, y| x - y);
    }

    /// Stores the elementwise product of `a` and `b` into the receiver.
    pub fn mul_elem(&mut self, a: &dyn Matrix, b: &dyn Matrix) {
        self.elementwise(a, b, |x, y| x * y);
    }

    /// Stores the elementwise quotient of `a` and `b` into the receiver.
    pub fn div_elem(&mut self, a: &dyn Matrix, b: &dyn Matrix) {
        self.elementwise(a, b, |x, y| x / y);
    }

    /// Stores `f * a` into the receiver.
    pub fn scale(&mut self, f: f64, a: &dyn Matrix) {
        let (ar, ac) = a.dims();
        self.reuse_as(ar, ac);
        let sa = stage(self, a);
        let am = sa.mat();
        let (doff, dstr) = (self.offset(), self.stride());
        for i in 0..ar {
            let row: Vec<f64> = (0..ac).map(|j| f * am.at(i, j)).collect();
            let d = doff + i * dstr;
            self.buf_mut()[d..d + ac].copy_from_slice(&row);
        }
    }

    /// Applies `f(i, j, a[i, j])` to every element of `a`, storing the
    /// results into the receiver.
    pub fn apply(&mut self, f: impl Fn(usize, usize, f64) -> f64, a: &dyn Matrix) {
        let (ar, ac) = a.dims();
        self.reuse_as(ar, ac);
        let sa = stage(self, a);
        let am = sa.mat();
        let (doff, dstr) = (self.offset(), self.stride());
        for i in 0..ar {
            let row: Vec<f64> = (0..ac).map(|j| f(i, j, am.at(i, j))).collect();
            let d = doff + i * dstr;
            self.buf_mut()[d..d + ac].copy_from_slice(&row);
        }
    }

    /// Stores the matrix product `a * b` into the receiver, dispatching to
    /// specialized paths for dense, symmetric, triangular and vector
    /// operands.
    pub fn mul(&mut self, a: &dyn Matrix, b: &dyn Matrix) {
        let (ar, ac) = a.dims();
        let (br, bc) = b.dims();
        if ac != br {
            panic!("{}", ERR_SHAPE);
        }
        self.reuse_as(ar, bc);
        let sa = stage(self, a);
        let sb = stage(self, b);
        let (am, bm) = (sa.mat(), sb.mat());
        let (ai, at) = untranspose(am);
        let (bi, bt) = untranspose(bm);

        match (ai.kind(), bi.kind()) {
            (MatrixKind::Dense(ad), MatrixKind::Dense(bd)) => {
                self.gemm(ad, at, bd, bt);
            }
            (MatrixKind::Dense(ad), MatrixKind::Vector(bv)) if !at && !bt => {
                self.gemv(ad, bv);
            }
            (MatrixKind::Tri(tl), _) if !at && !bt => {
                self.trmm_left(tl, bm);
            }
            (_, MatrixKind::Tri(tr)) if !at && !bt => {
                self.trmm_right(am, tr);
            }
            (MatrixKind::Sym(sl), _) if !bt => {
                self.symm_left(sl, bm);
            }
            (_, MatrixKind::Sym(sr)) if !at => {
                self.symm_right(am, sr);
            }
            _ => {
                // Generic fallback through the element accessor.
                let (doff, dstr) = (self.offset(), self.stride());
                let mut row = vec![0.0; ac];
                for i in 0..ar {
                    for (k, v) in row.iter_mut().enumerate() {
                        *v = am.at(i, k);
                    }
                    let out: Vec<f64> = (0..bc)
                        .map(|j| row.iter().enumerate().map(|(k, &v)| v * bm.at(k, j)).sum())
                        .collect();
                    let d = doff + i * dstr;
                    self.buf_mut()[d..d + bc].copy_from_slice(&out);
                }
            }
        }
    }

    fn gemm(&mut self, a: &Dense, a_trans: bool, b: &Dense, b_trans: bool) {
        let (r, c) = self.dims();
        let inner = if a_trans { a.rows() } else { a.cols() };
        let (aoff, astr) = (a.offset(), a.stride());
        let (boff, bstr) = (b.offset(), b.stride());
        let (doff, dstr) = (self.offset(), self.stride());
        let abuf = a.buf();
        let bbuf = b.buf();
        let mut dbuf = self.buf_mut();

        let a_idx = |i: usize, k: usize| {
            if a_trans {
                aoff + k * astr + i
            } else {
                aoff + i * astr + k
            }
        };
        let b_idx = |k: usize, j: usize| {
            if b_trans {
                boff + j * bstr + k
            } else {
                boff + k * bstr + j
            }
        };

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            // The parallel split needs whole rows as disjoint mutable
            // chunks, which only a stride-equals-cols destination offers.
            if !a_trans && !b_trans && dstr == c && r * c * inner >= 1 << 16 {
                let a_sl: &[f64] = &abuf;
                let b_sl: &[f64] = &bbuf;
                let out = &mut dbuf[doff..doff + r * c];
                out.par_chunks_mut(c).enumerate().for_each(|(i, drow)| {
                    for v in drow.iter_mut() {
                        *v = 0.0;
                    }
                    for k in 0..inner {
                        let av = a_sl[aoff + i * astr + k];
                        if av == 0.0 {
                            continue;
                        }
                        let brow = &b_sl[boff + k * bstr..boff + k * bstr + c];
                        for (v, &bv) in drow.iter_mut().zip(brow) {
                            *v += av * bv;
                        }
                    }
                });
                return;
            }
        }

        for i in 0..r {
            for j in 0..c {
                let mut acc = 0.0;
                for k in 0..inner {
                    acc += abuf[a_idx(i, k)] * bbuf[b_idx(k, j)];
                }
                dbuf[doff + i * dstr + j] = acc;
            }
        }
    }

    fn gemv(&mut self, a: &Dense, x: &Vector) {
        let (r, inner) = a.dims();
        let (aoff, astr) = (a.offset(), a.stride());
        let (doff, dstr) = (self.offset(), self.stride());
        let abuf = a.buf();
        let xs = x.to_vec();
        let mut dbuf = self.buf_mut();
        for i in 0..r {
            let row = &abuf[aoff + i * astr..aoff + i * astr + inner];
            let acc: f64 = row.iter().zip(&xs).map(|(&av, &xv)| av * xv).sum();
            dbuf[doff + i * dstr] = acc;
        }
    }

    fn trmm_left(&mut self, t: &TriDense, b: &dyn Matrix) {
        let n = t.order();
        let (_, bc) = b.dims();
        let (doff, dstr) = (self.offset(), self.stride());
        for i in 0..n {
            // Only the occupied triangle contributes.
            let range: Box<dyn Iterator<Item = usize>> = match t.uplo() {
                Uplo::Upper => Box::new(i..n),
                Uplo::Lower => Box::new(0..=i),
            };
            let ks: Vec<usize> = range.collect();
            let out: Vec<f64> = (0..bc)
                .map(|j| ks.iter().map(|&k| t.at(i, k) * b.at(k, j)).sum())
                .collect();
            let d = doff + i * dstr;
            self.buf_mut()[d..d + bc].copy_from_slice(&out);
        }
    }

    fn trmm_right(&mut self, a: &dyn Matrix, t: &TriDense) {
        let (ar, _) = a.dims();
        let n = t.order();
        let (doff, dstr) = (self.offset(), self.stride());
        for i in 0..ar {
            let out: Vec<f64> = (0..n)
                .map(|j| {
                    let ks: Vec<usize> = match t.uplo() {
                        Uplo::Upper => (0..=j).collect(),
                        Uplo::Lower => (j..n).collect(),
                    };
                    ks.iter().map(|&k| a.at(i, k) * t.at(k, j)).sum()
                })
                .collect();
            let d = doff + i * dstr;
            self.buf_mut()[d..d + n].copy_from_slice(&out);
        }
    }

    fn symm_left(&mut self, s: &SymDense, b: &dyn Matrix) {
        let n = s.order();
        let (_, bc) = b.dims();
        let (doff, dstr) = (self.offset(), self.stride());
        for i in 0..n {
            let out: Vec<f64> = (0..bc)
                .map(|j| (0..n).map(|k| s.at(i, k) * b.at(k, j)).sum())
                .collect();
            let d = doff + i * dstr;
            self.buf_mut()[d..d + bc].copy_from_slice(&out);
        }
    }

    fn symm_right(&mut self, a: &dyn Matrix, s: &SymDense) {
        let (ar, _) = a.dims();
        let n = s.order();
        let (doff, dstr) = (self.offset(), self.stride());
        for i in 0..ar {
            let out: Vec<f64> = (0..n)
                .map(|j| (0..n).map(|k| a.at(i, k) * s.at(k, j)).sum())
                .collect();
            let d = doff + i * dstr;
            self.buf_mut()[d..d + n].copy_from_slice(&out);
        }
    }

    /// Stores `a^n` into the receiver for a square `a` and `n >= 0`, by
    /// exponentiation by squaring over pooled workspaces.
    pub fn pow(&mut self, a: &dyn Matrix, n: usize) {
        let (r, c) = a.dims();
        if r != c {
            panic!("{}", ERR_SHAPE);
        }
        self.reuse_as(r, c);

        match n {
            0 => {
                let (doff, dstr) = (self.offset(), self.stride());
                let mut buf = self.buf_mut();
                for i in 0..r {
                    let d = doff + i * dstr;
                    buf[d..d + c].fill(0.0);
                    buf[d + i] = 1.0;
                }
                return;
            }
            1 => {
                let sa = stage(self, a);
                self.copy_from(sa.mat());
                return;
            }
            2 => {
                self.mul(a, a);
                return;
            }
            _ => {}
        }

        let mut w = get_workspace(r, r, false);
        w.copy_from(a);
        let mut s = get_workspace(r, r, false);
        s.copy_from(a);
        let mut x = get_workspace(r, r, false);
        let mut n = n - 1;
        while n > 0 {
            if n & 1 != 0 {
                x.mul(&w, &s);
                std::mem::swap(&mut x, &mut w);
            }
            if n != 1 {
                x.mul(&s, &s);
                std::mem::swap(&mut x, &mut s);
            }
            n >>= 1;
        }
        self.copy_from(&w);
        put_workspace(w);
        put_workspace(s);
        put_workspace(x);
    }

    /// Stores `e^a` into the receiver using scaling and squaring with a
    /// 10-term series at scale 2^-4.
    pub fn exp(&mut self, a: &dyn Matrix) {
        let (r, c) = a.dims();
        if r != c {
            panic!("{}", ERR_SHAPE);
        }
        self.reuse_as(r, c);

        const TERMS: usize = 10;
        const SCALING: i32 = 4;

        let mut w = get_workspace(r, r, true);
        {
            let mut buf = w.buf_mut();
            for i in 0..r {
                buf[i * r + i] = 1.0;
            }
        }
        let mut small = get_workspace(r, r, false);
        small.scale((2.0_f64).powi(-SCALING), a);
        let mut power = get_workspace(r, r, false);
        power.copy_from(&small);
        let mut tmp = get_workspace(r, r, false);

        let mut fact_i = 1.0;
        for i in 1..TERMS {
            fact_i *= i as f64;
            // Workspace matrices are contiguous, so whole-buffer loops are
            // safe here.
            {
                let pbuf = power.buf();
                let mut tbuf = tmp.buf_mut();
                let mut wbuf = w.buf_mut();
                for k in 0..r * r {
                    tbuf[k] = pbuf[k] / fact_i;
                    wbuf[k] += tbuf[k];
                }
            }
            if i < TERMS - 1 {
                tmp.mul(&power, &small);
                std::mem::swap(&mut tmp, &mut power);
            }
        }
        put_workspace(small);
        put_workspace(power);
        for _ in 0..SCALING {
            tmp.mul(&w, &w);
            std::mem::swap(&mut tmp, &mut w);
        }
        put_workspace(tmp);

        self.copy_from(&w);
        put_workspace(w);
    }

    /// Stores `a^-1` into the receiver. A singular input yields
    /// `Condition(inf)`; an ill-conditioned one still stores the computed
    /// inverse and returns the diagnostic.
    pub fn inverse(&mut self, a: &dyn Matrix) -> Result<(), Error> {
        let (r, c) = a.dims();
        if r != c {
            panic!("{}", ERR_SQUARE);
        }
        let mut lu = Lu::default();
        lu.factorize(a);
        let eye = Dense::identity(r);
        lu.solve_to(self, false, &eye)
    }

    /// Stores `a + alpha * x * y^T` into the receiver.
    pub fn rank_one(&mut self, a: &dyn Matrix, alpha: f64, x: &Vector, y: &Vector) {
        let (ar, ac) = a.dims();
        if x.len() != ar || y.len() != ac {
            panic!("{}", ERR_SHAPE);
        }
        self.reuse_as(ar, ac);
        let sa = stage(self, a);
        let am = sa.mat();
        let xs = x.to_vec();
        let ys = y.to_vec();
        let (doff, dstr) = (self.offset(), self.stride());
        for i in 0..ar {
            let row: Vec<f64> = (0..ac).map(|j| am.at(i, j) + alpha * xs[i] * ys[j]).collect();
            let d = doff + i * dstr;
            self.buf_mut()[d..d + ac].copy_from_slice(&row);
        }
    }

    /// Stores `alpha * x * y^T` into the receiver.
    pub fn outer(&mut self, alpha: f64, x: &Vector, y: &Vector) {
        self.reuse_as(x.len(), y.len());
        let xs = x.to_vec();
        let ys = y.to_vec();
        let (doff, dstr) = (self.offset(), self.stride());
        for i in 0..xs.len() {
            let row: Vec<f64> = ys.iter().map(|&yv| alpha * xs[i] * yv).collect();
            let d = doff + i * dstr;
            self.buf_mut()[d..d + ys.len()].copy_from_slice(&row);
        }
    }

    /// Builds an r x r permutation matrix from a row-swap sequence:
    /// `swaps[i]` is the column holding the single one of row `i`.
    pub fn permutation(&mut self, r: usize, swaps: &[usize]) {
        if swaps.len() != r {
            panic!("{}", crate::error::ERR_SLICE_LENGTH_MISMATCH);
        }
        self.reuse_as(r, r);
        let (doff, dstr) = (self.offset(), self.stride());
        let mut buf = self.buf_mut();
        for (i, &v) in swaps.iter().enumerate() {
            if v >= r {
                panic!("{}", crate::error::ERR_ROW_ACCESS);
            }
            let d = doff + i * dstr;
            buf[d..d + r].fill(0.0);
            buf[d + v] = 1.0;
        }
    }

}
