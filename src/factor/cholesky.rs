//! Cholesky factorization of symmetric positive definite matrices, with
//! O(n²) rank-one updates and downdates.

use crate::error::{Error, BAD_CHOLESKY, BAD_TRIANGLE, CONDITION_TOLERANCE, ERR_SHAPE};
use crate::kernel;
use crate::matrix::shadow;
use crate::matrix::{Dense, Matrix, SymDense, TriDense, Uplo, Vector};

/// Cholesky factorization `A = U^T * U` of a symmetric positive definite
/// matrix.
///
/// Methods may only be called after a `factorize` call that returned
/// `true`; calls on an empty or failed factorization panic. The internal
/// factor is owned exclusively by the struct and is never handed out as a
/// mutable alias.
pub struct Cholesky {
    chol: Option<TriDense>,
    cond: f64,
}

impl Default for Cholesky {
    fn default() -> Cholesky {
        Cholesky {
            chol: None,
            cond: f64::INFINITY,
        }
    }
}

impl Cholesky {
    fn valid(&self) -> bool {
        self.chol.is_some()
    }

    fn factor(&self) -> &TriDense {
        match &self.chol {
            Some(t) => t,
            None => panic!("{}", BAD_CHOLESKY),
        }
    }

    /// Computes the factorization of `a`, returning whether `a` is
    /// positive definite. On failure the receiver is reset and must not be
    /// used.
    pub fn factorize(&mut self, a: &SymDense) -> bool {
        let n = a.order();
        let mut chol = TriDense::new(n, Uplo::Upper);
        for i in 0..n {
            for j in i..n {
                chol.set_tri(i, j, a.at(i, j));
            }
        }
        let norm = a.norm1();
        let ok = potrf_upper(&mut chol);
        if ok {
            self.chol = Some(chol);
            self.update_cond(norm);
            true
        } else {
            self.reset();
            false
        }
    }

    /// Resets the factorization so the receiver can be reused.
    pub fn reset(&mut self) {
        self.chol = None;
        self.cond = f64::INFINITY;
    }

    /// Sets the factorization directly from an upper triangular factor.
    /// `t` is copied, not retained.
    pub fn set_from_u(&mut self, t: &TriDense) {
        let (n, uplo) = t.triangle();
        if uplo != Uplo::Upper {
            panic!("{}", BAD_TRIANGLE);
        }
        let mut chol = TriDense::new(n, Uplo::Upper);
        chol.copy_from_tri(t);
        self.chol = Some(chol);
        self.update_cond(-1.0);
    }

    /// Copies `other` into the receiver, overwriting any previous state.
    pub fn clone_from_chol(&mut self, other: &Cholesky) {
        if !other.valid() {
            panic!("{}", BAD_CHOLESKY);
        }
        let src = other.factor();
        let mut chol = TriDense::new(src.order(), Uplo::Upper);
        chol.copy_from_tri(src);
        self.chol = Some(chol);
        self.cond = other.cond;
    }

    /// The order of the factorized matrix.
    pub fn size(&self) -> usize {
        self.factor().order()
    }

    /// The condition-number estimate of the factorized matrix.
    pub fn cond(&self) -> f64 {
        if !self.valid() {
            panic!("{}", BAD_CHOLESKY);
        }
        self.cond
    }

    /// The determinant of the factorized matrix.
    pub fn det(&self) -> f64 {
        self.log_det().exp()
    }

    /// The log-determinant of the factorized matrix; stable for products
    /// and quotients of determinants.
    pub fn log_det(&self) -> f64 {
        let u = self.factor();
        let n = u.order();
        let mut det = 0.0;
        for i in 0..n {
            det += 2.0 * u.at(i, i).ln();
        }
        det
    }

    /// The upper triangular factor U with `A = U^T * U`.
    pub fn u(&self) -> TriDense {
        let mut t = TriDense::default();
        t.copy_from_tri(self.factor());
        t
    }

    /// The lower triangular factor L with `A = L * L^T`.
    pub fn l(&self) -> TriDense {
        self.factor().transposed()
    }

    /// Reconstructs the factorized matrix.
    pub fn reconstruct(&self) -> SymDense {
        let lt = self.factor().transposed();
        let mut s = SymDense::default();
        s.sym_outer_k(1.0, &lt);
        s
    }

    /// Stores the inverse of the factorized matrix into `s`. Matrix
    /// inversion is numerically unstable; prefer the solve methods where
    /// possible. Ill-conditioning is reported as a `Condition` diagnostic
    /// alongside the stored result.
    pub fn inverse_to(&self, s: &mut SymDense) -> Result<(), Error> {
        let u = self.factor();
        // If chol(A) = U^T U then A^-1 = S S^T with S = U^-1.
        let mut uinv = TriDense::default();
        let res = uinv.inverse_from_tri(u);
        if let Err(Error::Condition(c)) = res {
            if c.is_infinite() {
                return Err(Error::Condition(c));
            }
        }
        s.reuse_as(u.order());
        s.sym_outer_k(1.0, &uinv);
        res
    }

    /// Solves `A * X = B` for the factorized `A`, storing X into `m`.
    pub fn solve_to(&self, m: &mut Dense, b: &dyn Matrix) -> Result<(), Error> {
        let u = self.factor();
        let n = u.order();
        let (br, bc) = b.dims();
        if n != br {
            panic!("{}", ERR_SHAPE);
        }
        m.reuse_as(br, bc);
        {
            let staged = crate::matrix::arith::stage(m, b);
            m.copy_from(staged.mat());
        }
        {
            let ubuf = u.buf();
            let usl = &ubuf[u.offset()..];
            let (moff, mstr) = (m.offset(), m.stride());
            let mut mbuf = m.buf_mut();
            for j in 0..bc {
                let x = &mut mbuf[moff + j..];
                kernel::trsv(true, true, false, n, usl, u.stride(), x, mstr);
                kernel::trsv(true, false, false, n, usl, u.stride(), x, mstr);
            }
        }
        if self.cond > CONDITION_TOLERANCE {
            return Err(Error::Condition(self.cond));
        }
        Ok(())
    }

    /// Solves `A * x = b` for the factorized `A`, storing x into `v`.
    pub fn solve_vec_to(&self, v: &mut Vector, b: &Vector) -> Result<(), Error> {
        let u = self.factor();
        let n = u.order();
        if b.len() != n {
            panic!("{}", ERR_SHAPE);
        }
        if v.shares_storage_with(b.handle()) {
            shadow::check_overlap_vec(v, b);
        }
        v.reuse_as(n);
        let mut x = b.to_vec();
        {
            let ubuf = u.buf();
            let usl = &ubuf[u.offset()..];
            kernel::trsv(true, true, false, n, usl, u.stride(), &mut x, 1);
            kernel::trsv(true, false, false, n, usl, u.stride(), &mut x, 1);
        }
        for (i, val) in x.into_iter().enumerate() {
            v.set_vec(i, val);
        }
        if self.cond > CONDITION_TOLERANCE {
            return Err(Error::Condition(self.cond));
        }
        Ok(())
    }

    /// Updates the condition estimate. A negative `norm` means the norm of
    /// the factorized matrix is unknown and is approximated from the
    /// factor: by submultiplicativity ||A|| <= ||U^T|| ||U||, so the
    /// estimate somewhat understates the true condition number. The
    /// original norm cannot be retained across rank-one updates.
    fn update_cond(&mut self, norm: f64) {
        let u = self.chol.as_ref().expect("update_cond on empty factorization");
        let n = u.order();
        let norm = if norm < 0.0 {
            u.norm_inf() * u.norm1()
        } else {
            norm
        };
        // ||A^-1||_1 computed exactly through the factor, one unit column
        // at a time.
        let mut inv_norm = 0.0_f64;
        {
            let ubuf = u.buf();
            let usl = &ubuf[u.offset()..];
            let mut col = vec![0.0; n];
            for j in 0..n {
                col.fill(0.0);
                col[j] = 1.0;
                kernel::trsv(true, true, false, n, usl, u.stride(), &mut col, 1);
                kernel::trsv(true, false, false, n, usl, u.stride(), &mut col, 1);
                let sum: f64 = col.iter().map(|v| v.abs()).sum();
                inv_norm = inv_norm.max(sum);
            }
        }
        self.cond = norm * inv_norm;
    }

    /// Applies a rank-one update to the factorization of A, so that the
    /// receiver holds the factorization of `A + alpha * x * x^T`, in O(n²)
    /// instead of the O(n³) of refactorizing.
    ///
    /// A negative `alpha` is a downdate and can fail: the updated matrix
    /// may not be positive definite. `sym_rank_one` returns whether the
    /// updated matrix is positive definite; on `false` the receiver is
    /// reset and must not be used.
    pub fn sym_rank_one(&mut self, orig: &Cholesky, alpha: f64, x: &Vector) -> bool {
        if !orig.valid() {
            panic!("{}", BAD_CHOLESKY);
        }
        let n = orig.size();
        if x.len() != n {
            panic!("{}", ERR_SHAPE);
        }
        self.clone_from_chol(orig);
        if alpha == 0.0 {
            return true;
        }

        // The update and downdate schemes follow the LINPACK dchud/dchdd
        // pair: a sequence of Givens rotations against an extended factor.
        let mut work = x.to_vec();

        if alpha > 0.0 {
            if alpha != 1.0 {
                let s = alpha.sqrt();
                for w in &mut work {
                    *w *= s;
                }
            }
            let u = self.chol.as_mut().expect("receiver was just populated");
            let (uoff, ustr) = (u.offset(), u.stride());
            let mut ubuf = u.buf_mut();
            for i in 0..n {
                // Givens parameters zeroing the i-th element of the
                // update vector.
                let (mut c, mut s, mut r) = kernel::rotg(ubuf[uoff + i * ustr + i], work[i]);
                if r < 0.0 {
                    // Keep the diagonal positive.
                    r = -r;
                    c = -c;
                    s = -s;
                }
                ubuf[uoff + i * ustr + i] = r;
                if i < n - 1 {
                    // Only row i of U and the tail of the update vector
                    // change.
                    let row = &mut ubuf[uoff + i * ustr + i + 1..uoff + i * ustr + n];
                    kernel::rot(row, &mut work[i + 1..n], c, s);
                }
            }
            drop(ubuf);
            self.update_cond(-1.0);
            return true;
        }

        // Downdate.
        let alpha = (-alpha).sqrt();
        if alpha != 1.0 {
            for w in &mut work {
                *w *= alpha;
            }
        }
        {
            // Solve U^T p = x into work.
            let u = self.chol.as_ref().expect("receiver was just populated");
            let ubuf = u.buf();
            kernel::trsv(true, true, false, n, &ubuf[u.offset()..], u.stride(), &mut work, 1);
        }
        let norm = kernel::nrm2(&work);
        if norm >= 1.0 {
            // The downdated matrix is not positive definite.
            self.reset();
            return false;
        }
        let mut norm = ((1.0 + norm) * (1.0 - norm)).sqrt();
        let mut cos = vec![0.0; n];
        let mut sin = vec![0.0; n];
        for i in (0..n).rev() {
            // Givens parameters zeroing elements of p backwards.
            let (c, s, r) = kernel::rotg(norm, work[i]);
            let (c, s, r) = if r < 0.0 { (-c, -s, -r) } else { (c, s, r) };
            cos[i] = c;
            sin[i] = s;
            norm = r;
        }
        let mut ok = true;
        {
            let u = self.chol.as_mut().expect("receiver was just populated");
            let (uoff, ustr) = (u.offset(), u.stride());
            let mut ubuf = u.buf_mut();
            for i in (0..n).rev() {
                let row = &mut ubuf[uoff + i * ustr + i..uoff + i * ustr + n];
                kernel::rot(&mut work[i..n], row, cos[i], sin[i]);
                if row[0] == 0.0 {
                    // Singular after the rotation; can happen through
                    // floating-point cancellation.
                    ok = false;
                } else if row[0] < 0.0 {
                    // Keep diagonal elements positive.
                    for v in row.iter_mut() {
                        *v = -*v;
                    }
                }
            }
        }
        if ok {
            self.update_cond(-1.0);
        } else {
            self.reset();
        }
        ok
    }
}

/// In-place upper Cholesky of the data in `chol`, returning whether the
/// matrix is positive definite.
fn potrf_upper(chol: &mut TriDense) -> bool {
    let n = chol.order();
    let (off, stride) = (chol.offset(), chol.stride());
    let mut a = chol.buf_mut();
    for i in 0..n {
        let mut sum = a[off + i * stride + i];
        for k in 0..i {
            let v = a[off + k * stride + i];
            sum -= v * v;
        }
        if sum <= 0.0 {
            return false;
        }
        let diag = sum.sqrt();
        a[off + i * stride + i] = diag;
        for j in i + 1..n {
            let mut sum = a[off + i * stride + j];
            for k in 0..i {
                sum -= a[off + k * stride + i] * a[off + k * stride + j];
            }
            a[off + i * stride + j] = sum / diag;
        }
    }
    true
}
