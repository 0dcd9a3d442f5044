//! LQ factorization of wide or square matrices.
//!
//! `A = L * Q` is computed as the Householder QR of `A^T`: if
//! `A^T = Q' * R'` then `L = R'^T` and `Q = Q'^T`. The packed factor of the
//! transposed problem is what gets stored.

use crate::error::{Error, BAD_LQ, CONDITION_TOLERANCE, ERR_SHAPE};
use crate::kernel;
use crate::matrix::pool::{get_workspace, put_workspace};
use crate::matrix::{Dense, Matrix, Transpose, TriDense, Uplo};

/// LQ factorization `A = L * Q` of an m x n matrix with m <= n.
///
/// L is lower trapezoidal and Q is an orthonormal n x n matrix. The
/// factorization always exists, even for singular A.
pub struct Lq {
    // Packed QR factorization of A^T (an n x m matrix).
    qt: Option<Dense>,
    tau: Vec<f64>,
    cond: f64,
}

impl Default for Lq {
    fn default() -> Lq {
        Lq {
            qt: None,
            tau: Vec::new(),
            cond: f64::INFINITY,
        }
    }
}

impl Lq {
    fn stored(&self) -> &Dense {
        match &self.qt {
            Some(m) => m,
            None => panic!("{}", BAD_LQ),
        }
    }

    /// The (rows, cols) of the factorized matrix.
    fn shape(&self) -> (usize, usize) {
        let (n, m) = self.stored().dims();
        (m, n)
    }

    /// Computes the factorization of `a`, which must have at most as many
    /// rows as columns.
    pub fn factorize(&mut self, a: &dyn Matrix) {
        let (m, n) = a.dims();
        if m > n {
            panic!("{}", ERR_SHAPE);
        }
        let mut qt = Dense::copy_of(&Transpose(a));
        let mut tau = vec![0.0; m];
        {
            let (off, stride) = (qt.offset(), qt.stride());
            let mut buf = qt.buf_mut();
            kernel::householder_qr(n, m, &mut buf[off..], stride, &mut tau);
        }
        self.qt = Some(qt);
        self.tau = tau;
        self.update_cond();
    }

    /// Resets the factorization so the receiver can be reused.
    pub fn reset(&mut self) {
        self.qt = None;
        self.tau.clear();
        self.cond = f64::INFINITY;
    }

    /// The condition-number estimate of the factorized matrix, from the
    /// triangular factor alone.
    pub fn cond(&self) -> f64 {
        if self.qt.is_none() {
            panic!("{}", BAD_LQ);
        }
        self.cond
    }

    /// The m x n lower trapezoidal factor L.
    pub fn l(&self) -> Dense {
        let qt = self.stored();
        let (m, n) = self.shape();
        let mut l = Dense::new(m, n);
        for i in 0..m {
            for j in 0..=i {
                l.put(i, j, qt.get(j, i));
            }
        }
        l
    }

    /// The m x m lower triangular head of L.
    pub fn l_tri(&self) -> TriDense {
        let qt = self.stored();
        let (m, _) = self.shape();
        let mut t = TriDense::new(m, Uplo::Lower);
        for i in 0..m {
            for j in 0..=i {
                t.set_tri(i, j, qt.get(j, i));
            }
        }
        t
    }

    /// The n x n orthonormal factor Q.
    pub fn q(&self) -> Dense {
        let qt = self.stored();
        let (m, n) = self.shape();
        let mut q = Dense::identity(n);
        {
            let qb = qt.buf();
            let a = &qb[qt.offset()..];
            let (qoff, qstr) = (q.offset(), q.stride());
            let mut out = q.buf_mut();
            // Q = Q'^T, which is what applying the transposed reflectors
            // to the identity produces.
            kernel::apply_q(true, n, m, a, qt.stride(), &self.tau, &mut out[qoff..], qstr, n);
        }
        q
    }

    /// Solves against the factorized m x n matrix A: with `trans` unset,
    /// finds the minimum-norm solution of `A * X = B`; with `trans` set,
    /// finds X minimizing ||A^T*X - B||₂. X is stored into `m`.
    pub fn solve_to(&self, out: &mut Dense, trans: bool, b: &dyn Matrix) -> Result<(), Error> {
        let qt = self.stored();
        let (m, n) = self.shape();
        let (br, bc) = b.dims();
        if trans {
            if n != br {
                panic!("{}", ERR_SHAPE);
            }
            out.reuse_as(m, bc);
        } else {
            if m != br {
                panic!("{}", ERR_SHAPE);
            }
            out.reuse_as(n, bc);
        }
        for i in 0..m {
            if qt.get(i, i) == 0.0 {
                return Err(Error::Condition(f64::INFINITY));
            }
        }

        let mut x = get_workspace(n.max(m), bc, false);
        x.copy_from(b);
        {
            let qb = qt.buf();
            let a = &qb[qt.offset()..];
            let lda = qt.stride();
            let (xoff, xstr) = (x.offset(), x.stride());
            let mut xb = x.buf_mut();
            if trans {
                // x = L^-T (Q b): L^T is the R' factor of the transposed
                // problem.
                kernel::apply_q(true, n, m, a, lda, &self.tau, &mut xb[xoff..], xstr, bc);
                for j in 0..bc {
                    kernel::trsv(true, false, false, m, a, lda, &mut xb[xoff + j..], xstr);
                }
            } else {
                // x = Q^T [L^-1 b; 0], and Q^T here is Q' of the
                // transposed problem.
                for j in 0..bc {
                    kernel::trsv(true, true, false, m, a, lda, &mut xb[xoff + j..], xstr);
                }
                for i in m..n {
                    xb[xoff + i * xstr..xoff + i * xstr + bc].fill(0.0);
                }
                kernel::apply_q(false, n, m, a, lda, &self.tau, &mut xb[xoff..], xstr, bc);
            }
        }
        out.copy_from(&x);
        put_workspace(x);
        if self.cond > CONDITION_TOLERANCE {
            return Err(Error::Condition(self.cond));
        }
        Ok(())
    }

    fn update_cond(&mut self) {
        // A = LQ with Q orthonormal, so the condition number is that of L.
        let qt = self.qt.as_ref().expect("update_cond on empty factorization");
        let (m, _) = self.shape();
        for i in 0..m {
            if qt.get(i, i) == 0.0 {
                self.cond = f64::INFINITY;
                return;
            }
        }
        let buf = qt.buf();
        let a = &buf[qt.offset()..];
        let lda = qt.stride();
        // ||L||_1 is the max row sum of the stored R' head.
        let mut lnorm = 0.0_f64;
        for i in 0..m {
            let mut acc = 0.0;
            for j in i..m {
                acc += a[i * lda + j].abs();
            }
            lnorm = lnorm.max(acc);
        }
        let mut inv_norm = 0.0_f64;
        let mut col = vec![0.0; m];
        for j in 0..m {
            col.fill(0.0);
            col[j] = 1.0;
            // L col = e_j is R'^T col = e_j.
            kernel::trsv(true, true, false, m, a, lda, &mut col, 1);
            let sum: f64 = col.iter().map(|v| v.abs()).sum();
            inv_norm = inv_norm.max(sum);
        }
        self.cond = lnorm * inv_norm;
    }
}
