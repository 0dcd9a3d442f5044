//! Householder QR factorization of tall or square matrices.

use crate::error::{Error, BAD_QR, CONDITION_TOLERANCE, ERR_SHAPE};
use crate::kernel;
use crate::matrix::pool::{get_workspace, put_workspace};
use crate::matrix::{Dense, Matrix, TriDense, Uplo};

/// QR factorization `A = Q * R` of an m x n matrix with m >= n.
///
/// Q is an orthonormal m x m matrix and R is upper trapezoidal. The
/// factorization always exists, even for singular A. The packed factor
/// storage (R in the upper triangle, Householder vectors below it) is
/// owned exclusively by the struct.
pub struct Qr {
    qr: Option<Dense>,
    tau: Vec<f64>,
    cond: f64,
}

impl Default for Qr {
    fn default() -> Qr {
        Qr {
            qr: None,
            tau: Vec::new(),
            cond: f64::INFINITY,
        }
    }
}

impl Qr {
    fn stored(&self) -> &Dense {
        match &self.qr {
            Some(m) => m,
            None => panic!("{}", BAD_QR),
        }
    }

    /// Computes the factorization of `a`, which must have at least as many
    /// rows as columns.
    pub fn factorize(&mut self, a: &dyn Matrix) {
        let (m, n) = a.dims();
        if m < n {
            panic!("{}", ERR_SHAPE);
        }
        let mut qr = Dense::copy_of(a);
        let mut tau = vec![0.0; n];
        {
            let (off, stride) = (qr.offset(), qr.stride());
            let mut buf = qr.buf_mut();
            kernel::householder_qr(m, n, &mut buf[off..], stride, &mut tau);
        }
        self.qr = Some(qr);
        self.tau = tau;
        self.update_cond();
    }

    /// Resets the factorization so the receiver can be reused.
    pub fn reset(&mut self) {
        self.qr = None;
        self.tau.clear();
        self.cond = f64::INFINITY;
    }

    /// The condition-number estimate of the factorized matrix. Orthonormal
    /// factors leave norms unchanged, so the estimate comes from R alone.
    pub fn cond(&self) -> f64 {
        if self.qr.is_none() {
            panic!("{}", BAD_QR);
        }
        self.cond
    }

    /// The m x n upper trapezoidal factor R.
    pub fn r(&self) -> Dense {
        let qr = self.stored();
        let (m, n) = qr.dims();
        let mut r = Dense::new(m, n);
        for i in 0..n.min(m) {
            for j in i..n {
                r.put(i, j, qr.get(i, j));
            }
        }
        r
    }

    /// The n x n upper triangular head of R.
    pub fn r_tri(&self) -> TriDense {
        let qr = self.stored();
        let n = qr.cols();
        let mut t = TriDense::new(n, Uplo::Upper);
        for i in 0..n {
            for j in i..n {
                t.set_tri(i, j, qr.get(i, j));
            }
        }
        t
    }

    /// The m x m orthonormal factor Q, built by applying the stored
    /// elementary reflectors to the identity.
    pub fn q(&self) -> Dense {
        let qr = self.stored();
        let (m, n) = qr.dims();
        let mut q = Dense::identity(m);
        {
            let qrb = qr.buf();
            let a = &qrb[qr.offset()..];
            let (qoff, qstr) = (q.offset(), q.stride());
            let mut qb = q.buf_mut();
            kernel::apply_q(false, m, n, a, qr.stride(), &self.tau, &mut qb[qoff..], qstr, m);
        }
        q
    }

    /// Solves the least-squares problem for the factorized m x n matrix A:
    /// with `trans` unset, finds X minimizing ||A*X - B||₂; with `trans`
    /// set, finds the minimum-norm solution of `A^T * X = B`. X is stored
    /// into `m`.
    pub fn solve_to(&self, m: &mut Dense, trans: bool, b: &dyn Matrix) -> Result<(), Error> {
        let qr = self.stored();
        let (r, c) = qr.dims();
        let (br, bc) = b.dims();
        if trans {
            if c != br {
                panic!("{}", ERR_SHAPE);
            }
            m.reuse_as(r, bc);
        } else {
            if r != br {
                panic!("{}", ERR_SHAPE);
            }
            m.reuse_as(c, bc);
        }
        for i in 0..c {
            if qr.get(i, i) == 0.0 {
                return Err(Error::Condition(f64::INFINITY));
            }
        }

        // The solve works in-place in a buffer big enough for both the
        // right-hand side and the answer.
        let mut x = get_workspace(r.max(c), bc, false);
        x.copy_from(b);
        {
            let qrb = qr.buf();
            let a = &qrb[qr.offset()..];
            let lda = qr.stride();
            let (xoff, xstr) = (x.offset(), x.stride());
            let mut xb = x.buf_mut();
            if trans {
                // x = Q * [R^-T b; 0]
                for j in 0..bc {
                    kernel::trsv(true, true, false, c, a, lda, &mut xb[xoff + j..], xstr);
                }
                for i in c..r {
                    xb[xoff + i * xstr..xoff + i * xstr + bc].fill(0.0);
                }
                kernel::apply_q(false, r, c, a, lda, &self.tau, &mut xb[xoff..], xstr, bc);
            } else {
                // x = R^-1 (Q^T b), taking the top c rows.
                kernel::apply_q(true, r, c, a, lda, &self.tau, &mut xb[xoff..], xstr, bc);
                for j in 0..bc {
                    kernel::trsv(true, false, false, c, a, lda, &mut xb[xoff + j..], xstr);
                }
            }
        }
        m.copy_from(&x);
        put_workspace(x);
        if self.cond > CONDITION_TOLERANCE {
            return Err(Error::Condition(self.cond));
        }
        Ok(())
    }

    fn update_cond(&mut self) {
        // A = QR with Q orthonormal, so ||A|| = ||R|| and the condition
        // number of A is that of R.
        let qr = self.qr.as_ref().expect("update_cond on empty factorization");
        let n = qr.cols();
        for i in 0..n {
            if qr.get(i, i) == 0.0 {
                self.cond = f64::INFINITY;
                return;
            }
        }
        let buf = qr.buf();
        let a = &buf[qr.offset()..];
        let lda = qr.stride();
        let mut rnorm = 0.0_f64;
        for j in 0..n {
            let mut acc = 0.0;
            for i in 0..=j {
                acc += a[i * lda + j].abs();
            }
            rnorm = rnorm.max(acc);
        }
        let mut inv_norm = 0.0_f64;
        let mut col = vec![0.0; n];
        for j in 0..n {
            col.fill(0.0);
            col[j] = 1.0;
            kernel::trsv(true, false, false, n, a, lda, &mut col, 1);
            let sum: f64 = col.iter().map(|v| v.abs()).sum();
            inv_norm = inv_norm.max(sum);
        }
        self.cond = rnorm * inv_norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Vector;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn tall() -> Dense {
        Dense::with_data(4, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
    }

    #[test]
    fn q_is_orthonormal_and_qr_reconstructs() {
        let a = Dense::with_data(
            3,
            3,
            vec![12.0, -51.0, 4.0, 6.0, 167.0, -68.0, -4.0, 24.0, -41.0],
        );
        let mut qr = Qr::default();
        qr.factorize(&a);

        let q = qr.q();
        let mut qtq = Dense::default();
        qtq.mul(&q.t(), &q);
        for i in 0..3 {
            for j in 0..3 {
                let want = if i == j { 1.0 } else { 0.0 };
                assert!((qtq.at(i, j) - want).abs() < 1e-10, "qtq[{i}][{j}] = {}", qtq.at(i, j));
            }
        }

        let r = qr.r();
        let mut back = Dense::default();
        back.mul(&q, &r);
        for i in 0..3 {
            for j in 0..3 {
                assert!((back.at(i, j) - a.at(i, j)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn tall_factorization_reconstructs() {
        let a = tall();
        let mut qr = Qr::default();
        qr.factorize(&a);
        let (q, r) = (qr.q(), qr.r());
        assert_eq!(q.dims(), (4, 4));
        assert_eq!(r.dims(), (4, 2));
        let mut back = Dense::default();
        back.mul(&q, &r);
        for i in 0..4 {
            for j in 0..2 {
                assert!((back.at(i, j) - a.at(i, j)).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn wide_input_panics() {
        let a = Dense::new(2, 3);
        let mut qr = Qr::default();
        let got = catch_unwind(AssertUnwindSafe(|| qr.factorize(&a))).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), ERR_SHAPE);
    }

    #[test]
    fn least_squares_line_fit() {
        // Fit y = a + b*x through (1,6), (2,5), (3,7): x = [5, 0.5].
        let a = Dense::with_data(3, 2, vec![1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let b = Vector::with_data(vec![6.0, 5.0, 7.0]).as_dense();
        let mut qr = Qr::default();
        qr.factorize(&a);
        let mut x = Dense::default();
        qr.solve_to(&mut x, false, &b).unwrap();
        assert!((x.at(0, 0) - 5.0).abs() < 1e-10);
        assert!((x.at(1, 0) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn transposed_solve_gives_min_norm_solution() {
        let a = tall();
        let mut qr = Qr::default();
        qr.factorize(&a);
        // Solve A^T x = b for the 2-vector b; x has 4 entries.
        let b = Dense::with_data(2, 1, vec![1.0, 2.0]);
        let mut x = Dense::default();
        qr.solve_to(&mut x, true, &b).unwrap();
        assert_eq!(x.dims(), (4, 1));
        let mut atx = Dense::default();
        atx.mul(&a.t(), &x);
        for i in 0..2 {
            assert!((atx.at(i, 0) - b.at(i, 0)).abs() < 1e-10);
        }
    }

    #[test]
    fn rank_deficient_solve_reports_condition_inf() {
        // The second column is confined to the first coordinate, so R has
        // an exact zero on its diagonal.
        let a = Dense::with_data(3, 2, vec![1.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
        let mut qr = Qr::default();
        qr.factorize(&a);
        let b = Dense::new(3, 1);
        let mut x = Dense::default();
        match qr.solve_to(&mut x, false, &b) {
            Err(Error::Condition(c)) => assert!(c.is_infinite()),
            other => panic!("expected Condition(inf), got {other:?}"),
        }
    }

    #[test]
    fn empty_queries_panic() {
        let qr = Qr::default();
        let got = catch_unwind(AssertUnwindSafe(|| qr.q())).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), BAD_QR);
    }
}
