//! Shape-dispatched linear solving.
//!
//! `Dense::solve` picks the factorization for the caller: triangular
//! coefficients solve directly by substitution, square systems go through
//! LU, tall systems through QR (least squares) and wide systems through LQ
//! (minimum norm). Ill-conditioned systems still deliver the computed
//! answer, flagged with an [`Error::Condition`] diagnostic.

use crate::error::{Error, CONDITION_TOLERANCE, ERR_SHAPE};
use crate::factor::{Lq, Lu, Qr};
use crate::kernel;
use crate::matrix::shadow;
use crate::matrix::{untranspose, Dense, Matrix, MatrixKind, TriDense, Uplo, Vector};

impl Dense {
    /// Solves the linear system defined by `a` and `b`, storing the
    /// solution into the receiver:
    ///
    /// - square `a`: the exact solution of `A * X = B`,
    /// - more rows than columns: X minimizing ||A*X - B||₂,
    /// - more columns than rows: the minimum-norm solution of `A * X = B`,
    /// - triangular `a`: direct substitution without pivoting.
    ///
    /// The strategy is chosen by shape, not by caller hint. To solve many
    /// right-hand sides against one coefficient matrix, factorize once
    /// and use the factorization's own solve methods.
    pub fn solve(&mut self, a: &dyn Matrix, b: &dyn Matrix) -> Result<(), Error> {
        let (ar, ac) = a.dims();
        let (br, bc) = b.dims();
        if ar != br {
            panic!("{}", ERR_SHAPE);
        }

        let (au, a_trans) = untranspose(a);
        if let MatrixKind::Tri(t) = au.kind() {
            return self.solve_triangular(t, a_trans, b);
        }

        if ar == ac {
            if std::ptr::addr_eq(a, b) {
                // A X = A has the identity as its solution.
                self.reuse_as_zeroed(ar, bc);
                let (off, stride) = (self.offset(), self.stride());
                let mut buf = self.buf_mut();
                for i in 0..ar.min(bc) {
                    buf[off + i * stride + i] = 1.0;
                }
                return Ok(());
            }
            let mut lu = Lu::default();
            lu.factorize(a);
            return lu.solve_to(self, false, b);
        }
        if ar > ac {
            let mut qr = Qr::default();
            qr.factorize(a);
            return qr.solve_to(self, false, b);
        }
        let mut lq = Lq::default();
        lq.factorize(a);
        lq.solve_to(self, false, b)
    }

    fn solve_triangular(&mut self, t: &TriDense, trans: bool, b: &dyn Matrix) -> Result<(), Error> {
        let n = t.order();
        let (br, bc) = b.dims();
        if br != n {
            panic!("{}", ERR_SHAPE);
        }
        self.reuse_as(n, bc);
        {
            let staged = crate::matrix::arith::stage(self, b);
            self.copy_from(staged.mat());
        }
        let upper = t.uplo() == Uplo::Upper;
        {
            let tb = t.buf();
            let tsl = &tb[t.offset()..];
            let (off, stride) = (self.offset(), self.stride());
            let mut buf = self.buf_mut();
            for j in 0..bc {
                kernel::trsv(upper, trans, false, n, tsl, t.stride(), &mut buf[off + j..], stride);
            }
        }
        // Condition of a triangular matrix, straight from the factor.
        for i in 0..n {
            if t.at(i, i) == 0.0 {
                return Err(Error::Condition(f64::INFINITY));
            }
        }
        let mut inv_norm = 0.0_f64;
        {
            let tb = t.buf();
            let tsl = &tb[t.offset()..];
            let mut col = vec![0.0; n];
            for j in 0..n {
                col.fill(0.0);
                col[j] = 1.0;
                kernel::trsv(upper, false, false, n, tsl, t.stride(), &mut col, 1);
                let sum: f64 = col.iter().map(|v| v.abs()).sum();
                inv_norm = inv_norm.max(sum);
            }
        }
        let cond = t.norm1() * inv_norm;
        if cond > CONDITION_TOLERANCE {
            return Err(Error::Condition(cond));
        }
        Ok(())
    }
}

impl Vector {
    /// Solves the system defined by `a` and the right-hand side `b`,
    /// storing the solution into the receiver. See [`Dense::solve`] for
    /// the strategy selection.
    pub fn solve_vec(&mut self, a: &dyn Matrix, b: &Vector) -> Result<(), Error> {
        if self.shares_storage_with(b.handle()) {
            shadow::check_overlap_vec(self, b);
        }
        let (_, c) = a.dims();
        self.reuse_as(c);
        // The solve logic is non-trivial; recast through the dense path
        // rather than duplicating it.
        let bm = b.as_dense();
        let mut x = Dense::default();
        let res = x.solve(a, &bm);
        if let Err(Error::Condition(cond)) = &res {
            if cond.is_infinite() {
                return res;
            }
        }
        for i in 0..c {
            self.set_vec(i, x.at(i, 0));
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_system_is_exact() {
        let a = Dense::identity(2);
        let b = Vector::with_data(vec![5.0, 6.0]);
        let mut x = Vector::default();
        x.solve_vec(&a, &b).unwrap();
        assert_eq!(x.at_vec(0), 5.0);
        assert_eq!(x.at_vec(1), 6.0);
    }

    #[test]
    fn square_system_uses_exact_solution() {
        let a = Dense::with_data(3, 3, vec![2.0, 1.0, 1.0, 1.0, 3.0, 2.0, 1.0, 0.0, 0.0]);
        let b = Dense::with_data(3, 1, vec![4.0, 5.0, 6.0]);
        let mut x = Dense::default();
        x.solve(&a, &b).unwrap();
        let want = [6.0, 15.0, -23.0];
        for i in 0..3 {
            assert!((x.at(i, 0) - want[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn same_coefficient_and_rhs_returns_identity() {
        let a = Dense::with_data(2, 2, vec![3.0, 1.0, 2.0, 5.0]);
        let mut x = Dense::default();
        x.solve(&a, &a).unwrap();
        assert_eq!(x.at(0, 0), 1.0);
        assert_eq!(x.at(0, 1), 0.0);
        assert_eq!(x.at(1, 1), 1.0);
    }

    #[test]
    fn tall_system_solves_least_squares() {
        let a = Dense::with_data(3, 2, vec![1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let b = Dense::with_data(3, 1, vec![6.0, 5.0, 7.0]);
        let mut x = Dense::default();
        x.solve(&a, &b).unwrap();
        assert_eq!(x.dims(), (2, 1));
        assert!((x.at(0, 0) - 5.0).abs() < 1e-10);
        assert!((x.at(1, 0) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn wide_system_solves_min_norm() {
        let a = Dense::with_data(2, 3, vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let b = Dense::with_data(2, 1, vec![2.0, 4.0]);
        let mut x = Dense::default();
        x.solve(&a, &b).unwrap();
        assert_eq!(x.dims(), (3, 1));
        let mut ax = Dense::default();
        ax.mul(&a, &x);
        assert!((ax.at(0, 0) - 2.0).abs() < 1e-10);
        assert!((ax.at(1, 0) - 4.0).abs() < 1e-10);
    }

    #[test]
    fn triangular_coefficients_solve_directly() {
        let mut t = TriDense::new(3, Uplo::Lower);
        t.set_tri(0, 0, 2.0);
        t.set_tri(1, 0, 1.0);
        t.set_tri(1, 1, 3.0);
        t.set_tri(2, 1, -1.0);
        t.set_tri(2, 2, 4.0);
        let b = Dense::with_data(3, 1, vec![2.0, 5.0, 3.0]);
        let mut x = Dense::default();
        x.solve(&t, &b).unwrap();
        // Forward substitution by hand: x0 = 1, x1 = 4/3, x2 = (3 + 4/3)/4.
        assert!((x.at(0, 0) - 1.0).abs() < 1e-12);
        assert!((x.at(1, 0) - 4.0 / 3.0).abs() < 1e-12);
        assert!((x.at(2, 0) - (3.0 + 4.0 / 3.0) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn transposed_triangular_coefficients() {
        let mut t = TriDense::new(2, Uplo::Upper);
        t.set_tri(0, 0, 2.0);
        t.set_tri(0, 1, 1.0);
        t.set_tri(1, 1, 4.0);
        let b = Dense::with_data(2, 1, vec![2.0, 9.0]);
        let mut x = Dense::default();
        x.solve(&t.t(), &b).unwrap();
        // T^T x = b: 2x0 = 2; x0 + 4x1 = 9.
        assert!((x.at(0, 0) - 1.0).abs() < 1e-12);
        assert!((x.at(1, 0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn singular_square_system_reports_condition_inf() {
        let a = Dense::with_data(2, 2, vec![1.0, 2.0, 2.0, 4.0]);
        let b = Dense::with_data(2, 1, vec![1.0, 1.0]);
        let mut x = Dense::default();
        match x.solve(&a, &b) {
            Err(Error::Condition(c)) => assert!(c.is_infinite()),
            other => panic!("expected Condition(inf), got {other:?}"),
        }
    }

    #[test]
    fn nonconformable_shapes_panic() {
        use std::panic::{catch_unwind, AssertUnwindSafe};
        let a = Dense::new(3, 2);
        let b = Dense::new(2, 1);
        let mut x = Dense::default();
        let got = catch_unwind(AssertUnwindSafe(|| x.solve(&a, &b))).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), ERR_SHAPE);
    }
}
