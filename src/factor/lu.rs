//! LU factorization with partial pivoting and O(n²) rank-one updates.

use crate::error::{Error, BAD_LU, CONDITION_TOLERANCE, ERR_SHAPE, ERR_SQUARE};
use crate::kernel;
use crate::matrix::shadow;
use crate::matrix::{Dense, Matrix, TriDense, Uplo, Vector};

/// Pivoted LU factorization `P * L * U = A` of a square matrix.
///
/// The decomposition completes regardless of the singularity of A; a
/// singular input simply produces a zero determinant, and solves against
/// it report `Condition(inf)`.
pub struct Lu {
    lu: Option<Dense>,
    pivot: Vec<usize>,
    cond: f64,
}

impl Default for Lu {
    fn default() -> Lu {
        Lu {
            lu: None,
            pivot: Vec::new(),
            cond: f64::INFINITY,
        }
    }
}

impl Lu {
    fn valid(&self) -> bool {
        self.lu.is_some()
    }

    fn stored(&self) -> &Dense {
        match &self.lu {
            Some(m) => m,
            None => panic!("{}", BAD_LU),
        }
    }

    /// Computes the pivoted factorization of the square matrix `a`.
    pub fn factorize(&mut self, a: &dyn Matrix) {
        let (r, c) = a.dims();
        if r != c {
            panic!("{}", ERR_SQUARE);
        }
        let mut lu = Dense::copy_of(a);
        let mut pivot = vec![0usize; r];
        let anorm = {
            let buf = lu.buf();
            kernel::norm1(r, r, &buf[lu.offset()..], lu.stride())
        };
        {
            let (off, stride) = (lu.offset(), lu.stride());
            let mut buf = lu.buf_mut();
            kernel::lu_factor(r, &mut buf[off..], stride, &mut pivot);
        }
        self.lu = Some(lu);
        self.pivot = pivot;
        self.update_cond(anorm);
    }

    /// Resets the factorization so the receiver can be reused.
    pub fn reset(&mut self) {
        self.lu = None;
        self.pivot.clear();
        self.cond = f64::INFINITY;
    }

    /// The order of the factorized matrix.
    pub fn size(&self) -> usize {
        self.stored().rows()
    }

    /// The condition-number estimate of the factorized matrix.
    pub fn cond(&self) -> f64 {
        if !self.valid() {
            panic!("{}", BAD_LU);
        }
        self.cond
    }

    /// The determinant of the factorized matrix. [`Lu::log_det`] is more
    /// numerically stable in product expressions.
    pub fn det(&self) -> f64 {
        let (det, sign) = self.log_det();
        det.exp() * sign
    }

    /// The log of the absolute determinant and the determinant's sign.
    pub fn log_det(&self) -> (f64, f64) {
        let lu = self.stored();
        let n = lu.rows();
        let mut det = 0.0;
        let mut sign = 1.0;
        for i in 0..n {
            let v = lu.get(i, i);
            if v < 0.0 {
                sign = -sign;
            }
            if self.pivot[i] != i {
                sign = -sign;
            }
            det += v.abs().ln();
        }
        (det, sign)
    }

    /// Row-swap sequence from which [`Dense::permutation`] builds the
    /// permutation matrix P.
    pub fn pivot(&self) -> Vec<usize> {
        if !self.valid() {
            panic!("{}", BAD_LU);
        }
        let n = self.pivot.len();
        let mut swaps: Vec<usize> = (0..n).collect();
        // Replay the exchanges backwards to find final row positions.
        for i in (0..n).rev() {
            let v = self.pivot[i];
            swaps.swap(i, v);
        }
        swaps
    }

    /// The unit lower triangular factor L.
    pub fn l(&self) -> TriDense {
        let lu = self.stored();
        let n = lu.rows();
        let mut t = TriDense::new(n, Uplo::Lower);
        for i in 0..n {
            for j in 0..i {
                t.set_tri(i, j, lu.get(i, j));
            }
            t.set_tri(i, i, 1.0);
        }
        t
    }

    /// The upper triangular factor U.
    pub fn u(&self) -> TriDense {
        let lu = self.stored();
        let n = lu.rows();
        let mut t = TriDense::new(n, Uplo::Upper);
        for i in 0..n {
            for j in i..n {
                t.set_tri(i, j, lu.get(i, j));
            }
        }
        t
    }

    /// Updates the factorization as if a rank-one update `alpha * x * y^T`
    /// had been applied to the original matrix, in O(n²).
    ///
    /// Follows algorithm a1 of Deng, "Multiple-Rank Updates to Matrix
    /// Factorizations for Nonlinear Analysis and Circuit Design": the
    /// update is folded through the existing pivot sequence with
    /// elementary row operations, no new pivoting.
    pub fn rank_one(&mut self, orig: &Lu, alpha: f64, x: &Vector, y: &Vector) {
        if !orig.valid() {
            panic!("{}", BAD_LU);
        }
        let n = orig.size();
        if x.len() != n || y.len() != n {
            panic!("{}", ERR_SHAPE);
        }
        self.lu = Some(Dense::copy_of(orig.stored()));
        self.pivot = orig.pivot.clone();

        let mut xs = x.to_vec();
        let mut ys = y.to_vec();

        // Fold the update vector through the pivoting of the stored
        // factorization.
        for (i, &v) in self.pivot.iter().enumerate() {
            xs.swap(i, v);
        }

        {
            let lu = self.lu.as_mut().expect("receiver was just populated");
            let (off, stride) = (lu.offset(), lu.stride());
            let mut a = lu.buf_mut();
            let mut omega = alpha;
            for j in 0..n {
                let ujj = a[off + j * stride + j];
                ys[j] /= ujj;
                let theta = 1.0 + xs[j] * ys[j] * omega;
                let beta = omega * ys[j] / theta;
                let gamma = omega * xs[j];
                omega -= beta * gamma;
                a[off + j * stride + j] *= theta;
                for i in j + 1..n {
                    xs[i] -= a[off + i * stride + j] * xs[j];
                    let tmp = ys[i];
                    ys[i] -= a[off + j * stride + i] * ys[j];
                    a[off + i * stride + j] += beta * xs[i];
                    a[off + j * stride + i] += gamma * tmp;
                }
            }
        }
        self.update_cond(-1.0);
    }

    /// Solves `A * X = B` (or `A^T * X = B` when `trans` is set) for the
    /// factorized A, storing X into `m`. A singular or near-singular A
    /// yields a `Condition` error.
    pub fn solve_to(&self, m: &mut Dense, trans: bool, b: &dyn Matrix) -> Result<(), Error> {
        let lu = self.stored();
        let n = lu.rows();
        let (br, bc) = b.dims();
        if br != n {
            panic!("{}", ERR_SHAPE);
        }
        if self.det() == 0.0 {
            return Err(Error::Condition(f64::INFINITY));
        }
        m.reuse_as(n, bc);
        {
            let staged = crate::matrix::arith::stage(m, b);
            m.copy_from(staged.mat());
        }
        {
            let lubuf = lu.buf();
            let lusl = &lubuf[lu.offset()..];
            let (moff, mstr) = (m.offset(), m.stride());
            let mut mbuf = m.buf_mut();
            for j in 0..bc {
                let x = &mut mbuf[moff + j..];
                kernel::lu_solve(n, lusl, lu.stride(), &self.pivot, trans, x, mstr);
            }
        }
        if self.cond > CONDITION_TOLERANCE {
            return Err(Error::Condition(self.cond));
        }
        Ok(())
    }

    /// Solves `A * x = b` (or `A^T * x = b`) for the factorized A, storing
    /// x into `v`.
    pub fn solve_vec_to(&self, v: &mut Vector, trans: bool, b: &Vector) -> Result<(), Error> {
        let lu = self.stored();
        let n = lu.rows();
        if b.len() != n {
            panic!("{}", ERR_SHAPE);
        }
        if v.shares_storage_with(b.handle()) {
            shadow::check_overlap_vec(v, b);
        }
        if self.det() == 0.0 {
            return Err(Error::Condition(f64::INFINITY));
        }
        v.reuse_as(n);
        let mut x = b.to_vec();
        {
            let lubuf = lu.buf();
            kernel::lu_solve(n, &lubuf[lu.offset()..], lu.stride(), &self.pivot, trans, &mut x, 1);
        }
        for (i, val) in x.into_iter().enumerate() {
            v.set_vec(i, val);
        }
        if self.cond > CONDITION_TOLERANCE {
            return Err(Error::Condition(self.cond));
        }
        Ok(())
    }

    /// Updates the stored condition estimate. A negative `norm` means the
    /// norm of the factorized matrix is no longer available (after a
    /// rank-one update) and is approximated by ||L||·||U||, which may
    /// understate the true condition number.
    fn update_cond(&mut self, norm: f64) {
        let lu = self.lu.as_ref().expect("update_cond on empty factorization");
        let n = lu.rows();
        for i in 0..n {
            if lu.get(i, i) == 0.0 {
                self.cond = f64::INFINITY;
                return;
            }
        }
        let norm = if norm < 0.0 {
            self.l().norm1() * self.u().norm1()
        } else {
            norm
        };
        let mut inv_norm = 0.0_f64;
        {
            let buf = lu.buf();
            let a = &buf[lu.offset()..];
            let mut col = vec![0.0; n];
            for j in 0..n {
                col.fill(0.0);
                col[j] = 1.0;
                kernel::lu_solve(n, a, lu.stride(), &self.pivot, false, &mut col, 1);
                let sum: f64 = col.iter().map(|v| v.abs()).sum();
                inv_norm = inv_norm.max(sum);
            }
        }
        self.cond = norm * inv_norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn a3() -> Dense {
        Dense::with_data(3, 3, vec![2.0, 1.0, 1.0, 1.0, 3.0, 2.0, 1.0, 0.0, 0.0])
    }

    #[test]
    fn plu_reconstructs_input() {
        let a = a3();
        let mut lu = Lu::default();
        lu.factorize(&a);

        let mut p = Dense::default();
        p.permutation(3, &lu.pivot());
        let (l, u) = (lu.l(), lu.u());
        let mut lu_prod = Dense::default();
        lu_prod.mul(&l, &u);
        let mut plu = Dense::default();
        plu.mul(&p, &lu_prod);
        for i in 0..3 {
            for j in 0..3 {
                assert!(
                    (plu.at(i, j) - a.at(i, j)).abs() < 1e-12,
                    "plu[{i}][{j}] = {}, a = {}",
                    plu.at(i, j),
                    a.at(i, j)
                );
            }
        }
    }

    #[test]
    fn determinant_with_sign() {
        // det [[2,1,1],[1,3,2],[1,0,0]] = 1*(1*2-1*3) = -1.
        let mut lu = Lu::default();
        lu.factorize(&a3());
        assert!((lu.det() - (-1.0)).abs() < 1e-12, "det = {}", lu.det());
    }

    #[test]
    fn singular_matrix_factorizes_with_zero_det() {
        let a = Dense::with_data(2, 2, vec![1.0, 2.0, 2.0, 4.0]);
        let mut lu = Lu::default();
        lu.factorize(&a);
        assert_eq!(lu.det(), 0.0);
        let b = Vector::with_data(vec![1.0, 2.0]);
        let mut x = Vector::default();
        match lu.solve_vec_to(&mut x, false, &b) {
            Err(Error::Condition(c)) => assert!(c.is_infinite()),
            other => panic!("expected Condition(inf), got {other:?}"),
        }
    }

    #[test]
    fn non_square_panics() {
        let a = Dense::new(2, 3);
        let mut lu = Lu::default();
        let got = catch_unwind(AssertUnwindSafe(|| lu.factorize(&a))).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), ERR_SQUARE);
    }

    #[test]
    fn solve_and_transposed_solve() {
        let a = a3();
        let mut lu = Lu::default();
        lu.factorize(&a);

        let b = Vector::with_data(vec![4.0, 5.0, 6.0]);
        let mut x = Vector::default();
        lu.solve_vec_to(&mut x, false, &b).unwrap();
        let want = [6.0, 15.0, -23.0];
        for i in 0..3 {
            assert!((x.at_vec(i) - want[i]).abs() < 1e-10, "x = {:?}", x.to_vec());
        }

        let mut xt = Vector::default();
        lu.solve_vec_to(&mut xt, true, &b).unwrap();
        // Verify A^T x = b.
        for i in 0..3 {
            let mut acc = 0.0;
            for j in 0..3 {
                acc += a.at(j, i) * xt.at_vec(j);
            }
            assert!((acc - b.at_vec(i)).abs() < 1e-10);
        }
    }

    #[test]
    fn rank_one_update_matches_refactorization() {
        let a = a3();
        let mut lu = Lu::default();
        lu.factorize(&a);

        let x = Vector::with_data(vec![0.5, -1.0, 0.25]);
        let y = Vector::with_data(vec![1.0, 2.0, -0.5]);
        let alpha = 0.75;

        let mut updated = Lu::default();
        updated.rank_one(&lu, alpha, &x, &y);

        let mut a2 = Dense::default();
        a2.rank_one(&a, alpha, &x, &y);
        let mut fresh = Lu::default();
        fresh.factorize(&a2);

        // The factors themselves differ (no new pivoting is performed),
        // so compare through a solve.
        let b = Vector::with_data(vec![1.0, -2.0, 3.0]);
        let mut xu = Vector::default();
        updated.solve_vec_to(&mut xu, false, &b).unwrap();
        let mut xf = Vector::default();
        fresh.solve_vec_to(&mut xf, false, &b).unwrap();
        for i in 0..3 {
            assert!(
                (xu.at_vec(i) - xf.at_vec(i)).abs() < 1e-10,
                "updated = {:?}, fresh = {:?}",
                xu.to_vec(),
                xf.to_vec()
            );
        }
        assert!((updated.det() - fresh.det()).abs() < 1e-10);
    }

    #[test]
    fn empty_queries_panic() {
        let lu = Lu::default();
        let got = catch_unwind(AssertUnwindSafe(|| lu.det())).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), BAD_LU);
    }
}
