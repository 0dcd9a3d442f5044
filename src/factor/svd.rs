//! Singular value decomposition by the one-sided Jacobi method.

use crate::error::{BAD_SVD, ERR_SLICE_LENGTH_MISMATCH};
use crate::matrix::{Dense, Matrix};

/// How much of the singular-vector matrices to materialize.
///
/// The singular values themselves are identical in all modes; the kind
/// only controls the storage spent on U and V.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvdKind {
    /// Only the singular values.
    Values,
    /// Economy-size vectors: U is m x min(m,n), V is n x min(m,n).
    Thin,
    /// Complete orthonormal bases: U is m x m, V is n x n.
    Full,
}

/// Singular value decomposition `A = U * Σ * V^T`.
pub struct Svd {
    kind: Option<SvdKind>,
    s: Vec<f64>,
    u: Option<Dense>,
    v: Option<Dense>,
}

const MAX_SWEEPS: usize = 60;

impl Default for Svd {
    fn default() -> Svd {
        Svd {
            kind: None,
            s: Vec::new(),
            u: None,
            v: None,
        }
    }
}

impl Svd {
    /// Computes the singular value decomposition of `a`, materializing the
    /// singular vectors according to `kind`. Returns whether the iteration
    /// converged; on failure the receiver is reset.
    pub fn factorize(&mut self, a: &dyn Matrix, kind: SvdKind) -> bool {
        let (m, n) = a.dims();
        let wide = m < n;
        // The kernel works on the tall orientation; a wide input is
        // factorized transposed and the roles of U and V swap back.
        let (tm, tn) = if wide { (n, m) } else { (m, n) };
        let mut work = vec![0.0; tm * tn];
        for i in 0..tm {
            for j in 0..tn {
                work[i * tn + j] = if wide { a.at(j, i) } else { a.at(i, j) };
            }
        }

        let want_vectors = kind != SvdKind::Values;
        // Full vectors on the long side are only needed when that side is
        // the one `kind == Full` completes.
        let complete = kind == SvdKind::Full;
        let (s, u, v, ok) = jacobi_tall(work, tm, tn, want_vectors, complete);
        if !ok {
            self.reset();
            return false;
        }
        self.s = s;
        self.kind = Some(kind);
        if want_vectors {
            let (u, v) = (u.expect("vectors requested"), v.expect("vectors requested"));
            if wide {
                self.u = Some(v);
                self.v = Some(u);
            } else {
                self.u = Some(u);
                self.v = Some(v);
            }
        } else {
            self.u = None;
            self.v = None;
        }
        true
    }

    /// Resets the factorization so the receiver can be reused.
    pub fn reset(&mut self) {
        self.kind = None;
        self.s.clear();
        self.u = None;
        self.v = None;
    }

    /// The kind of the stored decomposition, if any.
    pub fn kind(&self) -> Option<SvdKind> {
        self.kind
    }

    /// The 2-norm condition number s_max / s_min of the factorized matrix.
    pub fn cond(&self) -> f64 {
        if self.kind.is_none() {
            panic!("{}", BAD_SVD);
        }
        self.s[0] / self.s[self.s.len() - 1]
    }

    /// The singular values in decreasing order. A non-empty `dst` must
    /// have length min(m, n) and is filled in place; otherwise a fresh
    /// vector is returned.
    pub fn values(&self, dst: Option<&mut [f64]>) -> Vec<f64> {
        if self.kind.is_none() {
            panic!("{}", BAD_SVD);
        }
        match dst {
            Some(out) => {
                if out.len() != self.s.len() {
                    panic!("{}", ERR_SLICE_LENGTH_MISMATCH);
                }
                out.copy_from_slice(&self.s);
                out.to_vec()
            }
            None => self.s.clone(),
        }
    }

    /// The left singular vectors. Panics unless the decomposition was
    /// computed with `Thin` or `Full`.
    pub fn u(&self) -> Dense {
        match (&self.kind, &self.u) {
            (Some(SvdKind::Thin | SvdKind::Full), Some(u)) => Dense::copy_of(u),
            _ => panic!("{}", BAD_SVD),
        }
    }

    /// The right singular vectors. Panics unless the decomposition was
    /// computed with `Thin` or `Full`.
    pub fn v(&self) -> Dense {
        match (&self.kind, &self.v) {
            (Some(SvdKind::Thin | SvdKind::Full), Some(v)) => Dense::copy_of(v),
            _ => panic!("{}", BAD_SVD),
        }
    }
}

/// One-sided Jacobi SVD of a tall (tm >= tn) row-major buffer. Returns the
/// singular values in decreasing order and, when requested, U (tm x tn, or
/// tm x tm when `complete` is set) and V (tn x tn).
fn jacobi_tall(
    mut work: Vec<f64>,
    tm: usize,
    tn: usize,
    want_vectors: bool,
    complete: bool,
) -> (Vec<f64>, Option<Dense>, Option<Dense>, bool) {
    let tol = f64::EPSILON * 100.0;
    let mut v = vec![0.0; tn * tn];
    for i in 0..tn {
        v[i * tn + i] = 1.0;
    }

    let mut converged = false;
    for _ in 0..MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..tn {
            for q in p + 1..tn {
                let mut app = 0.0;
                let mut aqq = 0.0;
                let mut apq = 0.0;
                for i in 0..tm {
                    let wp = work[i * tn + p];
                    let wq = work[i * tn + q];
                    app += wp * wp;
                    aqq += wq * wq;
                    apq += wp * wq;
                }
                if apq.abs() <= tol * (app * aqq).sqrt() {
                    continue;
                }
                rotated = true;

                let tau = (aqq - app) / (2.0 * apq);
                let t = if tau >= 0.0 {
                    1.0 / (tau + (1.0 + tau * tau).sqrt())
                } else {
                    -1.0 / (-tau + (1.0 + tau * tau).sqrt())
                };
                let cs = 1.0 / (1.0 + t * t).sqrt();
                let sn = t * cs;

                for i in 0..tm {
                    let wp = work[i * tn + p];
                    let wq = work[i * tn + q];
                    work[i * tn + p] = cs * wp - sn * wq;
                    work[i * tn + q] = sn * wp + cs * wq;
                }
                for i in 0..tn {
                    let vp = v[i * tn + p];
                    let vq = v[i * tn + q];
                    v[i * tn + p] = cs * vp - sn * vq;
                    v[i * tn + q] = sn * vp + cs * vq;
                }
            }
        }
        if !rotated {
            converged = true;
            break;
        }
    }
    if !converged {
        return (Vec::new(), None, None, false);
    }

    // Column norms are the singular values; sort them decreasing and carry
    // the permutation into the vector columns.
    let mut s: Vec<f64> = (0..tn)
        .map(|j| {
            let mut acc = 0.0;
            for i in 0..tm {
                acc += work[i * tn + j] * work[i * tn + j];
            }
            acc.sqrt()
        })
        .collect();
    let mut order: Vec<usize> = (0..tn).collect();
    order.sort_by(|&a, &b| s[b].partial_cmp(&s[a]).unwrap_or(std::cmp::Ordering::Equal));
    s = order.iter().map(|&j| s[j]).collect();

    if !want_vectors {
        return (s, None, None, true);
    }

    let ucols = if complete { tm } else { tn };
    let mut u = vec![0.0; tm * ucols];
    // Columns whose singular value is negligible relative to the largest
    // carry no usable direction; they are filled by completion below.
    let vec_tol = s.first().copied().unwrap_or(0.0) * tm.max(tn) as f64 * f64::EPSILON;
    for (new_j, &old_j) in order.iter().enumerate() {
        if s[new_j] > vec_tol {
            for i in 0..tm {
                u[i * ucols + new_j] = work[i * tn + old_j] / s[new_j];
            }
        }
    }
    // Fill any zero columns (rank deficiency, and the tm - tn tail of a
    // complete basis) by Gram-Schmidt against the columns already placed.
    let fill_from = |u: &mut Vec<f64>, j: usize| -> bool {
        for cand in 0..tm {
            for i in 0..tm {
                u[i * ucols + j] = if i == cand { 1.0 } else { 0.0 };
            }
            for k in 0..j {
                let mut dot = 0.0;
                for i in 0..tm {
                    dot += u[i * ucols + j] * u[i * ucols + k];
                }
                for i in 0..tm {
                    let uk = u[i * ucols + k];
                    u[i * ucols + j] -= dot * uk;
                }
            }
            let mut norm = 0.0;
            for i in 0..tm {
                norm += u[i * ucols + j] * u[i * ucols + j];
            }
            let norm = norm.sqrt();
            if norm > 0.5 {
                for i in 0..tm {
                    u[i * ucols + j] /= norm;
                }
                return true;
            }
        }
        false
    };
    for j in 0..ucols {
        let empty = (0..tm).all(|i| u[i * ucols + j] == 0.0);
        if empty && !fill_from(&mut u, j) {
            return (Vec::new(), None, None, false);
        }
    }

    let mut vs = vec![0.0; tn * tn];
    for (new_j, &old_j) in order.iter().enumerate() {
        for i in 0..tn {
            vs[i * tn + new_j] = v[i * tn + old_j];
        }
    }

    (
        s,
        Some(Dense::with_data(tm, ucols, u)),
        Some(Dense::with_data(tn, tn, vs)),
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn reconstruct(svd: &Svd, m: usize, n: usize) -> Dense {
        let u = svd.u();
        let v = svd.v();
        let s = svd.values(None);
        let k = s.len();
        let mut sigma = Dense::new(u.cols(), k);
        for (i, &si) in s.iter().enumerate() {
            sigma.put(i, i, si);
        }
        let mut us = Dense::default();
        us.mul(&u, &sigma);
        let mut back = Dense::default();
        back.mul(&us, &v.t());
        assert_eq!(back.dims(), (m, n));
        back
    }

    #[test]
    fn diagonal_singular_values() {
        let a = Dense::with_data(2, 2, vec![3.0, 0.0, 0.0, 4.0]);
        let mut svd = Svd::default();
        assert!(svd.factorize(&a, SvdKind::Values));
        let s = svd.values(None);
        assert!((s[0] - 4.0).abs() < 1e-12);
        assert!((s[1] - 3.0).abs() < 1e-12);
        assert!((svd.cond() - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn values_kind_refuses_vectors() {
        let a = Dense::with_data(2, 2, vec![3.0, 0.0, 0.0, 4.0]);
        let mut svd = Svd::default();
        assert!(svd.factorize(&a, SvdKind::Values));
        let got = catch_unwind(AssertUnwindSafe(|| svd.u())).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), BAD_SVD);
    }

    #[test]
    fn thin_reconstructs_tall_matrix() {
        let a = Dense::with_data(4, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let mut svd = Svd::default();
        assert!(svd.factorize(&a, SvdKind::Thin));
        assert_eq!(svd.u().dims(), (4, 2));
        assert_eq!(svd.v().dims(), (2, 2));
        let back = reconstruct(&svd, 4, 2);
        for i in 0..4 {
            for j in 0..2 {
                assert!((back.at(i, j) - a.at(i, j)).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn full_kind_gives_square_u() {
        let a = Dense::with_data(4, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let mut svd = Svd::default();
        assert!(svd.factorize(&a, SvdKind::Full));
        let u = svd.u();
        assert_eq!(u.dims(), (4, 4));
        // U must be orthonormal including the completed columns.
        let mut utu = Dense::default();
        utu.mul(&u.t(), &u);
        for i in 0..4 {
            for j in 0..4 {
                let want = if i == j { 1.0 } else { 0.0 };
                assert!((utu.at(i, j) - want).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn wide_matrix_swaps_roles() {
        let a = Dense::with_data(2, 3, vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        let mut svd = Svd::default();
        assert!(svd.factorize(&a, SvdKind::Thin));
        assert_eq!(svd.u().dims(), (2, 2));
        assert_eq!(svd.v().dims(), (3, 2));
        let back = reconstruct(&svd, 2, 3);
        for i in 0..2 {
            for j in 0..3 {
                assert!((back.at(i, j) - a.at(i, j)).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn values_agree_across_kinds() {
        let a = Dense::with_data(3, 3, vec![2.0, -1.0, 0.5, 1.0, 3.0, -2.0, 0.0, 1.0, 1.0]);
        let mut only = Svd::default();
        let mut thin = Svd::default();
        let mut full = Svd::default();
        assert!(only.factorize(&a, SvdKind::Values));
        assert!(thin.factorize(&a, SvdKind::Thin));
        assert!(full.factorize(&a, SvdKind::Full));
        let (a_, b_, c_) = (only.values(None), thin.values(None), full.values(None));
        for i in 0..3 {
            assert!((a_[i] - b_[i]).abs() < 1e-12);
            assert!((a_[i] - c_[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn empty_queries_panic() {
        let svd = Svd::default();
        let got = catch_unwind(AssertUnwindSafe(|| svd.cond())).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), BAD_SVD);
    }
}
