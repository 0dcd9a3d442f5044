//! Higher-order generalized singular value decomposition of three or more
//! matrices sharing a column count.
//!
//! Each factor decomposes as `A_i = U_i * Σ_i * V^T` with a common V,
//! computed from the eigendecomposition of the mean of the pairwise
//! Gram-product quotients `D_i * D_j^-1`.

use crate::error::{Error, BAD_HOGSVD, ERR_SHAPE, ERR_SLICE_LENGTH_MISMATCH, ERR_ZERO_LENGTH};
use crate::factor::{Cholesky, Eigen, Lu};
use crate::matrix::{Dense, Matrix, SymDense, Transpose};

/// Higher-order GSVD of N >= 3 tall matrices with a shared column count.
pub struct HogSvd {
    v: Option<Dense>,
    b: Vec<Dense>,
}

impl Default for HogSvd {
    fn default() -> HogSvd {
        HogSvd {
            v: None,
            b: Vec::new(),
        }
    }
}

impl HogSvd {
    fn check_valid(&self) {
        if self.v.is_none() {
            panic!("{}", BAD_HOGSVD);
        }
    }

    /// Computes the decomposition of the given matrices. Every input must
    /// have at least as many rows as columns; wide inputs make the
    /// pairwise-product step ill-posed and fail the factorization
    /// outright, as does any input whose Gram matrix is not positive
    /// definite. On failure the receiver is reset.
    pub fn factorize(&mut self, mats: &[&dyn Matrix]) -> bool {
        if mats.is_empty() {
            panic!("{}", ERR_ZERO_LENGTH);
        }
        let (_, c) = mats[0].dims();
        for m in mats {
            let (ri, ci) = m.dims();
            if ci != c {
                panic!("{}", ERR_SHAPE);
            }
            if ri < ci {
                self.reset();
                return false;
            }
        }
        let n = mats.len();
        if n < 3 {
            self.reset();
            return false;
        }

        // Gram matrices and their inverses through Cholesky; a failed
        // Cholesky means a rank-deficient input.
        let mut grams: Vec<Dense> = Vec::with_capacity(n);
        let mut inverses: Vec<Dense> = Vec::with_capacity(n);
        for m in mats {
            let mut d = SymDense::default();
            d.sym_outer_k(1.0, &Transpose(*m));
            let mut chol = Cholesky::default();
            if !chol.factorize(&d) {
                self.reset();
                return false;
            }
            let mut inv = SymDense::default();
            match chol.inverse_to(&mut inv) {
                Ok(()) => {}
                Err(Error::Condition(cond)) if cond.is_finite() => {
                    // Numerically suspect but usable.
                }
                Err(_) => {
                    self.reset();
                    return false;
                }
            }
            grams.push(Dense::copy_of(&d));
            inverses.push(Dense::copy_of(&inv));
        }

        let mut s = Dense::new(c, c);
        let mut prod = Dense::default();
        for i in 0..n {
            for j in i + 1..n {
                prod.mul(&grams[i], &inverses[j]);
                let tmp = Dense::copy_of(&s);
                s.add(&tmp, &prod);
                prod.mul(&grams[j], &inverses[i]);
                let tmp = Dense::copy_of(&s);
                s.add(&tmp, &prod);
            }
        }
        let scale = 1.0 / (n * (n - 1)) as f64;
        let tmp = Dense::copy_of(&s);
        s.scale(scale, &tmp);

        // The shared right basis comes from the eigenvectors of S. The
        // construction makes the eigenvalues real; only roundoff leaks
        // into the imaginary parts.
        let mut eig = Eigen::default();
        if !eig.factorize(&s, false, true) {
            self.reset();
            return false;
        }
        let v = eig.vectors();

        // U_i Σ_i = A_i V^-T, column norms are the values.
        let mut vt_lu = Lu::default();
        vt_lu.factorize(&v.t());
        let mut b = Vec::with_capacity(n);
        for m in mats {
            let mut xt = Dense::default();
            match vt_lu.solve_to(&mut xt, false, &Transpose(*m)) {
                Ok(()) => {}
                Err(Error::Condition(cond)) if cond.is_finite() => {}
                Err(_) => {
                    self.reset();
                    return false;
                }
            }
            b.push(Dense::copy_of(&xt.t()));
        }

        self.v = Some(v);
        self.b = b;
        true
    }

    /// Resets the factorization so the receiver can be reused.
    pub fn reset(&mut self) {
        self.v = None;
        self.b.clear();
    }

    /// The number of factorized matrices.
    pub fn len(&self) -> usize {
        self.check_valid();
        self.b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v.is_none()
    }

    /// The singular values of the i-th factorized matrix. A non-empty
    /// `dst` must have length c.
    pub fn values(&self, i: usize, dst: Option<&mut [f64]>) -> Vec<f64> {
        self.check_valid();
        let bi = &self.b[i];
        let (r, c) = bi.dims();
        let vals: Vec<f64> = (0..c)
            .map(|j| {
                let mut acc = 0.0;
                for row in 0..r {
                    acc += bi.at(row, j) * bi.at(row, j);
                }
                acc.sqrt()
            })
            .collect();
        match dst {
            Some(out) => {
                if out.len() != vals.len() {
                    panic!("{}", ERR_SLICE_LENGTH_MISMATCH);
                }
                out.copy_from_slice(&vals);
                vals
            }
            None => vals,
        }
    }

    /// The left factor U_i of the i-th matrix: the value-scaled columns of
    /// `A_i V^-T` normalized to unit length.
    pub fn u(&self, i: usize) -> Dense {
        self.check_valid();
        let bi = &self.b[i];
        let (r, c) = bi.dims();
        let vals = self.values(i, None);
        let mut u = Dense::new(r, c);
        for j in 0..c {
            if vals[j] == 0.0 {
                continue;
            }
            for row in 0..r {
                u.put(row, j, bi.at(row, j) / vals[j]);
            }
        }
        u
    }

    /// The shared right factor V.
    pub fn v(&self) -> Dense {
        self.check_valid();
        Dense::copy_of(self.v.as_ref().expect("validity checked"))
    }
}
