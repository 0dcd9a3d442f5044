//! Generalized singular value decomposition of a matrix pair.
//!
//! For an r x c matrix A and a p x c matrix B, the factorization is
//!
//! ```text
//! A = U * Σ₁ * [ 0 R ] * Q^T
//! B = V * Σ₂ * [ 0 R ] * Q^T
//! ```
//!
//! with orthogonal U, V, Q and diagonal Σ₁, Σ₂ whose entries pair up as
//! cos/sin values. It is computed here by the textbook route: a QR of the
//! stacked pair, a CS decomposition of the Q blocks (through the SVD of
//! the lower block), and an RQ step to restore triangular form.

use bitflags::bitflags;

use crate::error::{BAD_GSVD, ERR_SHAPE, ERR_SLICE_LENGTH_MISMATCH};
use crate::factor::svd::{Svd, SvdKind};
use crate::kernel;
use crate::matrix::{Dense, Matrix};

bitflags! {
    /// Which orthogonal factors to materialize. The empty set computes
    /// only the generalized values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GsvdKind: u8 {
        const U = 1 << 0;
        const V = 1 << 1;
        const Q = 1 << 2;
    }
}

/// Generalized singular value decomposition of a matrix pair.
pub struct Gsvd {
    kind: Option<GsvdKind>,
    r: usize,
    p: usize,
    c: usize,
    k: usize,
    l: usize,
    s1: Vec<f64>,
    s2: Vec<f64>,
    t: Option<Dense>,
    u: Option<Dense>,
    v: Option<Dense>,
    q: Option<Dense>,
}

impl Default for Gsvd {
    fn default() -> Gsvd {
        Gsvd {
            kind: None,
            r: 0,
            p: 0,
            c: 0,
            k: 0,
            l: 0,
            s1: Vec::new(),
            s2: Vec::new(),
            t: None,
            u: None,
            v: None,
            q: None,
        }
    }
}

// Generalized values this close to zero are structural zeros of the
// identity block.
const VALUE_TOL: f64 = 1e-13;

impl Gsvd {
    fn check_valid(&self) -> GsvdKind {
        match self.kind {
            Some(k) => k,
            None => panic!("{}", BAD_GSVD),
        }
    }

    /// Computes the GSVD of the pair (`a`, `b`), which must share a column
    /// count. Returns whether the decomposition succeeded; the stacked
    /// pair must have full column rank (in particular at least as many
    /// total rows as columns). On failure the receiver is reset.
    pub fn factorize(&mut self, a: &dyn Matrix, b: &dyn Matrix, kind: GsvdKind) -> bool {
        let (r, c) = a.dims();
        let (p, bc) = b.dims();
        if bc != c {
            panic!("{}", ERR_SHAPE);
        }
        if r + p < c {
            self.reset();
            return false;
        }
        let m = r + p;

        // QR of the stacked pair.
        let mut z = vec![0.0; m * c];
        for i in 0..r {
            for j in 0..c {
                z[i * c + j] = a.at(i, j);
            }
        }
        for i in 0..p {
            for j in 0..c {
                z[(r + i) * c + j] = b.at(i, j);
            }
        }
        let mut tau = vec![0.0; c];
        kernel::householder_qr(m, c, &mut z, c, &mut tau);

        let mut rmat = vec![0.0; c * c];
        for i in 0..c {
            for j in i..c {
                rmat[i * c + j] = z[i * c + j];
            }
        }
        let rnorm = kernel::norm1(c, c, &rmat, c);
        for j in 0..c {
            if rmat[j * c + j].abs() <= f64::EPSILON * rnorm * c as f64 {
                // Rank-deficient stack.
                self.reset();
                return false;
            }
        }

        // Thin Q of the stack, split into its A and B blocks.
        let mut qthin = vec![0.0; m * c];
        for j in 0..c {
            qthin[j * c + j] = 1.0;
        }
        kernel::apply_q(false, m, c, &z, c, &tau, &mut qthin, c, c);
        let q1 = Dense::with_data(r, c, qthin[..r * c].to_vec());
        let q2 = Dense::with_data(p, c, qthin[r * c..].to_vec());

        // CS decomposition through the SVD of the B block.
        let mut svd = Svd::default();
        if !svd.factorize(&q2, SvdKind::Full) {
            self.reset();
            return false;
        }
        let s_desc = svd.values(None);
        let v_svd = svd.v();
        let u_svd = svd.u();

        // Per-column sine values, ascending so the identity block of Σ₁
        // comes first; the SVD's descending order reverses.
        let mut beta = vec![0.0; c];
        for (j, &s) in s_desc.iter().enumerate() {
            beta[j] = s.min(1.0);
        }
        let order: Vec<usize> = (0..c).rev().collect();
        let beta: Vec<f64> = order.iter().map(|&j| beta[j]).collect();
        let alpha: Vec<f64> = beta.iter().map(|&b| (1.0 - b * b).max(0.0).sqrt()).collect();
        let k = beta.iter().take_while(|&&b| b <= VALUE_TOL).count();
        let l = c - k;

        // W: right singular vectors in ascending-sine order.
        let mut w = Dense::new(c, c);
        for (new_j, &old_j) in order.iter().enumerate() {
            for i in 0..c {
                w.put(i, new_j, v_svd.at(i, old_j));
            }
        }

        // M = W^T R, then the RQ step M = T * Qrq via the flip trick:
        // QR of (J M)^T gives T = J R1^T J and Qrq = J Q1^T.
        let rdense = Dense::with_data(c, c, rmat);
        let mut mmat = Dense::default();
        mmat.mul(&w.t(), &rdense);
        let mut flip = vec![0.0; c * c];
        for i in 0..c {
            for j in 0..c {
                // (J M)^T
                flip[i * c + j] = mmat.at(c - 1 - j, i);
            }
        }
        let mut rq_tau = vec![0.0; c];
        kernel::householder_qr(c, c, &mut flip, c, &mut rq_tau);
        let mut t = Dense::new(c, c);
        for i in 0..c {
            for j in i..c {
                // T = J R1^T J reads the transposed, doubly flipped upper
                // triangle.
                t.put(i, j, flip[(c - 1 - j) * c + (c - 1 - i)]);
            }
        }
        let q_gsvd = if kind.contains(GsvdKind::Q) {
            let mut q1p = vec![0.0; c * c];
            for j in 0..c {
                q1p[j * c + j] = 1.0;
            }
            kernel::apply_q(false, c, c, &flip, c, &rq_tau, &mut q1p, c, c);
            // Q = Qrq^T = (J Q1'^T)^T = Q1' J.
            let mut q = Dense::new(c, c);
            for i in 0..c {
                for j in 0..c {
                    q.put(i, j, q1p[i * c + (c - 1 - j)]);
                }
            }
            Some(q)
        } else {
            None
        };

        let u_gsvd = if kind.contains(GsvdKind::U) {
            let mut q1w = Dense::default();
            q1w.mul(&q1, &w);
            Some(orthonormal_from_scaled(&q1w, &alpha, r))
        } else {
            None
        };
        let v_gsvd = if kind.contains(GsvdKind::V) {
            // Columns of V pair with the positive sines, which live at
            // ordered positions k.., i.e. descending SVD positions l-1..0.
            let mut v = Dense::new(p, p);
            for i in 0..l.min(p) {
                let old = order[k + i];
                for row in 0..p {
                    v.put(row, i, u_svd.at(row, old));
                }
            }
            complete_basis(&mut v);
            Some(v)
        } else {
            None
        };

        self.kind = Some(kind);
        self.r = r;
        self.p = p;
        self.c = c;
        self.k = k;
        self.l = l;
        self.s1 = alpha;
        self.s2 = beta;
        self.t = Some(t);
        self.u = u_gsvd;
        self.v = v_gsvd;
        self.q = q_gsvd;
        true
    }

    /// Resets the factorization so the receiver can be reused.
    pub fn reset(&mut self) {
        *self = Gsvd::default();
    }

    /// The (k, l) split of the rank of the stacked pair: k generalized
    /// values are infinite (B's side is zero) and l are finite.
    pub fn rank(&self) -> (usize, usize) {
        self.check_valid();
        (self.k, self.l)
    }

    /// The generalized singular values α_i/β_i for the finite block. A
    /// non-empty `dst` must have length min(r, c) - k.
    pub fn generalized_values(&self, dst: Option<&mut [f64]>) -> Vec<f64> {
        self.check_valid();
        let d = self.r.min(self.c);
        let vals: Vec<f64> = (self.k..d).map(|i| self.s1[i] / self.s2[i]).collect();
        fill_or_clone(vals, dst)
    }

    /// The cosine values α_i of the finite block.
    pub fn values_a(&self, dst: Option<&mut [f64]>) -> Vec<f64> {
        self.check_valid();
        let d = self.r.min(self.c);
        fill_or_clone(self.s1[self.k..d].to_vec(), dst)
    }

    /// The sine values β_i of the finite block.
    pub fn values_b(&self, dst: Option<&mut [f64]>) -> Vec<f64> {
        self.check_valid();
        let d = self.r.min(self.c);
        fill_or_clone(self.s2[self.k..d].to_vec(), dst)
    }

    /// The (k+l) x c matrix `[ 0 R ]`.
    pub fn zero_r(&self) -> Dense {
        self.check_valid();
        Dense::copy_of(self.t.as_ref().expect("triangular factor always stored"))
    }

    /// The r x (k+l) diagonal factor Σ₁.
    pub fn sigma_a(&self) -> Dense {
        self.check_valid();
        let kl = self.k + self.l;
        let mut m = Dense::new(self.r, kl);
        for i in 0..self.k.min(self.r) {
            m.put(i, i, 1.0);
        }
        for i in self.k..kl.min(self.r) {
            m.put(i, i, self.s1[i]);
        }
        m
    }

    /// The p x (k+l) diagonal factor Σ₂.
    pub fn sigma_b(&self) -> Dense {
        self.check_valid();
        let kl = self.k + self.l;
        let mut m = Dense::new(self.p, kl);
        for i in 0..self.l.min(self.p) {
            m.put(i, self.k + i, self.s2[self.k + i]);
        }
        m
    }

    /// The r x r orthogonal factor U. Panics unless requested at
    /// factorization time.
    pub fn u(&self) -> Dense {
        if !self.check_valid().contains(GsvdKind::U) {
            panic!("{}", BAD_GSVD);
        }
        Dense::copy_of(self.u.as_ref().expect("kind bit checked"))
    }

    /// The p x p orthogonal factor V. Panics unless requested at
    /// factorization time.
    pub fn v(&self) -> Dense {
        if !self.check_valid().contains(GsvdKind::V) {
            panic!("{}", BAD_GSVD);
        }
        Dense::copy_of(self.v.as_ref().expect("kind bit checked"))
    }

    /// The c x c orthogonal factor Q. Panics unless requested at
    /// factorization time.
    pub fn q(&self) -> Dense {
        if !self.check_valid().contains(GsvdKind::Q) {
            panic!("{}", BAD_GSVD);
        }
        Dense::copy_of(self.q.as_ref().expect("kind bit checked"))
    }
}

fn fill_or_clone(vals: Vec<f64>, dst: Option<&mut [f64]>) -> Vec<f64> {
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

/// Builds an orthogonal rows x rows matrix whose j-th column is the j-th
/// column of `scaled` divided by `norms[j]`, completing negligible
/// columns to a full basis.
fn orthonormal_from_scaled(scaled: &Dense, norms: &[f64], rows: usize) -> Dense {
    let mut u = Dense::new(rows, rows);
    let cols = scaled.cols().min(rows);
    for j in 0..cols {
        if norms[j] > VALUE_TOL {
            for i in 0..rows {
                u.put(i, j, scaled.at(i, j) / norms[j]);
            }
        }
    }
    complete_basis(&mut u);
    u
}

/// Fills every zero column of `u` (all columns are unit or zero) with unit
/// vectors orthogonal to the columns already present.
fn complete_basis(u: &mut Dense) {
    let n = u.rows();
    for j in 0..u.cols() {
        let empty = (0..n).all(|i| u.at(i, j) == 0.0);
        if !empty {
            continue;
        }
        'cand: for cand in 0..n {
            let mut col = vec![0.0; n];
            col[cand] = 1.0;
            for k in 0..u.cols() {
                if k == j {
                    continue;
                }
                let mut dot = 0.0;
                for i in 0..n {
                    dot += col[i] * u.at(i, k);
                }
                for i in 0..n {
                    col[i] -= dot * u.at(i, k);
                }
            }
            let norm = col.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.5 {
                for (i, &v) in col.iter().enumerate() {
                    u.put(i, j, v / norm);
                }
                break 'cand;
            }
        }
    }
}
