//! Eigendecompositions: a symmetric-specialized solver with real
//! eigenvalues and orthonormal vectors, and a general solver returning
//! complex conjugate pairs.

use num_complex::Complex64;

use crate::error::{BAD_EIGEN, ERR_SLICE_LENGTH_MISMATCH, ERR_SQUARE};
use crate::matrix::{Dense, Matrix, SymDense};

const MAX_SWEEPS: usize = 100;
const HQR_MAX_ITERS: usize = 30;

/// Eigendecomposition of a symmetric matrix: `A = V * D * V^T` with real
/// eigenvalues and orthonormal eigenvectors.
pub struct EigenSym {
    values: Vec<f64>,
    vectors: Option<Dense>,
    valid: bool,
}

impl Default for EigenSym {
    fn default() -> EigenSym {
        EigenSym {
            values: Vec::new(),
            vectors: None,
            valid: false,
        }
    }
}

impl EigenSym {
    /// Computes the eigendecomposition of `a` by cyclic Jacobi rotations,
    /// optionally accumulating the eigenvector matrix. Returns whether the
    /// iteration converged; on failure the receiver is reset.
    pub fn factorize(&mut self, a: &SymDense, vectors: bool) -> bool {
        let n = a.order();
        let mut s = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                s[i * n + j] = a.at(i, j);
            }
        }
        let mut v = vec![0.0; n * n];
        for i in 0..n {
            v[i * n + i] = 1.0;
        }

        let tol = f64::EPSILON * 100.0;
        let mut converged = false;
        for _ in 0..MAX_SWEEPS {
            let mut off = 0.0;
            for i in 0..n {
                for j in i + 1..n {
                    off += s[i * n + j] * s[i * n + j];
                }
            }
            if off.sqrt() < tol {
                converged = true;
                break;
            }
            for p in 0..n {
                for q in p + 1..n {
                    let apq = s[p * n + q];
                    if apq.abs() < tol {
                        continue;
                    }
                    let app = s[p * n + p];
                    let aqq = s[q * n + q];
                    let theta = (aqq - app) / (2.0 * apq);
                    let t = if theta >= 0.0 {
                        1.0 / (theta + (1.0 + theta * theta).sqrt())
                    } else {
                        -1.0 / (-theta + (1.0 + theta * theta).sqrt())
                    };
                    let cs = 1.0 / (1.0 + t * t).sqrt();
                    let sn = t * cs;

                    s[p * n + p] = app - t * apq;
                    s[q * n + q] = aqq + t * apq;
                    s[p * n + q] = 0.0;
                    s[q * n + p] = 0.0;
                    for r in 0..n {
                        if r == p || r == q {
                            continue;
                        }
                        let srp = s[r * n + p];
                        let srq = s[r * n + q];
                        let rp = cs * srp - sn * srq;
                        let rq = sn * srp + cs * srq;
                        s[r * n + p] = rp;
                        s[p * n + r] = rp;
                        s[r * n + q] = rq;
                        s[q * n + r] = rq;
                    }
                    for i in 0..n {
                        let vp = v[i * n + p];
                        let vq = v[i * n + q];
                        v[i * n + p] = cs * vp - sn * vq;
                        v[i * n + q] = sn * vp + cs * vq;
                    }
                }
            }
        }
        if !converged {
            self.reset();
            return false;
        }

        // Ascending eigenvalue order, the convention of symmetric
        // eigensolvers.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            s[a * n + a]
                .partial_cmp(&s[b * n + b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.values = order.iter().map(|&i| s[i * n + i]).collect();
        self.vectors = if vectors {
            let mut sorted = Dense::new(n, n);
            for (new_j, &old_j) in order.iter().enumerate() {
                for i in 0..n {
                    sorted.put(i, new_j, v[i * n + old_j]);
                }
            }
            Some(sorted)
        } else {
            None
        };
        self.valid = true;
        true
    }

    /// Resets the factorization so the receiver can be reused.
    pub fn reset(&mut self) {
        self.values.clear();
        self.vectors = None;
        self.valid = false;
    }

    /// The eigenvalues in ascending order. A non-empty `dst` must have
    /// length n and is filled in place.
    pub fn values(&self, dst: Option<&mut [f64]>) -> Vec<f64> {
        if !self.valid {
            panic!("{}", BAD_EIGEN);
        }
        match dst {
            Some(out) => {
                if out.len() != self.values.len() {
                    panic!("{}", ERR_SLICE_LENGTH_MISMATCH);
                }
                out.copy_from_slice(&self.values);
                out.to_vec()
            }
            None => self.values.clone(),
        }
    }

    /// The orthonormal eigenvector matrix, columns ordered like the
    /// eigenvalues. Panics when the decomposition was computed without
    /// vectors.
    pub fn vectors(&self) -> Dense {
        match &self.vectors {
            Some(v) if self.valid => Dense::copy_of(v),
            _ => panic!("{}", BAD_EIGEN),
        }
    }
}

/// Eigendecomposition of a general square matrix. Eigenvalues are
/// returned as complex conjugate pairs; left and right eigenvector
/// computation is chosen at factorization time since it dominates the
/// cost.
pub struct Eigen {
    values: Vec<Complex64>,
    right: Option<Dense>,
    left: Option<Dense>,
    valid: bool,
}

impl Default for Eigen {
    fn default() -> Eigen {
        Eigen {
            values: Vec::new(),
            right: None,
            left: None,
            valid: false,
        }
    }
}

impl Eigen {
    /// Computes the eigendecomposition of the square matrix `a`,
    /// optionally with left and/or right eigenvectors. Returns whether the
    /// eigenvalue iteration converged; on failure the receiver is reset.
    pub fn factorize(&mut self, a: &dyn Matrix, left: bool, right: bool) -> bool {
        let (r, c) = a.dims();
        if r != c {
            panic!("{}", ERR_SQUARE);
        }
        let n = r;
        let mut h = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                h[i * n + j] = a.at(i, j);
            }
        }
        balance(n, &mut h);
        hessenberg(n, &mut h);
        let values = match hqr(n, &mut h) {
            Some(v) => v,
            None => {
                self.reset();
                return false;
            }
        };

        self.right = if right {
            Some(eigenvectors_via_inverse_iteration(a, &values, false))
        } else {
            None
        };
        self.left = if left {
            Some(eigenvectors_via_inverse_iteration(a, &values, true))
        } else {
            None
        };
        self.values = values;
        self.valid = true;
        true
    }

    /// Resets the factorization so the receiver can be reused.
    pub fn reset(&mut self) {
        self.values.clear();
        self.right = None;
        self.left = None;
        self.valid = false;
    }

    /// The eigenvalues; members of a complex conjugate pair are adjacent,
    /// the one with positive imaginary part second.
    pub fn values(&self, dst: Option<&mut [Complex64]>) -> Vec<Complex64> {
        if !self.valid {
            panic!("{}", BAD_EIGEN);
        }
        match dst {
            Some(out) => {
                if out.len() != self.values.len() {
                    panic!("{}", ERR_SLICE_LENGTH_MISMATCH);
                }
                out.copy_from_slice(&self.values);
                out.to_vec()
            }
            None => self.values.clone(),
        }
    }

    /// The right eigenvectors, packed as real columns: a real eigenvalue
    /// owns one column; a complex pair at positions (j, j+1) stores the
    /// real part in column j and the imaginary part in column j+1, so the
    /// eigenvectors are `col_j ± i*col_{j+1}`.
    pub fn vectors(&self) -> Dense {
        match &self.right {
            Some(v) if self.valid => Dense::copy_of(v),
            _ => panic!("{}", BAD_EIGEN),
        }
    }

    /// The left eigenvectors, packed like [`Eigen::vectors`].
    pub fn left_vectors(&self) -> Dense {
        match &self.left {
            Some(v) if self.valid => Dense::copy_of(v),
            _ => panic!("{}", BAD_EIGEN),
        }
    }
}

/// Diagonal similarity scaling that roughly equalizes row and column
/// norms, improving eigenvalue accuracy. Radix-2 scaling is exact, so the
/// eigenvalues are unchanged.
fn balance(n: usize, a: &mut [f64]) {
    const RADIX: f64 = 2.0;
    let sqrdx = RADIX * RADIX;
    loop {
        let mut done = true;
        for i in 0..n {
            let mut c = 0.0;
            let mut r = 0.0;
            for j in 0..n {
                if j != i {
                    c += a[j * n + i].abs();
                    r += a[i * n + j].abs();
                }
            }
            if c != 0.0 && r != 0.0 {
                let mut g = r / RADIX;
                let mut f = 1.0;
                let s = c + r;
                let mut c = c;
                while c < g {
                    f *= RADIX;
                    c *= sqrdx;
                }
                g = r * RADIX;
                while c > g {
                    f /= RADIX;
                    c /= sqrdx;
                }
                if (c + r) / f < 0.95 * s {
                    done = false;
                    let ginv = 1.0 / f;
                    for j in 0..n {
                        a[i * n + j] *= ginv;
                    }
                    for j in 0..n {
                        a[j * n + i] *= f;
                    }
                }
            }
        }
        if done {
            return;
        }
    }
}

/// Householder reduction to upper Hessenberg form, in place.
fn hessenberg(n: usize, a: &mut [f64]) {
    if n < 3 {
        return;
    }
    for k in 0..n - 2 {
        let mut xnorm_sq = 0.0;
        for i in k + 2..n {
            xnorm_sq += a[i * n + k] * a[i * n + k];
        }
        let alpha = a[(k + 1) * n + k];
        if xnorm_sq == 0.0 {
            continue;
        }
        let norm = (alpha * alpha + xnorm_sq).sqrt();
        let beta = if alpha >= 0.0 { -norm } else { norm };
        let tau = (beta - alpha) / beta;
        let inv = 1.0 / (alpha - beta);
        // v has an implicit one at k+1.
        let mut v = vec![0.0; n];
        v[k + 1] = 1.0;
        for i in k + 2..n {
            v[i] = a[i * n + k] * inv;
        }
        a[(k + 1) * n + k] = beta;
        for i in k + 2..n {
            a[i * n + k] = 0.0;
        }
        // A <- H A with H = I - tau v v^T, applied to columns k+1...
        for j in k + 1..n {
            let mut w = 0.0;
            for i in k + 1..n {
                w += v[i] * a[i * n + j];
            }
            w *= tau;
            for i in k + 1..n {
                a[i * n + j] -= v[i] * w;
            }
        }
        // A <- A H.
        for i in 0..n {
            let mut w = 0.0;
            for j in k + 1..n {
                w += a[i * n + j] * v[j];
            }
            w *= tau;
            for j in k + 1..n {
                a[i * n + j] -= w * v[j];
            }
        }
    }
}

/// Francis double-shift QR iteration on an upper Hessenberg matrix,
/// returning all eigenvalues, or `None` if an eigenvalue fails to
/// converge.
fn hqr(n: usize, h: &mut [f64]) -> Option<Vec<Complex64>> {
    if n == 0 {
        return Some(Vec::new());
    }
    let eps = f64::EPSILON;
    let mut values = vec![Complex64::new(0.0, 0.0); n];
    let mut anorm = 0.0;
    for i in 0..n {
        for j in i.saturating_sub(1)..n {
            anorm += h[i * n + j].abs();
        }
    }
    let mut t = 0.0;
    let mut nn = n as isize - 1;
    while nn >= 0 {
        let mut its = 0usize;
        loop {
            // Look for a negligible subdiagonal element.
            let mut l = nn;
            while l >= 1 {
                let (lu, l1) = (l as usize, (l - 1) as usize);
                let mut s = h[l1 * n + l1].abs() + h[lu * n + lu].abs();
                if s == 0.0 {
                    s = anorm;
                }
                if h[lu * n + l1].abs() <= eps * s {
                    h[lu * n + l1] = 0.0;
                    break;
                }
                l -= 1;
            }
            let nu = nn as usize;
            let mut x = h[nu * n + nu];
            if l == nn {
                // One real root found.
                values[nu] = Complex64::new(x + t, 0.0);
                nn -= 1;
                break;
            }
            let n1 = (nn - 1) as usize;
            let mut y = h[n1 * n + n1];
            let mut w = h[nu * n + n1] * h[n1 * n + nu];
            if l == nn - 1 {
                // A 2x2 block: two roots, real or a conjugate pair.
                let p = 0.5 * (y - x);
                let q = p * p + w;
                let z = q.abs().sqrt();
                x += t;
                if q >= 0.0 {
                    let z = p + if p >= 0.0 { z } else { -z };
                    let r1 = x + z;
                    let r2 = if z != 0.0 { x - w / z } else { r1 };
                    values[n1] = Complex64::new(r1, 0.0);
                    values[nu] = Complex64::new(r2, 0.0);
                } else {
                    values[n1] = Complex64::new(x + p, -z);
                    values[nu] = Complex64::new(x + p, z);
                }
                nn -= 2;
                break;
            }
            if its == HQR_MAX_ITERS {
                return None;
            }
            if its == 10 || its == 20 {
                // Exceptional shift to break cycling.
                t += x;
                for i in 0..=nu {
                    h[i * n + i] -= x;
                }
                let s = h[nu * n + n1].abs() + h[n1 * n + (nn - 2) as usize].abs();
                x = 0.75 * s;
                y = x;
                w = -0.4375 * s * s;
            }
            its += 1;

            // Form the double shift and find two consecutive small
            // subdiagonals.
            let mut m = nn - 2;
            let (mut p, mut q, mut r) = (0.0, 0.0, 0.0);
            while m >= l {
                let mu = m as usize;
                let z = h[mu * n + mu];
                let rr = x - z;
                let ss = y - z;
                p = (rr * ss - w) / h[(mu + 1) * n + mu] + h[mu * n + mu + 1];
                q = h[(mu + 1) * n + mu + 1] - z - rr - ss;
                r = h[(mu + 2) * n + mu + 1];
                let s = p.abs() + q.abs() + r.abs();
                p /= s;
                q /= s;
                r /= s;
                if m == l {
                    break;
                }
                let u = h[mu * n + mu - 1].abs() * (q.abs() + r.abs());
                let v = p.abs()
                    * (h[(mu - 1) * n + mu - 1].abs() + z.abs() + h[(mu + 1) * n + mu + 1].abs());
                if u <= eps * v {
                    break;
                }
                m -= 1;
            }
            for i in (m + 2)..=nn {
                let iu = i as usize;
                h[iu * n + iu - 2] = 0.0;
                if i > m + 2 {
                    h[iu * n + iu - 3] = 0.0;
                }
            }

            // Double QR sweep over rows l..=nn.
            let mut k = m;
            while k <= nn - 1 {
                let ku = k as usize;
                if k != m {
                    p = h[ku * n + ku - 1];
                    q = h[(ku + 1) * n + ku - 1];
                    r = if k != nn - 1 { h[(ku + 2) * n + ku - 1] } else { 0.0 };
                    x = p.abs() + q.abs() + r.abs();
                    if x != 0.0 {
                        p /= x;
                        q /= x;
                        r /= x;
                    }
                }
                let mut s = (p * p + q * q + r * r).sqrt();
                if p < 0.0 {
                    s = -s;
                }
                if s == 0.0 {
                    k += 1;
                    continue;
                }
                if k == m {
                    if l != m {
                        h[ku * n + ku - 1] = -h[ku * n + ku - 1];
                    }
                } else {
                    h[ku * n + ku - 1] = -s * x;
                }
                p += s;
                x = p / s;
                y = q / s;
                let z = r / s;
                q /= p;
                r /= p;
                for j in ku..=nu {
                    let mut pp = h[ku * n + j] + q * h[(ku + 1) * n + j];
                    if k != nn - 1 {
                        pp += r * h[(ku + 2) * n + j];
                        h[(ku + 2) * n + j] -= pp * z;
                    }
                    h[(ku + 1) * n + j] -= pp * y;
                    h[ku * n + j] -= pp * x;
                }
                let mmin = if nn < k + 3 { nu } else { ku + 3 };
                for i in (l as usize)..=mmin {
                    let mut pp = x * h[i * n + ku] + y * h[i * n + ku + 1];
                    if k != nn - 1 {
                        pp += z * h[i * n + ku + 2];
                        h[i * n + ku + 2] -= pp * r;
                    }
                    h[i * n + ku + 1] -= pp * q;
                    h[i * n + ku] -= pp;
                }
                k += 1;
            }
        }
    }
    Some(values)
}

/// Packs eigenvectors for the given eigenvalues into real columns via
/// inverse iteration with a complex elimination solve. `transpose`
/// selects left eigenvectors.
fn eigenvectors_via_inverse_iteration(
    a: &dyn Matrix,
    values: &[Complex64],
    transpose: bool,
) -> Dense {
    let n = values.len();
    let mut out = Dense::new(n, n);
    let mut j = 0;
    while j < n {
        let lambda = values[j];
        let v = inverse_iterate(a, lambda, transpose);
        if lambda.im != 0.0 && j + 1 < n && values[j + 1].im != 0.0 {
            // A conjugate pair: store the real and imaginary parts in the
            // two adjacent columns. The pair is ordered (λ̄, λ), so the
            // vector for the positive-imaginary member defines the
            // columns.
            let vpos = if values[j + 1].im > 0.0 {
                inverse_iterate(a, values[j + 1], transpose)
            } else {
                v
            };
            for i in 0..n {
                out.put(i, j, vpos[i].re);
                out.put(i, j + 1, vpos[i].im);
            }
            j += 2;
        } else {
            for i in 0..n {
                out.put(i, j, v[i].re);
            }
            j += 1;
        }
    }
    out
}

fn inverse_iterate(a: &dyn Matrix, lambda: Complex64, transpose: bool) -> Vec<Complex64> {
    let (n, _) = a.dims();
    // Perturb the shift slightly off the exact eigenvalue so the
    // elimination stays solvable.
    let scale = lambda.norm().max(1.0);
    let mu = lambda + Complex64::new(scale * 1e-10, scale * 1e-10);
    let mut v: Vec<Complex64> = (0..n)
        .map(|i| Complex64::new(1.0 + (i as f64) * 0.01, 0.0))
        .collect();
    normalize(&mut v);
    for _ in 0..3 {
        let mut shifted: Vec<Vec<Complex64>> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|k| {
                        let aval = if transpose { a.at(k, i) } else { a.at(i, k) };
                        let mut z = Complex64::new(aval, 0.0);
                        if i == k {
                            z -= mu;
                        }
                        z
                    })
                    .collect()
            })
            .collect();
        let w = solve_complex(&mut shifted, &v);
        v = w;
        normalize(&mut v);
    }
    // Rotate the phase so the largest component is real and positive,
    // which makes real eigenvectors come out real.
    let mut max_idx = 0;
    for (i, z) in v.iter().enumerate() {
        if z.norm() > v[max_idx].norm() {
            max_idx = i;
        }
    }
    let phase = v[max_idx] / v[max_idx].norm();
    for z in &mut v {
        *z /= phase;
    }
    v
}

fn normalize(v: &mut [Complex64]) {
    let norm = v.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0.0 {
        for z in v.iter_mut() {
            *z /= norm;
        }
    }
}

/// Gaussian elimination with partial pivoting over complex entries.
fn solve_complex(a: &mut [Vec<Complex64>], b: &[Complex64]) -> Vec<Complex64> {
    let n = b.len();
    let mut x = b.to_vec();
    for col in 0..n {
        let mut piv = col;
        for row in col + 1..n {
            if a[row][col].norm() > a[piv][col].norm() {
                piv = row;
            }
        }
        if piv != col {
            a.swap(col, piv);
            x.swap(col, piv);
        }
        if a[col][col].norm() < 1e-300 {
            a[col][col] += Complex64::new(1e-200, 1e-200);
        }
        for row in col + 1..n {
            let f = a[row][col] / a[col][col];
            for k in col..n {
                let v = a[col][k];
                a[row][k] -= f * v;
            }
            let xc = x[col];
            x[row] -= f * xc;
        }
    }
    for i in (0..n).rev() {
        let mut acc = x[i];
        for k in i + 1..n {
            acc -= a[i][k] * x[k];
        }
        x[i] = acc / a[i][i];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn sym_eigen_reconstructs() {
        let a = SymDense::with_data(
            3,
            vec![4.0, 2.0, 1.0, 0.0, 5.0, 3.0, 0.0, 0.0, 6.0],
        );
        let mut eig = EigenSym::default();
        assert!(eig.factorize(&a, true));
        let v = eig.vectors();
        let vals = eig.values(None);
        // V D V^T == A.
        let mut d = Dense::new(3, 3);
        for (i, &val) in vals.iter().enumerate() {
            d.put(i, i, val);
        }
        let mut vd = Dense::default();
        vd.mul(&v, &d);
        let mut back = Dense::default();
        back.mul(&vd, &v.t());
        for i in 0..3 {
            for j in 0..3 {
                assert!((back.at(i, j) - a.at(i, j)).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn sym_eigen_values_ascend() {
        let a = SymDense::with_data(2, vec![1.0, 2.0, 0.0, 1.0]);
        let mut eig = EigenSym::default();
        assert!(eig.factorize(&a, false));
        let vals = eig.values(None);
        // Eigenvalues of [[1,2],[2,1]] are -1 and 3.
        assert!((vals[0] - (-1.0)).abs() < 1e-10);
        assert!((vals[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn sym_eigen_orthonormal_vectors() {
        let a = SymDense::with_data(
            3,
            vec![4.0, 2.0, 1.0, 0.0, 5.0, 3.0, 0.0, 0.0, 6.0],
        );
        let mut eig = EigenSym::default();
        assert!(eig.factorize(&a, true));
        let v = eig.vectors();
        let mut vtv = Dense::default();
        vtv.mul(&v.t(), &v);
        for i in 0..3 {
            for j in 0..3 {
                let want = if i == j { 1.0 } else { 0.0 };
                assert!((vtv.at(i, j) - want).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn general_real_eigenvalues() {
        // Upper triangular: eigenvalues on the diagonal.
        let a = Dense::with_data(3, 3, vec![3.0, 1.0, 0.5, 0.0, 1.0, -1.0, 0.0, 0.0, -2.0]);
        let mut eig = Eigen::default();
        assert!(eig.factorize(&a, false, false));
        let mut got: Vec<f64> = eig.values(None).iter().map(|z| z.re).collect();
        got.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let want = [-2.0, 1.0, 3.0];
        for (g, w) in got.iter().zip(want.iter()) {
            assert!((g - w).abs() < 1e-10, "got {got:?}");
        }
        for z in eig.values(None) {
            assert_eq!(z.im, 0.0);
        }
    }

    #[test]
    fn general_complex_pair() {
        // [[0,-1],[1,0]] rotates the plane: eigenvalues are ±i.
        let a = Dense::with_data(2, 2, vec![0.0, -1.0, 1.0, 0.0]);
        let mut eig = Eigen::default();
        assert!(eig.factorize(&a, false, false));
        let vals = eig.values(None);
        assert!((vals[0].re).abs() < 1e-12);
        assert!((vals[1].re).abs() < 1e-12);
        assert!((vals[0].im + 1.0).abs() < 1e-12);
        assert!((vals[1].im - 1.0).abs() < 1e-12);
    }

    #[test]
    fn right_vectors_satisfy_eigen_equation() {
        let a = Dense::with_data(3, 3, vec![2.0, 0.0, 0.0, 1.0, 5.0, 0.0, -1.0, 2.0, 7.0]);
        let mut eig = Eigen::default();
        assert!(eig.factorize(&a, false, true));
        let vals = eig.values(None);
        let v = eig.vectors();
        for (j, &lambda) in vals.iter().enumerate() {
            assert!(lambda.im.abs() < 1e-9, "expected real spectrum, got {lambda}");
            // ||A v - lambda v|| small relative to ||v|| = 1.
            for i in 0..3 {
                let mut av = 0.0;
                for k in 0..3 {
                    av += a.at(i, k) * v.at(k, j);
                }
                assert!(
                    (av - lambda.re * v.at(i, j)).abs() < 1e-6,
                    "eigenpair {j} residual too large"
                );
            }
        }
    }

    #[test]
    fn complex_pair_vectors_packed_as_re_im() {
        // Block diagonal: rotation block and the eigenvalue 5.
        let a = Dense::with_data(
            3,
            3,
            vec![0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 5.0],
        );
        let mut eig = Eigen::default();
        assert!(eig.factorize(&a, false, true));
        let vals = eig.values(None);
        let v = eig.vectors();
        // Find the pair columns and verify A (vr + i*vi) = lambda (vr + i*vi).
        let mut pair = None;
        for (j, z) in vals.iter().enumerate() {
            if z.im > 0.0 {
                pair = Some((j, *z));
            }
        }
        let (j, lambda) = pair.expect("expected a complex pair");
        let (re_col, im_col) = (j - 1, j);
        for i in 0..3 {
            let mut avr = 0.0;
            let mut avi = 0.0;
            for k in 0..3 {
                avr += a.at(i, k) * v.at(k, re_col);
                avi += a.at(i, k) * v.at(k, im_col);
            }
            let want_r = lambda.re * v.at(i, re_col) - lambda.im * v.at(i, im_col);
            let want_i = lambda.re * v.at(i, im_col) + lambda.im * v.at(i, re_col);
            assert!((avr - want_r).abs() < 1e-6);
            assert!((avi - want_i).abs() < 1e-6);
        }
    }

    #[test]
    fn left_vectors_satisfy_transposed_equation() {
        let a = Dense::with_data(2, 2, vec![4.0, 1.0, 0.0, 2.0]);
        let mut eig = Eigen::default();
        assert!(eig.factorize(&a, true, false));
        let vals = eig.values(None);
        let u = eig.left_vectors();
        for (j, &lambda) in vals.iter().enumerate() {
            for i in 0..2 {
                let mut atv = 0.0;
                for k in 0..2 {
                    atv += a.at(k, i) * u.at(k, j);
                }
                assert!((atv - lambda.re * u.at(i, j)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn empty_queries_panic() {
        let eig = Eigen::default();
        let got = catch_unwind(AssertUnwindSafe(|| eig.values(None))).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), BAD_EIGEN);
        let sym = EigenSym::default();
        let got = catch_unwind(AssertUnwindSafe(|| sym.values(None))).unwrap_err();
        assert_eq!(*got.downcast_ref::<String>().unwrap(), BAD_EIGEN);
    }
}
