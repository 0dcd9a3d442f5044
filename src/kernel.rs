//! Low-level dense kernels shared by the factorizations.
//!
//! Everything here operates on raw row-major slices with an explicit
//! leading dimension, keeping the matrix types out of the innermost loops.
//! The routines are generic over the float type; the engine instantiates
//! them at `f64`.

use num_traits::{Float, NumAssign};

/// Computes the parameters of a Givens rotation zeroing `b`:
/// `[c s; -s c] * [a; b] = [r; 0]`.
pub(crate) fn rotg<F: Float + NumAssign>(a: F, b: F) -> (F, F, F) {
    let scale = a.abs() + b.abs();
    if scale == F::zero() {
        return (F::one(), F::zero(), F::zero());
    }
    let roe = if a.abs() > b.abs() { a } else { b };
    let r = scale * ((a / scale).powi(2) + (b / scale).powi(2)).sqrt();
    let r = r * roe.signum();
    (a / r, b / r, r)
}

/// Applies the rotation `[c s; -s c]` to the vector pair `(x, y)`:
/// `x <- c*x + s*y`, `y <- c*y - s*x`.
pub(crate) fn rot<F: Float + NumAssign>(x: &mut [F], y: &mut [F], c: F, s: F) {
    for (xi, yi) in x.iter_mut().zip(y.iter_mut()) {
        let t = c * *xi + s * *yi;
        *yi = c * *yi - s * *xi;
        *xi = t;
    }
}

/// The Euclidean norm of a contiguous slice.
pub(crate) fn nrm2<F: Float + NumAssign>(x: &[F]) -> F {
    let mut acc = F::zero();
    for &v in x {
        acc += v * v;
    }
    acc.sqrt()
}

/// The 1-norm (maximum absolute column sum) of an r x c block.
pub(crate) fn norm1<F: Float + NumAssign>(r: usize, c: usize, a: &[F], lda: usize) -> F {
    let mut max = F::zero();
    for j in 0..c {
        let mut acc = F::zero();
        for i in 0..r {
            acc += a[i * lda + j].abs();
        }
        if acc > max {
            max = acc;
        }
    }
    max
}

/// Solves `T x = b` (or `T^T x = b`) in place for a triangular `T` stored
/// in the tagged triangle of an n x n block. `x` is strided by `incx`.
/// The diagonal is taken as implicit ones when `unit` is set.
#[allow(clippy::too_many_arguments)]
pub(crate) fn trsv<F: Float + NumAssign>(
    upper: bool,
    trans: bool,
    unit: bool,
    n: usize,
    a: &[F],
    lda: usize,
    x: &mut [F],
    incx: usize,
) {
    if n == 0 {
        return;
    }
    // An upper triangle applied transposed is a forward substitution and
    // vice versa, so the four cases pair up.
    let forward = upper == trans;
    if forward {
        for i in 0..n {
            let mut acc = x[i * incx];
            for j in 0..i {
                let t = if trans { a[j * lda + i] } else { a[i * lda + j] };
                acc -= t * x[j * incx];
            }
            if !unit {
                acc = acc / a[i * lda + i];
            }
            x[i * incx] = acc;
        }
    } else {
        for i in (0..n).rev() {
            let mut acc = x[i * incx];
            for j in i + 1..n {
                let t = if trans { a[j * lda + i] } else { a[i * lda + j] };
                acc -= t * x[j * incx];
            }
            if !unit {
                acc = acc / a[i * lda + i];
            }
            x[i * incx] = acc;
        }
    }
}

/// Computes the LU factorization of an n x n block in place with partial
/// pivoting. `pivot[k]` records the row exchanged with row `k`. The
/// factorization completes even for singular input; a zero pivot leaves
/// its column untouched and shows up as a zero on the diagonal of U.
pub(crate) fn lu_factor<F: Float + NumAssign>(n: usize, a: &mut [F], lda: usize, pivot: &mut [usize]) {
    for k in 0..n {
        let mut p = k;
        let mut max = a[k * lda + k].abs();
        for i in k + 1..n {
            let v = a[i * lda + k].abs();
            if v > max {
                max = v;
                p = i;
            }
        }
        pivot[k] = p;
        if p != k {
            for j in 0..n {
                a.swap(k * lda + j, p * lda + j);
            }
        }
        let diag = a[k * lda + k];
        if diag == F::zero() {
            continue;
        }
        for i in k + 1..n {
            let f = a[i * lda + k] / diag;
            a[i * lda + k] = f;
            for j in k + 1..n {
                let u = a[k * lda + j];
                a[i * lda + j] -= f * u;
            }
        }
    }
}

/// Solves `A x = b` (or `A^T x = b`) from an LU factorization produced by
/// [`lu_factor`], in place over the strided column `x`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn lu_solve<F: Float + NumAssign>(
    n: usize,
    a: &[F],
    lda: usize,
    pivot: &[usize],
    trans: bool,
    x: &mut [F],
    incx: usize,
) {
    if !trans {
        for (i, &p) in pivot.iter().enumerate() {
            if p != i {
                x.swap(i * incx, p * incx);
            }
        }
        trsv(false, false, true, n, a, lda, x, incx);
        trsv(true, false, false, n, a, lda, x, incx);
    } else {
        trsv(true, true, false, n, a, lda, x, incx);
        trsv(false, true, true, n, a, lda, x, incx);
        for (i, &p) in pivot.iter().enumerate().rev() {
            if p != i {
                x.swap(i * incx, p * incx);
            }
        }
    }
}

/// Householder QR of an m x n block (m >= n is not required; min(m, n)
/// reflectors are produced). On return the upper triangle holds R, the
/// columns below the diagonal hold the reflector vectors with an implicit
/// leading one, and `tau` holds the reflector scales.
pub(crate) fn householder_qr<F: Float + NumAssign>(m: usize, n: usize, a: &mut [F], lda: usize, tau: &mut [F]) {
    let k = m.min(n);
    for col in 0..k {
        let alpha = a[col * lda + col];
        let mut xnorm_sq = F::zero();
        for i in col + 1..m {
            xnorm_sq += a[i * lda + col] * a[i * lda + col];
        }
        if xnorm_sq == F::zero() {
            tau[col] = F::zero();
            continue;
        }
        let norm = (alpha * alpha + xnorm_sq).sqrt();
        let beta = if alpha >= F::zero() { -norm } else { norm };
        tau[col] = (beta - alpha) / beta;
        let inv = F::one() / (alpha - beta);
        for i in col + 1..m {
            a[i * lda + col] *= inv;
        }
        a[col * lda + col] = beta;
        for j in col + 1..n {
            let mut w = a[col * lda + j];
            for i in col + 1..m {
                w += a[i * lda + col] * a[i * lda + j];
            }
            w *= tau[col];
            a[col * lda + j] -= w;
            for i in col + 1..m {
                let v = a[i * lda + col];
                a[i * lda + j] -= v * w;
            }
        }
    }
}

/// Applies `Q` (or `Q^T`) from a [`householder_qr`] factorization to the
/// m x nc block `c`. `nref` is the number of reflectors.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_q<F: Float + NumAssign>(
    trans: bool,
    m: usize,
    nref: usize,
    a: &[F],
    lda: usize,
    tau: &[F],
    c: &mut [F],
    ldc: usize,
    nc: usize,
) {
    // Q = H_0 H_1 ... H_{nref-1}; the rightmost factor is applied first.
    let order: Box<dyn Iterator<Item = usize>> = if trans {
        Box::new(0..nref)
    } else {
        Box::new((0..nref).rev())
    };
    for k in order {
        if tau[k] == F::zero() {
            continue;
        }
        for j in 0..nc {
            let mut w = c[k * ldc + j];
            for i in k + 1..m {
                w += a[i * lda + k] * c[i * ldc + j];
            }
            w *= tau[k];
            c[k * ldc + j] -= w;
            for i in k + 1..m {
                let v = a[i * lda + k];
                c[i * ldc + j] -= v * w;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotg_zeroes_second_component() {
        let (c, s, r) = rotg(3.0_f64, 4.0);
        assert!((c * 3.0 + s * 4.0 - r).abs() < 1e-14);
        assert!((-s * 3.0 + c * 4.0).abs() < 1e-14);
        assert!((c * c + s * s - 1.0).abs() < 1e-14);
    }

    #[test]
    fn trsv_upper_backward() {
        // [2 1; 0 4] x = [4; 8] -> x = [1; 2]
        let a = vec![2.0, 1.0, 0.0, 4.0];
        let mut x = vec![4.0, 8.0];
        trsv(true, false, false, 2, &a, 2, &mut x, 1);
        assert!((x[0] - 1.0).abs() < 1e-14);
        assert!((x[1] - 2.0).abs() < 1e-14);
    }

    #[test]
    fn trsv_upper_transposed_is_forward() {
        // [2 1; 0 4]^T x = [2; 9] -> 2x0 = 2, x0 + 4x1 = 9 -> x = [1; 2]
        let a = vec![2.0, 1.0, 0.0, 4.0];
        let mut x = vec![2.0, 9.0];
        trsv(true, true, false, 2, &a, 2, &mut x, 1);
        assert!((x[0] - 1.0).abs() < 1e-14);
        assert!((x[1] - 2.0).abs() < 1e-14);
    }

    #[test]
    fn lu_factor_and_solve() {
        // A = [[2,1,1],[1,3,2],[1,0,0]], b = [4,5,6] -> x = [6,15,-23]
        let mut a = vec![2.0, 1.0, 1.0, 1.0, 3.0, 2.0, 1.0, 0.0, 0.0];
        let mut pivot = vec![0usize; 3];
        lu_factor(3, &mut a, 3, &mut pivot);
        let mut x = vec![4.0, 5.0, 6.0];
        lu_solve(3, &a, 3, &pivot, false, &mut x, 1);
        let want = [6.0, 15.0, -23.0];
        for (xi, wi) in x.iter().zip(want.iter()) {
            assert!((xi - wi).abs() < 1e-12, "x = {x:?}");
        }
    }

    #[test]
    fn lu_transposed_solve() {
        let a0 = vec![2.0, 1.0, 1.0, 1.0, 3.0, 2.0, 1.0, 0.0, 0.0];
        let mut a = a0.clone();
        let mut pivot = vec![0usize; 3];
        lu_factor(3, &mut a, 3, &mut pivot);
        let mut x = vec![1.0, 2.0, 3.0];
        lu_solve(3, &a, 3, &pivot, true, &mut x, 1);
        // Check A^T x = b.
        for i in 0..3 {
            let mut acc = 0.0;
            for j in 0..3 {
                acc += a0[j * 3 + i] * x[j];
            }
            let want = [1.0, 2.0, 3.0][i];
            assert!((acc - want).abs() < 1e-12);
        }
    }

    #[test]
    fn householder_reconstructs() {
        let a0 = vec![12.0, -51.0, 4.0, 6.0, 167.0, -68.0, -4.0, 24.0, -41.0];
        let mut a = a0.clone();
        let mut tau = vec![0.0; 3];
        householder_qr(3, 3, &mut a, 3, &mut tau);
        // Build QR by applying Q to R.
        let mut qr = vec![0.0; 9];
        for i in 0..3 {
            for j in i..3 {
                qr[i * 3 + j] = a[i * 3 + j];
            }
        }
        apply_q(false, 3, 3, &a, 3, &tau, &mut qr, 3, 3);
        for (got, want) in qr.iter().zip(a0.iter()) {
            assert!((got - want).abs() < 1e-10, "qr = {qr:?}");
        }
    }
}
