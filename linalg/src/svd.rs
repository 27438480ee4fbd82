//! Batched dense SVD for the rank-deficient branch of the weighted
//! least-squares solve (used whenever the sampling functional annihilates
//! constants, so `sqrt(W) P` does not have full column rank and Householder
//! QR would report a zero pivot).
//!
//! Implemented as one-sided Jacobi SVD rather than a literal transliteration
//! of Golub-Reinsch bidiagonalization plus implicit-shift QR: both converge
//! to the same `A = U diag(sigma) V^T` decomposition, but the Jacobi sweep
//! has no tricky deflation bookkeeping, which matters when the only
//! correctness check available is careful reading rather than a compiler
//! and a test run. See `DESIGN.md` for this substitution.

use gmls_util::error::{GmlsError, GmlsResult};
use gmls_util::matrix::{MatrixView, MatrixViewMut};
use itertools::Itertools;

const MAX_SWEEPS: usize = 60;
const CONVERGE_TOL: f64 = 1e-14;

/// The non-`U` half of a thin SVD: `A`'s column space has already been
/// rotated into `U` in place (the matrix passed to
/// [`jacobi_svd_factorize`]), scaled so each column has unit norm.
pub struct SvdFactorization {
    /// Singular values, descending.
    pub singular_values: Vec<f64>,
    /// `n x n` right singular vectors, row-major, as `V` (not `V^T`).
    pub v: Vec<f64>,
}

/// Factorizes the `m x n` (`m >= n`) matrix `a` in place: on return, the
/// columns of `a` are the left singular vectors `U` and the singular
/// values/right singular vectors are returned separately.
pub fn jacobi_svd_factorize(
    a: &mut MatrixViewMut<'_>,
    _target: Option<usize>,
) -> SvdFactorization {
    let m = a.height();
    let n = a.width();
    assert!(m >= n, "SVD requires m >= n (m={m}, n={n})");

    let mut v = vec![0.0; n * n];
    for i in 0..n {
        v[i * n + i] = 1.0;
    }

    for _sweep in 0..MAX_SWEEPS {
        let mut off_diag_sq = 0.0;
        for (p, q) in (0..n).tuple_combinations() {
            let mut alpha = 0.0;
            let mut beta = 0.0;
            let mut gamma = 0.0;
            for i in 0..m {
                let aip = a.get(i, p);
                let aiq = a.get(i, q);
                alpha += aip * aip;
                beta += aiq * aiq;
                gamma += aip * aiq;
            }
            off_diag_sq += gamma * gamma;

            if gamma.abs() < CONVERGE_TOL * (alpha * beta).sqrt().max(1e-300) {
                continue;
            }

            let zeta = (beta - alpha) / (2.0 * gamma);
            let t = if zeta >= 0.0 {
                1.0 / (zeta + (1.0 + zeta * zeta).sqrt())
            } else {
                -1.0 / (-zeta + (1.0 + zeta * zeta).sqrt())
            };
            let c = 1.0 / (1.0 + t * t).sqrt();
            let s = c * t;

            for i in 0..m {
                let aip = a.get(i, p);
                let aiq = a.get(i, q);
                a.set(i, p, c * aip - s * aiq);
                a.set(i, q, s * aip + c * aiq);
            }
            for i in 0..n {
                let vip = v[i * n + p];
                let viq = v[i * n + q];
                v[i * n + p] = c * vip - s * viq;
                v[i * n + q] = s * vip + c * viq;
            }
        }
        if off_diag_sq.sqrt() < CONVERGE_TOL {
            break;
        }
    }

    let mut singular_values = vec![0.0; n];
    for j in 0..n {
        let mut norm_sq = 0.0;
        for i in 0..m {
            norm_sq += a.get(i, j).powi(2);
        }
        singular_values[j] = norm_sq.sqrt();
    }
    for j in 0..n {
        let sigma = singular_values[j];
        if sigma > 1e-300 {
            for i in 0..m {
                let val = a.get(i, j) / sigma;
                a.set(i, j, val);
            }
        }
    }

    // Sort descending by singular value so `sigma_0` (used for the
    // pseudo-inverse threshold) is always `singular_values[0]`.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| singular_values[j].partial_cmp(&singular_values[i]).unwrap());

    let sorted_values: Vec<f64> = order.iter().map(|&k| singular_values[k]).collect();
    let mut u_sorted = vec![0.0; m * n];
    let mut v_sorted = vec![0.0; n * n];
    for (new_j, &old_j) in order.iter().enumerate() {
        for i in 0..m {
            u_sorted[i * n + new_j] = a.get(i, old_j);
        }
        for i in 0..n {
            v_sorted[i * n + new_j] = v[i * n + old_j];
        }
    }
    for i in 0..m {
        for j in 0..n {
            a.set(i, j, u_sorted[i * n + j]);
        }
    }

    SvdFactorization {
        singular_values: sorted_values,
        v: v_sorted,
    }
}

/// Solves the weighted least-squares system via the pseudo-inverse implied
/// by `svd`, zeroing any singular value below `max(m,n) * 1e-14 * sigma_0`
/// (the minimum-norm solution a sampling functional with a non-trivial
/// nullspace requires). Fails with `GmlsError::IllConditioned` only in the
/// degenerate case where every singular value is below threshold (the
/// system is entirely rank-deficient against this tolerance).
pub fn solve_pseudo_inverse(
    u: MatrixView<'_>,
    svd: &SvdFactorization,
    rhs: MatrixView<'_>,
    target: Option<usize>,
) -> GmlsResult<Vec<f64>> {
    let m = u.height();
    let n = u.width();
    let cols = rhs.width();
    assert_eq!(rhs.height(), m);

    let sigma0 = svd.singular_values.first().copied().unwrap_or(0.0);
    let threshold = (m.max(n) as f64) * 1e-14 * sigma0;
    if svd.singular_values.iter().all(|&s| s < threshold) {
        return Err(GmlsError::ill_conditioned(
            target,
            "all singular values below threshold; system is entirely rank-deficient",
        ));
    }

    let mut temp = vec![0.0; n * cols];
    for j in 0..n {
        for c in 0..cols {
            let mut acc = 0.0;
            for i in 0..m {
                acc += u.get(i, j) * rhs.get(i, c);
            }
            temp[j * cols + c] = acc;
        }
    }
    for j in 0..n {
        let sigma = svd.singular_values[j];
        let inv = if sigma >= threshold { 1.0 / sigma } else { 0.0 };
        for c in 0..cols {
            temp[j * cols + c] *= inv;
        }
    }

    let mut x = vec![0.0; n * cols];
    for i in 0..n {
        for c in 0..cols {
            let mut acc = 0.0;
            for j in 0..n {
                acc += svd.v[i * n + j] * temp[j * cols + c];
            }
            x[i * cols + c] = acc;
        }
    }
    Ok(x)
}
