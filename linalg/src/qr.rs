//! Batched Householder QR for the full-rank branch of the weighted
//! least-squares solve.
//!
//! The kernel operates purely in terms of `(row, col)` indices on a
//! [`MatrixViewMut`], so it is agnostic to whatever physical layout backs
//! the view; the orchestrator in `gmls` is responsible for calling
//! `gmls_util::transpose::transpose_into` beforehand if it wants the
//! backing buffer column-major for cache locality on the CPU path.
//! Correctness here does not depend on that choice.

use gmls_util::error::{GmlsError, GmlsResult};
use gmls_util::matrix::MatrixViewMut;

/// Factorizes the `m x n` (`m >= n`) matrix `a` in place via Householder
/// reflections, applying the same reflections to `rhs` (`m x cols`) as it
/// goes. On success, the upper-left `n x n` block of `a` holds `R` and the
/// leading `n` rows of `rhs` hold `Q^T * rhs`; [`crate::triangular::back_substitute_upper`]
/// finishes the solve.
///
/// Fails with `GmlsError::IllConditioned` the moment a pivot falls below
/// `1e-14 * ||A||_inf` (the column should have been handled by
/// `gmls-linalg`'s SVD path instead).
pub fn householder_qr_factorize(
    a: &mut MatrixViewMut<'_>,
    rhs: &mut MatrixViewMut<'_>,
    target: Option<usize>,
) -> GmlsResult<()> {
    let m = a.height();
    let n = a.width();
    assert!(m >= n, "QR requires m >= n (m={m}, n={n})");
    assert_eq!(rhs.height(), m, "rhs row count must match A's row count");

    let mut norm_inf = 0.0_f64;
    for i in 0..m {
        for j in 0..n {
            norm_inf = norm_inf.max(a.get(i, j).abs());
        }
    }
    let tol = 1e-14 * norm_inf.max(1.0);

    for k in 0..n {
        let mut norm_sq = 0.0;
        for i in k..m {
            norm_sq += a.get(i, k).powi(2);
        }
        let norm = norm_sq.sqrt();
        if norm < 1e-300 {
            return Err(GmlsError::ill_conditioned(
                target,
                format!("zero column at pivot {k}"),
            ));
        }

        let alpha = if a.get(k, k) >= 0.0 { -norm } else { norm };

        let mut v = vec![0.0; m - k];
        for i in k..m {
            v[i - k] = a.get(i, k);
        }
        v[0] -= alpha;
        let v_norm_sq: f64 = v.iter().map(|x| x * x).sum();

        if v_norm_sq > 1e-300 {
            for j in k..n {
                let mut dot = 0.0;
                for i in k..m {
                    dot += v[i - k] * a.get(i, j);
                }
                let factor = 2.0 * dot / v_norm_sq;
                for i in k..m {
                    let updated = a.get(i, j) - factor * v[i - k];
                    a.set(i, j, updated);
                }
            }
            for c in 0..rhs.width() {
                let mut dot = 0.0;
                for i in k..m {
                    dot += v[i - k] * rhs.get(i, c);
                }
                let factor = 2.0 * dot / v_norm_sq;
                for i in k..m {
                    let updated = rhs.get(i, c) - factor * v[i - k];
                    rhs.set(i, c, updated);
                }
            }
        } else {
            // The column is already aligned with e_k; no reflection needed, but R's
            // diagonal still has to carry the (signed) column norm.
            a.set(k, k, alpha);
            for i in (k + 1)..m {
                a.set(i, k, 0.0);
            }
        }

        if a.get(k, k).abs() < tol {
            return Err(GmlsError::ill_conditioned(
                target,
                format!("zero pivot at column {k}: |R[{k},{k}]| = {}", a.get(k, k).abs()),
            ));
        }
    }
    Ok(())
}
