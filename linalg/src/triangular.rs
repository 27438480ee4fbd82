//! Upper-triangular back-substitution, the last step of the QR branch of
//! the weighted least-squares solve.

use gmls_util::error::{GmlsError, GmlsResult};
use gmls_util::matrix::MatrixView;

/// Solves `R x = rhs` for `x`, where `r` is `n x n` upper triangular (the
/// `R` factor from [`crate::qr::householder_qr_factorize`]) and `rhs` is
/// `n x cols` (the leading `n` rows of `Q^T` applied to the original
/// right-hand side). Returns the flattened `n x cols` row-major solution.
///
/// Fails with `GmlsError::IllConditioned` if a diagonal entry is
/// numerically zero; `householder_qr_factorize` already rejects this case
/// earlier, so this guard only fires if `r` was built some other way.
pub fn back_substitute_upper(
    r: MatrixView<'_>,
    rhs: MatrixView<'_>,
    target: Option<usize>,
) -> GmlsResult<Vec<f64>> {
    let n = r.height();
    assert_eq!(r.width(), n, "back_substitute_upper needs a square upper-triangular matrix");
    assert_eq!(rhs.height(), n, "rhs row count must match R's dimension");
    let cols = rhs.width();

    let mut x = vec![0.0; n * cols];
    for col in 0..cols {
        for i in (0..n).rev() {
            let diag = r.get(i, i);
            if diag.abs() < 1e-300 {
                return Err(GmlsError::ill_conditioned(
                    target,
                    format!("zero diagonal at row {i} in back-substitution"),
                ));
            }
            let mut sum = rhs.get(i, col);
            for j in (i + 1)..n {
                sum -= r.get(i, j) * x[j * cols + col];
            }
            x[i * cols + col] = sum / diag;
        }
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gmls_util::matrix::MatrixView;

    #[test]
    fn solves_simple_triangular_system() {
        // R = [[2,1],[0,3]], rhs = [5, 6] -> R x = rhs
        // 3*x1 = 6 => x1 = 2; 2*x0 + x1 = 5 => x0 = 1.5
        let r_data = vec![2.0, 1.0, 0.0, 3.0];
        let r = MatrixView::new(&r_data, 2, 2);
        let rhs_data = vec![5.0, 6.0];
        let rhs = MatrixView::new(&rhs_data, 2, 1);
        let x = back_substitute_upper(r, rhs, None).unwrap();
        assert!((x[0] - 1.5).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_diagonal_is_ill_conditioned() {
        let r_data = vec![0.0, 1.0, 0.0, 3.0];
        let r = MatrixView::new(&r_data, 2, 2);
        let rhs_data = vec![5.0, 6.0];
        let rhs = MatrixView::new(&rhs_data, 2, 1);
        assert!(back_substitute_upper(r, rhs, Some(2)).is_err());
    }
}
