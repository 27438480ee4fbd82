//! The manifold branch's three-stage reconstruction: a coarse tangent plane
//! from the neighbor cloud's principal directions, a curvature fit over
//! that plane, and a refined tangent frame corrected for the fitted
//! curvature. Grounded in `ComputeCoarseTangentPlane` /
//! `AssembleManifoldPsqrtW` in `examples/original_source/GMLS/src/GMLS.cpp`.
//!
//! Only the `d_global = 3` (2D tangent plane) case is implemented: a
//! `d_global = 2` manifold (a curve embedded in the plane, 1D tangent)
//! needs its own degenerate-case math this crate does not implement;
//! `orchestrator::process_manifold_target` reports
//! `GmlsError::NotImplemented` for that case (see `DESIGN.md`).

use gmls_linalg::eigen3x3::largest_two_eigenvectors_3x3_sym;
use gmls_linalg::poly_basis::basis_row;
use gmls_linalg::qr::householder_qr_factorize;
use gmls_linalg::triangular::back_substitute_upper;
use gmls_util::error::{GmlsError, GmlsResult};
use gmls_util::matrix::{MatrixView, MatrixViewMut};
use gmls_util::tables::np;

/// The coarse tangent frame `V`: an orthonormal 3x3 ambient frame whose
/// first two columns span the approximate tangent plane (largest two
/// eigenvalues of `P^T P`) and whose third column is the surface normal
/// direction (smallest eigenvalue).
pub struct CoarseTangentPlane {
    pub v: [[f64; 3]; 3],
}

/// `neighbor_rel_coords` are `x_nbr - x_t` in ambient 3D coordinates; this
/// builds `P^T P` from them and returns its eigenbasis.
pub fn compute_coarse_tangent_plane(neighbor_rel_coords: &[[f64; 3]]) -> CoarseTangentPlane {
    let mut ptp = [[0.0_f64; 3]; 3];
    for xi in neighbor_rel_coords {
        for i in 0..3 {
            for j in 0..3 {
                ptp[i][j] += xi[i] * xi[j];
            }
        }
    }
    let eig = largest_two_eigenvectors_3x3_sym(&ptp);
    CoarseTangentPlane { v: eig.v }
}

/// Projects an ambient 3D relative coordinate onto `d_local` columns of a
/// frame (`V` or the refined `T`), giving local tangent-plane coordinates.
pub fn project_onto_frame(rel: &[f64; 3], frame_cols: &[[f64; 3]], d_local: usize) -> Vec<f64> {
    (0..d_local)
        .map(|i| {
            let col = frame_cols[i];
            rel[0] * col[0] + rel[1] * col[1] + rel[2] * col[2]
        })
        .collect()
}

/// The result of the curvature fit: polynomial coefficients for the height
/// field `h(xi_1, ..., xi_{d-1})` over the coarse tangent plane, and the
/// height gradient at the target (`xi = 0`), which for a factorial-normalized
/// Taylor basis is simply the fit's first-order coefficients.
pub struct CurvatureFit {
    pub coeffs: Vec<f64>,
    pub gradient: Vec<f64>,
}

/// Fits a degree-`p_m` polynomial `h(xi)` to the normal-direction
/// coordinates `heights`, given the tangent-plane coordinates `tangent_xi`
/// of each neighbor and `sqrt_w`. Always solved via QR: the curvature fit's
/// sampling functional is always point sampling, so unlike the main GMLS
/// solve it never needs the SVD branch.
pub fn fit_curvature(
    tangent_xi: &[Vec<f64>],
    heights: &[f64],
    sqrt_w: &[f64],
    p_m: usize,
    d_local: usize,
    target: Option<usize>,
) -> GmlsResult<CurvatureFit> {
    let m = tangent_xi.len();
    let n = np(p_m, d_local);
    if m < n {
        return Err(GmlsError::input_inconsistent(
            target,
            format!("curvature fit needs at least {n} neighbors, got {m}"),
        ));
    }

    let mut a_data = vec![0.0; m * n];
    let mut rhs_data = vec![0.0; m];
    for (row, (xi, (&h, &sw))) in tangent_xi.iter().zip(heights.iter().zip(sqrt_w)).enumerate() {
        let basis = basis_row(xi, p_m, d_local);
        for (col, b) in basis.into_iter().enumerate() {
            a_data[row * n + col] = b * sw;
        }
        rhs_data[row] = h * sw;
    }

    let mut a = MatrixViewMut::new(&mut a_data, m, n);
    let mut rhs = MatrixViewMut::new(&mut rhs_data, m, 1);
    householder_qr_factorize(&mut a, &mut rhs, target)?;

    let r_data: Vec<f64> = (0..n).flat_map(|i| (0..n).map(move |j| a.get(i, j))).collect();
    let r = MatrixView::new(&r_data, n, n);
    let top_rhs_data: Vec<f64> = (0..n).map(|i| rhs.get(i, 0)).collect();
    let top_rhs = MatrixView::new(&top_rhs_data, n, 1);
    let coeffs = back_substitute_upper(r, top_rhs, target)?;

    let gradient = coeffs[1..1 + d_local].to_vec();
    Ok(CurvatureFit { coeffs, gradient })
}

/// The refined tangent frame `T`, the first fundamental form's inverse
/// `G^-1`, and `det(G)`.
pub struct RefinedFrame {
    pub t: Vec<[f64; 3]>,
    pub g_inv: Vec<f64>,
    pub det_g: f64,
}

/// `d_local` must be 2 (the only ambient/tangent combination this crate
/// implements, see the module doc comment).
pub fn refine_tangent_frame(
    v: &[[f64; 3]; 3],
    gradient: &[f64],
    d_local: usize,
    target: Option<usize>,
) -> GmlsResult<RefinedFrame> {
    if d_local != 2 {
        return Err(GmlsError::not_implemented(format!(
            "refine_tangent_frame only supports d_local == 2, got {d_local}"
        )));
    }
    // `v`'s columns are eigenvectors (`v[i][j]` is component `i` of eigenvector
    // `j`), so the normal (column 2, smallest eigenvalue) is read off a column,
    // not row 2.
    let normal = [v[0][2], v[1][2], v[2][2]];
    let mut t_raw: Vec<[f64; 3]> = (0..d_local)
        .map(|i| {
            let col = [v[0][i], v[1][i], v[2][i]];
            [
                col[0] + gradient[i] * normal[0],
                col[1] + gradient[i] * normal[1],
                col[2] + gradient[i] * normal[2],
            ]
        })
        .collect();

    // Gram-Schmidt orthonormalize the columns of T in place.
    let norm = |a: [f64; 3]| (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt();
    let dot = |a: [f64; 3], b: [f64; 3]| a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
    let n0 = norm(t_raw[0]);
    if n0 < 1e-300 {
        return Err(GmlsError::ill_conditioned(target, "degenerate refined tangent vector"));
    }
    t_raw[0] = [t_raw[0][0] / n0, t_raw[0][1] / n0, t_raw[0][2] / n0];
    let proj = dot(t_raw[0], t_raw[1]);
    let mut t1 = [
        t_raw[1][0] - proj * t_raw[0][0],
        t_raw[1][1] - proj * t_raw[0][1],
        t_raw[1][2] - proj * t_raw[0][2],
    ];
    let n1 = norm(t1);
    if n1 < 1e-300 {
        return Err(GmlsError::ill_conditioned(target, "degenerate refined tangent vector"));
    }
    t1 = [t1[0] / n1, t1[1] / n1, t1[2] / n1];
    let t = vec![t_raw[0], t1];

    // G = I + grad(h) grad(h)^T, closed-form 2x2 inverse.
    let (g1, g2) = (gradient[0], gradient[1]);
    let g = [[1.0 + g1 * g1, g1 * g2], [g1 * g2, 1.0 + g2 * g2]];
    let det_g = g[0][0] * g[1][1] - g[0][1] * g[1][0];
    if det_g.abs() < 1e-300 {
        return Err(GmlsError::ill_conditioned(target, "det(G) == 0 in metric tensor"));
    }
    let g_inv = vec![g[1][1] / det_g, -g[0][1] / det_g, -g[1][0] / det_g, g[0][0] / det_g];

    Ok(RefinedFrame { t, g_inv, det_g })
}

/// Closed-form manifold Laplacian row against the degree-`<=2` Taylor
/// basis, ported from `LaplacianOfScalarPointEvaluation` in
/// `computeTargetFunctionalsOnManifold`
/// (`examples/original_source/src/Compadre_Targets.hpp`). `curvature`
/// supplies the fitted height field's gradient (`a1`, `a2`) and, when the
/// curvature fit order is high enough, its Hessian (`a3`, `a4`, `a5`); `eps`
/// is the target's neighborhood radius (`h` in the original). Single-site
/// only: the original evaluates this formula once per target, not once per
/// additional evaluation site.
pub fn laplacian_row(curvature: &CurvatureFit, eps: f64, p: usize, d_local: usize) -> Vec<f64> {
    let np = np(p, d_local);
    let mut row = vec![0.0; np];
    let h2 = eps * eps;
    let a1 = curvature.coeffs.get(1).copied().unwrap_or(0.0);
    let a2 = curvature.coeffs.get(2).copied().unwrap_or(0.0);
    let has_hessian = curvature.coeffs.len() > 5;
    let (a3, a4, a5) = if has_hessian {
        (curvature.coeffs[3], curvature.coeffs[4], curvature.coeffs[5])
    } else {
        (0.0, 0.0, 0.0)
    };
    let has_gradient = curvature.coeffs.len() > 2;
    let den = h2 + a1 * a1 + a2 * a2;

    if p > 0 && has_hessian && np > 2 {
        let cross = (h2 + a2 * a2) * a3 - 2.0 * a1 * a2 * a4 + (h2 + a1 * a1) * a5;
        row[1] = -a1 * cross / (den * den) / h2;
        row[2] = -a2 * cross / (den * den) / h2;
    }
    if p > 1 && has_gradient && np > 5 {
        row[3] = (h2 + a2 * a2) / den / h2;
        row[4] = -2.0 * a1 * a2 / den / h2;
        row[5] = (h2 + a1 * a1) / den / h2;
    }
    row
}

/// Closed-form manifold divergence row for a rank-1 (vector) Taylor basis,
/// ported from the `reconstruction_space_rank == 1` branch of
/// `DivergenceOfVectorPointEvaluation` in `computeTargetFunctionalsOnManifold`
/// (`examples/original_source/src/Compadre_Targets.hpp`). Single-site only,
/// for the same reason as [`laplacian_row`].
pub fn divergence_row(
    curvature: &CurvatureFit,
    eps: f64,
    p: usize,
    d_local: usize,
    target: Option<usize>,
) -> GmlsResult<Vec<f64>> {
    let np_val = np(p, d_local);
    if np_val < 3 {
        return Err(GmlsError::input_inconsistent(
            target,
            "manifold Divergence needs polynomial_order >= 1",
        ));
    }
    let h = eps;
    let a1 = curvature.coeffs.get(1).copied().unwrap_or(0.0);
    let a2 = curvature.coeffs.get(2).copied().unwrap_or(0.0);
    let (a3, a4, a5) = if curvature.coeffs.len() > 5 {
        (curvature.coeffs[3], curvature.coeffs[4], curvature.coeffs[5])
    } else {
        (0.0, 0.0, 0.0)
    };
    let den = h * h + a1 * a1 + a2 * a2;

    let mut row = vec![0.0; np_val * d_local];
    row[0] = (a1 * a3 + a2 * a4) / (h * den);
    row[1] = 1.0 / h;
    row[np_val] = (a1 * a4 + a2 * a5) / (h * den);
    row[np_val + 2] = 1.0 / h;
    Ok(row)
}

/// Gaussian curvature `K = det(II)/det(I)` of the locally fitted height
/// field, using the curvature fit's second-order coefficients as the
/// Hessian of the height field (`a_3 = h_xx`, `a_4 = h_xy`, `a_5 = h_yy`)
/// and `det(G)` from [`refine_tangent_frame`]. Nonlinear in the fit
/// coefficients, hence not expressible as an alpha row (see `target_row`'s
/// module doc comment).
pub fn gaussian_curvature(curvature: &CurvatureFit, det_g: f64) -> GmlsResult<f64> {
    if curvature.coeffs.len() < 6 {
        return Err(GmlsError::not_implemented(
            "GaussianCurvature needs a curvature fit of order >= 2",
        ));
    }
    let (a3, a4, a5) = (curvature.coeffs[3], curvature.coeffs[4], curvature.coeffs[5]);
    let det_hessian = a3 * a5 - a4 * a4;
    Ok(det_hessian / (det_g * det_g))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarse_tangent_plane_of_flat_xy_cloud_has_z_normal() {
        let neighbors = [
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, -1.0, 0.0],
        ];
        let plane = compute_coarse_tangent_plane(&neighbors);
        assert!(plane.v[2][2].abs() > 1.0 - 1e-6);
    }

    #[test]
    fn curvature_fit_recovers_exact_quadratic_bowl() {
        // h(x,y) = x^2 + y^2 sampled exactly on a small stencil; p_m=2 should
        // recover a3=a5=2 (h_xx=h_yy=2), a4=0 (no cross term), gradient=0 at origin.
        let pts: Vec<[f64; 2]> = vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [-1.0, 0.0],
            [0.0, 1.0],
            [0.0, -1.0],
            [1.0, 1.0],
        ];
        let heights: Vec<f64> = pts.iter().map(|p| p[0] * p[0] + p[1] * p[1]).collect();
        let sqrt_w = vec![1.0; pts.len()];
        let tangent_xi: Vec<Vec<f64>> = pts.iter().map(|p| vec![p[0], p[1]]).collect();
        let fit = fit_curvature(&tangent_xi, &heights, &sqrt_w, 2, 2, None).unwrap();
        assert!((fit.coeffs[3] - 2.0).abs() < 1e-8, "a3={}", fit.coeffs[3]);
        assert!((fit.coeffs[5] - 2.0).abs() < 1e-8, "a5={}", fit.coeffs[5]);
        assert!(fit.gradient[0].abs() < 1e-8 && fit.gradient[1].abs() < 1e-8);
    }

    #[test]
    fn gaussian_curvature_of_paraboloid_matches_closed_form() {
        let curvature = CurvatureFit {
            coeffs: vec![0.0, 0.0, 0.0, 2.0, 0.0, 2.0],
            gradient: vec![0.0, 0.0],
        };
        // at the origin det(G) = 1 (zero gradient), K = (2*2 - 0) / 1 = 4.
        let k = gaussian_curvature(&curvature, 1.0).unwrap();
        assert!((k - 4.0).abs() < 1e-12);
    }
}
