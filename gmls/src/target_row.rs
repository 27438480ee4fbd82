//! Builds the functional-applied basis row `P_t` for a requested target
//! operator. Each function here returns one row per output component, in
//! the length-`NP(p,d_local) * basis_mult` layout the orchestrator's
//! factorization uses, so `alpha(t, op, q, n) = row[q] . C[:, n]`.
//!
//! `GaussianCurvature` is deliberately absent from this module: unlike every
//! other operator, it is a nonlinear function of the fitted curvature
//! coefficients (`K = det(II)/det(I)`), so it cannot be expressed as a row
//! contracted against neighbor data the way a linear operator can. `gmls`
//! computes it directly from `manifold::CurvatureFit` and exposes it through
//! its own accessor; see `DESIGN.md`.

use crate::types::{ReconstructionSpace, TargetOperator};
use gmls_linalg::poly_basis::{basis_row, embed_vector_block, partial_row, second_partial_row};
use gmls_util::error::{GmlsError, GmlsResult};

fn require_scalar(space: ReconstructionSpace, op: TargetOperator) -> GmlsResult<()> {
    if space == ReconstructionSpace::ScalarTaylorPolynomial {
        Ok(())
    } else {
        Err(GmlsError::config_invalid(format!(
            "{op:?} requires a scalar reconstruction space, got {space:?}"
        )))
    }
}

fn require_vector(space: ReconstructionSpace, op: TargetOperator) -> GmlsResult<()> {
    if space == ReconstructionSpace::ScalarTaylorPolynomial {
        Err(GmlsError::config_invalid(format!(
            "{op:?} requires a vector reconstruction space, got {space:?}"
        )))
    } else {
        Ok(())
    }
}

/// `alpha`-row(s) for `op` at relative (already `/eps`) coordinate `xi`, in
/// a flat (non-manifold) reconstruction. One row per output component.
pub fn build_flat_rows(
    op: TargetOperator,
    space: ReconstructionSpace,
    p: usize,
    d_local: usize,
    eps: f64,
    basis_mult: usize,
    xi: &[f64],
) -> GmlsResult<Vec<Vec<f64>>> {
    match op {
        TargetOperator::ScalarPointEval => {
            require_scalar(space, op)?;
            Ok(vec![basis_row(xi, p, d_local)])
        }

        TargetOperator::VectorPointEval => {
            require_vector(space, op)?;
            let scalar = basis_row(xi, p, d_local);
            Ok((0..basis_mult)
                .map(|c| embed_vector_block(&scalar, c, basis_mult))
                .collect())
        }

        TargetOperator::Gradient => {
            require_scalar(space, op)?;
            Ok((0..d_local)
                .map(|k| scale(&partial_row(xi, p, d_local, k), 1.0 / eps))
                .collect())
        }

        TargetOperator::PartialX => {
            require_scalar(space, op)?;
            Ok(vec![scale(&partial_row(xi, p, d_local, 0), 1.0 / eps)])
        }
        TargetOperator::PartialY => {
            require_scalar(space, op)?;
            if d_local < 2 {
                return Err(GmlsError::config_invalid("PartialY needs d_local >= 2"));
            }
            Ok(vec![scale(&partial_row(xi, p, d_local, 1), 1.0 / eps)])
        }
        TargetOperator::PartialZ => {
            require_scalar(space, op)?;
            if d_local < 3 {
                return Err(GmlsError::config_invalid("PartialZ needs d_local >= 3"));
            }
            Ok(vec![scale(&partial_row(xi, p, d_local, 2), 1.0 / eps)])
        }

        TargetOperator::Laplacian | TargetOperator::DivergenceOfVectorPointEvaluation => {
            require_scalar(space, op)?;
            Ok(vec![laplacian_row(xi, p, d_local, eps)])
        }

        TargetOperator::Divergence => {
            require_vector(space, op)?;
            let np = gmls_util::tables::np(p, d_local);
            let mut row = vec![0.0; np * basis_mult];
            for c in 0..d_local {
                let block = scale(&partial_row(xi, p, d_local, c), 1.0 / eps);
                row[c * np..(c + 1) * np].copy_from_slice(&block);
            }
            Ok(vec![row])
        }

        TargetOperator::Curl => {
            require_vector(space, op)?;
            curl_rows(space, xi, p, d_local, eps, basis_mult)
        }

        TargetOperator::CurlCurl => {
            require_vector(space, op)?;
            curl_curl_rows(xi, p, d_local, eps, basis_mult)
        }

        TargetOperator::ScalarFaceAverage | TargetOperator::GaussianCurvature => {
            Err(GmlsError::config_invalid(format!(
                "{op:?} is built by its own dedicated routine, not build_flat_rows"
            )))
        }
    }
}

fn scale(row: &[f64], factor: f64) -> Vec<f64> {
    row.iter().map(|v| v * factor).collect()
}

/// `(1/eps^2) * sum_k d^2/dxi_k^2`, each pure second partial coming from
/// `second_partial_row` rather than a hardcoded fixed-offset table: the
/// `(ax=2)`/`(ay=2)`/`(az=2)` monomial always lands at a fixed index for a
/// given `(p, d)` (`{2}`/`{3,5}`/`{4,6,9}` for `d=1,2,3`), but deriving it
/// from the basis directly keeps this correct for every `p >= 2` rather than
/// only the `p=2` case a fixed table would be read off of.
fn laplacian_row(xi: &[f64], p: usize, d_local: usize, eps: f64) -> Vec<f64> {
    let np = gmls_util::tables::np(p, d_local);
    let mut row = vec![0.0; np];
    for k in 0..d_local {
        let term = second_partial_row(xi, p, d_local, k, k);
        for (r, t) in row.iter_mut().zip(term) {
            *r += t;
        }
    }
    let scale = 1.0 / (eps * eps);
    row.iter_mut().for_each(|v| *v *= scale);
    row
}

/// 2D: `curl(v) = dv_y/dx - dv_x/dy`, a scalar. 3D: the usual vector curl,
/// built component-by-component from the vector basis's partials
/// (`Compadre_Targets.hpp`'s `CurlOfVectorPointEvaluation` branch).
fn curl_rows(
    space: ReconstructionSpace,
    xi: &[f64],
    p: usize,
    d_local: usize,
    eps: f64,
    basis_mult: usize,
) -> GmlsResult<Vec<Vec<f64>>> {
    if space == ReconstructionSpace::DivergenceFreeVectorTaylorPolynomial {
        return Err(GmlsError::not_implemented(
            "Curl of the divergence-free vector basis is not implemented",
        ));
    }
    let np = gmls_util::tables::np(p, d_local);
    match d_local {
        2 => {
            // row such that row . C = dC_y/dx - dC_x/dy, with C laid out in
            // two blocks [x-component coeffs, y-component coeffs].
            let mut row = vec![0.0; np * basis_mult];
            let dx = scale(&partial_row(xi, p, d_local, 0), 1.0 / eps);
            let dy = scale(&partial_row(xi, p, d_local, 1), 1.0 / eps);
            row[0 * np..1 * np].copy_from_slice(&negate(&dy));
            row[1 * np..2 * np].copy_from_slice(&dx);
            Ok(vec![row])
        }
        3 => {
            // curl(v)_x = dv_z/dy - dv_y/dz, etc. (cyclic).
            let d = |dir: usize| scale(&partial_row(xi, p, d_local, dir), 1.0 / eps);
            let mut rows = Vec::with_capacity(3);
            for ((pos_comp, pos_dir), (neg_comp, neg_dir)) in [
                ((2usize, 1usize), (1usize, 2usize)),
                ((0, 2), (2, 0)),
                ((1, 0), (0, 1)),
            ] {
                let mut row = vec![0.0; np * basis_mult];
                let pos = d(pos_dir);
                let neg = negate(&d(neg_dir));
                row[pos_comp * np..(pos_comp + 1) * np].copy_from_slice(&pos);
                let mut block = row[neg_comp * np..(neg_comp + 1) * np].to_vec();
                for (a, b) in block.iter_mut().zip(&neg) {
                    *a += b;
                }
                row[neg_comp * np..(neg_comp + 1) * np].copy_from_slice(&block);
                rows.push(row);
            }
            Ok(rows)
        }
        _ => Err(GmlsError::config_invalid("Curl needs d_local in {2, 3}")),
    }
}

fn negate(row: &[f64]) -> Vec<f64> {
    row.iter().map(|v| -v).collect()
}

/// `curl(curl(v))`: in 3D, the direct second-order combinatorial formula
/// from `CurlCurlOfVectorPointEvaluation`; in 2D, the identity
/// `curl(curl v) = grad(div v) - laplacian(v)` (both sides are 2-vectors).
fn curl_curl_rows(
    xi: &[f64],
    p: usize,
    d_local: usize,
    eps: f64,
    basis_mult: usize,
) -> GmlsResult<Vec<Vec<f64>>> {
    let np = gmls_util::tables::np(p, d_local);
    match d_local {
        2 => {
            // grad(div v) component k = sum_j d^2 v_j / (dx_k dx_j); laplacian(v)_k = sum_j d^2 v_k/dx_j^2.
            let mut rows = Vec::with_capacity(2);
            for k in 0..2 {
                let mut row = vec![0.0; np * basis_mult];
                for j in 0..2 {
                    let mixed = scale(&second_partial_row(xi, p, d_local, k, j), 1.0 / (eps * eps));
                    let mut block = row[j * np..(j + 1) * np].to_vec();
                    for (a, b) in block.iter_mut().zip(&mixed) {
                        *a += b;
                    }
                    row[j * np..(j + 1) * np].copy_from_slice(&block);
                }
                let lap_k = laplacian_row(xi, p, d_local, eps);
                let mut block = row[k * np..(k + 1) * np].to_vec();
                for (a, b) in block.iter_mut().zip(&lap_k) {
                    *a -= b;
                }
                row[k * np..(k + 1) * np].copy_from_slice(&block);
                rows.push(row);
            }
            Ok(rows)
        }
        3 => {
            // (curl curl v)_k = d/dx_k (div v) - laplacian(v)_k, same identity holds in 3D too
            // and is what the original's direct formula reduces to component-wise.
            let mut rows = Vec::with_capacity(3);
            for k in 0..3 {
                let mut row = vec![0.0; np * basis_mult];
                for j in 0..3 {
                    let mixed = scale(&second_partial_row(xi, p, d_local, k, j), 1.0 / (eps * eps));
                    let mut block = row[j * np..(j + 1) * np].to_vec();
                    for (a, b) in block.iter_mut().zip(&mixed) {
                        *a += b;
                    }
                    row[j * np..(j + 1) * np].copy_from_slice(&block);
                }
                let lap_k = laplacian_row(xi, p, d_local, eps);
                let mut block = row[k * np..(k + 1) * np].to_vec();
                for (a, b) in block.iter_mut().zip(&lap_k) {
                    *a -= b;
                }
                row[k * np..(k + 1) * np].copy_from_slice(&block);
                rows.push(row);
            }
            Ok(rows)
        }
        _ => Err(GmlsError::config_invalid("CurlCurl needs d_local in {2, 3}")),
    }
}

/// Fan-triangulates a 2D cell from its ordered boundary vertices and
/// integrates the scalar basis over it with a 3-point edge-midpoint
/// quadrature rule (exact for polynomials up to degree 2, matching the
/// original's `ScalarFaceAverageEvaluation` sub-triangle quadrature), then
/// normalizes by the cell's total area to produce a cell-average row.
pub fn scalar_face_average_row(
    p: usize,
    target: &[f64],
    eps: f64,
    vertices: &[f64],
) -> GmlsResult<Vec<f64>> {
    let d_local = 2;
    if vertices.len() % d_local != 0 {
        return Err(GmlsError::input_inconsistent(
            None,
            "face-average cell vertices must be flattened (n, 2) pairs",
        ));
    }
    let n_verts = vertices.len() / d_local;
    if n_verts < 3 {
        return Err(GmlsError::input_inconsistent(
            None,
            "face-average cell needs at least 3 vertices",
        ));
    }
    let vertex = |i: usize| -> [f64; 2] { [vertices[i * 2], vertices[i * 2 + 1]] };

    let mut centroid = [0.0, 0.0];
    for i in 0..n_verts {
        let v = vertex(i);
        centroid[0] += v[0];
        centroid[1] += v[1];
    }
    centroid[0] /= n_verts as f64;
    centroid[1] /= n_verts as f64;

    let np = gmls_util::tables::np(p, d_local);
    let mut row = vec![0.0; np];
    let mut total_area = 0.0;

    for i in 0..n_verts {
        let a = centroid;
        let b = vertex(i);
        let c = vertex((i + 1) % n_verts);
        let area = 0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])).abs();
        if area < 1e-300 {
            continue;
        }
        total_area += area;

        let midpoints = [
            [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0],
            [(b[0] + c[0]) / 2.0, (b[1] + c[1]) / 2.0],
            [(c[0] + a[0]) / 2.0, (c[1] + a[1]) / 2.0],
        ];
        let weight = area / 3.0;
        for qp in midpoints {
            let xi = [(qp[0] - target[0]) / eps, (qp[1] - target[1]) / eps];
            let basis = basis_row(&xi, p, d_local);
            for (r, b) in row.iter_mut().zip(basis) {
                *r += weight * b;
            }
        }
    }

    if total_area < 1e-300 {
        return Err(GmlsError::input_inconsistent(
            None,
            "face-average cell has degenerate (zero) area",
        ));
    }
    row.iter_mut().for_each(|v| *v /= total_area);
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReconstructionSpace;

    #[test]
    fn laplacian_of_quadratic_basis_is_two_per_axis() {
        // p=2, 1D: basis = [1, x, x^2/2]; laplacian row should pick out index 2 with value 1/eps^2.
        let row = laplacian_row(&[0.3], 2, 1, 1.0);
        assert_eq!(row, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn gradient_row_scales_by_inverse_epsilon() {
        let rows = build_flat_rows(
            TargetOperator::Gradient,
            ReconstructionSpace::ScalarTaylorPolynomial,
            1,
            2,
            2.0,
            1,
            &[0.0, 0.0],
        )
        .unwrap();
        // p=1, d=2: basis = [1, x, y]; d/dx = [0,1,0], scaled by 1/eps = 0.5.
        assert_eq!(rows[0], vec![0.0, 0.5, 0.0]);
        assert_eq!(rows[1], vec![0.0, 0.0, 0.5]);
    }

    #[test]
    fn scalar_point_eval_requires_scalar_space() {
        let err = build_flat_rows(
            TargetOperator::ScalarPointEval,
            ReconstructionSpace::VectorTaylorPolynomial,
            1,
            2,
            1.0,
            2,
            &[0.0, 0.0],
        )
        .unwrap_err();
        assert!(matches!(err, GmlsError::ConfigInvalid { .. }));
    }

    #[test]
    fn face_average_of_linear_field_matches_centroid_value() {
        // Unit right triangle (0,0),(1,0),(0,1); p=1 basis is exact for
        // linear fields, so the cell-average row dotted with f = 1+2x+3y
        // should equal the analytic cell average of f, namely f at the
        // centroid (1/3, 1/3): 1 + 2/3 + 1 = 8/3.
        let vertices = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let target = [0.0, 0.0];
        let row = scalar_face_average_row(1, &target, 1.0, &vertices).unwrap();
        let f = [1.0, 2.0, 3.0]; // basis [1, x, y] dotted with coeffs [1, 2, 3]
        let value: f64 = row.iter().zip(f).map(|(r, c)| r * c).sum();
        assert!((value - 8.0 / 3.0).abs() < 1e-12, "value={value}");
    }
}
