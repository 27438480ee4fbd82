//! Closed-form eigendecomposition of a symmetric 3x3 matrix, used by the
//! manifold branch's coarse tangent plane estimate: eigenvectors of the two
//! largest eigenvalues of `P^T P` (neighbor coordinates stacked as rows)
//! approximate the tangent plane, and the eigenvector of the smallest
//! eigenvalue approximates the surface normal.
//!
//! Eigenvalues come from Cardano's trigonometric solution for real
//! symmetric matrices; eigenvectors come from the cross product of two
//! rows of `A - lambda*I` (valid whenever that matrix has rank <= 2, which
//! it does whenever `lambda` is an eigenvalue of a 3x3 matrix). The frame
//! is re-orthonormalized at the end so downstream `det(G) != 0` assertions
//! are not sensitive to the eigenvector step's rounding.

use std::f64::consts::PI;

type Vec3 = [f64; 3];
type Mat3 = [[f64; 3]; 3];

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

fn normalize(a: Vec3) -> Vec3 {
    let n = norm(a);
    if n < 1e-300 {
        a
    } else {
        scale(a, 1.0 / n)
    }
}

/// The result of [`largest_two_eigenvectors_3x3_sym`]: eigenvalues sorted
/// descending, and an orthonormal matrix `v` whose columns are the
/// corresponding eigenvectors (`v[i][j]` is the `i`-th component of
/// eigenvector `j`). Column 2 (smallest eigenvalue) is the surface normal
/// direction for the coarse tangent plane use case.
pub struct Eigen3x3 {
    pub eigenvalues: Vec3,
    pub v: Mat3,
}

fn eigenvector_for(a: &Mat3, lambda: f64) -> Vec3 {
    let m = [
        [a[0][0] - lambda, a[0][1], a[0][2]],
        [a[1][0], a[1][1] - lambda, a[1][2]],
        [a[2][0], a[2][1], a[2][2] - lambda],
    ];
    let candidates = [
        cross(m[0], m[1]),
        cross(m[0], m[2]),
        cross(m[1], m[2]),
    ];
    let best = candidates
        .into_iter()
        .max_by(|x, y| norm(*x).partial_cmp(&norm(*y)).unwrap())
        .unwrap();
    if norm(best) < 1e-12 {
        // `lambda` has a >1-dimensional eigenspace (e.g. isotropic neighbor cloud);
        // any unit vector orthogonal to the other eigenvectors is as valid as
        // another, so fall back to a coordinate axis and let the caller's
        // Gram-Schmidt pass sort out orthogonality.
        [1.0, 0.0, 0.0]
    } else {
        normalize(best)
    }
}

/// Eigendecomposes a symmetric 3x3 matrix `a` (only the upper triangle is
/// read; `a` is assumed symmetric).
pub fn largest_two_eigenvectors_3x3_sym(a: &Mat3) -> Eigen3x3 {
    let a01 = a[0][1];
    let a02 = a[0][2];
    let a12 = a[1][2];
    let off_diag_sq = a01 * a01 + a02 * a02 + a12 * a12;

    let eigenvalues: Vec3;
    if off_diag_sq < 1e-300 {
        let mut diag = [a[0][0], a[1][1], a[2][2]];
        diag.sort_by(|x, y| y.partial_cmp(x).unwrap());
        eigenvalues = diag;
    } else {
        let q = (a[0][0] + a[1][1] + a[2][2]) / 3.0;
        let p2 = (a[0][0] - q).powi(2) + (a[1][1] - q).powi(2) + (a[2][2] - q).powi(2)
            + 2.0 * off_diag_sq;
        let p = (p2 / 6.0).sqrt();
        let b = [
            [(a[0][0] - q) / p, a01 / p, a02 / p],
            [a01 / p, (a[1][1] - q) / p, a12 / p],
            [a02 / p, a12 / p, (a[2][2] - q) / p],
        ];
        let det_b = b[0][0] * (b[1][1] * b[2][2] - b[1][2] * b[2][1])
            - b[0][1] * (b[1][0] * b[2][2] - b[1][2] * b[2][0])
            + b[0][2] * (b[1][0] * b[2][1] - b[1][1] * b[2][0]);
        let r = (det_b / 2.0).clamp(-1.0, 1.0);
        let phi = r.acos() / 3.0;
        let eig1 = q + 2.0 * p * phi.cos();
        let eig3 = q + 2.0 * p * (phi + 2.0 * PI / 3.0).cos();
        let eig2 = 3.0 * q - eig1 - eig3;
        eigenvalues = [eig1, eig2, eig3];
    }

    let v0_raw = eigenvector_for(a, eigenvalues[0]);
    let v1_raw = eigenvector_for(a, eigenvalues[1]);

    // Re-orthonormalize: Gram-Schmidt the second vector against the first,
    // then derive the third as their cross product so `v` is exactly
    // orthonormal regardless of rounding in the eigenvector step above.
    let v0 = normalize(v0_raw);
    let v1 = normalize(sub(v1_raw, scale(v0, dot(v0, v1_raw))));
    let v1 = if norm(v1) < 1e-9 {
        // v1_raw was (numerically) parallel to v0; pick any vector orthogonal to v0.
        let fallback = if v0[0].abs() < 0.9 { [1.0, 0.0, 0.0] } else { [0.0, 1.0, 0.0] };
        normalize(sub(fallback, scale(v0, dot(v0, fallback))))
    } else {
        normalize(v1)
    };
    let v2 = normalize(cross(v0, v1));

    Eigen3x3 {
        eigenvalues,
        v: [
            [v0[0], v1[0], v2[0]],
            [v0[1], v1[1], v2[1]],
            [v0[2], v1[2], v2[2]],
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_matrix_eigenvalues_are_diagonal_entries() {
        let a = [[5.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 9.0]];
        let eig = largest_two_eigenvectors_3x3_sym(&a);
        assert_eq!(eig.eigenvalues, [9.0, 5.0, 2.0]);
    }

    #[test]
    fn frame_is_orthonormal() {
        let a = [[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let eig = largest_two_eigenvectors_3x3_sym(&a);
        let col = |j: usize| [eig.v[0][j], eig.v[1][j], eig.v[2][j]];
        for j in 0..3 {
            assert!((norm(col(j)) - 1.0).abs() < 1e-8, "column {j} not unit");
        }
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            assert!(dot(col(i), col(j)).abs() < 1e-6, "columns {i},{j} not orthogonal");
        }
    }

    #[test]
    fn flat_plane_normal_is_z_axis() {
        // neighbors scattered in the xy-plane: P^T P has a zero eigenvalue along z.
        let a = [[4.0, 1.0, 0.0], [1.0, 3.0, 0.0], [0.0, 0.0, 0.0]];
        let eig = largest_two_eigenvectors_3x3_sym(&a);
        assert!((eig.eigenvalues[2]).abs() < 1e-9);
        // normal (column 2) should align with the z axis up to sign.
        assert!(eig.v[2][2].abs() > 1.0 - 1e-6);
    }
}
