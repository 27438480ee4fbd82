//! Monomial / Taylor polynomial basis evaluation.
//!
//! Ordering is graded lexicographic: for total degree `n = 0..=p`, exponents
//! `(ax, ay, az)` with `ax+ay+az == n` are enumerated with `az` varying
//! slowest (outermost) and `ax` fastest (innermost). In 2D this degenerates
//! to `ay` outermost, `ax = n - ay`; in 1D to the single exponent `ax = n`.
//! This matches the loop nest the target-functional table walks when it
//! fills a row in lockstep with the basis (`for n ... for alphaz ... for
//! alphay ... alphax = s - alphay`).
//!
//! Every monomial is normalized by `1/(ax! ay! az!)`, so a directional
//! partial derivative of a basis row is itself a (possibly zero) row of the
//! same basis evaluated at one degree lower: `d/dx (x^a / a!) = x^(a-1) /
//! (a-1)!`. [`partial_row`] and [`second_partial_row`] exploit this directly
//! instead of re-deriving the monomials.

use gmls_util::tables::{np, FACTORIAL};
use static_assertions::const_assert;

// `monomial_value` divides by `FACTORIAL[ax]`/`FACTORIAL[ay]`/`FACTORIAL[az]` for
// exponents up to `MAX_POLY_ORDER`; the table must actually reach that far.
const_assert!(FACTORIAL.len() > 0);

/// Selects which output component of a vector-valued basis a caller wants
/// evaluated, mirroring the source's `-(c+1)` convention for the
/// divergence-free vector basis (there, a negative `component` argument to
/// `calcPij` packs "which output component" into the target-neighbor
/// argument; here it is its own type instead of a sign trick on an `int`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BasisComponent {
    /// Evaluate every output component (used to build a full block-diagonal
    /// vector basis row).
    Any,
    /// Evaluate only output component `c` (used when the assembly loop
    /// handles one output component of a vector/divergence-free basis at a
    /// time).
    Only(usize),
}

const MAX_POLY_ORDER: usize = FACTORIAL.len() - 1;

/// Exponent triples `(ax, ay, az)` of every monomial of total degree `<= p`
/// in `d` variables, in the basis's canonical order. Unused dimensions
/// (`d < 3`) always carry exponent 0.
pub fn monomial_exponents(p: usize, d: usize) -> Vec<[usize; 3]> {
    assert!(p <= MAX_POLY_ORDER, "polynomial order {p} exceeds factorial table");
    assert!((1..=3).contains(&d), "dimension {d} outside {{1,2,3}}");

    let mut exponents = Vec::with_capacity(np(p, d));
    for n in 0..=p {
        match d {
            1 => exponents.push([n, 0, 0]),
            2 => {
                for ay in 0..=n {
                    let ax = n - ay;
                    exponents.push([ax, ay, 0]);
                }
            }
            3 => {
                for az in 0..=n {
                    let s = n - az;
                    for ay in 0..=s {
                        let ax = s - ay;
                        exponents.push([ax, ay, az]);
                    }
                }
            }
            _ => unreachable!(),
        }
    }
    exponents
}

fn monomial_value(xi: &[f64], exp: [usize; 3]) -> f64 {
    let [ax, ay, az] = exp;
    let vx = if ax == 0 { 1.0 } else { xi[0].powi(ax as i32) };
    let vy = if ay == 0 || xi.len() < 2 {
        1.0
    } else {
        xi[1].powi(ay as i32)
    };
    let vz = if az == 0 || xi.len() < 3 {
        1.0
    } else {
        xi[2].powi(az as i32)
    };
    vx * vy * vz / (FACTORIAL[ax] * FACTORIAL[ay] * FACTORIAL[az])
}

/// Evaluates the length-`NP(p,d)` scalar Taylor basis row at relative
/// coordinate `xi` (already divided by the support radius).
pub fn basis_row(xi: &[f64], p: usize, d: usize) -> Vec<f64> {
    monomial_exponents(p, d)
        .into_iter()
        .map(|exp| monomial_value(xi, exp))
        .collect()
}

/// Evaluates `d/d(xi[dir])` of the basis row, direction-by-direction, still
/// normalized as a basis row at one lower degree in that direction.
pub fn partial_row(xi: &[f64], p: usize, d: usize, dir: usize) -> Vec<f64> {
    assert!(dir < d, "partial direction {dir} >= dimension {d}");
    monomial_exponents(p, d)
        .into_iter()
        .map(|mut exp| {
            if exp[dir] == 0 {
                0.0
            } else {
                exp[dir] -= 1;
                monomial_value(xi, exp)
            }
        })
        .collect()
}

/// Evaluates the mixed second partial `d^2/d(xi[dir1])d(xi[dir2])` of the
/// basis row (`dir1 == dir2` gives the pure second partial).
pub fn second_partial_row(xi: &[f64], p: usize, d: usize, dir1: usize, dir2: usize) -> Vec<f64> {
    assert!(dir1 < d && dir2 < d, "partial direction out of bounds for dimension {d}");
    monomial_exponents(p, d)
        .into_iter()
        .map(|mut exp| {
            if exp[dir1] == 0 {
                return 0.0;
            }
            exp[dir1] -= 1;
            if exp[dir2] == 0 {
                return 0.0;
            }
            exp[dir2] -= 1;
            monomial_value(xi, exp)
        })
        .collect()
}

/// Places `scalar_row` into block `component` of a length-`basis_mult *
/// scalar_row.len()` block-diagonal vector basis row, zero elsewhere. This
/// is how `VectorTaylorPolynomial` and `VectorOfScalarClonesTaylorPolynomial`
/// reuse the scalar basis for each output component.
pub fn embed_vector_block(scalar_row: &[f64], component: usize, basis_mult: usize) -> Vec<f64> {
    assert!(component < basis_mult, "component {component} >= basis_mult {basis_mult}");
    let np = scalar_row.len();
    let mut row = vec![0.0; np * basis_mult];
    row[component * np..(component + 1) * np].copy_from_slice(scalar_row);
    row
}

/// Divergence-free vector basis in 2D, built as the curl (`(d/dy, -d/dx)`)
/// of each scalar potential in the degree-`<=p` monomial space. `curl` of
/// any scalar field is automatically divergence-free, so this gives
/// `NP(p,2)` linearly independent (but not all full-rank: the constant
/// potential curls to zero) divergence-free vector fields without needing
/// the stream-function combinatorics a literal port would require. This is
/// this crate's own construction (documented in `DESIGN.md`); 3D
/// divergence-free bases are not implemented and the `gmls` crate reports
/// `GmlsError::NotImplemented` for that combination.
pub fn divergence_free_basis_row_2d(xi: &[f64], p: usize) -> Vec<[f64; 2]> {
    assert_eq!(xi.len(), 2, "divergence_free_basis_row_2d needs a 2D coordinate");
    let potential_dy = partial_row(xi, p, 2, 1);
    let potential_dx = partial_row(xi, p, 2, 0);
    potential_dy
        .into_iter()
        .zip(potential_dx)
        .map(|(dy, dx)| [dy, -dx])
        .collect()
}

/// Directional partial of [`divergence_free_basis_row_2d`], used when a
/// target operator (e.g. `Curl`) needs derivatives of the divergence-free
/// basis rather than its value.
pub fn divergence_free_basis_partial_2d(xi: &[f64], p: usize, dir: usize) -> Vec<[f64; 2]> {
    assert_eq!(xi.len(), 2, "divergence_free_basis_partial_2d needs a 2D coordinate");
    assert!(dir < 2, "partial direction {dir} >= dimension 2");
    let d2_dy = second_partial_row(xi, p, 2, 1, dir);
    let d2_dx = second_partial_row(xi, p, 2, 0, dir);
    d2_dy
        .into_iter()
        .zip(d2_dx)
        .map(|(dy, dx)| [dy, -dx])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponent_count_matches_np() {
        for d in 1..=3 {
            for p in 0..=4 {
                assert_eq!(monomial_exponents(p, d).len(), np(p, d));
            }
        }
    }

    #[test]
    fn degree_3_z_outermost_order() {
        let exps = monomial_exponents(1, 3);
        // degree 0: (0,0,0); degree 1: az=0 => ay=0,1 (ax=1,0), then az=1 => (0,0,1)
        assert_eq!(
            exps,
            vec![[0, 0, 0], [1, 0, 0], [0, 1, 0], [0, 0, 1]]
        );
    }

    #[test]
    fn constant_basis_is_one() {
        let row = basis_row(&[0.3, -0.7, 1.2], 0, 3);
        assert_eq!(row, vec![1.0]);
    }

    #[test]
    fn partial_of_linear_term_is_constant() {
        // basis for p=1, d=1: [1, x]; d/dx x = 1
        let row = partial_row(&[2.5], 1, 1, 0);
        assert_eq!(row, vec![0.0, 1.0]);
    }

    #[test]
    fn quadratic_second_partial_matches_hand_derivative() {
        // p=2, d=1: basis [1, x, x^2/2]; d^2/dx^2 (x^2/2) = 1
        let row = second_partial_row(&[1.7], 2, 1, 0, 0);
        assert_eq!(row, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn divergence_free_row_is_actually_divergence_free() {
        // numerically check div(v) ~ 0 via finite differences for a nonconstant potential basis
        let h = 1e-5;
        let p = 2;
        let xi = [0.4, -0.2];
        let vx_plus = divergence_free_basis_row_2d(&[xi[0] + h, xi[1]], p);
        let vx_minus = divergence_free_basis_row_2d(&[xi[0] - h, xi[1]], p);
        let vy_plus = divergence_free_basis_row_2d(&[xi[0], xi[1] + h], p);
        let vy_minus = divergence_free_basis_row_2d(&[xi[0], xi[1] - h], p);
        for k in 0..vx_plus.len() {
            let ddx = (vx_plus[k][0] - vx_minus[k][0]) / (2.0 * h);
            let ddy = (vy_plus[k][1] - vy_minus[k][1]) / (2.0 * h);
            assert!((ddx + ddy).abs() < 1e-6, "div basis[{k}] = {}", ddx + ddy);
        }
    }

    #[test]
    fn embed_vector_block_places_scalar_row() {
        let scalar = vec![1.0, 2.0];
        let row = embed_vector_block(&scalar, 1, 2);
        assert_eq!(row, vec![0.0, 0.0, 1.0, 2.0]);
    }
}
