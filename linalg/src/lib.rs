//! Per-target dense linear algebra and polynomial basis evaluation for GMLS.
//!
//! Every routine here operates on a single target's local system (basis
//! assembly, weighting, QR or SVD factorization, triangular solve, tangent
//! plane eigendecomposition); none of it knows about clouds, neighbor
//! tables, or target operators. Those live one layer up, in the `gmls`
//! crate, which is the only consumer expected to batch these calls across
//! many targets.

pub mod eigen3x3;
pub mod poly_basis;
pub mod qr;
pub mod svd;
pub mod triangular;
pub mod weights;

pub use eigen3x3::{largest_two_eigenvectors_3x3_sym, Eigen3x3};
pub use poly_basis::{
    basis_row, divergence_free_basis_partial_2d, divergence_free_basis_row_2d,
    embed_vector_block, monomial_exponents, partial_row, second_partial_row, BasisComponent,
};
pub use qr::householder_qr_factorize;
pub use svd::{jacobi_svd_factorize, solve_pseudo_inverse, SvdFactorization};
pub use triangular::back_substitute_upper;
pub use weights::{sqrt_weights_for_distances, weights_for_distances, WeightingKernel};
