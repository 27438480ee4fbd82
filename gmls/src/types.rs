//! The GMLS data model: point clouds, neighbor table, problem descriptor,
//! and the builder that validates a configuration before any per-target
//! work begins.

use gmls_util::error::{GmlsError, GmlsResult};
use gmls_util::tables::np;
use serde::{Deserialize, Serialize};

/// How the unknown field is locally represented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconstructionSpace {
    ScalarTaylorPolynomial,
    VectorTaylorPolynomial,
    VectorOfScalarClonesTaylorPolynomial,
    DivergenceFreeVectorTaylorPolynomial,
}

impl ReconstructionSpace {
    pub fn is_vector(self) -> bool {
        !matches!(self, ReconstructionSpace::ScalarTaylorPolynomial)
    }
}

/// The linear functional applied to raw input data to produce the `s_n`
/// each alpha coefficient is contracted against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingFunctional {
    PointSample,
    StaggeredEdgeAnalyticGradientIntegralSample,
    ManifoldVectorSample,
    ManifoldGradientVectorSample,
    StaggeredEdgeIntegralSample,
}

impl SamplingFunctional {
    /// Whether this functional annihilates constants, forcing the SVD
    /// branch of the least-squares solve: a QR solve against a polynomial
    /// basis a functional kills on constants would try to factor a
    /// rank-deficient matrix.
    pub fn annihilates_constants(self) -> bool {
        matches!(
            self,
            SamplingFunctional::StaggeredEdgeAnalyticGradientIntegralSample
                | SamplingFunctional::StaggeredEdgeIntegralSample
        )
    }
}

/// Which dense factorization backs the per-target least-squares solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    Qr,
    Svd,
    Manifold,
}

/// A linear operator whose action at the target is approximated by the
/// generated alpha row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetOperator {
    ScalarPointEval,
    VectorPointEval,
    Gradient,
    PartialX,
    PartialY,
    PartialZ,
    Laplacian,
    Divergence,
    Curl,
    CurlCurl,
    DivergenceOfVectorPointEvaluation,
    ScalarFaceAverage,
    /// Manifold-only: Gaussian curvature of the locally fitted height
    /// field (see `DESIGN.md`).
    GaussianCurvature,
}

impl TargetOperator {
    /// Number of output components this operator produces per input
    /// component, for `d_local` the reconstruction's local dimension.
    pub fn output_rank(self, d_local: usize) -> usize {
        match self {
            TargetOperator::ScalarPointEval
            | TargetOperator::PartialX
            | TargetOperator::PartialY
            | TargetOperator::PartialZ
            | TargetOperator::Laplacian
            | TargetOperator::Divergence
            | TargetOperator::DivergenceOfVectorPointEvaluation
            | TargetOperator::ScalarFaceAverage
            | TargetOperator::GaussianCurvature => 1,
            TargetOperator::VectorPointEval => d_local,
            TargetOperator::Gradient => d_local,
            TargetOperator::Curl => {
                if d_local == 2 {
                    1
                } else {
                    3
                }
            }
            TargetOperator::CurlCurl => d_local,
        }
    }

    /// Whether this operator honors additional evaluation sites: everything
    /// except the two operators whose quadrature/curvature machinery only
    /// ever reads a single evaluation point in the original source.
    pub fn supports_additional_sites(self) -> bool {
        !matches!(
            self,
            TargetOperator::ScalarFaceAverage | TargetOperator::GaussianCurvature
        )
    }
}

/// `N_src` source points in `R^d_global`, plus optional per-point data
/// future sampling functionals might need (none of the implemented ones
/// do today, so this is currently unused but kept for parity with the
/// original's per-point auxiliary data slot).
#[derive(Clone, Debug)]
pub struct SourceCloud {
    pub coords: Vec<f64>,
    pub dimension: usize,
}

impl SourceCloud {
    pub fn new(coords: Vec<f64>, dimension: usize) -> GmlsResult<Self> {
        if dimension == 0 || coords.len() % dimension != 0 {
            return Err(GmlsError::config_invalid(format!(
                "source coords length {} is not a multiple of dimension {dimension}",
                coords.len()
            )));
        }
        Ok(SourceCloud { coords, dimension })
    }

    pub fn len(&self) -> usize {
        self.coords.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn point(&self, i: usize) -> &[f64] {
        &self.coords[i * self.dimension..(i + 1) * self.dimension]
    }
}

/// Per-target extra data required by operators that need more than a
/// point and a support radius: currently only the cell vertices consumed
/// by `ScalarFaceAverage`.
#[derive(Clone, Debug, Default)]
pub struct TargetExtraData {
    /// Flattened `(num_vertices, dimension)` cell vertex coordinates, one
    /// entry per target (empty when not a face-average target).
    pub cell_vertices: Vec<Vec<f64>>,
}

/// `N_tgt` target points in `R^d_global`, each with a support radius.
#[derive(Clone, Debug)]
pub struct TargetCloud {
    pub coords: Vec<f64>,
    pub epsilon: Vec<f64>,
    pub dimension: usize,
    /// Per-target list of additional evaluation sites (flattened
    /// `(num_sites, dimension)`), empty when a target has none.
    pub additional_sites: Vec<Vec<f64>>,
    pub extra_data: TargetExtraData,
}

impl TargetCloud {
    pub fn new(coords: Vec<f64>, epsilon: Vec<f64>, dimension: usize) -> GmlsResult<Self> {
        if dimension == 0 || coords.len() % dimension != 0 {
            return Err(GmlsError::config_invalid(format!(
                "target coords length {} is not a multiple of dimension {dimension}",
                coords.len()
            )));
        }
        let n_tgt = coords.len() / dimension;
        if epsilon.len() != n_tgt {
            return Err(GmlsError::config_invalid(format!(
                "epsilon length {} does not match target count {n_tgt}",
                epsilon.len()
            )));
        }
        for (t, &eps) in epsilon.iter().enumerate() {
            if !(eps > 1e-300) {
                return Err(GmlsError::input_inconsistent(
                    Some(t),
                    format!("support radius epsilon must be > 0, got {eps}"),
                ));
            }
        }
        Ok(TargetCloud {
            coords,
            epsilon,
            dimension,
            additional_sites: vec![Vec::new(); n_tgt],
            extra_data: TargetExtraData::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.coords.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn point(&self, t: usize) -> &[f64] {
        &self.coords[t * self.dimension..(t + 1) * self.dimension]
    }

    pub fn num_additional_sites(&self, t: usize) -> usize {
        self.additional_sites[t].len() / self.dimension
    }

    pub fn additional_site(&self, t: usize, k: usize) -> &[f64] {
        &self.additional_sites[t][k * self.dimension..(k + 1) * self.dimension]
    }
}

/// For each target `t`, an ordered list of source indices `nbr(t,
/// 0..k_t-1)` with `k_t <= k_max`. Stored flat, row stride `k_max + 1`,
/// column 0 holding `k_t` itself — matching the original's
/// `_neighbor_lists` layout exactly.
#[derive(Clone, Debug)]
pub struct NeighborTable {
    data: Vec<u32>,
    n_tgt: usize,
    k_max: usize,
}

impl NeighborTable {
    /// `rows[t]` is the list of neighbor source indices for target `t`;
    /// `k_max` must be at least the longest row.
    pub fn new(rows: Vec<Vec<u32>>, k_max: usize) -> GmlsResult<Self> {
        let n_tgt = rows.len();
        let mut data = vec![0u32; n_tgt * (k_max + 1)];
        for (t, row) in rows.into_iter().enumerate() {
            if row.len() > k_max {
                return Err(GmlsError::input_inconsistent(
                    Some(t),
                    format!("neighbor count {} exceeds k_max {k_max}", row.len()),
                ));
            }
            let stride = k_max + 1;
            data[t * stride] = row.len() as u32;
            data[t * stride + 1..t * stride + 1 + row.len()].copy_from_slice(&row);
        }
        Ok(NeighborTable { data, n_tgt, k_max })
    }

    pub fn n_tgt(&self) -> usize {
        self.n_tgt
    }

    pub fn k_max(&self) -> usize {
        self.k_max
    }

    pub fn count(&self, t: usize) -> usize {
        self.data[t * (self.k_max + 1)] as usize
    }

    pub fn neighbors(&self, t: usize) -> &[u32] {
        let stride = self.k_max + 1;
        let k_t = self.count(t);
        &self.data[t * stride + 1..t * stride + 1 + k_t]
    }
}

/// Derived multipliers that stay fixed for the whole batch once the
/// problem is configured.
#[derive(Clone, Copy, Debug)]
pub struct Multipliers {
    pub basis_mult: usize,
    pub sampling_mult: usize,
    pub np: usize,
    pub np_manifold: usize,
}

/// A fully validated GMLS problem descriptor, produced by
/// [`GmlsConfig::build`]. Immutable for the lifetime of the engine: every
/// entity is fixed once `generate_alphas` runs, except the outputs
/// themselves.
#[derive(Clone, Debug)]
pub struct GmlsProblem {
    pub polynomial_order: usize,
    pub curvature_polynomial_order: usize,
    pub dimension: usize,
    pub reconstruction_space: ReconstructionSpace,
    pub polynomial_sampling_functional: SamplingFunctional,
    pub data_sampling_functional: SamplingFunctional,
    pub solver_kind: SolverKind,
    pub operators: Vec<TargetOperator>,
    pub multipliers: Multipliers,
}

impl GmlsProblem {
    pub fn d_local(&self) -> usize {
        if self.solver_kind == SolverKind::Manifold {
            self.dimension - 1
        } else {
            self.dimension
        }
    }

    /// Total output components across every requested operator, derived
    /// once here rather than asked of the caller (mirrors the original's
    /// `_total_alpha_values`).
    pub fn total_alpha_values(&self) -> usize {
        let d_local = self.d_local();
        self.operators.iter().map(|op| op.output_rank(d_local)).sum()
    }
}

const MAX_POLYNOMIAL_ORDER: usize = 14;

/// Builder for a [`GmlsProblem`]; mirrors the original's setter-method
/// interface (`set_polynomial_order`, `add_target`, ...).
#[derive(Clone, Debug, Default)]
pub struct GmlsConfig {
    polynomial_order: Option<usize>,
    curvature_polynomial_order: usize,
    dimension: Option<usize>,
    reconstruction_space: Option<ReconstructionSpace>,
    polynomial_sampling_functional: Option<SamplingFunctional>,
    data_sampling_functional: Option<SamplingFunctional>,
    solver_kind: Option<SolverKind>,
    operators: Vec<TargetOperator>,
}

impl GmlsConfig {
    pub fn new() -> Self {
        GmlsConfig::default()
    }

    pub fn set_polynomial_order(mut self, p: usize) -> Self {
        self.polynomial_order = Some(p);
        self
    }

    pub fn set_curvature_polynomial_order(mut self, p_m: usize) -> Self {
        self.curvature_polynomial_order = p_m;
        self
    }

    pub fn set_dimension(mut self, d_global: usize) -> Self {
        self.dimension = Some(d_global);
        self
    }

    pub fn set_reconstruction_space(mut self, space: ReconstructionSpace) -> Self {
        self.reconstruction_space = Some(space);
        self
    }

    /// Defaults to `PointSample` when never called.
    pub fn set_polynomial_sampling_functional(mut self, f: SamplingFunctional) -> Self {
        self.polynomial_sampling_functional = Some(f);
        self
    }

    /// Defaults to `PointSample` when never called.
    pub fn set_data_sampling_functional(mut self, f: SamplingFunctional) -> Self {
        self.data_sampling_functional = Some(f);
        self
    }

    pub fn set_solver_type(mut self, solver: SolverKind) -> Self {
        self.solver_kind = Some(solver);
        self
    }

    pub fn add_target(mut self, operator: TargetOperator) -> Self {
        self.operators.push(operator);
        self
    }

    /// Validates the accumulated configuration and derives the fixed
    /// multipliers, strictly before any allocation.
    pub fn build(self) -> GmlsResult<GmlsProblem> {
        let dimension = self
            .dimension
            .ok_or_else(|| GmlsError::config_invalid("dimension was never set"))?;
        if !(1..=3).contains(&dimension) {
            return Err(GmlsError::config_invalid(format!(
                "dimension must be in 1..=3, got {dimension}"
            )));
        }
        let polynomial_order = self
            .polynomial_order
            .ok_or_else(|| GmlsError::config_invalid("polynomial order was never set"))?;
        if polynomial_order > MAX_POLYNOMIAL_ORDER {
            return Err(GmlsError::config_invalid(format!(
                "polynomial order {polynomial_order} exceeds the supported maximum {MAX_POLYNOMIAL_ORDER}"
            )));
        }
        let reconstruction_space = self
            .reconstruction_space
            .ok_or_else(|| GmlsError::config_invalid("reconstruction space was never set"))?;
        let solver_kind = self
            .solver_kind
            .ok_or_else(|| GmlsError::config_invalid("solver kind was never set"))?;
        if self.operators.is_empty() {
            return Err(GmlsError::config_invalid("no target operators were added"));
        }

        let polynomial_sampling_functional = self
            .polynomial_sampling_functional
            .unwrap_or(SamplingFunctional::PointSample);
        let data_sampling_functional = self
            .data_sampling_functional
            .unwrap_or(SamplingFunctional::PointSample);

        if solver_kind != SolverKind::Manifold
            && matches!(
                data_sampling_functional,
                SamplingFunctional::ManifoldVectorSample
                    | SamplingFunctional::ManifoldGradientVectorSample
            )
        {
            return Err(GmlsError::config_invalid(
                "manifold sampling functionals require SolverKind::Manifold",
            ));
        }

        // A sampling functional that annihilates constants leaves sqrt(W)P
        // rank-deficient, so QR's full-rank assumption can never hold for it.
        if solver_kind == SolverKind::Qr
            && (polynomial_sampling_functional.annihilates_constants()
                || data_sampling_functional.annihilates_constants())
        {
            return Err(GmlsError::config_invalid(
                "a sampling functional that annihilates constants requires SolverKind::Svd, not Qr",
            ));
        }

        for &op in &self.operators {
            if op == TargetOperator::GaussianCurvature && solver_kind != SolverKind::Manifold {
                return Err(GmlsError::config_invalid(
                    "GaussianCurvature is only valid under SolverKind::Manifold",
                ));
            }
            if reconstruction_space == ReconstructionSpace::DivergenceFreeVectorTaylorPolynomial
                && dimension == 3
                && matches!(op, TargetOperator::Curl | TargetOperator::CurlCurl)
            {
                return Err(GmlsError::not_implemented(
                    "3D divergence-free vector basis is not implemented",
                ));
            }
        }

        let d_local = if solver_kind == SolverKind::Manifold {
            dimension - 1
        } else {
            dimension
        };

        // `StaggeredEdgeAnalyticGradientIntegralSample` bumps the effective
        // polynomial order by one internally so the gradient of the basis
        // retains nominal order.
        let effective_p = if polynomial_sampling_functional
            == SamplingFunctional::StaggeredEdgeAnalyticGradientIntegralSample
        {
            polynomial_order + 1
        } else {
            polynomial_order
        };

        let basis_mult = if reconstruction_space == ReconstructionSpace::ScalarTaylorPolynomial {
            1
        } else {
            d_local
        };
        let sampling_mult = match data_sampling_functional {
            SamplingFunctional::ManifoldVectorSample
            | SamplingFunctional::ManifoldGradientVectorSample => d_local,
            _ => 1,
        };

        Ok(GmlsProblem {
            polynomial_order: effective_p,
            curvature_polynomial_order: self.curvature_polynomial_order,
            dimension,
            reconstruction_space,
            polynomial_sampling_functional,
            data_sampling_functional,
            solver_kind,
            operators: self.operators,
            multipliers: Multipliers {
                basis_mult,
                sampling_mult,
                np: np(effective_p, d_local),
                np_manifold: np(self.curvature_polynomial_order, d_local),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_missing_dimension() {
        let err = GmlsConfig::new()
            .set_polynomial_order(2)
            .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
            .set_solver_type(SolverKind::Qr)
            .add_target(TargetOperator::ScalarPointEval)
            .build()
            .unwrap_err();
        assert!(matches!(err, GmlsError::ConfigInvalid { .. }));
    }

    #[test]
    fn build_accepts_minimal_flat_scalar_problem() {
        let problem = GmlsConfig::new()
            .set_polynomial_order(2)
            .set_dimension(2)
            .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
            .set_solver_type(SolverKind::Qr)
            .add_target(TargetOperator::ScalarPointEval)
            .build()
            .unwrap();
        assert_eq!(problem.multipliers.np, np(2, 2));
        assert_eq!(problem.multipliers.basis_mult, 1);
    }

    #[test]
    fn staggered_sampling_bumps_polynomial_order() {
        let problem = GmlsConfig::new()
            .set_polynomial_order(2)
            .set_dimension(2)
            .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
            .set_polynomial_sampling_functional(
                SamplingFunctional::StaggeredEdgeAnalyticGradientIntegralSample,
            )
            .set_solver_type(SolverKind::Svd)
            .add_target(TargetOperator::DivergenceOfVectorPointEvaluation)
            .build()
            .unwrap();
        assert_eq!(problem.polynomial_order, 3);
    }

    #[test]
    fn gaussian_curvature_requires_manifold_solver() {
        let err = GmlsConfig::new()
            .set_polynomial_order(2)
            .set_dimension(3)
            .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
            .set_solver_type(SolverKind::Qr)
            .add_target(TargetOperator::GaussianCurvature)
            .build()
            .unwrap_err();
        assert!(matches!(err, GmlsError::ConfigInvalid { .. }));
    }

    #[test]
    fn neighbor_table_layout() {
        let table = NeighborTable::new(vec![vec![0, 1, 2], vec![3, 4]], 4).unwrap();
        assert_eq!(table.count(0), 3);
        assert_eq!(table.neighbors(0), &[0, 1, 2]);
        assert_eq!(table.count(1), 2);
        assert_eq!(table.neighbors(1), &[3, 4]);
    }

    #[test]
    fn neighbor_table_rejects_overflow() {
        let err = NeighborTable::new(vec![vec![0, 1, 2, 3, 4]], 3).unwrap_err();
        assert!(matches!(err, GmlsError::InputInconsistent { .. }));
    }
}
