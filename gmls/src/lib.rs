#![allow(clippy::too_many_arguments)]

//! A Generalized Moving Least Squares (GMLS) stencil coefficient engine:
//! given a scattered point cloud, per-target neighbor lists, and a
//! description of what to reconstruct (polynomial space, sampling
//! functional, target operator), [`GMLS::generate_alphas`] produces, for
//! every target, the dense `alpha` row such that `Σ_n alpha_n * s_n`
//! approximates the requested operator's action at the target to the
//! chosen polynomial order.
//!
//! Invoked programmatically: build a [`types::GmlsConfig`], set the point
//! clouds and neighbor table, call [`GMLS::generate_alphas`], then read
//! results back with [`GMLS::get_alpha`] / [`GMLS::get_prestencil_weight`].
//! There is no CLI, file format, or wire protocol.

pub mod error;
pub mod manifold;
pub mod orchestrator;
pub mod prestencil;
pub mod target_row;
pub mod types;
pub mod util;

pub use error::{GmlsError, GmlsResult};
pub use types::{
    GmlsConfig, GmlsProblem, NeighborTable, ReconstructionSpace, SamplingFunctional, SolverKind,
    SourceCloud, TargetCloud, TargetExtraData, TargetOperator,
};

use orchestrator::TargetOutput;
use util::timing::TimingTree;

/// The engine. Holds the validated problem descriptor, the input clouds,
/// and (once [`GMLS::generate_alphas`] has run) the per-target outputs.
pub struct GMLS {
    problem: GmlsProblem,
    sources: SourceCloud,
    targets: TargetCloud,
    neighbors: NeighborTable,
    operator_coefficients: Option<Vec<f64>>,
    outputs: Option<Vec<TargetOutput>>,
}

impl GMLS {
    /// Validates that the clouds and neighbor table are consistent with
    /// `problem`'s dimension and target count; configuration checks run
    /// before any allocation.
    pub fn new(
        problem: GmlsProblem,
        sources: SourceCloud,
        targets: TargetCloud,
        neighbors: NeighborTable,
    ) -> GmlsResult<Self> {
        if sources.dimension != problem.dimension {
            return Err(GmlsError::config_invalid(format!(
                "source cloud dimension {} does not match problem dimension {}",
                sources.dimension, problem.dimension
            )));
        }
        if targets.dimension != problem.dimension {
            return Err(GmlsError::config_invalid(format!(
                "target cloud dimension {} does not match problem dimension {}",
                targets.dimension, problem.dimension
            )));
        }
        if neighbors.n_tgt() != targets.len() {
            return Err(GmlsError::config_invalid(format!(
                "neighbor table has {} rows but there are {} targets",
                neighbors.n_tgt(),
                targets.len()
            )));
        }
        for t in 0..targets.len() {
            let k_t = neighbors.count(t);
            for &n in neighbors.neighbors(t) {
                if n as usize >= sources.len() {
                    return Err(GmlsError::input_inconsistent(
                        Some(t),
                        format!("neighbor index {n} is out of range for {} sources", sources.len()),
                    ));
                }
            }
            let _ = k_t;
        }
        Ok(GMLS {
            problem,
            sources,
            targets,
            neighbors,
            operator_coefficients: None,
            outputs: None,
        })
    }

    /// Sets the per-source-point coefficients
    /// `StaggeredEdgeAnalyticGradientIntegralSample` reads.
    pub fn set_operator_coefficients(&mut self, coefficients: Vec<f64>) -> GmlsResult<()> {
        if coefficients.len() != self.sources.len() {
            return Err(GmlsError::config_invalid(format!(
                "operator coefficients length {} does not match source count {}",
                coefficients.len(),
                self.sources.len()
            )));
        }
        self.operator_coefficients = Some(coefficients);
        Ok(())
    }

    /// Attaches the cell vertices a `ScalarFaceAverage` target needs.
    pub fn set_target_cell_vertices(&mut self, target: usize, vertices: Vec<f64>) -> GmlsResult<()> {
        let cells = &mut self.targets.extra_data.cell_vertices;
        if target >= cells.len() {
            return Err(GmlsError::input_inconsistent(Some(target), "target index out of range"));
        }
        cells[target] = vertices;
        Ok(())
    }

    /// Attaches additional evaluation sites to a target.
    pub fn set_additional_sites(&mut self, target: usize, sites: Vec<f64>) -> GmlsResult<()> {
        if target >= self.targets.additional_sites.len() {
            return Err(GmlsError::input_inconsistent(Some(target), "target index out of range"));
        }
        self.targets.additional_sites[target] = sites;
        Ok(())
    }

    /// Drives the whole pipeline: every target's weights, basis assembly,
    /// factorization, target-row application, and prestencil weights.
    /// Data-parallel across targets; see `orchestrator`'s module doc
    /// comment.
    pub fn generate_alphas(&mut self) -> GmlsResult<()> {
        let mut timing = TimingTree::default();
        let outputs = crate::timed!(
            timing,
            "generate_alphas",
            orchestrator::generate_all(
                &self.problem,
                &self.sources,
                &self.targets,
                &self.neighbors,
                self.operator_coefficients.as_deref(),
            )
        )?;
        timing.print();
        self.outputs = Some(outputs);
        Ok(())
    }

    fn outputs(&self) -> GmlsResult<&[TargetOutput]> {
        self.outputs
            .as_deref()
            .ok_or_else(|| GmlsError::config_invalid("generate_alphas has not been called yet"))
    }

    fn operator(&self, operator_index: usize) -> GmlsResult<TargetOperator> {
        self.problem
            .operators
            .get(operator_index)
            .copied()
            .ok_or_else(|| GmlsError::config_invalid(format!("operator index {operator_index} out of range")))
    }

    /// `alpha(target, operator_index, output_component, input_component,
    /// neighbor_index, additional_site_index)`. `input_component` selects
    /// among `sampling_mult` sampled components per neighbor (always `0`
    /// for scalar point sampling).
    pub fn get_alpha(
        &self,
        target: usize,
        operator_index: usize,
        output_component: usize,
        input_component: usize,
        neighbor_index: usize,
        additional_site_index: usize,
    ) -> GmlsResult<f64> {
        let outputs = self.outputs()?;
        let out = outputs
            .get(target)
            .ok_or_else(|| GmlsError::input_inconsistent(Some(target), "target index out of range"))?;
        let op = self.operator(operator_index)?;
        if op == TargetOperator::GaussianCurvature {
            return Err(GmlsError::config_invalid(
                "GaussianCurvature has no alpha row; use GMLS::gaussian_curvature instead",
            ));
        }
        let d_local = self.problem.d_local();
        let output_rank = op.output_rank(d_local);
        let m = self.problem.multipliers;
        let k_t = self.neighbors.count(target);
        if input_component >= m.sampling_mult {
            return Err(GmlsError::input_inconsistent(Some(target), "input component out of range"));
        }
        if neighbor_index >= k_t {
            return Err(GmlsError::input_inconsistent(Some(target), "neighbor index out of range"));
        }
        if output_component >= output_rank {
            return Err(GmlsError::input_inconsistent(Some(target), "output component out of range"));
        }
        let row_len = k_t * m.sampling_mult;
        let num_sites = 1 + self.targets.num_additional_sites(target);
        if additional_site_index >= num_sites {
            return Err(GmlsError::input_inconsistent(Some(target), "additional site index out of range"));
        }
        let alpha = out
            .alpha
            .get(operator_index)
            .ok_or_else(|| GmlsError::config_invalid("operator has no recorded alpha values"))?;
        let idx = additional_site_index * output_rank * row_len
            + output_component * row_len
            + neighbor_index * m.sampling_mult
            + input_component;
        alpha
            .get(idx)
            .copied()
            .ok_or_else(|| GmlsError::config_invalid("alpha index out of range"))
    }

    /// `prestencil(target, output_component, input_component, neighbor_index,
    /// end_index)`. Only meaningful when
    /// `data_sampling_functional != SamplingFunctional::PointSample`.
    pub fn get_prestencil_weight(
        &self,
        target: usize,
        output_component: usize,
        input_component: usize,
        neighbor_index: usize,
        end_index: usize,
    ) -> GmlsResult<f64> {
        let outputs = self.outputs()?;
        let out = outputs
            .get(target)
            .ok_or_else(|| GmlsError::input_inconsistent(Some(target), "target index out of range"))?;
        let table = out
            .prestencil
            .as_ref()
            .ok_or_else(|| GmlsError::config_invalid("no prestencil table for this sampling functional"))?;
        let d = self.sources.dimension;
        let k_t = self.neighbors.count(target);
        if neighbor_index >= k_t {
            return Err(GmlsError::input_inconsistent(Some(target), "neighbor index out of range"));
        }

        let idx = match self.problem.data_sampling_functional {
            SamplingFunctional::PointSample => {
                return Err(GmlsError::config_invalid("PointSample has no prestencil table"));
            }
            SamplingFunctional::StaggeredEdgeAnalyticGradientIntegralSample => {
                if end_index >= 2 {
                    return Err(GmlsError::input_inconsistent(Some(target), "end index must be 0 or 1"));
                }
                neighbor_index * 2 + end_index
            }
            SamplingFunctional::StaggeredEdgeIntegralSample => {
                if end_index >= 2 || input_component >= d {
                    return Err(GmlsError::input_inconsistent(
                        Some(target),
                        "end index must be 0 or 1, input component must be an ambient dimension",
                    ));
                }
                neighbor_index * 2 * d + end_index * d + input_component
            }
            SamplingFunctional::ManifoldVectorSample | SamplingFunctional::ManifoldGradientVectorSample => {
                let d_local = self.problem.d_local();
                if output_component >= d_local || input_component >= 3 {
                    return Err(GmlsError::input_inconsistent(
                        Some(target),
                        "output component must be a tangent direction, input component an ambient coordinate",
                    ));
                }
                output_component * 3 + input_component
            }
        };
        table
            .get(idx)
            .copied()
            .ok_or_else(|| GmlsError::config_invalid("prestencil index out of range"))
    }

    /// The manifold-only Gaussian curvature output; see `target_row`'s
    /// module doc comment for why this is not routed through
    /// [`GMLS::get_alpha`].
    pub fn gaussian_curvature(&self, target: usize, operator_index: usize) -> GmlsResult<f64> {
        let op = self.operator(operator_index)?;
        if op != TargetOperator::GaussianCurvature {
            return Err(GmlsError::config_invalid("operator_index does not name GaussianCurvature"));
        }
        let outputs = self.outputs()?;
        let out = outputs
            .get(target)
            .ok_or_else(|| GmlsError::input_inconsistent(Some(target), "target index out of range"))?;
        out.gaussian_curvature
            .ok_or_else(|| GmlsError::config_invalid("no Gaussian curvature was computed for this target"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_one() -> GMLS {
        let coords: Vec<f64> = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        let sources = SourceCloud::new(coords, 1).unwrap();
        let targets = TargetCloud::new(vec![0.0], vec![2.0], 1).unwrap();
        let neighbors = NeighborTable::new(vec![vec![0, 1, 2, 3, 4]], 5).unwrap();
        let problem = GmlsConfig::new()
            .set_polynomial_order(2)
            .set_dimension(1)
            .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
            .set_solver_type(SolverKind::Qr)
            .add_target(TargetOperator::Laplacian)
            .build()
            .unwrap();
        GMLS::new(problem, sources, targets, neighbors).unwrap()
    }

    #[test]
    fn end_to_end_laplacian_reproduces_quadratic() {
        let mut gmls = scenario_one();
        gmls.generate_alphas().unwrap();
        let f = [4.0, 1.0, 0.0, 1.0, 4.0]; // x^2 at {-2,-1,0,1,2}
        let mut value = 0.0;
        for n in 0..5 {
            value += gmls.get_alpha(0, 0, 0, 0, n, 0).unwrap() * f[n];
        }
        assert!((value - 2.0).abs() < 1e-8, "value={value}");
    }

    #[test]
    fn get_alpha_before_generate_fails() {
        let gmls = scenario_one();
        assert!(gmls.get_alpha(0, 0, 0, 0, 0, 0).is_err());
    }

    #[test]
    fn gaussian_curvature_accessor_rejects_wrong_operator() {
        let gmls = scenario_one();
        assert!(gmls.gaussian_curvature(0, 0).is_err());
    }
}
