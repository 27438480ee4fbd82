//! Prestencil weight computation: per-target tables that convert raw
//! neighbor/target data into the value a sampling functional actually
//! samples, applied *before* the data is dotted with `alpha`.
//!
//! `PointSample` needs no table at all — callers simply skip this module
//! when `data_sampling_functional == SamplingFunctional::PointSample`.
//! Grounded in `ComputeStaggeredEdgeWeights` / `ComputeManifoldCrossTerms`
//! in `examples/original_source/GMLS/src/GMLS_Targets.hpp`.
//!
//! Each function here returns the weights for a single target; the
//! orchestrator is responsible for writing them into an explicitly
//! zero-initialized global table before populating it — the original
//! accumulates with `+=` into a buffer that is never shown being zeroed
//! first, which this crate treats as a bug to avoid rather than a behavior
//! to reproduce.

/// `StaggeredEdgeAnalyticGradientIntegralSample`: entries `(-c_i, +c_i)` per
/// neighbor, `c_i = 1/2 * (coef(nbr_0) + coef(nbr_i))`. `coefs_at_neighbors[0]`
/// is `coef(nbr_0)`, so `c_0` collapses to `coef(nbr_0)` automatically.
pub fn staggered_edge_analytic_gradient_weights(coefs_at_neighbors: &[f64]) -> Vec<(f64, f64)> {
    let c0 = coefs_at_neighbors[0];
    coefs_at_neighbors
        .iter()
        .map(|&ci| {
            let c = 0.5 * (c0 + ci);
            (-c, c)
        })
        .collect()
}

/// `ManifoldVectorSample`: projects an ambient vector onto the refined
/// tangent frame `T`. The same projection applies to every neighbor, so
/// this just hands back `T`'s rows as the per-output-component weight
/// vectors against the ambient input components.
pub fn manifold_vector_sample_weights(t_frame: &[[f64; 3]]) -> Vec<[f64; 3]> {
    t_frame.to_vec()
}

/// `ManifoldGradientVectorSample`: as [`manifold_vector_sample_weights`] but
/// against the coarse tangent frame `V` instead of the refined `T`.
pub fn manifold_gradient_vector_sample_weights(v_frame_tangent_cols: &[[f64; 3]]) -> Vec<[f64; 3]> {
    v_frame_tangent_cols.to_vec()
}

/// `StaggeredEdgeIntegralSample` weights for one target-neighbor edge:
/// `int_0^1 (1-s) t_j ds` at the target end and `int_0^1 s t_j ds` at the
/// neighbor end, where `t` is the unit tangent along the edge. Both
/// integrals are `1/2` for any straight edge, scaled by the edge length.
pub struct EdgeIntegralWeights {
    pub target_weights: Vec<f64>,
    pub neighbor_weights: Vec<f64>,
}

pub fn staggered_edge_integral_weights(target: &[f64], neighbor: &[f64]) -> EdgeIntegralWeights {
    let d = target.len();
    let edge: Vec<f64> = (0..d).map(|k| neighbor[k] - target[k]).collect();
    let len = edge.iter().map(|e| e * e).sum::<f64>().sqrt();
    let tangent: Vec<f64> = if len > 1e-300 {
        edge.iter().map(|e| e / len).collect()
    } else {
        vec![0.0; d]
    };
    let target_weights = tangent.iter().map(|t| 0.5 * len * t).collect();
    let neighbor_weights = tangent.iter().map(|t| 0.5 * len * t).collect();
    EdgeIntegralWeights {
        target_weights,
        neighbor_weights,
    }
}
