use gmls::{
    GMLS, GmlsConfig, NeighborTable, ReconstructionSpace, SamplingFunctional, SolverKind,
    SourceCloud, TargetCloud, TargetOperator,
};

fn grid_2d_3x3(h: f64) -> (Vec<f64>, Vec<[f64; 2]>) {
    let mut coords = Vec::new();
    let mut pts = Vec::new();
    for &y in &[-1.0, 0.0, 1.0] {
        for &x in &[-1.0, 0.0, 1.0] {
            coords.push(x * h);
            coords.push(y * h);
            pts.push([x * h, y * h]);
        }
    }
    (coords, pts)
}

#[test]
fn three_d_laplacian_reproduces_quadratic_on_jittered_cloud() {
    // A 27-point cloud on a jittered 3x3x3 grid, scaled to stay within the
    // weighting kernel's compact support at epsilon=1.5 (the corners of a
    // full [-1,1]^3 cube sit past r=1 and would drop out entirely).
    let mut coords = Vec::new();
    let mut idx = 0.0f64;
    for &x in &[-1.0, 0.0, 1.0] {
        for &y in &[-1.0, 0.0, 1.0] {
            for &z in &[-1.0, 0.0, 1.0] {
                idx += 1.0;
                let jitter = 0.03 * (idx * 0.7).sin();
                coords.push(x * 0.8 + jitter);
                coords.push(y * 0.8 + jitter * 0.6);
                coords.push(z * 0.8 + jitter * 0.3);
            }
        }
    }
    let n = coords.len() / 3;
    let sources = SourceCloud::new(coords.clone(), 3).unwrap();
    let targets = TargetCloud::new(vec![0.0, 0.0, 0.0], vec![1.5], 3).unwrap();
    let neighbors = NeighborTable::new(vec![(0..n as u32).collect()], n).unwrap();

    let problem = GmlsConfig::new()
        .set_polynomial_order(3)
        .set_dimension(3)
        .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
        .set_solver_type(SolverKind::Qr)
        .add_target(TargetOperator::Laplacian)
        .build()
        .unwrap();
    let mut gmls = GMLS::new(problem, sources, targets, neighbors).unwrap();
    gmls.generate_alphas().unwrap();

    let f: Vec<f64> = (0..n)
        .map(|i| {
            let p = &coords[i * 3..i * 3 + 3];
            p[0] * p[0] + p[1] * p[1] + p[2] * p[2]
        })
        .collect();
    let mut value = 0.0;
    for i in 0..n {
        value += gmls.get_alpha(0, 0, 0, 0, i, 0).unwrap() * f[i];
    }
    assert!((value - 6.0).abs() < 1e-6, "value={value}");
}

#[test]
fn face_average_of_linear_field_matches_centroid_value_end_to_end() {
    let (coords, _pts) = grid_2d_3x3(1.0);
    let n = coords.len() / 2;
    let sources = SourceCloud::new(coords.clone(), 2).unwrap();
    let targets = TargetCloud::new(vec![0.0, 0.0], vec![1.5], 2).unwrap();
    let neighbors = NeighborTable::new(vec![(0..n as u32).collect()], n).unwrap();

    let problem = GmlsConfig::new()
        .set_polynomial_order(1)
        .set_dimension(2)
        .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
        .set_solver_type(SolverKind::Qr)
        .add_target(TargetOperator::ScalarFaceAverage)
        .build()
        .unwrap();
    let mut gmls = GMLS::new(problem, sources, targets, neighbors).unwrap();
    gmls.set_target_cell_vertices(0, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]).unwrap();
    gmls.generate_alphas().unwrap();

    let f: Vec<f64> = (0..n)
        .map(|i| 1.0 + 2.0 * coords[i * 2] + 3.0 * coords[i * 2 + 1])
        .collect();
    let mut value = 0.0;
    for i in 0..n {
        value += gmls.get_alpha(0, 0, 0, 0, i, 0).unwrap() * f[i];
    }
    assert!((value - 8.0 / 3.0).abs() < 1e-10, "value={value}");
}

#[test]
fn staggered_edge_prestencil_weights_are_antisymmetric_end_to_end() {
    let (coords, _pts) = grid_2d_3x3(1.0);
    let n = coords.len() / 2;
    let sources = SourceCloud::new(coords, 2).unwrap();
    let targets = TargetCloud::new(vec![0.0, 0.0], vec![1.5], 2).unwrap();
    let neighbors = NeighborTable::new(vec![(0..n as u32).collect()], n).unwrap();

    let problem = GmlsConfig::new()
        .set_polynomial_order(2)
        .set_dimension(2)
        .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
        .set_data_sampling_functional(SamplingFunctional::StaggeredEdgeAnalyticGradientIntegralSample)
        .set_solver_type(SolverKind::Svd)
        .add_target(TargetOperator::DivergenceOfVectorPointEvaluation)
        .build()
        .unwrap();
    let mut gmls = GMLS::new(problem, sources, targets, neighbors).unwrap();
    gmls.set_operator_coefficients((0..n).map(|i| 1.0 + i as f64).collect()).unwrap();
    gmls.generate_alphas().unwrap();

    for i in 0..n {
        let end0 = gmls.get_prestencil_weight(0, 0, 0, i, 0).unwrap();
        let end1 = gmls.get_prestencil_weight(0, 0, 0, i, 1).unwrap();
        assert!((end0 + end1).abs() < 1e-12, "end0={end0} end1={end1}");
    }
}

#[test]
fn manifold_gradient_on_a_flat_embedded_plane_matches_ordinary_gradient() {
    // Degenerate (zero-curvature) manifold case: the neighbor cloud and
    // target all lie in the z=0 plane, so the coarse and refined tangent
    // frames coincide with the xy-plane, G = I, and the manifold gradient
    // must reduce exactly to the ordinary 2D gradient of scenario two.
    let (coords_2d, _pts) = grid_2d_3x3(1.0);
    let n = coords_2d.len() / 2;
    let mut coords_3d = Vec::with_capacity(n * 3);
    for i in 0..n {
        coords_3d.push(coords_2d[i * 2]);
        coords_3d.push(coords_2d[i * 2 + 1]);
        coords_3d.push(0.0);
    }
    let sources = SourceCloud::new(coords_3d.clone(), 3).unwrap();
    let targets = TargetCloud::new(vec![0.0, 0.0, 0.0], vec![1.5], 3).unwrap();
    let neighbors = NeighborTable::new(vec![(0..n as u32).collect()], n).unwrap();

    let problem = GmlsConfig::new()
        .set_polynomial_order(2)
        .set_curvature_polynomial_order(2)
        .set_dimension(3)
        .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
        .set_solver_type(SolverKind::Manifold)
        .add_target(TargetOperator::Gradient)
        .build()
        .unwrap();
    let mut gmls = GMLS::new(problem, sources, targets, neighbors).unwrap();
    gmls.generate_alphas().unwrap();

    let f: Vec<f64> = (0..n)
        .map(|i| 3.0 * coords_3d[i * 3] + 5.0 * coords_3d[i * 3 + 1] + coords_3d[i * 3] * coords_3d[i * 3 + 1])
        .collect();
    let mut dfdx = 0.0;
    let mut dfdy = 0.0;
    for i in 0..n {
        dfdx += gmls.get_alpha(0, 0, 0, 0, i, 0).unwrap() * f[i];
        dfdy += gmls.get_alpha(0, 0, 1, 0, i, 0).unwrap() * f[i];
    }
    assert!((dfdx - 3.0).abs() < 1e-6, "dfdx={dfdx}");
    assert!((dfdy - 5.0).abs() < 1e-6, "dfdy={dfdy}");
}

#[test]
fn zero_polynomial_order_reproduces_constants() {
    let (coords, _pts) = grid_2d_3x3(1.0);
    let n = coords.len() / 2;
    let sources = SourceCloud::new(coords, 2).unwrap();
    let targets = TargetCloud::new(vec![0.3, -0.2], vec![1.8], 2).unwrap();
    let neighbors = NeighborTable::new(vec![(0..n as u32).collect()], n).unwrap();

    let problem = GmlsConfig::new()
        .set_polynomial_order(0)
        .set_dimension(2)
        .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
        .set_solver_type(SolverKind::Qr)
        .add_target(TargetOperator::ScalarPointEval)
        .build()
        .unwrap();
    let mut gmls = GMLS::new(problem, sources, targets, neighbors).unwrap();
    gmls.generate_alphas().unwrap();

    let f = vec![7.0; n];
    let mut value = 0.0;
    for i in 0..n {
        value += gmls.get_alpha(0, 0, 0, 0, i, 0).unwrap() * f[i];
    }
    assert!((value - 7.0).abs() < 1e-10, "value={value}");
}

#[test]
fn minimal_well_posed_neighbor_count_still_reproduces_exactly() {
    // NP(2,1) == 3: exactly as many neighbors as unknowns, the boundary
    // case where k_t == NP*basis_mult exactly.
    let coords: Vec<f64> = vec![-1.0, 0.0, 1.0];
    let sources = SourceCloud::new(coords, 1).unwrap();
    let targets = TargetCloud::new(vec![0.2], vec![1.5], 1).unwrap();
    let neighbors = NeighborTable::new(vec![vec![0, 1, 2]], 3).unwrap();

    let problem = GmlsConfig::new()
        .set_polynomial_order(2)
        .set_dimension(1)
        .set_reconstruction_space(ReconstructionSpace::ScalarTaylorPolynomial)
        .set_solver_type(SolverKind::Qr)
        .add_target(TargetOperator::ScalarPointEval)
        .build()
        .unwrap();
    let mut gmls = GMLS::new(problem, sources, targets, neighbors).unwrap();
    gmls.generate_alphas().unwrap();

    let f = [(-1.0f64).powi(2), 0.0, 1.0];
    let mut value = 0.0;
    for i in 0..3 {
        value += gmls.get_alpha(0, 0, 0, 0, i, 0).unwrap() * f[i];
    }
    assert!((value - 0.2f64.powi(2)).abs() < 1e-10, "value={value}");
}

#[test]
fn non_positive_epsilon_is_rejected() {
    let err = TargetCloud::new(vec![0.0], vec![0.0], 1).unwrap_err();
    assert!(matches!(err, gmls::GmlsError::InputInconsistent { .. }));
}
