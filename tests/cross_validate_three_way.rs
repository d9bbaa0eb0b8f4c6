//! Three-way cross-validation: universal variable vs Battin vs k-variable.
//!
//! The formulations share nothing past the geometry and the minimum-time
//! record, so agreement on velocities is a strong check on each one and
//! on the branch selection they share.

mod common;

use common::assert_same_velocities;
use lambert_multirev::{
    minimum_time, solve_lambert, Body, Direction, Energy, Guard, Method, SolverConfig, TransferGeometry,
    TransferRequest,
};
use std::f64::consts::PI;

/// Three iterative methods, same problem
const THREE_WAY_TOL: f64 = 1e-9;

fn three_way_check(label: &str, r1: [f64; 3], r2: [f64; 3], request: TransferRequest) {
    let body = Body::new(1.0, 0.01);
    let config = SolverConfig::default();
    let uv = solve_lambert(&r1, &r2, &request, Method::UniversalVariable, &config, &body);
    let battin = solve_lambert(&r1, &r2, &request, Method::Battin, &config, &body);
    let kvar = solve_lambert(&r1, &r2, &request, Method::KVariable, &config, &body);
    for sol in [&uv, &battin, &kvar] {
        assert!(sol.converged, "{}: {}", label, sol.summary());
    }
    assert_same_velocities(&format!("{label} uv/battin"), &uv, &battin, THREE_WAY_TOL);
    assert_same_velocities(&format!("{label} uv/k"), &uv, &kvar, THREE_WAY_TOL);
}

#[test]
fn test_three_way_90_deg() {
    three_way_check("90°", [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], TransferRequest::new(Direction::Short, PI / 2.0));
}

#[test]
fn test_three_way_135_deg() {
    let angle = 135.0_f64.to_radians();
    let r2 = [angle.cos(), angle.sin(), 0.0];
    three_way_check("135°", [1.0, 0.0, 0.0], r2, TransferRequest::new(Direction::Short, angle));
}

#[test]
fn test_three_way_170_deg() {
    let angle = 170.0_f64.to_radians();
    let r2 = [angle.cos(), angle.sin(), 0.0];
    three_way_check("170°", [1.0, 0.0, 0.0], r2, TransferRequest::new(Direction::Short, 2.0));
}

#[test]
fn test_three_way_different_radii() {
    three_way_check("diff-r", [1.0, 0.0, 0.0], [0.0, 2.0, 0.0], TransferRequest::new(Direction::Short, 2.0));
}

#[test]
fn test_three_way_3d_long_way() {
    three_way_check("3D long", [1.0, 0.0, 0.0], [0.0, 0.8, 0.6], TransferRequest::new(Direction::Long, 4.0));
}

#[test]
fn test_three_way_hyperbolic() {
    three_way_check("hyperbolic", [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], TransferRequest::new(Direction::Short, 0.1));
    three_way_check("hyperbolic long", [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], TransferRequest::new(Direction::Long, 0.5));
}

#[test]
fn test_three_way_near_full_revolution() {
    let angle = 359.0_f64.to_radians();
    let r2 = [1.2 * angle.cos(), 1.2 * angle.sin(), 0.0];
    three_way_check("359°", [1.0, 0.0, 0.0], r2, TransferRequest::new(Direction::Long, 7.0));
}

#[test]
fn test_three_way_multi_rev_branches() {
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [-0.3, 1.1, -0.2];
    for direction in [Direction::Short, Direction::Long] {
        for nrev in 1..=3 {
            for energy in [Energy::Low, Energy::High] {
                let tof = (nrev as f64 + 0.8) * 2.0 * PI * 1.2;
                let request = TransferRequest::new(direction, tof).with_revolutions(nrev, energy);
                three_way_check(&format!("{direction:?}/{energy:?} N={nrev}"), r1, r2, request);
            }
        }
    }
}

#[test]
fn test_branches_are_distinct() {
    let body = Body::new(1.0, 0.01);
    let config = SolverConfig::default();
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [0.0, 1.3, 0.0];
    let tof = 2.0 * 2.0 * PI;
    for method in Method::ALL {
        let low = solve_lambert(&r1, &r2, &TransferRequest::new(Direction::Short, tof).with_revolutions(1, Energy::Low),
            method, &config, &body);
        let high = solve_lambert(&r1, &r2, &TransferRequest::new(Direction::Short, tof).with_revolutions(1, Energy::High),
            method, &config, &body);
        assert!(low.converged && high.converged, "{method}");
        let dv = common::vec_diff_mag(&low.v1, &high.v1);
        assert!(dv > 1e-3, "{method}: both energies landed on the same branch");
    }
}

#[test]
fn test_three_way_at_minimum_time() {
    let body = Body::new(1.0, 0.01);
    let config = SolverConfig::default();
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [0.2, -1.4, 0.3];
    let geom = TransferGeometry::new(&r1, &r2).unwrap();
    let record = minimum_time(&geom, Direction::Long, Energy::Low, 2, &body, &config).unwrap();
    let request = TransferRequest::new(Direction::Long, record.tof_min).with_revolutions(2, Energy::Low);
    let sols: Vec<_> = Method::ALL
        .iter()
        .map(|m| solve_lambert(&r1, &r2, &request, *m, &config, &body))
        .collect();
    for sol in &sols {
        assert!(sol.converged, "{}", sol.summary());
        assert!(sol.diagnostics.has_guard(Guard::AtMinimumTime));
    }
    // the minimum is flat in time, so the velocities agree only to the
    // square root of the minimum-location tolerance
    assert_same_velocities("minimum uv/battin", &sols[0], &sols[1], 1e-5);
    assert_same_velocities("minimum uv/k", &sols[0], &sols[2], 1e-5);
}
