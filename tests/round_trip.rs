//! Round-trip integration tests for every formulation.
//!
//! Solve Lambert → propagate (r1, v1) forward by TOF → verify arrival at r2.
//! Tolerance: 1e-8 (two iterative methods in series).

mod common;

use common::assert_round_trip;
use lambert_multirev::{solve_lambert, Body, Direction, Energy, Method, SolverConfig, TransferRequest};
use std::f64::consts::PI;

fn round_trip_check(r1: [f64; 3], r2: [f64; 3], request: TransferRequest, mu: f64, tol: f64) {
    let body = Body::new(mu, 1e-3 * common::vec_mag(&r1));
    let config = SolverConfig::default();
    for method in Method::ALL {
        let sol = solve_lambert(&r1, &r2, &request, method, &config, &body);
        assert_round_trip(&method.to_string(), &sol, &r2, request.tof, mu, tol);
    }
}

#[test]
fn test_round_trip_circular_90_deg() {
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [0.0, 1.0, 0.0];
    round_trip_check(r1, r2, TransferRequest::new(Direction::Short, PI / 2.0), 1.0, 1e-8);
}

#[test]
fn test_round_trip_circular_45_deg() {
    let angle = PI / 4.0;
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [angle.cos(), angle.sin(), 0.0];
    round_trip_check(r1, r2, TransferRequest::new(Direction::Short, angle), 1.0, 1e-8);
}

#[test]
fn test_round_trip_circular_150_deg() {
    let angle = 150.0_f64.to_radians();
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [angle.cos(), angle.sin(), 0.0];
    round_trip_check(r1, r2, TransferRequest::new(Direction::Short, angle), 1.0, 1e-8);
}

#[test]
fn test_round_trip_elliptic_different_radii() {
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [0.0, 1.5, 0.0];
    round_trip_check(r1, r2, TransferRequest::new(Direction::Short, 2.0), 1.0, 1e-8);
}

#[test]
fn test_round_trip_hyperbolic() {
    // short TOF => hyperbolic
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [0.0, 1.0, 0.0];
    round_trip_check(r1, r2, TransferRequest::new(Direction::Short, 0.1), 1.0, 1e-8);
}

#[test]
fn test_round_trip_long_way() {
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [0.0, 1.0, 0.0];
    round_trip_check(r1, r2, TransferRequest::new(Direction::Long, 3.0 * PI / 2.0), 1.0, 1e-8);
}

#[test]
fn test_round_trip_3d() {
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [0.0, 0.8, 0.6];
    round_trip_check(r1, r2, TransferRequest::new(Direction::Short, PI / 2.0), 1.0, 1e-8);
}

#[test]
fn test_round_trip_physical_units() {
    // LEO to GEO-like transfer in km, s
    let mu = 398600.4418;
    let r1 = [6678.0, 0.0, 0.0];
    let r2 = [0.0, 42164.0, 0.0];
    round_trip_check(r1, r2, TransferRequest::new(Direction::Short, 5.0 * 3600.0), mu, 1e-8);
}

#[test]
fn test_round_trip_multi_rev_both_branches() {
    let r1 = [1.0, 0.0, 0.0];
    let r2 = [-0.5, 1.2, 0.1];
    for direction in [Direction::Short, Direction::Long] {
        for nrev in 1..=2 {
            for energy in [Energy::Low, Energy::High] {
                let tof = (nrev as f64 + 0.9) * 2.0 * PI * 1.3;
                let request = TransferRequest::new(direction, tof).with_revolutions(nrev, energy);
                round_trip_check(r1, r2, request, 1.0, 1e-8);
            }
        }
    }
}
