//! Universal-variable (Stumpff) Lambert solver.
//!
//! Iterates on psi = chi^2 / a with the time equation
//!
//! ```text
//! y(psi)   = r1 + r2 + A (psi c3 - 1) / sqrt(c2)
//! chi      = sqrt(y / c2)
//! sqrt(mu) t = chi^3 c3 + A sqrt(y)
//! ```
//!
//! Zero-revolution solutions live on (-inf, 4 pi^2), where t grows
//! monotonically with psi. An N-revolution branch lives on
//! (4 N^2 pi^2, 4 (N+1)^2 pi^2), where t has a single minimum and the
//! energy branch picks the side of it.

use std::f64::consts::PI;

use crate::config::{Body, SolverConfig};
use crate::error::LambertError;
use crate::geometry::TransferGeometry;
use crate::min_time::CurveSide;
use crate::solution::{Diagnostics, Guard, TransferRequest, TransferSolution};
use crate::solver::{accept_rounding_limited, run_pipeline, ArcSolution, LambertSolver, Method, SolveContext};
use crate::stumpff::stumpff_c2c3;
use crate::velocity::ArcCoefficients;

const FOUR_PI_SQ: f64 = 4.0 * PI * PI;
/// Doublings of the lower psi bound allowed before giving up; cosh overflows past ~-5e5.
const MAX_BRACKET_EXTENSIONS: usize = 14;
const SMALL_PSI: f64 = 1e-6;

/// Time of flight and its slope at one psi.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TofPoint {
    pub psi: f64,
    pub y: f64,
    /// Time of flight (s)
    pub t: f64,
    /// dt/dpsi (s)
    pub dtdpsi: f64,
}

/// Evaluate the universal time equation. `None` where y(psi) <= 0 (no
/// conic through both points) or c2 vanishes.
pub(crate) fn time_of_flight(r1_plus_r2: f64, a_constant: f64, psi: f64, mu: f64) -> Option<TofPoint> {
    let (c2, c3) = stumpff_c2c3(psi);
    if !(c2 > 0.0) {
        return None;
    }
    let sqrt_c2 = c2.sqrt();
    let y = r1_plus_r2 + a_constant * (psi * c3 - 1.0) / sqrt_c2;
    if !(y > 0.0) {
        return None;
    }
    let chi = (y / c2).sqrt();
    let chi3 = chi * chi * chi;
    let sqrt_y = y.sqrt();
    let sqrt_mu = mu.sqrt();
    let t = (chi3 * c3 + a_constant * sqrt_y) / sqrt_mu;

    let dtdpsi = if psi.abs() > SMALL_PSI {
        (chi3 * ((c2 - 1.5 * c3 / c2) / (2.0 * psi) + 0.75 * c3 * c3 / c2)
            + 0.125 * a_constant * (3.0 * c3 * sqrt_y / c2 + a_constant / chi))
            / sqrt_mu
    } else {
        (std::f64::consts::SQRT_2 / 40.0 * y * sqrt_y
            + 0.125 * a_constant * (sqrt_y + a_constant * (0.5 / y).sqrt()))
            / sqrt_mu
    };

    if t.is_finite() {
        Some(TofPoint { psi, y, t, dtdpsi })
    } else {
        None
    }
}

/// Universal-variable formulation with Newton steps and bracket bisection.
#[derive(Debug, Clone, Default)]
pub struct UniversalVariableSolver {
    pub config: SolverConfig,
    pub body: Body,
}

impl UniversalVariableSolver {
    pub fn new(config: SolverConfig, body: Body) -> Self {
        Self { config, body }
    }
}

impl LambertSolver for UniversalVariableSolver {
    fn method(&self) -> Method {
        Method::UniversalVariable
    }

    fn solve(&self, geometry: &TransferGeometry, request: &TransferRequest) -> TransferSolution {
        run_pipeline(self.method(), geometry, request, &self.config, &self.body, iterate)
    }
}

fn iterate(ctx: &SolveContext<'_>, diag: &mut Diagnostics) -> Result<ArcSolution, LambertError> {
    let geom = ctx.geometry;
    let mu = ctx.body.mu;
    let nrev = ctx.request.nrev;
    let a_constant = geom.a_constant(ctx.request.direction);
    if a_constant == 0.0 {
        return Err(LambertError::DegenerateGeometry(
            "universal-variable formulation is singular at 180 degrees".into(),
        ));
    }
    let target = ctx.tof;
    let time_scale = geom.time_scale(mu);
    let record = ctx.record;
    let eval = |psi: f64| time_of_flight(geom.r1_plus_r2, a_constant, psi, mu);

    if let Some(minimum) = record.minimum.as_ref().filter(|_| ctx.at_minimum()) {
        diag.guard(Guard::AtMinimumTime);
        let point = eval(minimum.psi).ok_or_else(|| {
            LambertError::DegenerateGeometry("time curve undefined at its minimum".into())
        })?;
        return Ok(finish(geom, a_constant, mu, &point, (point.t - target) / time_scale, 0));
    }

    let (mut lo, mut hi) = record.psi_bracket;
    if nrev == 0 {
        // push the lower bound down until the time there falls short of the target
        let mut extensions = 0;
        while let Some(point) = eval(lo) {
            if point.t <= target {
                break;
            }
            if extensions == MAX_BRACKET_EXTENSIONS {
                return Err(LambertError::NotConverged { iterations: 0, residual: (point.t - target) / time_scale });
            }
            hi = lo;
            lo *= 2.0;
            extensions += 1;
            diag.guard(Guard::BracketExtended);
        }
    }

    let seed = if nrev == 0 {
        zero_rev_seed(ctx, lo)
    } else {
        record.psi_seed(target)
    };
    let mut psi = if seed > lo && seed < hi { seed } else { 0.5 * (lo + hi) };

    // sign of dt/dpsi on the branch being searched
    let slope = match (nrev, record.side) {
        (0, _) | (_, CurveSide::Right) => 1.0,
        (_, CurveSide::Left) => -1.0,
    };

    let mut residual = f64::INFINITY;
    for iter in 0..ctx.config.max_iterations {
        let point = match eval(psi) {
            Some(point) => point,
            None => {
                // y < 0: psi is below every conic through both points
                lo = psi;
                psi = 0.5 * (lo + hi);
                diag.bisection_steps += 1;
                diag.guard(Guard::Bisection);
                continue;
            }
        };

        residual = (point.t - target) / time_scale;
        log::trace!("uv iter {}: psi = {:.15e}, residual = {:.3e}", iter, psi, residual);
        if residual.abs() < ctx.config.tof_tolerance {
            return Ok(finish(geom, a_constant, mu, &point, residual, iter + 1));
        }

        if residual * slope > 0.0 {
            hi = psi;
        } else {
            lo = psi;
        }
        if hi - lo <= 4.0 * f64::EPSILON * psi.abs().max(1.0) {
            accept_rounding_limited(residual, iter + 1, ctx.config, diag)?;
            return Ok(finish(geom, a_constant, mu, &point, residual, iter + 1));
        }

        let newton = psi - (point.t - target) / point.dtdpsi;
        if newton.is_finite() && newton > lo && newton < hi {
            psi = newton;
            diag.newton_steps += 1;
        } else {
            psi = 0.5 * (lo + hi);
            diag.bisection_steps += 1;
            diag.guard(Guard::Bisection);
        }
    }

    Err(LambertError::NotConverged { iterations: ctx.config.max_iterations, residual })
}

/// Zero-revolution seed by conic type: the parabolic time splits elliptic
/// from hyperbolic transfers.
fn zero_rev_seed(ctx: &SolveContext<'_>, lo: f64) -> f64 {
    let record = ctx.record;
    let tof = ctx.tof;
    if (tof - record.parabolic_tof).abs() <= 1e-6 * tof {
        0.0
    } else if tof > record.parabolic_tof {
        // elliptic: start from the minimum-energy transfer, nudged toward the slow end
        if tof > record.min_energy_tof {
            0.5 * (record.min_energy_psi + FOUR_PI_SQ)
        } else {
            0.5 * record.min_energy_psi
        }
    } else {
        0.5 * lo
    }
}

fn finish(
    geom: &TransferGeometry,
    a_constant: f64,
    mu: f64,
    point: &TofPoint,
    residual: f64,
    iterations: usize,
) -> ArcSolution {
    let (v1, v2) = ArcCoefficients::from_universal(geom, a_constant, point.y, mu).velocities(geom);
    ArcSolution { v1, v2, iterations, residual, parameter: point.psi }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Direction;
    use crate::solution::Status;

    #[test]
    fn test_slope_matches_finite_difference() {
        let geom = TransferGeometry::new(&[1.0, 0.0, 0.0], &[-0.3, 1.4, 0.2]).unwrap();
        for dir in [Direction::Short, Direction::Long] {
            let a = geom.a_constant(dir);
            for &psi in &[-20.0_f64, -1.0, 0.0, 3.0, 30.0, 60.0, 100.0] {
                let h = 1e-5 * f64::max(1.0, psi.abs());
                let (Some(lo), Some(mid), Some(hi)) = (
                    time_of_flight(geom.r1_plus_r2, a, psi - h, 1.0),
                    time_of_flight(geom.r1_plus_r2, a, psi, 1.0),
                    time_of_flight(geom.r1_plus_r2, a, psi + h, 1.0),
                ) else {
                    continue;
                };
                let fd = (hi.t - lo.t) / (2.0 * h);
                assert!((mid.dtdpsi - fd).abs() < 1e-5 * fd.abs().max(1.0),
                    "{:?} psi={}: analytic {} vs fd {}", dir, psi, mid.dtdpsi, fd);
            }
        }
    }

    #[test]
    fn test_circular_quarter() {
        let solver = UniversalVariableSolver::new(SolverConfig::default(), Body::new(1.0, 0.1));
        let geom = TransferGeometry::new(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let sol = solver.solve(&geom, &TransferRequest::new(Direction::Short, PI / 2.0));
        assert_eq!(sol.status, Status::Converged, "{}", sol.summary());
        assert!((sol.v1[0]).abs() < 1e-9 && (sol.v1[1] - 1.0).abs() < 1e-9, "v1 = {:?}", sol.v1);
        assert!((sol.v2[0] + 1.0).abs() < 1e-9, "v2 = {:?}", sol.v2);
    }

    #[test]
    fn test_hyperbolic_short_tof_extends_bracket() {
        let solver = UniversalVariableSolver::new(SolverConfig::default(), Body::new(1.0, 0.1));
        let geom = TransferGeometry::new(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let sol = solver.solve(&geom, &TransferRequest::new(Direction::Long, 0.5));
        assert!(sol.converged, "{}", sol.summary());
        let v = crate::vector::mag(&sol.v1);
        assert!(v * v > 2.0, "expected hyperbolic speed, got {}", v);
    }

    #[test]
    fn test_exact_half_rev_is_degenerate() {
        let solver = UniversalVariableSolver::new(SolverConfig::default(), Body::new(1.0, 0.1));
        let geom = TransferGeometry::new(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]).unwrap();
        let sol = solver.solve(&geom, &TransferRequest::new(Direction::Short, PI));
        assert!(matches!(sol.error(), Some(LambertError::DegenerateGeometry(_))), "{}", sol.summary());
        assert_eq!(sol.v1, [0.0; 3]);
    }
}
