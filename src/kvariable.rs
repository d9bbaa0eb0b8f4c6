//! k-variable (vercosine) Lambert solver.
//!
//! Works entirely in the geometry invariants: with tau from
//! [`TransferGeometry::tau`] and S = sqrt((r1+r2)^3 / mu), the time equation
//! is
//!
//! ```text
//! T / S = F(k) = sqrt(p) (tau + p W(k)),   p = 1 - k tau
//! ```
//!
//! so the curve depends only on tau and N, not on the scale of the orbit.
//! Halley steps are the default update; a solve that runs out of
//! iterations is repeated once with plain Newton steps.

use crate::config::{Body, SolverConfig};
use crate::error::LambertError;
use crate::geometry::TransferGeometry;
use crate::min_time::CurveSide;
use crate::solution::{Diagnostics, Guard, TransferRequest, TransferSolution};
use crate::solver::{accept_rounding_limited, run_pipeline, ArcSolution, LambertSolver, Method, SolveContext};
use crate::stumpff::w_and_derivatives;
use crate::velocity::ArcCoefficients;

use std::f64::consts::PI;

const SQRT_2: f64 = std::f64::consts::SQRT_2;
const TWO_PI: f64 = 2.0 * PI;

/// Margin from k boundaries
pub(crate) const K_MARGIN: f64 = 1e-10;
/// Above this T/S the residual is taken in log form
const TOF_BY_S_HUGE_BOUNDARY: f64 = 1e4;
/// Maximum step size for the multi-rev safeguard
const MAX_K_STEP_MULTI_REV: f64 = 0.5;
const MAX_BRACKET_EXTENSIONS: usize = 60;

/// F(k) and its first three derivatives, `[F, F', F'', F''']`.
/// `None` when p = 1 - k tau is not positive.
pub(crate) fn tof_and_derivatives(k: f64, tau: f64, nrev: u32) -> Option<[f64; 4]> {
    let p = 1.0 - k * tau;
    if !(p > 0.0) {
        return None;
    }
    let dw = w_and_derivatives(k, TWO_PI * nrev as f64, nrev == 0);
    let sqrt_p = p.sqrt();
    let tau_sq = tau * tau;
    let tau_cu = tau_sq * tau;
    let p_sq = p * p;
    let one_by_sqrt_p = 1.0 / sqrt_p;
    let one_by_p = one_by_sqrt_p * one_by_sqrt_p;
    let one_by_p_32 = one_by_sqrt_p * one_by_p;

    let f = sqrt_p * (tau + p * dw[0]);

    // dF/dk = (-3 p tau W + 2 p^2 W' - tau^2) / (2 sqrt(p))
    let df1 = (-3.0 * p * tau * dw[0] + 2.0 * p_sq * dw[1] - tau_sq) * one_by_sqrt_p * 0.5;

    // d2F/dk2 = (3 p tau^2 W + 4 p^3 W'' - 12 p^2 tau W' - tau^3) / (4 p^(3/2))
    let df2 = (3.0 * p * tau_sq * dw[0] + 4.0 * p_sq * p * dw[2]
        - 12.0 * p_sq * tau * dw[1] - tau_cu) * one_by_p_32 * 0.25;

    let df3 = (3.0 * p * tau_cu * dw[0] + 18.0 * p_sq * tau_sq * dw[1]
        - 36.0 * p_sq * p * tau * dw[2] + 8.0 * p_sq * p_sq * dw[3]
        - 3.0 * tau_sq * tau_sq) * one_by_p_32 * one_by_p * 0.125;

    let out = [f, df1, df2, df3];
    if out.iter().all(|v| v.is_finite()) {
        Some(out)
    } else {
        None
    }
}

/// Update rule for one solve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateRule {
    Halley,
    Newton,
}

/// Vercosine formulation with Halley steps, falling back to Newton.
#[derive(Debug, Clone, Default)]
pub struct KVariableSolver {
    pub config: SolverConfig,
    pub body: Body,
}

impl KVariableSolver {
    pub fn new(config: SolverConfig, body: Body) -> Self {
        Self { config, body }
    }
}

impl LambertSolver for KVariableSolver {
    fn method(&self) -> Method {
        Method::KVariable
    }

    fn solve(&self, geometry: &TransferGeometry, request: &TransferRequest) -> TransferSolution {
        run_pipeline(self.method(), geometry, request, &self.config, &self.body, iterate)
    }
}

/// Fixed inputs of one k iteration.
struct KProblem {
    tau: f64,
    nrev: u32,
    /// T / S
    target: f64,
    huge_tof_case: bool,
    /// +1 where F increases with k on the searched branch
    slope: f64,
}

impl KProblem {
    /// Residual and its first two derivatives, in log form for huge T/S.
    fn residual(&self, k: f64) -> Option<(f64, f64, f64)> {
        let df = tof_and_derivatives(k, self.tau, self.nrev)?;
        if self.huge_tof_case {
            let inv_f = 1.0 / df[0];
            let t1 = df[1] * inv_f;
            let t2 = df[2] * inv_f - t1 * t1;
            Some((df[0].ln() - self.target.ln(), t1, t2))
        } else {
            Some((df[0] - self.target, df[1], df[2]))
        }
    }
}

fn iterate(ctx: &SolveContext<'_>, diag: &mut Diagnostics) -> Result<ArcSolution, LambertError> {
    let geom = ctx.geometry;
    let direction = ctx.request.direction;
    let nrev = ctx.request.nrev;
    let tau = geom.tau(direction);
    if tau == 0.0 {
        return Err(LambertError::DegenerateGeometry(
            "k-variable formulation is singular at 180 degrees".into(),
        ));
    }
    let time_scale = geom.time_scale(ctx.body.mu);
    let record = ctx.record;
    let target = ctx.tof / time_scale;

    if let Some(minimum) = record.minimum.as_ref().filter(|_| ctx.at_minimum()) {
        diag.guard(Guard::AtMinimumTime);
        let f = tof_and_derivatives(minimum.k, tau, nrev).map_or(f64::NAN, |df| df[0]);
        return Ok(finish(geom, tau, time_scale, minimum.k, f - target, 0));
    }

    let slope = match (nrev, record.side) {
        (0, _) | (_, CurveSide::Right) => -1.0,
        (_, CurveSide::Left) => 1.0,
    };
    let problem = KProblem {
        tau,
        nrev,
        target,
        huge_tof_case: target > TOF_BY_S_HUGE_BOUNDARY,
        slope,
    };

    let (mut lo, mut hi) = record.k_bracket;
    lo += K_MARGIN;
    if hi.is_finite() {
        hi -= K_MARGIN * hi.abs().max(1.0);
    } else {
        // open-ended hyperbolic side: double until the time drops below target
        hi = 2.0 * SQRT_2;
        let mut extensions = 0;
        while problem.residual(hi).is_some_and(|(r, _, _)| r > 0.0) {
            if extensions == MAX_BRACKET_EXTENSIONS {
                return Err(LambertError::NotConverged { iterations: 0, residual: f64::INFINITY });
            }
            lo = hi;
            hi *= 2.0;
            extensions += 1;
            diag.guard(Guard::BracketExtended);
        }
    }

    let seed = if nrev == 0 {
        zero_rev_seed(tau, target)
    } else {
        record.k_seed(ctx.tof, time_scale)
    };
    let seed = if seed > lo && seed < hi { seed } else { 0.5 * (lo + hi) };

    let (k, residual, iterations) = with_newton_fallback(diag, |rule, diag| {
        solve_k(&problem, seed, lo, hi, rule, ctx.config, diag)
    })?;

    Ok(finish(geom, tau, time_scale, k, residual, iterations))
}

/// Run `attempt` with Halley steps, and once more with Newton steps if that
/// runs out of iterations. Other failures are returned as they are.
fn with_newton_fallback<F>(diag: &mut Diagnostics, mut attempt: F) -> Result<(f64, f64, usize), LambertError>
where
    F: FnMut(UpdateRule, &mut Diagnostics) -> Result<(f64, f64, usize), LambertError>,
{
    match attempt(UpdateRule::Halley, diag) {
        Err(LambertError::NotConverged { .. }) => {
            log::debug!("halley iteration stalled; retrying with newton steps");
            diag.guard(Guard::NewtonFallback);
            attempt(UpdateRule::Newton, diag)
        }
        other => other,
    }
}

fn solve_k(
    problem: &KProblem,
    seed: f64,
    mut lo: f64,
    mut hi: f64,
    rule: UpdateRule,
    config: &SolverConfig,
    diag: &mut Diagnostics,
) -> Result<(f64, f64, usize), LambertError> {
    let mut k = seed;
    let mut residual = f64::INFINITY;

    for iter in 0..config.max_iterations {
        let Some((func, d1, d2)) = problem.residual(k) else {
            // p <= 0 sits past the zero-time end of the zero-rev curve
            hi = k;
            k = 0.5 * (lo + hi);
            diag.bisection_steps += 1;
            diag.guard(Guard::Bisection);
            continue;
        };
        residual = func;
        log::trace!("k iter {} ({:?}): k = {:.15e}, residual = {:.3e}", iter, rule, k, func);
        if func.abs() < config.tof_tolerance {
            return Ok((k, func, iter + 1));
        }

        if func * problem.slope > 0.0 {
            hi = k;
        } else {
            lo = k;
        }
        if hi - lo <= 4.0 * f64::EPSILON * k.abs().max(1.0) {
            accept_rounding_limited(func, iter + 1, config, diag)?;
            return Ok((k, func, iter + 1));
        }

        let mut dk = match rule {
            UpdateRule::Halley => -2.0 * func * d1 / (2.0 * d1 * d1 - func * d2),
            UpdateRule::Newton => -func / d1,
        };
        if problem.nrev > 0 {
            dk = dk.clamp(-MAX_K_STEP_MULTI_REV, MAX_K_STEP_MULTI_REV);
        }

        let next = k + dk;
        if next.is_finite() && next > lo && next < hi {
            k = next;
            match rule {
                UpdateRule::Halley => diag.halley_steps += 1,
                UpdateRule::Newton => diag.newton_steps += 1,
            }
        } else {
            k = 0.5 * (lo + hi);
            diag.bisection_steps += 1;
            diag.guard(Guard::Bisection);
        }
    }

    Err(LambertError::NotConverged { iterations: config.max_iterations, residual })
}

/// Zero-rev starting k from the parabolic time: above it the transfer is
/// elliptic (k < sqrt 2), below it hyperbolic.
fn zero_rev_seed(tau: f64, target: f64) -> f64 {
    let t_parab = tof_and_derivatives(SQRT_2, tau, 0).map_or(f64::NAN, |df| df[0]);
    if !t_parab.is_finite() {
        return 0.0;
    }
    if target < t_parab {
        SQRT_2 * (t_parab / target).clamp(1.0, 5.0)
    } else {
        SQRT_2 / (target / t_parab).sqrt().clamp(1.0, 10.0)
    }
}

fn finish(
    geom: &TransferGeometry,
    tau: f64,
    time_scale: f64,
    k: f64,
    residual: f64,
    iterations: usize,
) -> ArcSolution {
    let p = 1.0 - k * tau;
    let (v1, v2) = ArcCoefficients::from_k_variable(geom, tau, time_scale, p).velocities(geom);
    ArcSolution { v1, v2, iterations, residual, parameter: k }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Direction;
    use crate::solution::Status;

    #[test]
    fn test_derivatives_match_finite_difference() {
        let tau = 0.4;
        for nrev in [0u32, 1, 2] {
            for &k in &[-1.0, -0.3, 0.2, 0.9, 1.3] {
                let h = 1e-6;
                let lo = tof_and_derivatives(k - h, tau, nrev).unwrap();
                let mid = tof_and_derivatives(k, tau, nrev).unwrap();
                let hi = tof_and_derivatives(k + h, tau, nrev).unwrap();
                for order in 0..3 {
                    let fd = (hi[order] - lo[order]) / (2.0 * h);
                    let analytic = mid[order + 1];
                    assert!((analytic - fd).abs() < 1e-5 * fd.abs().max(1.0),
                        "N={} k={} order {}: {} vs {}", nrev, k, order + 1, analytic, fd);
                }
            }
        }
    }

    #[test]
    fn test_newton_retry_after_halley_stall() {
        let request = TransferRequest::new(Direction::Short, 1.0);
        let mut diag = Diagnostics::new(Method::KVariable, &request);
        let mut rules = Vec::new();
        let out = with_newton_fallback(&mut diag, |rule, _| {
            rules.push(rule);
            match rule {
                UpdateRule::Halley => Err(LambertError::NotConverged { iterations: 50, residual: 1e-3 }),
                UpdateRule::Newton => Ok((0.25, 1e-13, 7)),
            }
        });
        assert_eq!(out, Ok((0.25, 1e-13, 7)));
        assert_eq!(rules, vec![UpdateRule::Halley, UpdateRule::Newton]);
        assert!(diag.has_guard(Guard::NewtonFallback));

        // only a stall is retried
        let mut diag = Diagnostics::new(Method::KVariable, &request);
        let mut calls = 0;
        let out = with_newton_fallback(&mut diag, |_, _| {
            calls += 1;
            Err(LambertError::DegenerateGeometry("test".into()))
        });
        assert!(matches!(out, Err(LambertError::DegenerateGeometry(_))));
        assert_eq!(calls, 1);
        assert!(!diag.has_guard(Guard::NewtonFallback));
    }

    #[test]
    fn test_iteration_cap_triggers_newton_retry() {
        let config = SolverConfig { max_iterations: 1, ..SolverConfig::default() };
        let solver = KVariableSolver::new(config, Body::new(1.0, 0.1));
        let geom = TransferGeometry::new(&[1.0, 0.0, 0.0], &[0.0, 2.0, 0.0]).unwrap();
        // zero-rev, so no minimum-time search runs under the same cap
        let sol = solver.solve(&geom, &TransferRequest::new(Direction::Short, 2.0));
        assert!(matches!(sol.error(), Some(LambertError::NotConverged { .. })), "{}", sol.summary());
        assert!(sol.diagnostics.has_guard(Guard::NewtonFallback));
        // one step under each rule
        assert_eq!(sol.iterations, 2, "{}", sol.summary());
    }

    #[test]
    fn test_circular_quarter() {
        let solver = KVariableSolver::new(SolverConfig::default(), Body::new(1.0, 0.1));
        let geom = TransferGeometry::new(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let sol = solver.solve(&geom, &TransferRequest::new(Direction::Short, PI / 2.0));
        assert_eq!(sol.status, Status::Converged, "{}", sol.summary());
        assert!((crate::vector::mag(&sol.v1) - 1.0).abs() < 1e-9);
        assert!(sol.diagnostics.halley_steps > 0);
    }

    #[test]
    fn test_retrograde_angular_momentum() {
        let solver = KVariableSolver::new(SolverConfig::default(), Body::new(1.0, 0.1));
        let geom = TransferGeometry::new(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let sol = solver.solve(&geom, &TransferRequest::new(Direction::Long, 1.5 * PI));
        assert!(sol.converged, "{}", sol.summary());
        let h_z = sol.v1[1]; // r1 along +x
        assert!(h_z < 0.0, "long way should circle -z, got h_z = {}", h_z);
    }

    #[test]
    fn test_huge_tof_uses_log_form() {
        let solver = KVariableSolver::new(SolverConfig::default(), Body::new(1.0, 0.1));
        let geom = TransferGeometry::new(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let sol = solver.solve(&geom, &TransferRequest::new(Direction::Short, 1e5));
        assert!(sol.converged, "{}", sol.summary());
        // nearly rectilinear long ellipse: departure speed just below escape
        let v = crate::vector::mag(&sol.v1);
        assert!(v < 2.0_f64.sqrt() && v > 1.2, "v = {}", v);
    }
}
