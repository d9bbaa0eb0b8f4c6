//! Battin's Lambert solver.
//!
//! Iterates on the Lancaster-Blanchard variable x (x^2 = 1 - s / 2a) with
//! the non-dimensional time T = t sqrt(2 mu / s^3). The time equation is
//! written through Battin's hypergeometric function,
//!
//! ```text
//! T(x) = (eta^3 Q + 4 lambda eta) / 2 + N pi / (1 - x^2)^(3/2)
//! Q    = 4/3 2F1(3, 1; 5/2; S1),   S1 = (1 - lambda - x eta) / 2
//! ```
//!
//! and 2F1 is evaluated as a Gauss continued fraction. That form is only
//! used near the parabola (|x - 1| < 0.2); elsewhere the eta^3 Q and
//! 4 lambda eta terms cancel, so the closed Lancaster form in acos/ln is
//! used instead. Nothing in either depends on the transfer angle except
//! lambda, so the same expressions hold at 0, 180 and 360 degrees. Velocities come back as radial and
//! transverse components in the transfer plane, which is what lets this
//! solver handle anti-parallel endpoints when a plane is supplied.

use crate::config::{Body, SolverConfig};
use crate::error::LambertError;
use crate::geometry::TransferGeometry;
use crate::kvariable::K_MARGIN;
use crate::min_time::CurveSide;
use crate::solution::{Diagnostics, Guard, TransferRequest, TransferSolution};
use crate::solver::{accept_rounding_limited, run_pipeline, ArcSolution, LambertSolver, Method, SolveContext};
use crate::vector::{add_scaled, cross, mag, scale};

use std::f64::consts::PI;

const SQRT_2: f64 = std::f64::consts::SQRT_2;

const HYPERGEOMETRIC_MAX_TERMS: usize = 1000;
const HYPERGEOMETRIC_TOLERANCE: f64 = 1e-15;
/// |x - 1| below which the hypergeometric form replaces Lancaster's.
const HYPERGEOMETRIC_BAND: f64 = 0.2;
/// Inside this distance from x = 1 the closed-form derivatives lose their
/// digits to 0/0 and finite differences are used instead.
const PARABOLIC_BAND: f64 = 0.01;
const FD_STEP: f64 = 1e-5;
const MAX_BRACKET_EXTENSIONS: usize = 60;
const LENTZ_TINY: f64 = 1e-300;

/// 2F1(3, 1; 5/2; z) by the Gauss continued fraction
/// 1 / (1 - k1 z / (1 - k2 z / (1 - ...))), evaluated with modified Lentz.
pub(crate) fn hypergeometric(z: f64) -> f64 {
    let mut f = 1.0;
    let mut c = f;
    let mut d = 0.0;
    for m in 1..=HYPERGEOMETRIC_MAX_TERMS {
        let n = ((m - 1) / 2) as f64;
        let k = if m % 2 == 1 {
            (3.0 + n) * (1.5 + n) / ((1.5 + 2.0 * n) * (2.5 + 2.0 * n))
        } else {
            (n + 1.0) * (n - 0.5) / ((2.5 + 2.0 * n) * (3.5 + 2.0 * n))
        };
        let a = -k * z;
        d = 1.0 + a * d;
        if d == 0.0 {
            d = LENTZ_TINY;
        }
        c = 1.0 + a / c;
        if c == 0.0 {
            c = LENTZ_TINY;
        }
        d = 1.0 / d;
        let delta = c * d;
        f *= delta;
        if (delta - 1.0).abs() < HYPERGEOMETRIC_TOLERANCE {
            break;
        }
    }
    1.0 / f
}

/// y = sqrt(1 - lambda^2 (1 - x^2)) and eta = y - lambda x, the latter
/// without cancellation when lambda x > 0.
fn y_and_eta(x: f64, lambda: f64) -> (f64, f64) {
    let y = (1.0 - lambda * lambda * (1.0 - x * x)).sqrt();
    let eta = if lambda * x > 0.0 {
        (1.0 - lambda * lambda) / (y + lambda * x)
    } else {
        y - lambda * x
    };
    (y, eta)
}

/// Non-dimensional time of flight at x.
pub(crate) fn time_of_flight(x: f64, lambda: f64, nrev: u32) -> f64 {
    if (x - 1.0).abs() < HYPERGEOMETRIC_BAND {
        hypergeometric_time(x, lambda, nrev)
    } else {
        lancaster_time(x, lambda, nrev)
    }
}

fn hypergeometric_time(x: f64, lambda: f64, nrev: u32) -> f64 {
    let (_, eta) = y_and_eta(x, lambda);
    let s1 = 0.5 * (1.0 - lambda - x * eta);
    let q = 4.0 / 3.0 * hypergeometric(s1);
    let mut t = 0.5 * (eta * eta * eta * q + 4.0 * lambda * eta);
    if nrev > 0 {
        t += nrev as f64 * PI / (1.0 - x * x).powf(1.5);
    }
    t
}

/// T = (x - lambda y - d / sqrt|x^2 - 1|) / (x^2 - 1), with d the
/// eccentric (acos) or hyperbolic (ln) anomaly difference.
fn lancaster_time(x: f64, lambda: f64, nrev: u32) -> f64 {
    let (y, eta) = y_and_eta(x, lambda);
    let e = x * x - 1.0;
    let sqrt_rho = e.abs().sqrt();
    // x - lambda y, rationalized when the two terms share a sign
    let head = if lambda * x > 0.0 {
        (1.0 - lambda * lambda) * (x * x * (1.0 + lambda * lambda) - lambda * lambda) / (x + lambda * y)
    } else {
        x - lambda * y
    };
    let g = x * y - lambda * e;
    let d = if e < 0.0 {
        nrev as f64 * PI + g.clamp(-1.0, 1.0).acos()
    } else {
        (sqrt_rho * eta + g).ln()
    };
    (head - d / sqrt_rho) / e
}

/// (T, dT/dx, d2T/dx2) at x.
pub(crate) fn time_and_derivatives(x: f64, lambda: f64, nrev: u32) -> (f64, f64, f64) {
    let t = time_of_flight(x, lambda, nrev);
    if nrev == 0 && (x - 1.0).abs() < PARABOLIC_BAND {
        let up = time_of_flight(x + FD_STEP, lambda, nrev);
        let down = time_of_flight(x - FD_STEP, lambda, nrev);
        return (t, (up - down) / (2.0 * FD_STEP), (up - 2.0 * t + down) / (FD_STEP * FD_STEP));
    }
    let (y, _) = y_and_eta(x, lambda);
    let l3 = lambda * lambda * lambda;
    let umx2 = 1.0 - x * x;
    let d1 = (3.0 * t * x - 2.0 + 2.0 * l3 * x / y) / umx2;
    let d2 = (3.0 * t + 5.0 * x * d1 + 2.0 * (1.0 - lambda * lambda) * l3 / (y * y * y)) / umx2;
    (t, d1, d2)
}

/// x for a k-variable value on the same conic.
///
/// k / sqrt 2 = x y + lambda (1 - x^2) is increasing in x (its slope is
/// eta^2 / y), mapping x = -1, 0, 1 to k = -sqrt 2, sqrt 2 lambda, sqrt 2.
pub(crate) fn k_to_x(k: f64, lambda: f64) -> f64 {
    let target = k / SQRT_2;
    let g = |x: f64| {
        let (y, _) = y_and_eta(x, lambda);
        x * y + lambda * (1.0 - x * x)
    };

    let (mut lo, mut hi) = if target <= 1.0 { (-1.0, 1.0) } else { (1.0, 2.0) };
    for _ in 0..MAX_BRACKET_EXTENSIONS {
        if g(hi) >= target {
            break;
        }
        lo = hi;
        hi *= 2.0;
    }

    let mut x = if target.abs() <= 1.0 { target.clamp(lo, hi) } else { 0.5 * (lo + hi) };
    for _ in 0..100 {
        let (y, eta) = y_and_eta(x, lambda);
        let r = g(x) - target;
        if r == 0.0 {
            break;
        }
        if r > 0.0 {
            hi = x;
        } else {
            lo = x;
        }
        let newton = x - r * y / (eta * eta);
        let next = if newton.is_finite() && newton > lo && newton < hi { newton } else { 0.5 * (lo + hi) };
        let done = (next - x).abs() <= f64::EPSILON * x.abs().max(1.0);
        x = next;
        if done {
            break;
        }
    }
    x
}

/// Battin's continued-fraction formulation.
#[derive(Debug, Clone, Default)]
pub struct BattinSolver {
    pub config: SolverConfig,
    pub body: Body,
}

impl BattinSolver {
    pub fn new(config: SolverConfig, body: Body) -> Self {
        Self { config, body }
    }
}

impl LambertSolver for BattinSolver {
    fn method(&self) -> Method {
        Method::Battin
    }

    fn solve(&self, geometry: &TransferGeometry, request: &TransferRequest) -> TransferSolution {
        let mut sol = run_pipeline(self.method(), geometry, request, &self.config, &self.body, iterate);
        if let Some(report) = &sol.impact {
            sol.diagnostics.note = Some(format!(
                "r1 {:.1} km, transfer {:.3} deg, {}",
                mag(&sol.r1),
                geometry.transfer_angle(request.direction).to_degrees(),
                report
            ));
        }
        sol
    }
}

fn iterate(ctx: &SolveContext<'_>, diag: &mut Diagnostics) -> Result<ArcSolution, LambertError> {
    let geom = ctx.geometry;
    let nrev = ctx.request.nrev;
    let lambda = geom.lambda(ctx.request.direction);
    let s = geom.semi_perimeter;
    let target = ctx.tof * (2.0 * ctx.body.mu / (s * s * s)).sqrt();
    let record = ctx.record;

    if let Some(minimum) = record.minimum.as_ref().filter(|_| ctx.at_minimum()) {
        diag.guard(Guard::AtMinimumTime);
        let x = k_to_x(minimum.k, lambda);
        let residual = (time_of_flight(x, lambda, nrev) - target) / target;
        return Ok(finish(ctx, lambda, x, residual, 0));
    }

    let (lo, hi, slope, seed) = if nrev == 0 {
        let t_parabolic = 2.0 * (1.0 - lambda * lambda * lambda) / 3.0;
        let (mut lo, mut hi) = if target < t_parabolic { (1.0, 2.0) } else { (-1.0, 1.0) };
        if lo == 1.0 {
            let mut extensions = 0;
            while time_of_flight(hi, lambda, 0) > target {
                if extensions == MAX_BRACKET_EXTENSIONS {
                    return Err(LambertError::NotConverged { iterations: 0, residual: f64::INFINITY });
                }
                lo = hi;
                hi *= 2.0;
                extensions += 1;
                diag.guard(Guard::BracketExtended);
            }
        }
        (lo, hi, -1.0, zero_rev_seed(lambda, target))
    } else {
        let (k_lo, k_hi) = record.k_bracket;
        let lo = k_to_x(k_lo + K_MARGIN, lambda);
        let hi = k_to_x(k_hi - K_MARGIN, lambda);
        let slope = match record.side {
            CurveSide::Left => 1.0,
            CurveSide::Right => -1.0,
        };
        let time_scale = geom.time_scale(ctx.body.mu);
        (lo, hi, slope, k_to_x(record.k_seed(ctx.tof, time_scale), lambda))
    };

    let (x, residual, iterations) = solve_x(lambda, nrev, target, seed, lo, hi, slope, ctx.config, diag)?;
    Ok(finish(ctx, lambda, x, residual, iterations))
}

#[allow(clippy::too_many_arguments)]
fn solve_x(
    lambda: f64,
    nrev: u32,
    target: f64,
    seed: f64,
    mut lo: f64,
    mut hi: f64,
    slope: f64,
    config: &SolverConfig,
    diag: &mut Diagnostics,
) -> Result<(f64, f64, usize), LambertError> {
    let mut x = if seed > lo && seed < hi { seed } else { 0.5 * (lo + hi) };
    let mut residual = f64::INFINITY;

    for iter in 0..config.max_iterations {
        let (t, d1, d2) = time_and_derivatives(x, lambda, nrev);
        // relative, so short transfers are held to the same digits as long ones
        let func = (t - target) / target;
        if !func.is_finite() {
            // past the end of the curve: step back toward the interior
            if x > 0.0 {
                hi = x;
            } else {
                lo = x;
            }
            x = 0.5 * (lo + hi);
            diag.bisection_steps += 1;
            diag.guard(Guard::Bisection);
            continue;
        }
        residual = func;
        log::trace!("battin iter {}: x = {:.15e}, residual = {:.3e}", iter, x, func);
        if func.abs() < config.tof_tolerance {
            return Ok((x, func, iter + 1));
        }

        if func * slope > 0.0 {
            hi = x;
        } else {
            lo = x;
        }
        if hi - lo <= 4.0 * f64::EPSILON * x.abs().max(1.0) {
            accept_rounding_limited(func, iter + 1, config, diag)?;
            return Ok((x, func, iter + 1));
        }

        let f = t - target;
        let halley = x - 2.0 * f * d1 / (2.0 * d1 * d1 - f * d2);
        if halley.is_finite() && halley > lo && halley < hi {
            x = halley;
            diag.halley_steps += 1;
        } else {
            x = 0.5 * (lo + hi);
            diag.bisection_steps += 1;
            diag.guard(Guard::Bisection);
        }
    }

    Err(LambertError::NotConverged { iterations: config.max_iterations, residual })
}

/// Izzo's zero-revolution starter, split on the times at x = 0 and x = 1.
fn zero_rev_seed(lambda: f64, target: f64) -> f64 {
    let t00 = lambda.acos() + lambda * (1.0 - lambda * lambda).sqrt();
    let t1 = 2.0 * (1.0 - lambda * lambda * lambda) / 3.0;
    if target >= t00 {
        -(target - t00) / (target - t00 + 4.0)
    } else if target <= t1 {
        t1 * (t1 - target) / (0.4 * (1.0 - lambda.powi(5)) * target) + 1.0
    } else {
        (target / t00).powf(std::f64::consts::LN_2 / (t1 / t00).ln()) - 1.0
    }
}

/// Radial and transverse velocity components from the converged x.
fn finish(ctx: &SolveContext<'_>, lambda: f64, x: f64, residual: f64, iterations: usize) -> ArcSolution {
    let geom = ctx.geometry;
    let (y, eta) = y_and_eta(x, lambda);
    // y + lambda x without cancellation: (y + lambda x)(y - lambda x) = 1 - lambda^2
    let y_plus = if lambda * x < 0.0 { (1.0 - lambda * lambda) / eta } else { y + lambda * x };
    let gamma = (ctx.body.mu * geom.semi_perimeter / 2.0).sqrt();
    let rho = if geom.chord > 0.0 { (geom.r1 - geom.r2) / geom.chord } else { 0.0 };
    let sigma = (1.0 - rho * rho).max(0.0).sqrt();

    let ly = lambda * y;
    let vr1 = gamma * ((ly - x) - rho * (ly + x)) * geom.inv_r1;
    let vr2 = -gamma * ((ly - x) + rho * (ly + x)) * geom.inv_r2;
    let vt = gamma * sigma * y_plus;

    let normal = geom.transfer_normal(ctx.request.direction);
    let r1_hat = scale(geom.inv_r1, &geom.r1_vec);
    let r2_hat = scale(geom.inv_r2, &geom.r2_vec);
    let v1 = add_scaled(vr1, &r1_hat, vt * geom.inv_r1, &cross(&normal, &r1_hat));
    let v2 = add_scaled(vr2, &r2_hat, vt * geom.inv_r2, &cross(&normal, &r2_hat));
    ArcSolution { v1, v2, iterations, residual, parameter: x }
}
