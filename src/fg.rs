//! Lagrange f and g coefficients, three independent ways.
//!
//! After a solver converges, the pipeline recomputes (f, g, f_dot, g_dot)
//! for the returned arc and checks both the identity f g_dot - f_dot g = 1
//! and that f r1 + g v1 lands on r2. Each derivation fails differently
//! (PQW needs a non-rectilinear orbit, the series needs short steps, the
//! Stumpff form needs a Kepler solve), which is what makes them useful
//! as cross-checks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SolverConfig;
use crate::error::LambertError;
use crate::kepler::solve_universal_anomaly;
use crate::vector::{add_scaled, cross, distance, dot, mag, scale};

/// Derivation used for the Lagrange coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FgMethod {
    /// Closed form in the perifocal frame from p and the eccentricity vector
    Pqw,
    /// Maclaurin series in time, composed over short substeps
    Series,
    /// Universal-variable closed form through a Kepler solve
    #[default]
    Stumpff,
}

impl fmt::Display for FgMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FgMethod::Pqw => "pqw",
            FgMethod::Series => "series",
            FgMethod::Stumpff => "stumpff",
        })
    }
}

/// Lagrange coefficients mapping (r1, v1) to (r2, v2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagrangeCoefficients {
    pub f: f64,
    pub g: f64,
    pub f_dot: f64,
    pub g_dot: f64,
}

impl LagrangeCoefficients {
    /// f g_dot - f_dot g, identically 1 for Keplerian motion
    #[inline]
    pub fn determinant(&self) -> f64 {
        self.f * self.g_dot - self.f_dot * self.g
    }

    /// Compose `self` after `first`: both map (r, v) pairs linearly.
    fn after(&self, first: &LagrangeCoefficients) -> LagrangeCoefficients {
        LagrangeCoefficients {
            f: self.f * first.f + self.g * first.f_dot,
            g: self.f * first.g + self.g * first.g_dot,
            f_dot: self.f_dot * first.f + self.g_dot * first.f_dot,
            g_dot: self.f_dot * first.g + self.g_dot * first.g_dot,
        }
    }

    pub fn apply(&self, r: &[f64; 3], v: &[f64; 3]) -> ([f64; 3], [f64; 3]) {
        (add_scaled(self.f, r, self.g, v), add_scaled(self.f_dot, r, self.g_dot, v))
    }
}

/// Result of the post-solve consistency check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsistencyCheck {
    pub method: FgMethod,
    pub coefficients: LagrangeCoefficients,
    /// |f g_dot - f_dot g - 1|
    pub determinant_error: f64,
    /// |f r1 + g v1 - r2| / |r2|
    pub position_residual: f64,
    pub passed: bool,
}

/// Lagrange coefficients of the arc (r1, v1) -> (r2, v2) over `dt`.
///
/// `Pqw` reads the swept angle from r1 and r2 (so it does not care how many
/// revolutions were flown); the other two integrate forward in time from
/// (r1, v1) and ignore r2 and v2.
pub fn lagrange_coefficients(
    r1: &[f64; 3],
    v1: &[f64; 3],
    r2: &[f64; 3],
    dt: f64,
    mu: f64,
    method: FgMethod,
) -> Result<LagrangeCoefficients, LambertError> {
    match method {
        FgMethod::Pqw => pqw(r1, v1, r2, mu),
        FgMethod::Series => series(r1, v1, dt, mu),
        FgMethod::Stumpff => {
            let anomaly = solve_universal_anomaly(r1, v1, dt, mu)?;
            let (f, g, f_dot, g_dot) = anomaly.lagrange(mu);
            Ok(LagrangeCoefficients { f, g, f_dot, g_dot })
        }
    }
}

/// Run the consistency check on a converged arc.
pub fn cross_check(
    r1: &[f64; 3],
    v1: &[f64; 3],
    r2: &[f64; 3],
    dt: f64,
    mu: f64,
    config: &SolverConfig,
) -> Result<ConsistencyCheck, LambertError> {
    let coefficients = lagrange_coefficients(r1, v1, r2, dt, mu, config.fg_method)?;
    let determinant_error = (coefficients.determinant() - 1.0).abs();
    let (r2_pred, _) = coefficients.apply(r1, v1);
    let position_residual = distance(&r2_pred, r2) / mag(r2);
    let passed = determinant_error <= config.fg_tolerance
        && position_residual <= config.position_tolerance;
    Ok(ConsistencyCheck {
        method: config.fg_method,
        coefficients,
        determinant_error,
        position_residual,
        passed,
    })
}

/// Perifocal form. On the conic through (r1, v1) the velocity at any
/// point r is sqrt(mu / p) h_hat x (r_hat + e), with e the eccentricity
/// vector, so v2 follows from r2 without a true anomaly. (f, g) and
/// (f_dot, g_dot) then come from resolving r2 and v2 on the (r1, v1) basis.
fn pqw(r1: &[f64; 3], v1: &[f64; 3], r2: &[f64; 3], mu: f64) -> Result<LagrangeCoefficients, LambertError> {
    let h = cross(r1, v1);
    let h_mag = mag(&h);
    if h_mag == 0.0 {
        return Err(LambertError::DegenerateGeometry("rectilinear orbit has no perifocal frame".into()));
    }
    let h_hat = scale(1.0 / h_mag, &h);
    let p = h_mag * h_mag / mu;
    let r1_hat = scale(1.0 / mag(r1), r1);
    let r2_hat = scale(1.0 / mag(r2), r2);

    // e = v x h / mu - r_hat
    let e = add_scaled(1.0 / mu, &cross(v1, &h), -1.0, &r1_hat);
    let v2 = scale((mu / p).sqrt(), &cross(&h_hat, &add_scaled(1.0, &r2_hat, 1.0, &e)));

    let in_plane = |a: &[f64; 3], b: &[f64; 3]| dot(&cross(a, b), &h_hat) / h_mag;
    Ok(LagrangeCoefficients {
        f: in_plane(r2, v1),
        g: in_plane(r1, r2),
        f_dot: in_plane(&v2, v1),
        g_dot: in_plane(r1, &v2),
    })
}

/// Substep length as a fraction of the local dynamical time scale.
const SERIES_STEP_FRACTION: f64 = 0.01;
const SERIES_MAX_STEPS: usize = 2_000_000;

fn series(r1: &[f64; 3], v1: &[f64; 3], dt: f64, mu: f64) -> Result<LagrangeCoefficients, LambertError> {
    let mut total = LagrangeCoefficients { f: 1.0, g: 0.0, f_dot: 0.0, g_dot: 1.0 };
    let mut elapsed = 0.0;
    let direction = dt.signum();

    for _ in 0..SERIES_MAX_STEPS {
        let remaining = dt - elapsed;
        if remaining.abs() <= 1e-15 * dt.abs() {
            return Ok(total);
        }
        let (r, v) = total.apply(r1, v1);
        let r_sq = dot(&r, &r);
        let u = mu / (r_sq * r_sq.sqrt());
        let p = dot(&r, &v) / r_sq;
        let q = dot(&v, &v) / r_sq - u;
        let rate = u.sqrt().max(p.abs()).max(q.abs().sqrt());
        let h = direction * remaining.abs().min(SERIES_STEP_FRACTION / rate);

        total = maclaurin_step(u, p, q, h).after(&total);
        elapsed += h;
    }

    Err(LambertError::NotConverged { iterations: SERIES_MAX_STEPS, residual: (dt - elapsed).abs() })
}

/// Fifth-order f and g series for one step of length t.
fn maclaurin_step(u: f64, p: f64, q: f64, t: f64) -> LagrangeCoefficients {
    let t2 = t * t;
    let t3 = t2 * t;
    let t4 = t2 * t2;
    let t5 = t4 * t;
    let p2 = p * p;
    let f4 = u / 24.0 * (-15.0 * p2 + 3.0 * q + u);
    let f5 = u * p / 8.0 * (7.0 * p2 - 3.0 * q - u);
    let g5 = u / 120.0 * (-45.0 * p2 + 9.0 * q + u);

    LagrangeCoefficients {
        f: 1.0 - 0.5 * u * t2 + 0.5 * u * p * t3 + f4 * t4 + f5 * t5,
        g: t - u / 6.0 * t3 + 0.25 * u * p * t4 + g5 * t5,
        f_dot: -u * t + 1.5 * u * p * t2 + 4.0 * f4 * t3 + 5.0 * f5 * t4,
        g_dot: 1.0 - 0.5 * u * t2 + u * p * t3 + 5.0 * g5 * t4,
    }
}
