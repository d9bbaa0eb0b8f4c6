//! Two-body propagation in universal variables.
//!
//! Used for the pre-transfer coast, for the Stumpff form of the f-and-g
//! check, and by tests to confirm that a solution actually reaches r2. The
//! Lambert iterations never call it.

use std::f64::consts::PI;

use crate::error::LambertError;
use crate::stumpff::stumpff_c2c3;
use crate::vector::{add_scaled, dot, mag};

const MAX_ITERATIONS: usize = 200;
const MAX_BRACKET_EXTENSIONS: usize = 60;
const CHI_TOLERANCE: f64 = 1e-13;
const ROUNDING_FLOOR: f64 = 8.0 * f64::EPSILON;

/// Converged universal anomaly for one propagation.
#[derive(Debug, Clone, Copy)]
pub struct UniversalAnomaly {
    /// Universal anomaly chi
    pub chi: f64,
    /// psi = alpha chi^2
    pub psi: f64,
    pub c2: f64,
    pub c3: f64,
    /// |r0|
    pub r0: f64,
    /// |r| at the end of the step
    pub r: f64,
    /// Time actually propagated (reduced modulo the period for ellipses)
    pub dt: f64,
    pub newton_steps: usize,
}

impl UniversalAnomaly {
    /// Lagrange coefficients `(f, g, f_dot, g_dot)` for the step.
    pub fn lagrange(&self, mu: f64) -> (f64, f64, f64, f64) {
        let sqrt_mu = mu.sqrt();
        let chi2 = self.chi * self.chi;
        let f = 1.0 - chi2 / self.r0 * self.c2;
        let g = self.dt - chi2 * self.chi / sqrt_mu * self.c3;
        let g_dot = 1.0 - chi2 / self.r * self.c2;
        let f_dot = sqrt_mu / (self.r * self.r0) * self.chi * (self.psi * self.c3 - 1.0);
        (f, g, f_dot, g_dot)
    }
}

/// Solve the universal Kepler equation for a step of `dt` from (r0, v0).
pub fn solve_universal_anomaly(
    r0: &[f64; 3],
    v0: &[f64; 3],
    dt: f64,
    mu: f64,
) -> Result<UniversalAnomaly, LambertError> {
    let r0_mag = mag(r0);
    if r0_mag == 0.0 || !dt.is_finite() || !(mu > 0.0) {
        return Err(LambertError::DegenerateInput("cannot propagate from the origin".into()));
    }
    let sqrt_mu = mu.sqrt();
    let rdotv = dot(r0, v0);
    let alpha = 2.0 / r0_mag - dot(v0, v0) / mu; // 1/a

    // full periods of an ellipse change nothing
    let dt = if alpha > 1e-12 {
        let period = 2.0 * PI / (sqrt_mu * alpha.powf(1.5));
        dt % period
    } else {
        dt
    };

    let mut chi = if alpha > 1e-12 {
        sqrt_mu * dt * alpha
    } else if alpha < -1e-12 {
        let a = 1.0 / alpha;
        let sign_dt = if dt >= 0.0 { 1.0 } else { -1.0 };
        let arg = (-2.0 * mu * alpha * dt * dt)
            / (rdotv + sign_dt * (-mu * a).sqrt() * (1.0 - r0_mag * alpha));
        if arg > 0.0 && arg.is_finite() {
            sign_dt * (-a).sqrt() * arg.ln()
        } else {
            sqrt_mu * dt / r0_mag
        }
    } else {
        sqrt_mu * dt / r0_mag
    };

    // sqrt(mu) (t(chi) - dt), r(chi), and the size of the largest term of
    // the former; t grows with chi at rate r / sqrt(mu)
    let kepler = |chi: f64| {
        let chi2 = chi * chi;
        let psi = alpha * chi2;
        let (c2, c3) = stumpff_c2c3(psi);
        let r = chi2 * c2 + rdotv / sqrt_mu * chi * (1.0 - psi * c3) + r0_mag * (1.0 - psi * c2);
        let terms = [r0_mag * chi * (1.0 - psi * c3), rdotv / sqrt_mu * chi2 * c2, chi2 * chi * c3, -sqrt_mu * dt];
        let t_err = terms.iter().sum::<f64>();
        let size = terms.iter().fold(0.0_f64, |m, t| m.max(t.abs()));
        (t_err, r, size)
    };
    let converged = |chi: f64, steps: usize| {
        let psi = alpha * chi * chi;
        let (c2, c3) = stumpff_c2c3(psi);
        let (_, r, _) = kepler(chi);
        UniversalAnomaly { chi, psi, c2, c3, r0: r0_mag, r, dt, newton_steps: steps }
    };
    if dt == 0.0 {
        return Ok(converged(0.0, 0));
    }

    // chi = 0 is one end of the bracket; one full period (or a doubled
    // bound on open orbits) is the other
    let sign_dt = dt.signum();
    let far = if alpha > 1e-12 {
        2.0 * PI / alpha.sqrt()
    } else {
        let mut bound = chi.abs().max(1.0);
        let mut extensions = 0;
        loop {
            let (t_err, _, _) = kepler(sign_dt * bound);
            if !t_err.is_finite() || t_err * sign_dt > 0.0 {
                break bound;
            }
            if extensions == MAX_BRACKET_EXTENSIONS {
                return Err(LambertError::NotConverged { iterations: 0, residual: t_err / sqrt_mu });
            }
            bound *= 2.0;
            extensions += 1;
        }
    };
    let (mut lo, mut hi) = if sign_dt > 0.0 { (0.0, far) } else { (-far, 0.0) };
    if !(chi > lo && chi < hi) {
        chi = 0.5 * (lo + hi);
    }

    let mut t_err = f64::NAN;
    for iter in 0..MAX_ITERATIONS {
        let (err, r, size) = kepler(chi);
        t_err = err;
        // nothing left to resolve below the rounding of the largest term
        if t_err.abs() <= ROUNDING_FLOOR * size {
            return Ok(converged(chi, iter + 1));
        }
        // past the overflow point of cosh counts as too late
        if !t_err.is_finite() || t_err > 0.0 {
            hi = chi;
        } else {
            lo = chi;
        }

        let newton = chi - t_err / r;
        let next = if newton.is_finite() && newton > lo && newton < hi { newton } else { 0.5 * (lo + hi) };
        let step = next - chi;
        chi = next;
        if step.abs() <= CHI_TOLERANCE * chi.abs().max(1.0) || hi - lo <= 4.0 * f64::EPSILON * chi.abs().max(1.0) {
            return Ok(converged(chi, iter + 1));
        }
    }

    Err(LambertError::NotConverged { iterations: MAX_ITERATIONS, residual: t_err / sqrt_mu })
}

/// Propagate (r0, v0) by `dt` on the two-body conic. Returns (r, v).
pub fn propagate(
    r0: &[f64; 3],
    v0: &[f64; 3],
    dt: f64,
    mu: f64,
) -> Result<([f64; 3], [f64; 3]), LambertError> {
    let anomaly = solve_universal_anomaly(r0, v0, dt, mu)?;
    let (f, g, f_dot, g_dot) = anomaly.lagrange(mu);
    Ok((add_scaled(f, r0, g, v0), add_scaled(f_dot, r0, g_dot, v0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_quarter_orbit() {
        let (r, v) = propagate(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], PI / 2.0, 1.0).unwrap();
        assert!((r[0]).abs() < 1e-12 && (r[1] - 1.0).abs() < 1e-12, "r = {:?}", r);
        assert!((v[0] + 1.0).abs() < 1e-12 && v[1].abs() < 1e-12, "v = {:?}", v);
    }

    #[test]
    fn test_many_periods_reduce() {
        let (r, _) = propagate(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], 20.0 * PI + 0.5, 1.0).unwrap();
        assert!((r[0] - 0.5_f64.cos()).abs() < 1e-10);
        assert!((r[1] - 0.5_f64.sin()).abs() < 1e-10);
    }

    #[test]
    fn test_long_eccentric_arc_converges() {
        // the 1e5 s short-way transfer from (1, 0, 0) to (0, 1, 0): a ~ 630,
        // so the arc is ill-conditioned and only loose agreement is possible
        let r0 = [1.0, 0.0, 0.0];
        let v0 = [1.3058953057142817, 0.5413473849671186, 0.0];
        let anomaly = solve_universal_anomaly(&r0, &v0, 1.0e5, 1.0).unwrap();
        assert!(anomaly.newton_steps < 50, "{} steps", anomaly.newton_steps);
        let (r, v) = propagate(&r0, &v0, 1.0e5, 1.0).unwrap();
        assert!(r[0].abs() < 1e-5 && (r[1] - 1.0).abs() < 1e-5, "r = {:?}", r);
        let e0 = dot(&v0, &v0) / 2.0 - 1.0 / mag(&r0);
        let e1 = dot(&v, &v) / 2.0 - 1.0 / mag(&r);
        assert!((e0 - e1).abs() < 1e-6 * e0.abs(), "{} vs {}", e0, e1);
    }

    #[test]
    fn test_short_hyperbolic_step_converges() {
        let r0 = [1.0, 0.0, 0.0];
        let v0 = [-4.0555967, -0.2331674, 0.0];
        let (r, v) = propagate(&r0, &v0, 0.01, 1.0).unwrap();
        let (rb, _) = propagate(&r, &v, -0.01, 1.0).unwrap();
        for i in 0..3 {
            assert!((rb[i] - r0[i]).abs() < 1e-12, "component {}: {}", i, rb[i]);
        }
    }

    #[test]
    fn test_hyperbolic_energy_conserved() {
        let r0 = [1.0, 0.0, 0.0];
        let v0 = [0.3, 1.6, 0.1];
        let (r, v) = propagate(&r0, &v0, 5.0, 1.0).unwrap();
        let e0 = dot(&v0, &v0) / 2.0 - 1.0 / mag(&r0);
        let e1 = dot(&v, &v) / 2.0 - 1.0 / mag(&r);
        assert!((e0 - e1).abs() < 1e-11, "{} vs {}", e0, e1);
    }

    #[test]
    fn test_backward_propagation_inverts() {
        let r0 = [7000.0, 100.0, -300.0];
        let v0 = [0.5, 7.3, 1.0];
        let mu = 398_600.441_8;
        let (r, v) = propagate(&r0, &v0, 2400.0, mu).unwrap();
        let (rb, _) = propagate(&r, &v, -2400.0, mu).unwrap();
        for i in 0..3 {
            assert!((rb[i] - r0[i]).abs() < 1e-6, "component {}: {} vs {}", i, rb[i], r0[i]);
        }
    }
}
