//! Minimum-time curve and branch selection.
//!
//! For N >= 1 revolutions the time of flight, as a function of the
//! universal variable psi on (4 N^2 pi^2, 4 (N+1)^2 pi^2), is a bowl: it
//! tends to infinity at both ends and has one minimum in between. Each
//! energy branch owns one side of that minimum. This module finds the
//! minimum twice, once in psi and once in the k variable, cross-checks
//! the two, and hands every solver the same bracket, seed and feasibility
//! bound through a [`MinimumTimeRecord`].
//!
//! All three iteration variables are monotone in one another along a
//! branch: k and Battin's x decrease as psi increases. Sides are therefore
//! named once, in psi, by [`CurveSide`].

use std::f64::consts::PI;

use crate::config::{Body, SolverConfig};
use crate::error::LambertError;
use crate::geometry::{Direction, Energy, TransferGeometry};
use crate::kvariable::{tof_and_derivatives, K_MARGIN};
use crate::universal::time_of_flight;

const SQRT_2: f64 = std::f64::consts::SQRT_2;
const TWO_PI: f64 = 2.0 * PI;
const FOUR_PI_SQ: f64 = 4.0 * PI * PI;

/// Relative disagreement between the two minima that triggers a warning.
const MIN_TIME_AGREEMENT: f64 = 1e-6;
/// Iteration budget for locating a minimum, as a multiple of the solver cap.
const MIN_SEARCH_FACTOR: usize = 4;

/// Side of the time-curve minimum, measured along increasing psi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveSide {
    /// Smaller psi: larger k and x, larger semi-major axis
    Left,
    /// Larger psi: smaller k and x
    Right,
}

impl CurveSide {
    fn opposite(self) -> Self {
        match self {
            CurveSide::Left => CurveSide::Right,
            CurveSide::Right => CurveSide::Left,
        }
    }
}

/// The single place that pairs (direction, energy) with a side of the curve.
///
/// Along the curve the k-variable semi-parameter ratio p = 1 - k tau grows
/// with psi on the short way and shrinks with psi on the long way, because
/// tau carries the direction sign. Low energy on the short way and high
/// energy on the long way sit on the larger-p side; the other two pairings
/// are swapped onto the smaller-p side. Every solver goes through here.
pub fn curve_side(direction: Direction, energy: Energy) -> CurveSide {
    let larger_p = match direction {
        Direction::Short => CurveSide::Right,
        Direction::Long => CurveSide::Left,
    };
    let swapped = matches!(
        (direction, energy),
        (Direction::Short, Energy::High) | (Direction::Long, Energy::Low)
    );
    if swapped {
        larger_p.opposite()
    } else {
        larger_p
    }
}

/// The minimum of an N >= 1 revolution time curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveMinimum {
    /// psi at the minimum
    pub psi: f64,
    /// k at the minimum, found independently of `psi`
    pub k: f64,
    /// Minimum time of flight (s)
    pub tof: f64,
    /// d2t/dpsi2 at the minimum (s)
    pub psi_curvature: f64,
    /// d2F/dk2 at the minimum, F = t / S
    pub k_curvature: f64,
    /// Relative disagreement between the psi and k minima
    pub disagreement: f64,
}

/// Bracket, seed and feasibility data for one (geometry, direction, energy, nrev).
#[derive(Debug, Clone, PartialEq)]
pub struct MinimumTimeRecord {
    pub nrev: u32,
    pub direction: Direction,
    pub energy: Energy,
    pub side: CurveSide,
    /// Smallest feasible time of flight (s); zero for nrev = 0
    pub tof_min: f64,
    /// Present for nrev >= 1
    pub minimum: Option<CurveMinimum>,
    /// Open psi interval holding the requested branch. For nrev = 0 the lower
    /// end is only a starting point and is pushed down as needed.
    pub psi_bracket: (f64, f64),
    /// Open k interval holding the requested branch. For nrev = 0 on the
    /// long way the upper end is infinite.
    pub k_bracket: (f64, f64),
    /// Time of the minimum-energy (a = s/2) transfer with nrev revolutions (s)
    pub min_energy_tof: f64,
    pub min_energy_psi: f64,
    /// Parabolic time of flight (s); only meaningful for nrev = 0
    pub parabolic_tof: f64,
}

impl MinimumTimeRecord {
    /// Starting psi for time of flight `tof`, from a quadratic model of the
    /// curve about its minimum.
    pub fn psi_seed(&self, tof: f64) -> f64 {
        let (lo, hi) = self.psi_bracket;
        let Some(m) = &self.minimum else {
            return 0.5 * (lo + hi);
        };
        let offset = (2.0 * (tof - m.tof).max(0.0) / m.psi_curvature).sqrt();
        let seed = match self.side {
            CurveSide::Left => m.psi - offset,
            CurveSide::Right => m.psi + offset,
        };
        interior_or_midpoint(seed, lo, hi)
    }

    /// Starting k for time of flight `tof`, with S the k-variable time scale.
    pub fn k_seed(&self, tof: f64, time_scale: f64) -> f64 {
        let (lo, hi) = self.k_bracket;
        let Some(m) = &self.minimum else {
            return if hi.is_finite() { 0.5 * (lo + hi) } else { 0.0 };
        };
        let offset = (2.0 * (tof - m.tof).max(0.0) / time_scale / m.k_curvature).sqrt();
        let seed = match self.side {
            CurveSide::Left => m.k + offset,
            CurveSide::Right => m.k - offset,
        };
        interior_or_midpoint(seed, lo, hi)
    }
}

fn interior_or_midpoint(x: f64, lo: f64, hi: f64) -> f64 {
    if x.is_finite() && x > lo && x < hi {
        x
    } else {
        0.5 * (lo + hi)
    }
}

/// k for a universal variable psi on revolution branch `nrev`.
///
/// k = sqrt(2) cos(dE/2) with dE = sqrt(psi) - 2 pi N for ellipses, and
/// k = sqrt(2) cosh(sqrt(-psi)/2) for hyperbolas.
pub fn k_from_psi(psi: f64, nrev: u32) -> f64 {
    if psi >= 0.0 {
        let delta_e = psi.sqrt() - TWO_PI * nrev as f64;
        SQRT_2 * (0.5 * delta_e).cos()
    } else {
        SQRT_2 * (0.5 * (-psi).sqrt()).cosh()
    }
}

/// Inverse of [`k_from_psi`].
pub fn psi_from_k(k: f64, nrev: u32) -> f64 {
    let ratio = k / SQRT_2;
    if ratio <= 1.0 {
        let delta_e = 2.0 * ratio.max(-1.0).acos();
        let angle = TWO_PI * nrev as f64 + delta_e;
        angle * angle
    } else {
        let half = ratio.acosh();
        -4.0 * half * half
    }
}

/// Minimum-energy transfer time and its psi.
///
/// a_m = s/2 and beta_m = 2 asin(sqrt((s - c)/s)); the short way sweeps
/// dE = pi - beta_m beyond the N full revolutions, the long way pi + beta_m.
pub fn min_energy_tof(geometry: &TransferGeometry, direction: Direction, nrev: u32, mu: f64) -> (f64, f64) {
    let s = geometry.semi_perimeter;
    let a_m = 0.5 * s;
    let lambda = geometry.lambda(direction);
    let beta_m = 2.0 * lambda.abs().min(1.0).asin();
    let d = direction.sign();
    let n_part = TWO_PI * nrev as f64;
    let tof = (a_m * a_m * a_m / mu).sqrt() * (n_part + PI - d * (beta_m - beta_m.sin()));
    let delta_e = PI - d * beta_m;
    (tof, (n_part + delta_e).powi(2))
}

/// Parabolic time of flight (Euler's equation).
pub fn parabolic_tof(geometry: &TransferGeometry, direction: Direction, mu: f64) -> f64 {
    let s = geometry.semi_perimeter;
    let s_minus_c = (s - geometry.chord).max(0.0);
    (2.0_f64.sqrt() / 3.0) / mu.sqrt() * (s.powf(1.5) - direction.sign() * s_minus_c.powf(1.5))
}

/// Build the record for one branch.
///
/// For nrev = 0 there is no minimum and every positive time is feasible.
/// For nrev >= 1 the minimum is located in psi (bracketed Newton on
/// dt/dpsi) and in k (bracketed Halley on dF/dk) and the two are compared.
pub fn minimum_time(
    geometry: &TransferGeometry,
    direction: Direction,
    energy: Energy,
    nrev: u32,
    body: &Body,
    config: &SolverConfig,
) -> Result<MinimumTimeRecord, LambertError> {
    let mu = body.mu;
    let side = curve_side(direction, energy);
    let (min_energy_tof, min_energy_psi) = min_energy_tof(geometry, direction, nrev, mu);
    let parabolic_tof = parabolic_tof(geometry, direction, mu);
    let tau = geometry.tau(direction);

    if nrev == 0 {
        let k_hi = if tau > 0.0 { 1.0 / tau } else { f64::INFINITY };
        return Ok(MinimumTimeRecord {
            nrev,
            direction,
            energy,
            side,
            tof_min: 0.0,
            minimum: None,
            psi_bracket: (-FOUR_PI_SQ, FOUR_PI_SQ),
            k_bracket: (-SQRT_2, k_hi),
            min_energy_tof,
            min_energy_psi,
            parabolic_tof,
        });
    }

    let a_constant = geometry.a_constant(direction);
    let time_scale = geometry.time_scale(mu);
    let (psi_min, t_psi, psi_curvature) =
        psi_minimum(geometry.r1_plus_r2, a_constant, nrev, mu, min_energy_psi, config)?;
    let (k_min, f_k, k_curvature) = k_minimum(tau, nrev, config)?;
    let t_k = f_k * time_scale;

    let disagreement = (t_psi - t_k).abs() / t_psi;
    let k_of_psi_min = k_from_psi(psi_min, nrev);
    if disagreement > MIN_TIME_AGREEMENT {
        log::warn!(
            "minimum-time curves disagree for nrev={}: t(psi)={:.9} s at k={:.9}, t(k)={:.9} s at k={:.9}",
            nrev, t_psi, k_of_psi_min, t_k, k_min
        );
    } else {
        log::trace!("nrev={} minimum time {:.9} s (psi {:.9}, k {:.9})", nrev, t_psi, psi_min, k_min);
    }
    let tof_min = t_psi.min(t_k);

    let n = nrev as f64;
    let psi_lo = (TWO_PI * n).powi(2);
    let psi_hi = (TWO_PI * (n + 1.0)).powi(2);
    let (psi_bracket, k_bracket) = match side {
        CurveSide::Left => ((psi_lo, psi_min), (k_min, SQRT_2)),
        CurveSide::Right => ((psi_min, psi_hi), (-SQRT_2, k_min)),
    };

    Ok(MinimumTimeRecord {
        nrev,
        direction,
        energy,
        side,
        tof_min,
        minimum: Some(CurveMinimum {
            psi: psi_min,
            k: k_min,
            tof: tof_min,
            psi_curvature,
            k_curvature,
            disagreement,
        }),
        psi_bracket,
        k_bracket,
        min_energy_tof,
        min_energy_psi,
        parabolic_tof,
    })
}

/// Root of dt/dpsi on the N-revolution interval: (psi, t, d2t/dpsi2).
fn psi_minimum(
    r1_plus_r2: f64,
    a_constant: f64,
    nrev: u32,
    mu: f64,
    seed: f64,
    config: &SolverConfig,
) -> Result<(f64, f64, f64), LambertError> {
    let n = nrev as f64;
    let mut lo = (TWO_PI * n).powi(2);
    let mut hi = (TWO_PI * (n + 1.0)).powi(2);
    let slope = |psi: f64| time_of_flight(r1_plus_r2, a_constant, psi, mu).map(|p| p.dtdpsi);
    let curvature = |psi: f64| {
        let h = 1e-6 * psi;
        match (slope(psi + h), slope(psi - h)) {
            (Some(up), Some(down)) => (up - down) / (2.0 * h),
            _ => f64::NAN,
        }
    };

    let mut psi = interior_or_midpoint(seed, lo, hi);
    for _ in 0..config.max_iterations * MIN_SEARCH_FACTOR {
        let Some(d) = slope(psi) else {
            break;
        };
        if d < 0.0 {
            lo = psi;
        } else {
            hi = psi;
        }
        let c = curvature(psi);
        let newton = psi - d / c;
        let next = if c > 0.0 && newton > lo && newton < hi { newton } else { 0.5 * (lo + hi) };
        let done = (next - psi).abs() <= config.min_time_tolerance * psi || hi - lo <= config.min_time_tolerance * psi;
        psi = next;
        if done {
            break;
        }
    }

    let point = time_of_flight(r1_plus_r2, a_constant, psi, mu).ok_or_else(|| {
        LambertError::DegenerateGeometry(format!("time curve undefined near its {}-rev minimum", nrev))
    })?;
    Ok((psi, point.t, curvature(psi)))
}

/// Root of dF/dk on (-sqrt 2, sqrt 2) by bracketed Halley: (k, F, F'').
fn k_minimum(tau: f64, nrev: u32, config: &SolverConfig) -> Result<(f64, f64, f64), LambertError> {
    let mut lo = -SQRT_2 + K_MARGIN;
    let mut hi = SQRT_2 - K_MARGIN;
    let mut k = 0.0;

    for _ in 0..config.max_iterations * MIN_SEARCH_FACTOR {
        let Some(df) = tof_and_derivatives(k, tau, nrev) else {
            break;
        };
        let (g, g1, g2) = (df[1], df[2], df[3]);
        if g < 0.0 {
            lo = k;
        } else {
            hi = k;
        }
        let halley = k - 2.0 * g * g1 / (2.0 * g1 * g1 - g * g2);
        let next = if halley.is_finite() && halley > lo && halley < hi { halley } else { 0.5 * (lo + hi) };
        let done = (next - k).abs() <= config.min_time_tolerance * k.abs().max(1.0) || hi - lo <= config.min_time_tolerance;
        k = next;
        if done {
            break;
        }
    }

    let df = tof_and_derivatives(k, tau, nrev).ok_or_else(|| {
        LambertError::DegenerateGeometry(format!("k time curve undefined near its {}-rev minimum", nrev))
    })?;
    Ok((k, df[0], df[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> TransferGeometry {
        TransferGeometry::new(&[7000.0, 0.0, 0.0], &[-2000.0, 9000.0, 500.0]).unwrap()
    }

    #[test]
    fn test_curve_side_table() {
        assert_eq!(curve_side(Direction::Short, Energy::Low), CurveSide::Right);
        assert_eq!(curve_side(Direction::Short, Energy::High), CurveSide::Left);
        assert_eq!(curve_side(Direction::Long, Energy::Low), CurveSide::Right);
        assert_eq!(curve_side(Direction::Long, Energy::High), CurveSide::Left);
    }

    #[test]
    fn test_k_psi_round_trip() {
        for nrev in 0..3u32 {
            let lo = (TWO_PI * nrev as f64).powi(2);
            let hi = (TWO_PI * (nrev as f64 + 1.0)).powi(2);
            for frac in [0.1, 0.5, 0.9] {
                let psi = lo + frac * (hi - lo);
                let k = k_from_psi(psi, nrev);
                assert!(k.abs() < SQRT_2);
                assert!((psi_from_k(k, nrev) - psi).abs() < 1e-9 * psi, "N={} psi={}", nrev, psi);
            }
        }
        let k = k_from_psi(-9.0, 0);
        assert!(k > SQRT_2);
        assert!((psi_from_k(k, 0) + 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_k_matches_stumpff_definition() {
        // k = (1 - psi c3) / sqrt(c2)
        for &(psi, nrev) in &[(-4.0, 0u32), (2.0, 0), (20.0, 0), (70.0, 1), (120.0, 1)] {
            let (c2, c3) = crate::stumpff::stumpff_c2c3(psi);
            let expected = (1.0 - psi * c3) / c2.sqrt();
            assert!((k_from_psi(psi, nrev) - expected).abs() < 1e-12, "psi = {}", psi);
        }
    }

    #[test]
    fn test_minimum_agrees_between_parameterizations() {
        let geom = geometry();
        let body = Body::EARTH;
        let config = SolverConfig::default();
        for dir in [Direction::Short, Direction::Long] {
            for nrev in 1..4 {
                let record = minimum_time(&geom, dir, Energy::Low, nrev, &body, &config).unwrap();
                let m = record.minimum.unwrap();
                assert!(m.disagreement < 1e-9, "{:?} N={}: {}", dir, nrev, m.disagreement);
                assert!((k_from_psi(m.psi, nrev) - m.k).abs() < 1e-6, "{:?} N={}", dir, nrev);
                assert!(m.psi_curvature > 0.0 && m.k_curvature > 0.0);
                // at least N periods of the minimum-energy ellipse minus the swept part
                assert!(record.tof_min < record.min_energy_tof);
            }
        }
    }

    #[test]
    fn test_minimum_grows_with_revolutions() {
        let geom = geometry();
        let config = SolverConfig::default();
        let mut last = 0.0;
        for nrev in 1..5 {
            let record = minimum_time(&geom, Direction::Short, Energy::High, nrev, &Body::EARTH, &config).unwrap();
            assert!(record.tof_min > last);
            last = record.tof_min;
        }
    }

    #[test]
    fn test_zero_rev_record() {
        let geom = geometry();
        let record = minimum_time(&geom, Direction::Long, Energy::High, 0, &Body::EARTH, &SolverConfig::default()).unwrap();
        assert_eq!(record.tof_min, 0.0);
        assert!(record.minimum.is_none());
        assert!(record.k_bracket.1.is_infinite());
        assert!(record.parabolic_tof > 0.0);
        assert!(record.min_energy_tof > record.parabolic_tof);
    }

    #[test]
    fn test_min_energy_point_is_on_curve() {
        // the psi of the minimum-energy transfer reproduces its time
        let geom = geometry();
        let mu = Body::EARTH.mu;
        for dir in [Direction::Short, Direction::Long] {
            for nrev in 0..3 {
                let (t_m, psi_m) = min_energy_tof(&geom, dir, nrev, mu);
                let point = time_of_flight(geom.r1_plus_r2, geom.a_constant(dir), psi_m, mu).unwrap();
                assert!((point.t - t_m).abs() < 1e-8 * t_m, "{:?} N={}: {} vs {}", dir, nrev, point.t, t_m);
            }
        }
    }
}
