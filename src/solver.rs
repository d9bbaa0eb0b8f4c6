//! Solver strategy surface and the pipeline every formulation runs through.
//!
//! A solve is: validate the request, bracket the time curve through
//! [`minimum_time`], iterate in the formulation's own variable, then
//! cross-check the arc with Lagrange coefficients, screen the perigee and
//! fill in the diagnostics. Only the iteration differs between
//! [`UniversalVariableSolver`], [`BattinSolver`] and [`KVariableSolver`];
//! the rest lives here so the three report identically.

use std::f64::consts::PI;
use std::fmt;

use crate::battin::BattinSolver;
use crate::config::{Body, SolverConfig};
use crate::error::LambertError;
use crate::fg;
use crate::geometry::{AngleRegime, Direction, Energy, TransferGeometry};
use crate::impact::check_impact;
use crate::kepler::propagate;
use crate::kvariable::KVariableSolver;
use crate::min_time::{minimum_time, MinimumTimeRecord};
use crate::solution::{Diagnostics, Guard, Status, TransferRequest, TransferSolution};
use crate::universal::UniversalVariableSolver;
use crate::vector::distance;

/// Relative band around the minimum time inside which a request is solved
/// at the minimum instead of on a branch.
pub(crate) const MIN_TIME_BAND: f64 = 1e-9;
/// Chord below this fraction of r1 counts as coincident endpoints.
const COINCIDENT_CHORD: f64 = 1e-12;

/// Lambert formulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Universal variable psi with Stumpff functions
    UniversalVariable,
    /// Battin's x with a hypergeometric continued fraction
    Battin,
    /// Vercosine k variable
    KVariable,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::UniversalVariable, Method::Battin, Method::KVariable];

    /// Boxed solver for this formulation.
    pub fn solver(self, config: SolverConfig, body: Body) -> Box<dyn LambertSolver> {
        match self {
            Method::UniversalVariable => Box::new(UniversalVariableSolver::new(config, body)),
            Method::Battin => Box::new(BattinSolver::new(config, body)),
            Method::KVariable => Box::new(KVariableSolver::new(config, body)),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::UniversalVariable => "universal-variable",
            Method::Battin => "battin",
            Method::KVariable => "k-variable",
        })
    }
}

/// A Lambert formulation. Solvers never panic and never return `Err`;
/// failures come back inside [`TransferSolution::status`].
pub trait LambertSolver {
    fn method(&self) -> Method;

    fn solve(&self, geometry: &TransferGeometry, request: &TransferRequest) -> TransferSolution;
}

/// Everything a formulation needs for its iteration.
pub(crate) struct SolveContext<'a> {
    pub geometry: &'a TransferGeometry,
    pub request: &'a TransferRequest,
    pub record: &'a MinimumTimeRecord,
    pub config: &'a SolverConfig,
    pub body: &'a Body,
    /// Transfer time (s)
    pub tof: f64,
}

impl SolveContext<'_> {
    /// The requested time sits on the minimum of a multi-revolution curve.
    pub fn at_minimum(&self) -> bool {
        self.record.minimum.is_some() && self.tof <= self.record.tof_min * (1.0 + MIN_TIME_BAND)
    }
}

/// Exit for a root bracket that has shrunk to rounding width before the
/// residual met `tof_tolerance`: the point is kept, flagged, only while the
/// residual is within `precision_limit`.
pub(crate) fn accept_rounding_limited(
    residual: f64,
    iterations: usize,
    config: &SolverConfig,
    diag: &mut Diagnostics,
) -> Result<(), LambertError> {
    if residual.abs() <= config.precision_limit {
        diag.guard(Guard::PrecisionLimited);
        Ok(())
    } else {
        Err(LambertError::NotConverged { iterations, residual })
    }
}

/// Raw output of one formulation's iteration.
#[derive(Debug, Clone)]
pub(crate) struct ArcSolution {
    pub v1: [f64; 3],
    pub v2: [f64; 3],
    pub iterations: usize,
    /// Final time-equation residual (non-dimensional)
    pub residual: f64,
    /// Converged value of the iteration variable (psi, x or k)
    pub parameter: f64,
}

/// Run a formulation's `iterate` inside the shared validation and
/// post-processing stages.
pub(crate) fn run_pipeline<F>(
    method: Method,
    geometry: &TransferGeometry,
    request: &TransferRequest,
    config: &SolverConfig,
    body: &Body,
    iterate: F,
) -> TransferSolution
where
    F: FnOnce(&SolveContext<'_>, &mut Diagnostics) -> Result<ArcSolution, LambertError>,
{
    let mut diag = Diagnostics::new(method, request);

    let coasted = match coast_departure(geometry, request, body) {
        Ok(coasted) => coasted,
        Err(e) => return TransferSolution::failed(geometry.r1_vec, diag, e),
    };
    let (geometry, departure_velocity) = match &coasted {
        Some((geom, v)) => {
            diag.guard(Guard::Coast);
            (geom, Some(*v))
        }
        None => (geometry, request.departure_velocity),
    };
    let r1 = geometry.r1_vec;
    let r2 = geometry.r2_vec;

    let arc = match solve_arc(method, geometry, request, departure_velocity, config, body, &mut diag, iterate) {
        Ok(arc) => arc,
        Err(e) => {
            if matches!(e, LambertError::NotConverged { .. }) {
                log::warn!("{} did not converge: {}", method, e);
            } else {
                log::debug!("{} solve failed: {}", method, e);
            }
            return TransferSolution::failed(r1, diag, e);
        }
    };
    diag.residual = arc.residual;

    let status = match fg::cross_check(&r1, &arc.v1, &r2, request.tof, body.mu, config) {
        Ok(check) => {
            diag.consistency = Some(check);
            if check.passed {
                Status::Converged
            } else {
                log::warn!(
                    "{} arc failed the {} f-and-g check: det err {:.3e}, position residual {:.3e}",
                    method, check.method, check.determinant_error, check.position_residual
                );
                Status::ConsistencyCheckFailed {
                    determinant_error: check.determinant_error,
                    position_residual: check.position_residual,
                }
            }
        }
        Err(e) => {
            log::warn!("{} f-and-g check could not run: {}", method, e);
            Status::ConsistencyCheckUnavailable(e)
        }
    };

    let report = check_impact(
        &r1,
        &arc.v1,
        &r2,
        &arc.v2,
        request.nrev,
        request.altitude_pad.unwrap_or(0.0),
        body,
    );
    if report.hit {
        diag.guard(Guard::ImpactDetected);
        log::warn!("{} transfer {}", method, report);
    }

    let departure_delta_v = departure_velocity.map(|v| distance(&arc.v1, &v));
    log::debug!(
        "{} converged in {} iterations: parameter {:.12e}, residual {:.3e}",
        method, arc.iterations, arc.parameter, arc.residual
    );

    TransferSolution {
        v1: arc.v1,
        v2: arc.v2,
        r1,
        iterations: arc.iterations,
        converged: true,
        status,
        impact: Some(report),
        departure_delta_v,
        diagnostics: diag,
    }
}

/// Move the departure point along the initial orbit when a coast is requested.
fn coast_departure(
    geometry: &TransferGeometry,
    request: &TransferRequest,
    body: &Body,
) -> Result<Option<(TransferGeometry, [f64; 3])>, LambertError> {
    let Some(dt) = request.coast else {
        return Ok(None);
    };
    let v0 = request.departure_velocity.ok_or_else(|| {
        LambertError::DegenerateInput("coast requested without a departure velocity".into())
    })?;
    if !dt.is_finite() {
        return Err(LambertError::DegenerateInput(format!("coast duration {dt} is not finite")));
    }
    let (r, v) = propagate(&geometry.r1_vec, &v0, dt, body.mu)?;
    Ok(Some((geometry.with_departure(&r)?, v)))
}

#[allow(clippy::too_many_arguments)]
fn solve_arc<F>(
    method: Method,
    geometry: &TransferGeometry,
    request: &TransferRequest,
    departure_velocity: Option<[f64; 3]>,
    config: &SolverConfig,
    body: &Body,
    diag: &mut Diagnostics,
    iterate: F,
) -> Result<ArcSolution, LambertError>
where
    F: FnOnce(&SolveContext<'_>, &mut Diagnostics) -> Result<ArcSolution, LambertError>,
{
    let tof = request.tof;
    if !(tof.is_finite() && tof >= 0.0) {
        return Err(LambertError::DegenerateInput(format!("time of flight {tof} must be finite and non-negative")));
    }

    if geometry.chord <= COINCIDENT_CHORD * geometry.r1 && request.nrev == 0 {
        return match departure_velocity {
            Some(v) if tof == 0.0 => {
                diag.guard(Guard::TrivialTransfer);
                Ok(ArcSolution { v1: v, v2: v, iterations: 0, residual: 0.0, parameter: f64::NAN })
            }
            _ => Err(LambertError::DegenerateInput("coincident endpoints with no revolutions".into())),
        };
    }
    if tof == 0.0 {
        return Err(LambertError::DegenerateInput("zero time of flight between distinct points".into()));
    }

    if geometry.plane_from_hint {
        diag.guard(Guard::PlaneFromHint);
    }
    match geometry.angle_regime {
        AngleRegime::NearHalfRev | AngleRegime::ExactHalfRev => diag.guard(Guard::NearHalfRevolution),
        AngleRegime::NearFullRev => diag.guard(Guard::NearFullRevolution),
        AngleRegime::Normal => {}
    }
    if geometry.angle_regime == AngleRegime::ExactHalfRev && method != Method::Battin {
        return Err(LambertError::DegenerateGeometry(format!(
            "{method} formulation cannot resolve an exact 180 degree transfer"
        )));
    }

    let record = minimum_time(geometry, request.direction, request.energy, request.nrev, body, config)?;
    diag.tof_min = record.tof_min;
    if request.nrev > 0 && tof < record.tof_min * (1.0 - MIN_TIME_BAND) {
        return Err(LambertError::InfeasibleTimeOfFlight { tof, tof_min: record.tof_min, nrev: request.nrev });
    }

    let ctx = SolveContext { geometry, request, record: &record, config, body, tof };
    iterate(&ctx, diag)
}

/// Solve one transfer between two positions with the chosen formulation.
///
/// # Example
/// ```
/// use lambert_multirev::{solve_lambert, Body, Direction, Method, SolverConfig, TransferRequest};
///
/// let body = Body::new(1.0, 0.5);
/// let request = TransferRequest::new(Direction::Short, std::f64::consts::FRAC_PI_2);
/// let sol = solve_lambert(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], &request,
///     Method::KVariable, &SolverConfig::default(), &body);
/// assert!(sol.converged);
/// assert!((sol.v1[1] - 1.0).abs() < 1e-9);
/// ```
pub fn solve_lambert(
    r1: &[f64; 3],
    r2: &[f64; 3],
    request: &TransferRequest,
    method: Method,
    config: &SolverConfig,
    body: &Body,
) -> TransferSolution {
    match TransferGeometry::new(r1, r2) {
        Ok(geometry) => method.solver(config.clone(), *body).solve(&geometry, request),
        Err(e) => TransferSolution::failed(*r1, Diagnostics::new(method, request), e),
    }
}

/// Every solution for `tof` with up to `max_nrev` revolutions: both
/// directions, and both energy branches once nrev >= 1. Revolution counts
/// whose minimum time exceeds `tof` are skipped.
pub fn solve_all_branches(
    r1: &[f64; 3],
    r2: &[f64; 3],
    tof: f64,
    max_nrev: u32,
    method: Method,
    config: &SolverConfig,
    body: &Body,
) -> Result<Vec<TransferSolution>, LambertError> {
    let geometry = TransferGeometry::new(r1, r2)?;
    let solver = method.solver(config.clone(), *body);
    let mut solutions = Vec::new();

    for direction in [Direction::Short, Direction::Long] {
        solutions.push(solver.solve(&geometry, &TransferRequest::new(direction, tof)));
        'revs: for nrev in 1..=max_nrev {
            for energy in [Energy::Low, Energy::High] {
                let request = TransferRequest::new(direction, tof).with_revolutions(nrev, energy);
                let sol = solver.solve(&geometry, &request);
                if matches!(sol.error(), Some(LambertError::InfeasibleTimeOfFlight { .. })) {
                    // the minimum time only grows with nrev
                    break 'revs;
                }
                solutions.push(sol);
            }
        }
    }
    Ok(solutions)
}

/// Largest revolution count whose minimum time does not exceed `tof`.
pub fn max_revolutions(
    geometry: &TransferGeometry,
    direction: Direction,
    tof: f64,
    body: &Body,
    config: &SolverConfig,
) -> u32 {
    // no orbit through both points is faster than the minimum-energy ellipse
    let a_m = 0.5 * geometry.semi_perimeter;
    let shortest_period = 2.0 * PI * (a_m * a_m * a_m / body.mu).sqrt();
    let ceiling = (tof / shortest_period).floor().clamp(0.0, u32::MAX as f64) as u32;

    let mut best = 0;
    for nrev in 1..=ceiling {
        match minimum_time(geometry, direction, Energy::Low, nrev, body, config) {
            Ok(record) if record.tof_min <= tof => best = nrev,
            _ => break,
        }
    }
    best
}
