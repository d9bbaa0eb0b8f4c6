//! Request and result types shared by all solvers.

use std::fmt;

use crate::error::LambertError;
use crate::fg::ConsistencyCheck;
use crate::geometry::{Direction, Energy};
use crate::impact::ImpactReport;
use crate::solver::Method;

/// What the caller wants solved. Read-only to the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub direction: Direction,
    /// Only meaningful when `nrev > 0`
    pub energy: Energy,
    /// Complete revolutions before arrival
    pub nrev: u32,
    /// Time of flight (s)
    pub tof: f64,
    /// Coast (s) along the departure orbit before the transfer starts.
    /// Requires `departure_velocity`.
    pub coast: Option<f64>,
    /// Minimum perigee altitude above the body radius (km); zero when absent
    pub altitude_pad: Option<f64>,
    /// Velocity already held at r1 (km/s), used for the coast and the
    /// departure delta-v
    pub departure_velocity: Option<[f64; 3]>,
}

impl TransferRequest {
    /// Zero-revolution request.
    pub fn new(direction: Direction, tof: f64) -> Self {
        Self {
            direction,
            energy: Energy::Low,
            nrev: 0,
            tof,
            coast: None,
            altitude_pad: None,
            departure_velocity: None,
        }
    }

    pub fn with_revolutions(mut self, nrev: u32, energy: Energy) -> Self {
        self.nrev = nrev;
        self.energy = energy;
        self
    }

    pub fn with_coast(mut self, coast: f64) -> Self {
        self.coast = Some(coast);
        self
    }

    pub fn with_altitude_pad(mut self, pad: f64) -> Self {
        self.altitude_pad = Some(pad);
        self
    }

    pub fn with_departure_velocity(mut self, v: [f64; 3]) -> Self {
        self.departure_velocity = Some(v);
        self
    }
}

/// Outcome of a solve.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// Time equation satisfied and the f-and-g check passed.
    Converged,
    /// Time equation satisfied but the f-and-g check missed its tolerance.
    /// The velocities are kept; treat them as low confidence.
    ConsistencyCheckFailed { determinant_error: f64, position_residual: f64 },
    /// Time equation satisfied but the f-and-g check itself could not be
    /// evaluated (e.g. its Kepler solve failed). Also low confidence.
    ConsistencyCheckUnavailable(LambertError),
    /// No solution; the velocity vectors are zero.
    Failed(LambertError),
}

/// Safeguards and special cases hit during a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// A step left the bracket and was replaced by bisection
    Bisection,
    /// The lower universal-variable or upper k/x bound had to be widened
    BracketExtended,
    /// Halley did not converge; the solve was repeated with Newton steps
    NewtonFallback,
    /// Time of flight sits on the minimum of the time curve
    AtMinimumTime,
    /// Transfer angle close to 180 degrees
    NearHalfRevolution,
    /// Transfer angle close to 0 or 360 degrees
    NearFullRevolution,
    /// Plane of motion taken from the hint or the equatorial default
    PlaneFromHint,
    /// Departure point moved by the pre-transfer coast
    Coast,
    /// Coincident endpoints with zero time; the departure velocity was returned
    TrivialTransfer,
    /// Perigee below the altitude pad
    ImpactDetected,
    /// The bracket shrank to rounding width before the time residual met
    /// `tof_tolerance`; the residual is still within `precision_limit`
    PrecisionLimited,
}

impl Guard {
    fn label(self) -> &'static str {
        match self {
            Guard::Bisection => "bisection",
            Guard::BracketExtended => "bracket-extended",
            Guard::NewtonFallback => "newton-fallback",
            Guard::AtMinimumTime => "at-minimum-time",
            Guard::NearHalfRevolution => "near-half-rev",
            Guard::NearFullRevolution => "near-full-rev",
            Guard::PlaneFromHint => "plane-from-hint",
            Guard::Coast => "coast",
            Guard::TrivialTransfer => "trivial",
            Guard::ImpactDetected => "impact",
            Guard::PrecisionLimited => "precision-limited",
        }
    }
}

/// Structured per-call diagnostics. Callers aggregate these themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub method: Method,
    pub direction: Direction,
    pub energy: Energy,
    pub nrev: u32,
    pub newton_steps: usize,
    pub halley_steps: usize,
    pub bisection_steps: usize,
    /// Final time-equation residual (non-dimensional)
    pub residual: f64,
    /// Minimum time of flight on the branch (0 for nrev = 0)
    pub tof_min: f64,
    /// Guards in the order they fired, without repeats
    pub guards: Vec<Guard>,
    pub consistency: Option<ConsistencyCheck>,
    /// Free-form note, e.g. the impact classification
    pub note: Option<String>,
}

impl Diagnostics {
    pub fn new(method: Method, request: &TransferRequest) -> Self {
        Self {
            method,
            direction: request.direction,
            energy: request.energy,
            nrev: request.nrev,
            newton_steps: 0,
            halley_steps: 0,
            bisection_steps: 0,
            residual: f64::NAN,
            tof_min: 0.0,
            guards: Vec::new(),
            consistency: None,
            note: None,
        }
    }

    pub fn guard(&mut self, guard: Guard) {
        if !self.guards.contains(&guard) {
            self.guards.push(guard);
        }
    }

    pub fn has_guard(&self, guard: Guard) -> bool {
        self.guards.contains(&guard)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Short => "short",
            Direction::Long => "long",
        };
        write!(f, "{} {}", self.method, direction)?;
        if self.nrev > 0 {
            let energy = match self.energy {
                Energy::Low => "low",
                Energy::High => "high",
            };
            write!(f, "/{} nrev={} (tmin {:.3} s)", energy, self.nrev, self.tof_min)?;
        }
        write!(
            f,
            ": newton {}, halley {}, bisection {}, residual {:.2e}",
            self.newton_steps, self.halley_steps, self.bisection_steps, self.residual
        )?;
        if !self.guards.is_empty() {
            let labels: Vec<&str> = self.guards.iter().map(|g| g.label()).collect();
            write!(f, "; guards: {}", labels.join(","))?;
        }
        if let Some(check) = &self.consistency {
            write!(f, "; fg({}) det err {:.1e}", check.method, check.determinant_error)?;
        }
        if let Some(note) = &self.note {
            write!(f, "; {}", note)?;
        }
        Ok(())
    }
}

/// Result of one Lambert solve. Owned by the caller.
#[derive(Debug, Clone)]
pub struct TransferSolution {
    /// Departure velocity (km/s); zero when failed
    pub v1: [f64; 3],
    /// Arrival velocity (km/s); zero when failed
    pub v2: [f64; 3],
    /// Departure position actually used (differs from the input after a coast)
    pub r1: [f64; 3],
    pub iterations: usize,
    /// True unless the status is `Failed`
    pub converged: bool,
    pub status: Status,
    pub impact: Option<ImpactReport>,
    /// |v1 - departure velocity| when the departure velocity was given
    pub departure_delta_v: Option<f64>,
    pub diagnostics: Diagnostics,
}

impl TransferSolution {
    pub(crate) fn failed(r1: [f64; 3], diagnostics: Diagnostics, error: LambertError) -> Self {
        Self {
            v1: [0.0; 3],
            v2: [0.0; 3],
            r1,
            iterations: diagnostics.newton_steps + diagnostics.halley_steps + diagnostics.bisection_steps,
            converged: false,
            status: Status::Failed(error),
            impact: None,
            departure_delta_v: None,
            diagnostics,
        }
    }

    /// Whether the transfer's perigee violates the altitude pad.
    pub fn hit(&self) -> bool {
        self.impact.as_ref().is_some_and(|report| report.hit)
    }

    pub fn error(&self) -> Option<&LambertError> {
        match &self.status {
            Status::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// `Err` for a failed solve, the solution otherwise (including
    /// low-confidence ones).
    pub fn into_result(self) -> Result<Self, LambertError> {
        match self.status {
            Status::Failed(e) => Err(e),
            _ => Ok(self),
        }
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        let outcome = match &self.status {
            Status::Converged => "converged".to_string(),
            Status::ConsistencyCheckFailed { determinant_error, .. } => {
                format!("low confidence (det err {:.1e})", determinant_error)
            }
            Status::ConsistencyCheckUnavailable(e) => format!("unchecked ({e})"),
            Status::Failed(e) => format!("failed: {e}"),
        };
        format!("{} in {} iterations [{}]", outcome, self.iterations, self.diagnostics)
    }
}
