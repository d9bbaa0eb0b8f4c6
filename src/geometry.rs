//! Geometry invariants of a Lambert transfer.
//!
//! Everything here depends only on the two endpoint vectors, so one
//! [`TransferGeometry`] serves every direction, energy branch and revolution
//! count asked of the same pair. Direction enters only through the sign of
//! the k-variable parameter tau and of Lancaster's lambda.

use std::f64::consts::PI;

use crate::error::LambertError;
use crate::vector::{cross, dot, mag, scale, sub, unit};

/// Direction of motion from r1 to r2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Swept angle below 180 degrees (prograde about r1 x r2)
    Short,
    /// Swept angle above 180 degrees
    Long,
}

impl Direction {
    /// Returns +1.0 for the short way, -1.0 for the long way
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Short => 1.0,
            Direction::Long => -1.0,
        }
    }
}

/// Energy branch of a multi-revolution transfer. Ignored when nrev = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Energy {
    /// Smaller semi-major axis (larger psi)
    Low,
    /// Larger semi-major axis (smaller psi)
    High,
}

/// How close the transfer angle is to a multiple of pi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleRegime {
    Normal,
    /// Close to 180 degrees; velocities may lose accuracy
    NearHalfRev,
    /// Exactly 180 degrees (endpoints anti-parallel)
    ExactHalfRev,
    /// Close to 0/360 degrees
    NearFullRev,
}

const NEAR_N_PI_REV_WARNING: f64 = 3.8e-5;
const ALTERNATE_TAU_THRESHOLD: f64 = 1e-8;
/// |r1 x r2| / (r1 r2) below this leaves the plane to the hint.
const PLANE_SINE_THRESHOLD: f64 = 1e-10;
const EQUATORIAL_NORMAL: [f64; 3] = [0.0, 0.0, 1.0];

/// Invariants derived once from (r1, r2).
#[derive(Debug, Clone)]
pub struct TransferGeometry {
    /// Departure position
    pub r1_vec: [f64; 3],
    /// Arrival position
    pub r2_vec: [f64; 3],
    pub r1: f64,
    pub r2: f64,
    pub inv_r1: f64,
    pub inv_r2: f64,
    /// r1 + r2
    pub r1_plus_r2: f64,
    /// r1 * r2
    pub r1_times_r2: f64,
    /// Cosine of the (short-way) transfer angle
    pub cos_theta: f64,
    /// 1 + cos(theta)
    pub one_plus_cos_theta: f64,
    /// 1 - cos(theta)
    pub one_minus_cos_theta: f64,
    /// |r1 x r2| = r1 r2 sin(theta), theta in [0, pi]
    pub sin_theta_r1r2: f64,
    /// r2 - r1
    pub chord_vec: [f64; 3],
    /// |r2 - r1|
    pub chord: f64,
    /// Semi-perimeter s = (r1 + r2 + c) / 2
    pub semi_perimeter: f64,
    /// |tau| = sqrt(r1 r2 (1 + cos theta)) / (r1 + r2)
    pub abs_tau: f64,
    /// Unit normal of the short-way transfer plane
    pub normal: [f64; 3],
    /// The normal came from the caller's hint (or the equatorial default)
    pub plane_from_hint: bool,
    /// Hint kept so a rebuilt geometry (after a coast) resolves the same plane
    pub plane_hint: Option<[f64; 3]>,
    pub angle_regime: AngleRegime,
}

impl TransferGeometry {
    /// Build the invariants, resolving an undefined plane with the
    /// equatorial normal (+z).
    pub fn new(r1_vec: &[f64; 3], r2_vec: &[f64; 3]) -> Result<Self, LambertError> {
        Self::build(r1_vec, r2_vec, None)
    }

    /// Build the invariants with a caller-supplied out-of-plane reference,
    /// consulted only when r1 and r2 are (anti-)parallel.
    pub fn with_plane_hint(
        r1_vec: &[f64; 3],
        r2_vec: &[f64; 3],
        normal_hint: &[f64; 3],
    ) -> Result<Self, LambertError> {
        Self::build(r1_vec, r2_vec, Some(*normal_hint))
    }

    fn build(
        r1_vec: &[f64; 3],
        r2_vec: &[f64; 3],
        hint: Option<[f64; 3]>,
    ) -> Result<Self, LambertError> {
        if r1_vec.iter().chain(r2_vec.iter()).any(|c| !c.is_finite()) {
            return Err(LambertError::DegenerateInput("non-finite position component".into()));
        }
        let r1 = mag(r1_vec);
        let r2 = mag(r2_vec);
        if r1 == 0.0 || r2 == 0.0 {
            return Err(LambertError::DegenerateInput("zero-length position vector".into()));
        }

        let inv_r1 = 1.0 / r1;
        let inv_r2 = 1.0 / r2;
        let r1_plus_r2 = r1 + r2;
        let r1_times_r2 = r1 * r2;

        let cos_theta = (dot(r1_vec, r2_vec) * inv_r1 * inv_r2).clamp(-1.0, 1.0);
        let one_plus_cos_theta = 1.0 + cos_theta;
        let one_minus_cos_theta = 1.0 - cos_theta;

        let h = cross(r1_vec, r2_vec);
        let sin_theta_r1r2 = mag(&h);

        let abs_tau = if one_plus_cos_theta < ALTERNATE_TAU_THRESHOLD {
            // near pi: 1 + cos loses digits, recover it from the sine instead
            (1.0 / (one_minus_cos_theta * r1_times_r2)).sqrt() / r1_plus_r2 * sin_theta_r1r2
        } else {
            (r1_times_r2 * one_plus_cos_theta).sqrt() / r1_plus_r2
        };

        let chord_vec = sub(r2_vec, r1_vec);
        let chord = mag(&chord_vec);
        let semi_perimeter = 0.5 * (r1_plus_r2 + chord);

        let (normal, plane_from_hint) = if sin_theta_r1r2 > PLANE_SINE_THRESHOLD * r1_times_r2 {
            (scale(1.0 / sin_theta_r1r2, &h), false)
        } else {
            (resolve_plane(r1_vec, r1, hint)?, true)
        };

        let angle_regime = if one_plus_cos_theta < NEAR_N_PI_REV_WARNING {
            if plane_from_hint {
                AngleRegime::ExactHalfRev
            } else {
                AngleRegime::NearHalfRev
            }
        } else if one_minus_cos_theta < NEAR_N_PI_REV_WARNING {
            AngleRegime::NearFullRev
        } else {
            AngleRegime::Normal
        };

        Ok(Self {
            r1_vec: *r1_vec,
            r2_vec: *r2_vec,
            r1,
            r2,
            inv_r1,
            inv_r2,
            r1_plus_r2,
            r1_times_r2,
            cos_theta,
            one_plus_cos_theta,
            one_minus_cos_theta,
            sin_theta_r1r2,
            chord_vec,
            chord,
            semi_perimeter,
            abs_tau,
            normal,
            plane_from_hint,
            plane_hint: hint,
            angle_regime,
        })
    }

    /// Rebuild for a new departure position, keeping the arrival point and hint.
    pub fn with_departure(&self, r1_vec: &[f64; 3]) -> Result<Self, LambertError> {
        Self::build(r1_vec, &self.r2_vec, self.plane_hint)
    }

    /// tau = d sqrt(r1 r2 (1 + cos theta)) / (r1 + r2)
    #[inline]
    pub fn tau(&self, direction: Direction) -> f64 {
        direction.sign() * self.abs_tau
    }

    /// A = d sqrt(r1 r2 (1 + cos theta)), the universal-variable geometry constant.
    #[inline]
    pub fn a_constant(&self, direction: Direction) -> f64 {
        self.tau(direction) * self.r1_plus_r2
    }

    /// Lancaster's lambda = d sqrt(1 - c/s), written through tau so it keeps
    /// its digits near 180 degrees.
    #[inline]
    pub fn lambda(&self, direction: Direction) -> f64 {
        self.tau(direction) * self.r1_plus_r2 / (std::f64::consts::SQRT_2 * self.semi_perimeter)
    }

    /// Time scale S = sqrt((r1 + r2)^3 / mu) of the k-variable formulation.
    #[inline]
    pub fn time_scale(&self, mu: f64) -> f64 {
        self.r1_plus_r2 * (self.r1_plus_r2 / mu).sqrt()
    }

    /// Angle swept from r1 to r2 in the given direction, in [0, 2 pi].
    pub fn transfer_angle(&self, direction: Direction) -> f64 {
        let theta = self.sin_theta_r1r2.atan2(self.r1_times_r2 * self.cos_theta);
        match direction {
            Direction::Short => theta,
            Direction::Long => 2.0 * PI - theta,
        }
    }

    /// Normal of the plane the transfer actually moves prograde in.
    #[inline]
    pub fn transfer_normal(&self, direction: Direction) -> [f64; 3] {
        scale(direction.sign(), &self.normal)
    }
}

/// Pick a plane containing r1 from an out-of-plane reference.
fn resolve_plane(r1_vec: &[f64; 3], r1: f64, hint: Option<[f64; 3]>) -> Result<[f64; 3], LambertError> {
    let reference = hint.unwrap_or(EQUATORIAL_NORMAL);
    let r1_hat = scale(1.0 / r1, r1_vec);
    let along = dot(&reference, &r1_hat);
    let projected = sub(&reference, &scale(along, &r1_hat));
    match unit(&projected) {
        Some(n) if mag(&projected) > PLANE_SINE_THRESHOLD * mag(&reference) => Ok(n),
        _ => Err(LambertError::DegenerateInput(
            "endpoints are collinear and the plane reference lies along them".into(),
        )),
    }
}
