//! Perigee screening of a candidate transfer.

use std::fmt;

use crate::config::Body;
use crate::vector::{cross, dot, mag};

/// Conic elements relevant to a surface-impact check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactReport {
    /// Perigee radius (km)
    pub rp: f64,
    /// Semi-major axis (km); negative for hyperbolas, infinite for a parabola
    pub a: f64,
    pub e: f64,
    /// rp below `threshold`
    pub hit: bool,
    /// The flown arc passes through perigee (always true once a full
    /// revolution is flown)
    pub perigee_in_arc: bool,
    /// Body radius plus altitude pad (km)
    pub threshold: f64,
}

impl ImpactReport {
    /// Short description such as `"elliptic, rp 3185.9 km, a 10699.5 km: impact"`.
    pub fn classification(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ImpactReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.e < 1.0 - 1e-12 {
            "elliptic"
        } else if self.e > 1.0 + 1e-12 {
            "hyperbolic"
        } else {
            "parabolic"
        };
        let verdict = match (self.hit, self.perigee_in_arc) {
            (true, true) => "impact",
            (true, false) => "impact (perigee outside arc)",
            (false, _) => "clear",
        };
        write!(f, "{}, rp {:.1} km, a {:.1} km: {}", kind, self.rp, self.a, verdict)
    }
}

/// Perigee and semi-major axis of the arc through (r1, v1) and (r2, v2),
/// flagged against `body.radius + altitude_pad`.
///
/// The flag depends only on the conic, so any number of revolutions gives
/// the same answer; `perigee_in_arc` says whether the flown arc actually
/// reaches that perigee.
pub fn check_impact(
    r1: &[f64; 3],
    v1: &[f64; 3],
    r2: &[f64; 3],
    v2: &[f64; 3],
    nrev: u32,
    altitude_pad: f64,
    body: &Body,
) -> ImpactReport {
    let mu = body.mu;
    let r1_mag = mag(r1);
    let energy = 0.5 * dot(v1, v1) - mu / r1_mag;
    let h = mag(&cross(r1, v1));

    let a = if energy == 0.0 { f64::INFINITY } else { -mu / (2.0 * energy) };
    let e = (1.0 + 2.0 * energy * h * h / (mu * mu)).max(0.0).sqrt();
    let p = h * h / mu;
    let rp = p / (1.0 + e);

    let threshold = body.radius + altitude_pad;
    // approaching at departure and receding at arrival means perigee lies between
    let perigee_in_arc = nrev > 0 || (dot(r1, v1) < 0.0 && dot(r2, v2) > 0.0);

    ImpactReport { rp, a, e, hit: rp < threshold, perigee_in_arc, threshold }
}
