//! Terminal velocities from a solved Lambert parameter.
//!
//! The universal-variable and k-variable solvers both end with the same
//! three Lagrange coefficients; only the way they are expressed differs.
//! Battin's solver recovers velocities from radial and transverse
//! components instead and does not use this module.

use crate::geometry::TransferGeometry;

/// Position-only Lagrange coefficients of a Lambert arc.
#[derive(Debug, Clone, Copy)]
pub struct ArcCoefficients {
    pub f: f64,
    pub g: f64,
    pub g_dot: f64,
}

impl ArcCoefficients {
    /// From the k-variable solution p = 1 - k tau:
    /// f = 1 - p (r1+r2)/r1, g = S tau sqrt(p), g_dot = 1 - p (r1+r2)/r2.
    pub fn from_k_variable(geom: &TransferGeometry, tau: f64, time_scale: f64, p: f64) -> Self {
        Self {
            f: 1.0 - p * geom.r1_plus_r2 * geom.inv_r1,
            g: time_scale * tau * p.sqrt(),
            g_dot: 1.0 - p * geom.r1_plus_r2 * geom.inv_r2,
        }
    }

    /// From the universal-variable solution y(psi):
    /// f = 1 - y/r1, g = A sqrt(y/mu), g_dot = 1 - y/r2.
    pub fn from_universal(geom: &TransferGeometry, a_constant: f64, y: f64, mu: f64) -> Self {
        Self {
            f: 1.0 - y * geom.inv_r1,
            g: a_constant * (y / mu).sqrt(),
            g_dot: 1.0 - y * geom.inv_r2,
        }
    }

    /// v1 = (r2 - f r1) / g, v2 = (g_dot r2 - r1) / g
    pub fn velocities(&self, geom: &TransferGeometry) -> ([f64; 3], [f64; 3]) {
        let inv_g = 1.0 / self.g;
        let (r1, r2) = (&geom.r1_vec, &geom.r2_vec);
        let v1 = [
            (r2[0] - self.f * r1[0]) * inv_g,
            (r2[1] - self.f * r1[1]) * inv_g,
            (r2[2] - self.f * r1[2]) * inv_g,
        ];
        let v2 = [
            (self.g_dot * r2[0] - r1[0]) * inv_g,
            (self.g_dot * r2[1] - r1[1]) * inv_g,
            (self.g_dot * r2[2] - r1[2]) * inv_g,
        ];
        (v1, v2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Direction;

    #[test]
    fn test_forms_agree_for_same_conic() {
        // y = p (r1 + r2) ties the two parameterizations together
        let geom = TransferGeometry::new(&[1.0, 0.0, 0.0], &[0.0, 1.5, 0.0]).unwrap();
        let mu = 1.0;
        let tau = geom.tau(Direction::Short);
        let p = 0.4;
        let k_form = ArcCoefficients::from_k_variable(&geom, tau, geom.time_scale(mu), p);
        let uv_form = ArcCoefficients::from_universal(&geom, geom.a_constant(Direction::Short), p * geom.r1_plus_r2, mu);
        assert!((k_form.f - uv_form.f).abs() < 1e-15);
        assert!((k_form.g - uv_form.g).abs() < 1e-14);
        assert!((k_form.g_dot - uv_form.g_dot).abs() < 1e-15);
    }

    #[test]
    fn test_circular_quarter_velocities() {
        // circular r = 1: f = g_dot = cos 90 = 0, g = sin 90 = 1
        let geom = TransferGeometry::new(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        let coeffs = ArcCoefficients { f: 0.0, g: 1.0, g_dot: 0.0 };
        let (v1, v2) = coeffs.velocities(&geom);
        assert_eq!(v1, [0.0, 1.0, 0.0]);
        assert_eq!(v2, [-1.0, 0.0, 0.0]);
    }
}
