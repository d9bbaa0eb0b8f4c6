//! Shared helpers for the integration tests.

#![allow(dead_code)]

use lambert_multirev::kepler::propagate;
use lambert_multirev::TransferSolution;

pub const RE: f64 = 6378.137;
pub const MU_EARTH: f64 = 3.986_004_33e5;

pub fn vec_mag(v: &[f64; 3]) -> f64 {
    (v[0].powi(2) + v[1].powi(2) + v[2].powi(2)).sqrt()
}

pub fn vec_diff_mag(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// 1/a from the departure state.
pub fn inverse_sma(r: &[f64; 3], v: &[f64; 3], mu: f64) -> f64 {
    2.0 / vec_mag(r) - (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]) / mu
}

/// Propagate (r1, v1) by tof and check that the arc lands on r2 with v2.
pub fn assert_round_trip(label: &str, sol: &TransferSolution, r2: &[f64; 3], tof: f64, mu: f64, tol: f64) {
    assert!(sol.converged, "{}: {}", label, sol.summary());
    let (r2_prop, v2_prop) = propagate(&sol.r1, &sol.v1, tof, mu)
        .unwrap_or_else(|e| panic!("{}: propagation failed: {}", label, e));

    let pos_err = vec_diff_mag(r2, &r2_prop) / vec_mag(r2);
    assert!(pos_err < tol, "{}: position error {:.2e} (tol {:.0e})", label, pos_err, tol);

    let vel_err = vec_diff_mag(&sol.v2, &v2_prop) / vec_mag(&sol.v2);
    assert!(vel_err < tol, "{}: velocity error {:.2e} (tol {:.0e})", label, vel_err, tol);
}

/// Component-wise velocity agreement between two solutions.
pub fn assert_same_velocities(label: &str, a: &TransferSolution, b: &TransferSolution, tol: f64) {
    let scale = vec_mag(&a.v1).max(vec_mag(&a.v2)).max(1e-300);
    for i in 0..3 {
        assert!(
            (a.v1[i] - b.v1[i]).abs() < tol * scale,
            "{}: v1[{}] {:.12e} vs {:.12e}", label, i, a.v1[i], b.v1[i]
        );
        assert!(
            (a.v2[i] - b.v2[i]).abs() < tol * scale,
            "{}: v2[{}] {:.12e} vs {:.12e}", label, i, a.v2[i], b.v2[i]
        );
    }
}

/// xoshiro256** seeded through SplitMix64, so runs are reproducible.
pub struct Rng {
    s: [u64; 4],
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        let mut z = seed;
        let mut s = [0u64; 4];
        for slot in &mut s {
            z = z.wrapping_add(0x9e3779b97f4a7c15);
            let mut w = z;
            w = (w ^ (w >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
            w = (w ^ (w >> 27)).wrapping_mul(0x94d049bb133111eb);
            *slot = w ^ (w >> 31);
        }
        Rng { s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.s[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.s[1] << 17;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        result
    }

    /// Uniform in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Marsaglia point on the unit sphere
    pub fn unit_vector(&mut self) -> [f64; 3] {
        loop {
            let x = self.uniform(-1.0, 1.0);
            let y = self.uniform(-1.0, 1.0);
            let s = x * x + y * y;
            if s < 1.0 {
                let factor = 2.0 * (1.0 - s).sqrt();
                return [x * factor, y * factor, 1.0 - 2.0 * s];
            }
        }
    }

    pub fn position(&mut self, r_min: f64, r_max: f64) -> [f64; 3] {
        let u = self.unit_vector();
        let r = self.uniform(r_min, r_max);
        [u[0] * r, u[1] * r, u[2] * r]
    }
}
