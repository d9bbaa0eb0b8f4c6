//! Universal auxiliary functions.
//!
//! Two families live here: the Stumpff pair c2(z), c3(z) used by the
//! universal-variable solver and the two-body propagator, and the single
//! W(k) function of the k-variable (vercosine) formulation. Both cover the
//! elliptic, parabolic and hyperbolic regimes with one code path each.

use std::f64::consts::PI;

/// Below this |z| the Stumpff pair is taken from its Maclaurin series.
const STUMPFF_SERIES_BAND: f64 = 1e-6;

/// Half-width of the band around k = sqrt(2) where W uses its series.
const PARABOLA_BAND: f64 = 0.02;

const SQRT_2: f64 = std::f64::consts::SQRT_2;
const TWO_PI: f64 = 2.0 * PI;

/// Taylor coefficients of W about k = sqrt(2), in powers of nu = k - sqrt(2).
const W_PARABOLA_SERIES: [f64; 9] = [
    0.471_404_520_791_031_68,
    -0.2,
    0.080_812_203_564_176_86,
    -0.031_746_031_746_031_746,
    0.012_244_273_267_299_524,
    -0.004_662_004_662_004_662,
    0.001_758_152_058_894_290_7,
    -0.000_658_165_364_047_717,
    0.000_244_943_785_294_870_2,
];

/// Stumpff functions c2(z) and c3(z).
///
/// Trigonometric forms for z > 0, hyperbolic forms for z < 0 and a
/// three-term series in the band around zero. Always finite for finite z
/// (the hyperbolic branch overflows only beyond z ~ -5e5).
pub fn stumpff_c2c3(z: f64) -> (f64, f64) {
    if z > STUMPFF_SERIES_BAND {
        let sqrt_z = z.sqrt();
        let c2 = (1.0 - sqrt_z.cos()) / z;
        let c3 = (sqrt_z - sqrt_z.sin()) / (z * sqrt_z);
        (c2, c3)
    } else if z < -STUMPFF_SERIES_BAND {
        let sqrt_neg_z = (-z).sqrt();
        let c2 = (1.0 - sqrt_neg_z.cosh()) / z;
        let c3 = (sqrt_neg_z.sinh() - sqrt_neg_z) / (-z * sqrt_neg_z);
        (c2, c3)
    } else {
        let c2 = 0.5 - z / 24.0 + z * z / 720.0;
        let c3 = 1.0 / 6.0 - z / 120.0 + z * z / 5040.0;
        (c2, c3)
    }
}

/// W(k) and its first three derivatives: `[W, W', W'', W''']`.
///
/// `two_pi_n` is 2*pi*N for an N-revolution branch. Multi-revolution
/// branches are always elliptic (|k| < sqrt(2)); the parabolic series is
/// only used when `zero_rev` is set.
pub fn w_and_derivatives(k: f64, two_pi_n: f64, zero_rev: bool) -> [f64; 4] {
    let nu = k - SQRT_2;
    if zero_rev && nu.abs() < PARABOLA_BAND {
        return w_near_parabola(nu);
    }

    let k_sq = k * k;
    let m = 2.0 - k_sq;
    let one_by_m = 1.0 / m;
    let k_sq_m1 = k_sq - 1.0;

    let w = if m > 0.0 {
        // cos(dE) = k^2 - 1; k < 0 means the swept eccentric anomaly exceeds pi
        let acos_val = k_sq_m1.clamp(-1.0, 1.0).acos();
        let swept = if k >= 0.0 { acos_val } else { TWO_PI - acos_val };
        (two_pi_n + swept) * (one_by_m * one_by_m * one_by_m).sqrt() - k * one_by_m
    } else {
        let neg_m = -m;
        let acosh_val = (k_sq_m1 + (k_sq_m1 * k_sq_m1 - 1.0).sqrt()).ln();
        -acosh_val / (neg_m * neg_m * neg_m).sqrt() - k * one_by_m
    };

    // dW/dk = (3Wk - 2)/m, then differentiate the recurrence
    let w1 = (3.0 * w * k - 2.0) * one_by_m;
    let w2 = (5.0 * w1 * k + 3.0 * w) * one_by_m;
    let w3 = (7.0 * w2 * k + 8.0 * w1) * one_by_m;
    [w, w1, w2, w3]
}

fn w_near_parabola(nu: f64) -> [f64; 4] {
    let mut out = [0.0; 4];
    for (order, slot) in out.iter_mut().enumerate() {
        // Horner on the order-th derivative of the truncated series
        let mut acc = 0.0;
        for j in (order..W_PARABOLA_SERIES.len()).rev() {
            let falling: f64 = (0..order).map(|i| (j - i) as f64).product();
            acc = acc * nu + falling * W_PARABOLA_SERIES[j];
        }
        *slot = acc;
    }
    out
}
