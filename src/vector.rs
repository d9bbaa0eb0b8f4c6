//! Three-component vector helpers.
//!
//! Positions and velocities travel through the crate as plain `[f64; 3]`
//! arrays; these are the handful of operations the solvers need.

/// Euclidean norm.
#[inline]
pub fn mag(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[inline]
pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Linear combination `s1 * a + s2 * b`.
#[inline]
pub fn add_scaled(s1: f64, a: &[f64; 3], s2: f64, b: &[f64; 3]) -> [f64; 3] {
    [
        s1 * a[0] + s2 * b[0],
        s1 * a[1] + s2 * b[1],
        s1 * a[2] + s2 * b[2],
    ]
}

#[inline]
pub fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    add_scaled(1.0, a, -1.0, b)
}

#[inline]
pub fn scale(s: f64, a: &[f64; 3]) -> [f64; 3] {
    [s * a[0], s * a[1], s * a[2]]
}

/// Unit vector along `v`. Returns `None` for a zero or non-finite vector.
#[inline]
pub fn unit(v: &[f64; 3]) -> Option<[f64; 3]> {
    let m = mag(v);
    if m > 0.0 && m.is_finite() {
        Some(scale(1.0 / m, v))
    } else {
        None
    }
}

/// Distance between two points.
#[inline]
pub fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    mag(&sub(a, b))
}
