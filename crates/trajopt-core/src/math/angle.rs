//! Planar angle helpers

use std::f64::consts::PI;

/// Wrap an angle into (-π, π]
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Signed smallest difference `a - b`, wrapped into (-π, π]
pub fn angle_difference(a: f64, b: f64) -> f64 {
    (a.sin() * b.cos() - a.cos() * b.sin()).atan2(a.cos() * b.cos() + a.sin() * b.sin())
}

/// Remove 2π jumps so consecutive samples differ by less than π
pub fn unwrap_angles(angles: &mut [f64]) {
    for i in 1..angles.len() {
        let delta = normalize_angle(angles[i] - angles[i - 1]);
        angles[i] = angles[i - 1] + delta;
    }
}
