//! Numerical integration methods
//!
//! Fixed-step explicit schemes used to roll the vehicle model forward
//! between shooting nodes.

use nalgebra::SVector;

/// Generic RK4 integrator for any state vector
///
/// Solves dx/dt = f(t, x) using 4th-order Runge-Kutta method.
///
/// # Arguments
/// * `x` - Current state
/// * `t` - Current time
/// * `dt` - Time step
/// * `f` - Derivative function f(t, x) -> dx/dt
///
/// # Returns
/// New state after integration
pub fn rk4<const N: usize, F>(
    x: &SVector<f64, N>,
    t: f64,
    dt: f64,
    f: F,
) -> SVector<f64, N>
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    let k1 = f(t, x);
    let k2 = f(t + dt / 2.0, &(x + k1 * dt / 2.0));
    let k3 = f(t + dt / 2.0, &(x + k2 * dt / 2.0));
    let k4 = f(t + dt, &(x + k3 * dt));

    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

/// RK4 over one interval split into `substeps` equal steps
///
/// `substeps == 0` is treated as a single step.
pub fn rk4_substeps<const N: usize, F>(
    x: &SVector<f64, N>,
    t: f64,
    dt: f64,
    substeps: usize,
    f: F,
) -> SVector<f64, N>
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    let steps = substeps.max(1);
    let h = dt / steps as f64;
    let mut state = *x;
    for k in 0..steps {
        state = rk4(&state, t + k as f64 * h, h, &f);
    }
    state
}
