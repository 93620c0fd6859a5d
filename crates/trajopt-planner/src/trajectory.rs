//! Solver output to vehicle trajectory conversion
//!
//! Yaw rate and longitudinal acceleration are not OCP states; they are
//! recovered by forward differences between consecutive nodes.

use trajopt_core::dynamics::{StateVector, DELTA, D_DELTA, PSI, V, X, Y};
use trajopt_core::vehicle::{Trajectory, VehicleState};

use crate::solver::SolverOutput;

/// Vehicle state at one shooting node, without the differenced quantities
fn node_state(state: &StateVector, time: f64) -> VehicleState {
    VehicleState {
        x: state[X],
        y: state[Y],
        yaw_angle: state[PSI],
        vx: state[V],
        steering_angle: state[DELTA],
        steering_rate: state[D_DELTA],
        ax: 0.0,
        yaw_rate: 0.0,
        time,
    }
}

/// Convert solver states to a trajectory
///
/// State `i` gets `yaw_rate = (ψ[i+1] − ψ[i]) / dt` and
/// `ax = (v[i+1] − v[i]) / dt`; the last state repeats the values of the
/// second-to-last.
pub fn to_trajectory(output: &SolverOutput, time_step: f64) -> Trajectory {
    let n = output.states.len().min(output.times.len());
    let mut states: Vec<VehicleState> = output.states[..n]
        .iter()
        .zip(&output.times[..n])
        .map(|(x, &t)| node_state(x, t))
        .collect();

    for i in 0..n.saturating_sub(1) {
        let (current, next) = (&output.states[i], &output.states[i + 1]);
        states[i].yaw_rate = (next[PSI] - current[PSI]) / time_step;
        states[i].ax = (next[V] - current[V]) / time_step;
    }
    if n >= 2 {
        states[n - 1].yaw_rate = states[n - 2].yaw_rate;
        states[n - 1].ax = states[n - 2].ax;
    }

    Trajectory::new(states)
}
