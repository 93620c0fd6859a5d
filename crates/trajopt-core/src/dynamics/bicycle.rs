//! Kinematic bicycle model with first-order speed response
//!
//! State layout used by the trajectory optimiser:
//!
//! ```text
//! x = [x, y, ψ, v, δ, δ̇, L, s]
//! u = [δ̈]
//! ```
//!
//! `L` accumulates the tracking cost and `s` the travelled arc-length. This
//! module owns the vehicle part of the derivative; the cost rate `L̇` depends
//! on the tracking reference and is filled in by the planner.

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

use crate::vehicle::VehicleState;

/// Number of OCP states
pub const STATE_SIZE: usize = 8;
/// Number of OCP inputs
pub const INPUT_SIZE: usize = 1;

/// Position x [m]
pub const X: usize = 0;
/// Position y [m]
pub const Y: usize = 1;
/// Heading [rad]
pub const PSI: usize = 2;
/// Longitudinal velocity [m/s]
pub const V: usize = 3;
/// Steering angle [rad]
pub const DELTA: usize = 4;
/// Steering rate [rad/s]
pub const D_DELTA: usize = 5;
/// Accumulated tracking cost
pub const L: usize = 6;
/// Arc-length progress [m]
pub const S: usize = 7;

/// Steering acceleration input [rad/s²]
pub const DD_DELTA: usize = 0;

pub type StateVector = SVector<f64, STATE_SIZE>;
pub type InputVector = SVector<f64, INPUT_SIZE>;

/// Parameters of the kinematic bicycle model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BicycleModel {
    /// Distance between front and rear axle [m]
    pub wheelbase: f64,
    /// Speed response time constant while speeding up [s]
    pub accelerating_time_constant: f64,
    /// Speed response time constant while slowing down [s]
    pub braking_time_constant: f64,
}

impl Default for BicycleModel {
    fn default() -> Self {
        Self {
            wheelbase: 2.69,
            accelerating_time_constant: 2.5,
            braking_time_constant: 1.25,
        }
    }
}

impl BicycleModel {
    /// Time constant of the speed response towards `reference_velocity`
    pub fn time_constant(&self, reference_velocity: f64, velocity: f64) -> f64 {
        if reference_velocity - velocity > 0.0 {
            self.accelerating_time_constant
        } else {
            self.braking_time_constant
        }
    }

    /// Vehicle part of the state derivative
    ///
    /// The cost-rate entry `L` is left at zero.
    pub fn derivative(
        &self,
        state: &StateVector,
        input: &InputVector,
        reference_velocity: f64,
    ) -> StateVector {
        let v = state[V];
        let psi = state[PSI];
        let tau = self.time_constant(reference_velocity, v);

        let mut derivative = StateVector::zeros();
        derivative[X] = v * psi.cos();
        derivative[Y] = v * psi.sin();
        derivative[PSI] = v * state[DELTA].tan() / self.wheelbase;
        derivative[V] = (reference_velocity - v) / tau;
        derivative[DELTA] = state[D_DELTA];
        derivative[D_DELTA] = input[DD_DELTA];
        derivative[S] = v;
        derivative
    }
}

/// Initial OCP state for a measured vehicle state
///
/// Steering angle and rate carry over from the measurement so consecutive
/// plans join smoothly; accumulated cost and progress start at zero.
pub fn initial_state(vehicle: &VehicleState) -> StateVector {
    let mut x = StateVector::zeros();
    x[X] = vehicle.x;
    x[Y] = vehicle.y;
    x[PSI] = vehicle.yaw_angle;
    x[V] = vehicle.vx;
    x[DELTA] = vehicle.steering_angle;
    x[D_DELTA] = vehicle.steering_rate;
    x
}
