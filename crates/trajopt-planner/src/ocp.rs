//! Optimal Control Problem (OCP) definition
//!
//! Per planning cycle the planner solves
//!
//! ```text
//! minimize    L(T)
//! subject to  x(0) = x_init
//!             ẋ = f(x, u)                  (bicycle model + cost rate)
//!             x_min ≤ x ≤ x_max,  u_min ≤ u ≤ u_max
//!             g_min ≤ g(x, u) ≤ g_max      (path constraints)
//! ```
//!
//! with the running cost `L̇ = w_lat·e_lat² + w_head·e_ψ²` measured against
//! the reference splines at progress `s`.

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

use trajopt_core::dynamics::{
    BicycleModel, InputVector, StateVector, DD_DELTA, DELTA, D_DELTA, INPUT_SIZE, L, PSI, S, STATE_SIZE, V, X, Y,
};
use trajopt_core::math::angle_difference;

use crate::config::{CostWeights, PlannerConfig, VehicleLimits};
use crate::reference::ReferenceRoute;

/// Number of path constraints
pub const PATH_CONSTRAINT_SIZE: usize = 1;

pub type PathConstraintVector = SVector<f64, PATH_CONSTRAINT_SIZE>;

/// Lower and upper box bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxBounds<const N: usize> {
    pub lower: SVector<f64, N>,
    pub upper: SVector<f64, N>,
}

impl<const N: usize> BoxBounds<N> {
    /// Bounds with every component free
    pub fn unbounded() -> Self {
        Self {
            lower: SVector::repeat(f64::NEG_INFINITY),
            upper: SVector::repeat(f64::INFINITY),
        }
    }

    /// Bound component `index` to `[lower, upper]`
    pub fn with(mut self, index: usize, lower: f64, upper: f64) -> Self {
        self.lower[index] = lower;
        self.upper[index] = upper;
        self
    }

    pub fn contains(&self, value: &SVector<f64, N>) -> bool {
        (0..N).all(|i| value[i] >= self.lower[i] && value[i] <= self.upper[i])
    }

    /// Clamp `value` into the box
    pub fn project(&self, value: &SVector<f64, N>) -> SVector<f64, N> {
        SVector::from_fn(|i, _| value[i].max(self.lower[i]).min(self.upper[i]))
    }

    /// Per-component distance outside the box (zero inside)
    pub fn violation(&self, value: &SVector<f64, N>) -> SVector<f64, N> {
        SVector::from_fn(|i, _| (self.lower[i] - value[i]).max(value[i] - self.upper[i]).max(0.0))
    }
}

/// Immutable per-cycle problem data
///
/// Everything the model functions read is copied in here when the cycle
/// starts, so a solve never observes a parameter change half-way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleContext {
    pub model: BicycleModel,
    pub weights: CostWeights,
    pub limits: VehicleLimits,
    /// Target speed of the first-order speed response [m/s]
    pub reference_velocity: f64,
}

impl CycleContext {
    pub fn new(config: &PlannerConfig, reference_velocity: f64) -> Self {
        Self {
            model: config.bicycle_model(),
            weights: config.weights,
            limits: config.vehicle,
            reference_velocity,
        }
    }
}

/// Tracking errors against the reference
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingError {
    /// Signed lateral offset, positive to the left of the reference [m]
    pub lateral: f64,
    /// Heading error wrapped into (-π, π] [rad]
    pub heading: f64,
}

/// OCP of one planning cycle
#[derive(Debug, Clone, Copy)]
pub struct OcpProblem<'a> {
    pub context: CycleContext,
    pub reference: &'a ReferenceRoute,
}

impl<'a> OcpProblem<'a> {
    pub fn new(context: CycleContext, reference: &'a ReferenceRoute) -> Self {
        Self { context, reference }
    }

    /// Tracking errors of `state` against the reference at its progress `s`
    pub fn tracking_error(&self, state: &StateVector) -> TrackingError {
        let pose = self.reference.pose_at(state[S]);
        let dx = state[X] - pose.x;
        let dy = state[Y] - pose.y;
        let (sin_r, cos_r) = pose.heading.sin_cos();
        TrackingError {
            lateral: -dx * sin_r + dy * cos_r,
            heading: angle_difference(state[PSI], pose.heading),
        }
    }

    /// Running cost rate `L̇`
    pub fn tracking_cost_rate(&self, state: &StateVector) -> f64 {
        let error = self.tracking_error(state);
        let weights = &self.context.weights;
        weights.lateral_weight * error.lateral * error.lateral + weights.heading_weight * error.heading * error.heading
    }

    /// Full state derivative `f(x, u)`
    pub fn dynamics(&self, state: &StateVector, input: &InputVector) -> StateVector {
        let mut derivative = self
            .context
            .model
            .derivative(state, input, self.context.reference_velocity);
        derivative[L] = self.tracking_cost_rate(state);
        derivative
    }

    /// Objective of a terminal state: the accumulated tracking cost
    pub fn objective(&self, terminal: &StateVector) -> f64 {
        terminal[L]
    }

    pub fn state_bounds(&self) -> BoxBounds<STATE_SIZE> {
        let limits = &self.context.limits;
        BoxBounds::unbounded()
            .with(V, limits.max_reverse_speed, limits.max_forward_speed)
            .with(DELTA, -limits.max_steering_angle, limits.max_steering_angle)
            .with(D_DELTA, -limits.max_steering_velocity, limits.max_steering_velocity)
    }

    pub fn input_bounds(&self) -> BoxBounds<INPUT_SIZE> {
        let limit = self.context.limits.max_steering_acceleration;
        BoxBounds::unbounded().with(DD_DELTA, -limit, limit)
    }

    /// Path constraint values, a single disabled slot
    pub fn path_constraints(&self, _state: &StateVector, _input: &InputVector) -> PathConstraintVector {
        PathConstraintVector::zeros()
    }

    pub fn path_constraint_bounds(&self) -> BoxBounds<PATH_CONSTRAINT_SIZE> {
        BoxBounds {
            lower: PathConstraintVector::zeros(),
            upper: PathConstraintVector::zeros(),
        }
    }
}
