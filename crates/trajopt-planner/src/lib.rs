//! Trajectory Planner
//!
//! Receding-horizon NMPC trajectory planner for road vehicles.
//!
//! # Architecture
//!
//! Every planning cycle solves a finite-horizon Optimal Control Problem (OCP)
//! on a kinematic bicycle model:
//!
//! ```text
//! minimize    L(T) = ∫ (w_lat·e_lat² + w_head·e_ψ²) dt
//! subject to  x(0) = x_init
//!             ẋ = f(x, u)               (bicycle model, first-order speed)
//!             x_min ≤ x ≤ x_max         (speed, steering angle and rate)
//!             u_min ≤ u ≤ u_max         (steering acceleration)
//! ```
//!
//! The tracking errors are measured against a smoothing-spline reference of
//! the route, and the speed target comes from curvature, lane speed limit and
//! an intelligent-driver-model car-following law.
//!
//! # Components
//!
//! - [`config`]: Planner configuration and tuning interface
//! - [`route`], [`map`]: Route, road map and traffic ports
//! - [`reference`]: Spline reference route builder
//! - [`velocity`]: Reference velocity planner
//! - [`ocp`]: OCP definition (dynamics, cost, bounds)
//! - [`solver`]: Solver interface and the built-in shooting solver
//! - [`constraints`]: Post-solve validation
//! - [`trajectory`]: Solver output to trajectory conversion
//! - [`controller`]: Planning orchestrator with fallback
//! - [`scenarios`]: Canned road scenarios

pub mod config;
pub mod constraints;
pub mod controller;
pub mod map;
pub mod ocp;
pub mod reference;
pub mod route;
pub mod scenarios;
pub mod solver;
pub mod trajectory;
pub mod velocity;

// Re-exports
pub use config::{PlannerConfig, TuningParameters};
pub use controller::{CycleReport, PlanningPhase, TrajectoryPlanner};
pub use map::{LaneMap, RoadMap, TrafficParticipantSet};
pub use ocp::OcpProblem;
pub use reference::ReferenceRoute;
pub use route::{PolylineRoute, Route};
pub use solver::{OcpSolver, ShootingSolver};
pub use trajopt_core::vehicle::{Trajectory, VehicleState};
