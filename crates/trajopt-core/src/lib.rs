//! # trajopt-core
//!
//! Numeric building blocks for the road-vehicle trajectory optimiser.
//!
//! ## Modules
//!
//! - [`math`]: Smoothing splines, integrators, angle helpers
//! - [`dynamics`]: Kinematic bicycle model and OCP state layout
//! - [`vehicle`]: Vehicle state and trajectory types

pub mod dynamics;
pub mod math;
pub mod vehicle;

pub use vehicle::{Trajectory, VehicleState};
