//! Mathematical utilities
//!
//! Smoothing splines over arc-length, fixed-step integrators and
//! planar angle helpers.

pub mod angle;
pub mod integrator;
pub mod spline;

pub use angle::*;
pub use integrator::*;
pub use spline::*;
