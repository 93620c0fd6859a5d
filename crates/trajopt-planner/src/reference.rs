//! Reference route construction
//!
//! Turns the route centerline ahead of the vehicle into three smoothing
//! splines of arc-length: x(s), y(s) and heading(s). Arc-length is measured
//! from the vehicle's projection onto the route, so every reference starts
//! at `s = 0`.

use log::warn;
use thiserror::Error;

use trajopt_core::math::{unwrap_angles, SplineCurve, SplineError, MIN_SPLINE_POINTS};
use trajopt_core::vehicle::VehicleState;

use crate::config::PlannerConfig;
use crate::route::Route;

/// Reasons a reference route cannot be built
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReferenceError {
    #[error("Required route length {required:.2} m is below the minimum of {minimum:.2} m")]
    HorizonTooShort { required: f64, minimum: f64 },
    #[error("Route centerline is empty")]
    EmptyCenterline,
    #[error("Route is {length:.2} m long, the horizon needs {required:.2} m")]
    RouteTooShort { length: f64, required: f64 },
    #[error("Only {0} route points ahead of the vehicle, need at least {MIN_SPLINE_POINTS}")]
    TooFewPoints(usize),
    #[error("Route tangent is degenerate at sample {0}")]
    DegenerateTangent(usize),
    #[error("Spline fit failed: {0}")]
    Spline(#[from] SplineError),
}

/// Resampled route points the splines are fitted to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSamples {
    /// Arc-length from the vehicle [m]
    pub s: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Tangent heading, unwrapped [rad]
    pub heading: Vec<f64>,
}

impl ReferenceSamples {
    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }
}

/// Spline reference for one planning cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRoute {
    pub x: SplineCurve,
    pub y: SplineCurve,
    pub heading: SplineCurve,
    pub samples: ReferenceSamples,
}

/// Reference pose at an arc-length
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl ReferenceRoute {
    /// Build the reference for the route ahead of `vehicle`
    pub fn build<R: Route + ?Sized>(
        route: &R,
        vehicle: &VehicleState,
        config: &PlannerConfig,
    ) -> Result<Self, ReferenceError> {
        let required = config.required_route_length();
        let minimum = config.reference.min_route_length;
        if required < minimum {
            return Err(ReferenceError::HorizonTooShort { required, minimum });
        }

        let centerline = route.centerline();
        if centerline.is_empty() {
            return Err(ReferenceError::EmptyCenterline);
        }
        let length = route.length();
        if length < required {
            return Err(ReferenceError::RouteTooShort { length, required });
        }

        let state_s = route.project(&vehicle.position());
        let spacing = config.reference.resample_spacing;

        let mut samples = ReferenceSamples::default();
        for point in centerline {
            if point.s < state_s {
                continue;
            }
            let progress = point.s - state_s;
            if progress > required {
                break;
            }
            let emit = match samples.s.last() {
                None => true,
                Some(&last) => progress - last >= spacing,
            };
            if emit {
                samples.s.push(progress);
                samples.x.push(point.position.x);
                samples.y.push(point.position.y);
            }
        }

        if samples.len() < MIN_SPLINE_POINTS {
            return Err(ReferenceError::TooFewPoints(samples.len()));
        }
        samples.s[0] = 0.0;

        let weights = vec![1.0; samples.len()];
        let smoothing = config.reference.position_smoothing;
        let x = SplineCurve::fit_smoothing(&samples.s, &samples.x, &weights, smoothing)?;
        let y = SplineCurve::fit_smoothing(&samples.s, &samples.y, &weights, smoothing)?;

        let (_, dx) = x.evaluate_with_derivative(&samples.s);
        let (_, dy) = y.evaluate_with_derivative(&samples.s);

        let last = samples.len() - 1;
        let mut heading = Vec::with_capacity(samples.len());
        for i in 0..last {
            // Vertical tangents are rejected along with non-finite ones
            let degenerate = dx[i] == 0.0 || !dx[i].is_finite() || !dy[i].is_finite();
            if degenerate {
                return Err(ReferenceError::DegenerateTangent(i));
            }
            heading.push(dy[i].atan2(dx[i]));
        }
        heading.push(heading[last - 1]);
        unwrap_angles(&mut heading);
        samples.heading = heading;

        let heading = SplineCurve::fit_smoothing(
            &samples.s,
            &samples.heading,
            &weights,
            config.reference.heading_smoothing,
        )?;

        Ok(Self { x, y, heading, samples })
    }

    /// Length covered by the resampled points [m]
    pub fn length(&self) -> f64 {
        self.samples.s.last().copied().unwrap_or(0.0)
    }

    /// Pose on the reference at arc-length `s`
    ///
    /// The three splines share their break points, so one segment lookup
    /// serves all of them.
    pub fn pose_at(&self, s: f64) -> ReferencePose {
        let idx = self.x.find_segment(s);
        ReferencePose {
            x: self.x.evaluate_segment(idx, s),
            y: self.y.evaluate_segment(idx, s),
            heading: self.heading.evaluate_segment(idx, s),
        }
    }
}

/// Build a reference, logging the reason on failure
pub fn build_reference<R: Route + ?Sized>(
    route: &R,
    vehicle: &VehicleState,
    config: &PlannerConfig,
) -> Option<ReferenceRoute> {
    match ReferenceRoute::build(route, vehicle, config) {
        Ok(reference) => Some(reference),
        Err(e) => {
            warn!("Cannot build reference route: {e}");
            None
        }
    }
}
