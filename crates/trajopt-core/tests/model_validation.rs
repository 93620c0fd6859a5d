//! Model Validation Tests
//!
//! Checks the numeric building blocks against closed-form results:
//! 1. Smoothing spline limits (interpolation and least squares)
//! 2. Arc-length spline geometry on a circle
//! 3. First-order speed response of the bicycle model

use approx::assert_relative_eq;

use trajopt_core::dynamics::{BicycleModel, InputVector, StateVector, PSI, S, V, X, Y};
use trajopt_core::math::{rk4_substeps, SplineCurve};

mod spline_limit_tests {
    use super::*;

    #[test]
    fn test_zero_smoothing_is_least_squares_line() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [1.0, 3.1, 4.9, 7.1, 8.9];
        let spline = SplineCurve::fit_smoothing(&xs, &ys, &[1.0; 5], 0.0).unwrap();

        // Least-squares fit of the samples: y = 1.98 x + 1.04
        for &x in &xs {
            assert_relative_eq!(spline.evaluate(x), 1.98 * x + 1.04, epsilon = 1e-9);
        }
        assert_relative_eq!(spline.derivative(0.5), 1.98, epsilon = 1e-9);
        assert_relative_eq!(spline.derivative(3.5), 1.98, epsilon = 1e-9);
    }

    #[test]
    fn test_interpolating_spline_tracks_sine() {
        let xs: Vec<f64> = (0..=20).map(|i| i as f64 * 0.5).collect();
        let ys: Vec<f64> = xs.iter().map(|x| x.sin()).collect();
        let spline = SplineCurve::interpolate(&xs, &ys).unwrap();

        // Away from the natural end conditions the error is small
        for &x in &xs[4..16] {
            assert_relative_eq!(spline.evaluate(x + 0.25), (x + 0.25).sin(), epsilon = 1e-3);
        }
    }
}

mod arc_length_geometry_tests {
    use super::*;

    #[test]
    fn test_circle_heading_from_derivatives() {
        let radius = 10.0;
        let s: Vec<f64> = (0..=60).map(|i| i as f64 * 0.5).collect();
        let x: Vec<f64> = s.iter().map(|si| radius * (si / radius).sin()).collect();
        let y: Vec<f64> = s.iter().map(|si| radius - radius * (si / radius).cos()).collect();

        let fx = SplineCurve::fit_smoothing(&s, &x, &vec![1.0; s.len()], 0.9).unwrap();
        let fy = SplineCurve::fit_smoothing(&s, &y, &vec![1.0; s.len()], 0.9).unwrap();
        let (_, dx) = fx.evaluate_with_derivative(&s);
        let (_, dy) = fy.evaluate_with_derivative(&s);

        for i in 10..50 {
            let heading = dy[i].atan2(dx[i]);
            assert_relative_eq!(heading, s[i] / radius, epsilon = 1e-3);
            assert_relative_eq!(dx[i].hypot(dy[i]), 1.0, epsilon = 1e-3);
        }
    }
}

mod speed_response_tests {
    use super::*;

    fn integrate(model: &BicycleModel, v0: f64, reference: f64, duration: f64) -> StateVector {
        let mut x = StateVector::zeros();
        x[V] = v0;
        let steps = 1000;
        let dt = duration / steps as f64;
        for k in 0..steps {
            x = rk4_substeps(&x, k as f64 * dt, dt, 1, |_, s| {
                model.derivative(s, &InputVector::zeros(), reference)
            });
        }
        x
    }

    #[test]
    fn test_acceleration_time_constant() {
        let model = BicycleModel::default();
        let x = integrate(&model, 0.0, 10.0, 2.5);
        assert_relative_eq!(x[V], 10.0 * (1.0 - (-1.0f64).exp()), epsilon = 1e-6);
        // Straight motion: travelled distance equals progress
        assert_relative_eq!(x[X], x[S], epsilon = 1e-9);
        assert_relative_eq!(x[Y], 0.0);
        assert_relative_eq!(x[PSI], 0.0);
    }

    #[test]
    fn test_braking_time_constant() {
        let model = BicycleModel::default();
        let x = integrate(&model, 10.0, 0.0, 1.25);
        assert_relative_eq!(x[V], 10.0 * (-1.0f64).exp(), epsilon = 1e-6);
    }
}
