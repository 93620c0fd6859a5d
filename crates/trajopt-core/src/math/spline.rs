//! Piecewise-cubic smoothing splines
//!
//! Fits a cubic smoothing spline to sampled data and evaluates it at
//! arbitrary abscissas. The fit minimises
//!
//! ```text
//! p · Σᵢ wᵢ (yᵢ − f(xᵢ))²  +  (1 − p) · ∫ f''(x)² dx
//! ```
//!
//! where `p ∈ [0, 1]` is the smoothing factor: `p = 1` reproduces the natural
//! interpolating spline, `p = 0` collapses to the weighted least-squares line.
//!
//! Each segment `i` stores its coefficients in descending powers of
//! `(x − breaks[i])`, so evaluation is a single Horner step once the segment
//! index is known.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum number of samples a smoothing spline can be fitted to
pub const MIN_SPLINE_POINTS: usize = 3;

/// Spline fitting errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplineError {
    #[error("At least {MIN_SPLINE_POINTS} points are required, got {0}")]
    TooFewPoints(usize),
    #[error("Sample length mismatch: {abscissas} abscissas, {ordinates} ordinates, {weights} weights")]
    LengthMismatch {
        abscissas: usize,
        ordinates: usize,
        weights: usize,
    },
    #[error("Abscissas must be strictly increasing (violated at index {0})")]
    NotIncreasing(usize),
    #[error("Weights must be positive and finite (violated at index {0})")]
    InvalidWeight(usize),
    #[error("Smoothing factor must lie in [0, 1], got {0}")]
    InvalidSmoothing(f64),
    #[error("Smoothing system is singular")]
    SingularSystem,
}

/// Piecewise cubic curve over strictly increasing break points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineCurve {
    /// Break points (segment start abscissas plus the final end point)
    breaks: Vec<f64>,
    /// Per-segment coefficients `[c3, c2, c1, c0]` in powers of `(x − breaks[i])`
    coefs: Vec<[f64; 4]>,
}

impl SplineCurve {
    /// Fit a cubic smoothing spline
    ///
    /// # Arguments
    /// * `abscissas` - Sample positions, strictly increasing
    /// * `ordinates` - Sample values
    /// * `weights` - Per-sample data weights (positive)
    /// * `smoothing` - Smoothing factor `p ∈ [0, 1]`
    pub fn fit_smoothing(
        abscissas: &[f64],
        ordinates: &[f64],
        weights: &[f64],
        smoothing: f64,
    ) -> Result<Self, SplineError> {
        let n = abscissas.len();
        if n != ordinates.len() || n != weights.len() {
            return Err(SplineError::LengthMismatch {
                abscissas: n,
                ordinates: ordinates.len(),
                weights: weights.len(),
            });
        }
        if n < MIN_SPLINE_POINTS {
            return Err(SplineError::TooFewPoints(n));
        }
        if !(0.0..=1.0).contains(&smoothing) {
            return Err(SplineError::InvalidSmoothing(smoothing));
        }
        if let Some(i) = abscissas
            .windows(2)
            .position(|w| !(w[1] > w[0]) || !w[1].is_finite() || !w[0].is_finite())
        {
            return Err(SplineError::NotIncreasing(i + 1));
        }
        if let Some(i) = weights.iter().position(|w| !(*w > 0.0) || !w.is_finite()) {
            return Err(SplineError::InvalidWeight(i));
        }

        let p = smoothing;
        let m = n - 2;
        let dx: Vec<f64> = abscissas.windows(2).map(|w| w[1] - w[0]).collect();
        let slopes: Vec<f64> = ordinates
            .windows(2)
            .zip(&dx)
            .map(|(w, h)| (w[1] - w[0]) / h)
            .collect();

        // R: tridiagonal (n-2)x(n-2) second-derivative continuity matrix
        let mut r = DMatrix::<f64>::zeros(m, m);
        for i in 0..m {
            r[(i, i)] = 2.0 * (dx[i] + dx[i + 1]);
            if i + 1 < m {
                r[(i, i + 1)] = dx[i + 1];
                r[(i + 1, i)] = dx[i + 1];
            }
        }

        // Qᵀ W^(-1/2): second-difference operator scaled by the data weights
        let mut qtw = DMatrix::<f64>::zeros(m, n);
        for i in 0..m {
            qtw[(i, i)] = 1.0 / dx[i] / weights[i].sqrt();
            qtw[(i, i + 1)] = -(1.0 / dx[i] + 1.0 / dx[i + 1]) / weights[i + 1].sqrt();
            qtw[(i, i + 2)] = 1.0 / dx[i + 1] / weights[i + 2].sqrt();
        }

        let system = &qtw * qtw.transpose() * (6.0 * (1.0 - p)) + r * p;
        let rhs = DVector::from_iterator(m, slopes.windows(2).map(|w| w[1] - w[0]));

        let u = system
            .clone()
            .cholesky()
            .map(|c| c.solve(&rhs))
            .or_else(|| system.lu().solve(&rhs))
            .ok_or(SplineError::SingularSystem)?;

        // Pad with the natural end conditions (zero curvature at both ends)
        let mut u_full = vec![0.0; n];
        for i in 0..m {
            u_full[i + 1] = u[i];
        }

        // Smoothed ordinates: y - 6(1-p) W⁻¹ Q u
        let d1: Vec<f64> = (0..n - 1).map(|i| (u_full[i + 1] - u_full[i]) / dx[i]).collect();
        let mut fitted = Vec::with_capacity(n);
        for i in 0..n {
            let left = if i > 0 { d1[i - 1] } else { 0.0 };
            let right = if i < n - 1 { d1[i] } else { 0.0 };
            fitted.push(ordinates[i] - 6.0 * (1.0 - p) / weights[i] * (right - left));
        }

        let c2: Vec<f64> = u_full.iter().map(|v| p * v).collect();
        let coefs = (0..n - 1)
            .map(|i| {
                let h = dx[i];
                let cubic = (c2[i + 1] - c2[i]) / h;
                let quadratic = 3.0 * c2[i];
                let linear = (fitted[i + 1] - fitted[i]) / h - h * (2.0 * c2[i] + c2[i + 1]);
                [cubic, quadratic, linear, fitted[i]]
            })
            .collect();

        Ok(Self {
            breaks: abscissas.to_vec(),
            coefs,
        })
    }

    /// Natural interpolating spline (smoothing factor 1)
    pub fn interpolate(abscissas: &[f64], ordinates: &[f64]) -> Result<Self, SplineError> {
        let weights = vec![1.0; abscissas.len()];
        Self::fit_smoothing(abscissas, ordinates, &weights, 1.0)
    }

    /// Break points of the curve
    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    /// Number of cubic segments
    pub fn num_segments(&self) -> usize {
        self.coefs.len()
    }

    /// Lower end of the break range
    pub fn start(&self) -> f64 {
        self.breaks.first().copied().unwrap_or(0.0)
    }

    /// Upper end of the break range
    pub fn end(&self) -> f64 {
        self.breaks.last().copied().unwrap_or(0.0)
    }

    /// Index of the segment whose interval contains `s`
    ///
    /// Queries outside the break range are clamped to the first or last
    /// segment, which then extrapolates.
    pub fn find_segment(&self, s: f64) -> usize {
        let last = self.coefs.len().saturating_sub(1);
        if self.breaks.is_empty() || s <= self.breaks[0] {
            return 0;
        }
        // breaks[0] < s here, so partition_point >= 1
        let idx = self.breaks.partition_point(|&b| b <= s) - 1;
        idx.min(last)
    }

    /// Evaluate the cubic of segment `index` at `s`
    pub fn evaluate_segment(&self, index: usize, s: f64) -> f64 {
        match self.coefs.get(index) {
            Some(&[c3, c2, c1, c0]) => {
                let t = s - self.breaks[index];
                ((c3 * t + c2) * t + c1) * t + c0
            }
            None => 0.0,
        }
    }

    /// First derivative of segment `index` at `s`
    pub fn derivative_segment(&self, index: usize, s: f64) -> f64 {
        match self.coefs.get(index) {
            Some(&[c3, c2, c1, _]) => {
                let t = s - self.breaks[index];
                (3.0 * c3 * t + 2.0 * c2) * t + c1
            }
            None => 0.0,
        }
    }

    /// Second derivative of segment `index` at `s`
    pub fn second_derivative_segment(&self, index: usize, s: f64) -> f64 {
        match self.coefs.get(index) {
            Some(&[c3, c2, _, _]) => 6.0 * c3 * (s - self.breaks[index]) + 2.0 * c2,
            None => 0.0,
        }
    }

    /// Evaluate at `s`, searching for the segment
    pub fn evaluate(&self, s: f64) -> f64 {
        self.evaluate_segment(self.find_segment(s), s)
    }

    /// First derivative at `s`, searching for the segment
    pub fn derivative(&self, s: f64) -> f64 {
        self.derivative_segment(self.find_segment(s), s)
    }

    /// Bulk evaluation of values and first derivatives
    pub fn evaluate_with_derivative(&self, abscissas: &[f64]) -> (Vec<f64>, Vec<f64>) {
        abscissas
            .iter()
            .map(|&s| {
                let idx = self.find_segment(s);
                (self.evaluate_segment(idx, s), self.derivative_segment(idx, s))
            })
            .unzip()
    }
}
