//! Vehicle state and trajectory types

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Dynamic state of a road vehicle at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleState {
    /// Position x in the map frame [m]
    pub x: f64,
    /// Position y in the map frame [m]
    pub y: f64,
    /// Heading [rad]
    pub yaw_angle: f64,
    /// Longitudinal velocity [m/s]
    pub vx: f64,
    /// Front wheel steering angle [rad]
    pub steering_angle: f64,
    /// Steering angle rate [rad/s]
    pub steering_rate: f64,
    /// Longitudinal acceleration [m/s²]
    pub ax: f64,
    /// Yaw rate [rad/s]
    pub yaw_rate: f64,
    /// Time stamp [s]
    pub time: f64,
}

impl VehicleState {
    /// State at rest at a pose
    pub fn at_pose(x: f64, y: f64, yaw_angle: f64) -> Self {
        Self {
            x,
            y,
            yaw_angle,
            ..Default::default()
        }
    }

    /// Same pose, moving at `vx`
    pub fn with_velocity(mut self, vx: f64) -> Self {
        self.vx = vx;
        self
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// Time-ordered sequence of planned vehicle states
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub states: Vec<VehicleState>,
}

impl Trajectory {
    pub fn new(states: Vec<VehicleState>) -> Self {
        Self { states }
    }

    /// Create an empty trajectory
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn first(&self) -> Option<&VehicleState> {
        self.states.first()
    }

    pub fn last(&self) -> Option<&VehicleState> {
        self.states.last()
    }

    /// Total time spanned by the trajectory [s]
    pub fn duration(&self) -> f64 {
        match (self.states.first(), self.states.last()) {
            (Some(a), Some(b)) => b.time - a.time,
            _ => 0.0,
        }
    }

    /// Whether time stamps are strictly increasing
    pub fn is_time_ordered(&self) -> bool {
        self.states.windows(2).all(|w| w[1].time > w[0].time)
    }

    /// State at time `t`, linearly interpolated between samples
    ///
    /// Times outside the trajectory clamp to the first or last state.
    pub fn state_at(&self, t: f64) -> Option<VehicleState> {
        let first = self.states.first()?;
        let last = self.states.last()?;
        if t <= first.time {
            return Some(*first);
        }
        if t >= last.time {
            return Some(*last);
        }

        let idx = self.states.partition_point(|s| s.time <= t).saturating_sub(1);
        let a = &self.states[idx];
        let b = &self.states[idx + 1];
        let alpha = if b.time > a.time { (t - a.time) / (b.time - a.time) } else { 0.0 };
        let lerp = |p: f64, q: f64| p + alpha * (q - p);

        Some(VehicleState {
            x: lerp(a.x, b.x),
            y: lerp(a.y, b.y),
            yaw_angle: a.yaw_angle + alpha * crate::math::angle_difference(b.yaw_angle, a.yaw_angle),
            vx: lerp(a.vx, b.vx),
            steering_angle: lerp(a.steering_angle, b.steering_angle),
            steering_rate: lerp(a.steering_rate, b.steering_rate),
            ax: lerp(a.ax, b.ax),
            yaw_rate: lerp(a.yaw_rate, b.yaw_rate),
            time: t,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_trajectory() -> Trajectory {
        Trajectory::new(
            (0..5)
                .map(|i| VehicleState {
                    x: i as f64,
                    vx: 1.0,
                    time: 10.0 + i as f64 * 0.5,
                    ..Default::default()
                })
                .collect(),
        )
    }

    #[test]
    fn test_empty_trajectory() {
        let traj = Trajectory::empty();
        assert!(traj.is_empty());
        assert_eq!(traj.duration(), 0.0);
        assert!(traj.state_at(1.0).is_none());
    }

    #[test]
    fn test_duration_and_ordering() {
        let traj = sample_trajectory();
        assert_eq!(traj.len(), 5);
        assert_relative_eq!(traj.duration(), 2.0, epsilon = 1e-12);
        assert!(traj.is_time_ordered());
    }

    #[test]
    fn test_state_at_interpolates_and_clamps() {
        let traj = sample_trajectory();

        let mid = traj.state_at(10.75).unwrap();
        assert_relative_eq!(mid.x, 1.5, epsilon = 1e-12);
        assert_relative_eq!(mid.time, 10.75, epsilon = 1e-12);

        assert_relative_eq!(traj.state_at(0.0).unwrap().x, 0.0);
        assert_relative_eq!(traj.state_at(99.0).unwrap().x, 4.0);
    }
}
