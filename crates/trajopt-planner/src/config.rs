//! Planner configuration
//!
//! Configuration parameters for the receding-horizon trajectory planner.
//! Every section has defaults so a partial TOML file is enough.

use std::collections::HashMap;
use std::fs::read_to_string;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use trajopt_core::dynamics::BicycleModel;

/// Named tuning values applied at construction or reconfiguration
pub type TuningParameters = HashMap<String, f64>;

/// Errors raised while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot load the configuration file: {0}")]
    FileLoad(#[from] std::io::Error),
    #[error("Cannot parse the configuration file: {0}")]
    Deserialise(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: &'static str },
}

/// Main planner configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// OCP horizon configuration
    pub horizon: HorizonConfig,
    /// Cost function weights
    pub weights: CostWeights,
    /// Vehicle geometry and actuator limits
    pub vehicle: VehicleLimits,
    /// Reference velocity planning
    pub velocity: VelocityConfig,
    /// Reference route construction
    pub reference: ReferenceConfig,
    /// Solver configuration
    pub solver: SolverConfig,
    /// Post-solve validation
    pub validation: ValidationConfig,
}

impl PlannerConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the planner cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon.control_points < 2 {
            return Err(ConfigError::Invalid {
                key: "horizon.control_points",
                reason: "at least 2 shooting nodes are needed",
            });
        }
        if !(self.horizon.horizon_time > 0.0) || !self.horizon.horizon_time.is_finite() {
            return Err(ConfigError::Invalid {
                key: "horizon.horizon_time",
                reason: "must be positive and finite",
            });
        }
        if self.validation.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid {
                key: "validation.max_consecutive_failures",
                reason: "must be at least 1, otherwise no cycle is ever accepted",
            });
        }
        Ok(())
    }

    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply named tuning values
    ///
    /// Recognised keys are `wheel_base`, `lateral_weight`, `heading_weight`,
    /// `maximum_velocity` and `min_distance_to_vehicle_ahead`; anything else
    /// is ignored.
    pub fn apply_tuning(&mut self, params: &TuningParameters) {
        for (name, &value) in params {
            match name.as_str() {
                "wheel_base" => self.vehicle.wheel_base = value,
                "lateral_weight" => self.weights.lateral_weight = value,
                "heading_weight" => self.weights.heading_weight = value,
                "maximum_velocity" => self.velocity.maximum_velocity = value,
                "min_distance_to_vehicle_ahead" => self.velocity.min_distance_to_vehicle_ahead = value,
                _ => debug!("Ignoring unknown tuning parameter {name} = {value}"),
            }
        }
    }

    /// Length of route the horizon can consume at top speed [m]
    pub fn required_route_length(&self) -> f64 {
        self.horizon.horizon_time * self.vehicle.max_forward_speed
    }

    /// Bicycle model parameters for this configuration
    pub fn bicycle_model(&self) -> BicycleModel {
        BicycleModel {
            wheelbase: self.vehicle.wheel_base,
            accelerating_time_constant: self.velocity.accelerating_time_constant,
            braking_time_constant: self.velocity.braking_time_constant,
        }
    }
}

/// Horizon configuration for the OCP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonConfig {
    /// Number of shooting nodes, also the trajectory length
    pub control_points: usize,
    /// Total horizon time [s]
    pub horizon_time: f64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            control_points: 30,
            horizon_time: 3.0,
        }
    }
}

impl HorizonConfig {
    /// Node spacing [s]
    pub fn time_step(&self) -> f64 {
        self.horizon_time / self.control_points.max(1) as f64
    }
}

/// Tracking cost weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Weight on squared lateral offset from the reference
    pub lateral_weight: f64,
    /// Weight on squared heading error
    pub heading_weight: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            lateral_weight: 0.01,
            heading_weight: 0.06,
        }
    }
}

/// Vehicle geometry and actuator limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleLimits {
    /// Wheelbase [m]
    pub wheel_base: f64,
    /// Highest admissible forward speed [m/s]
    pub max_forward_speed: f64,
    /// Lowest admissible speed, negative when reversing is allowed [m/s]
    pub max_reverse_speed: f64,
    /// Steering angle limit [rad]
    pub max_steering_angle: f64,
    /// Steering rate limit [rad/s]
    pub max_steering_velocity: f64,
    /// Steering acceleration limit [rad/s²]
    pub max_steering_acceleration: f64,
}

impl Default for VehicleLimits {
    fn default() -> Self {
        Self {
            wheel_base: 2.69,
            max_forward_speed: 13.6,
            max_reverse_speed: -2.0,
            max_steering_angle: 0.7,
            max_steering_velocity: 0.5,
            max_steering_acceleration: 0.5,
        }
    }
}

/// Reference velocity and car-following parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Cruise speed ceiling [m/s]
    pub maximum_velocity: f64,
    /// Time ahead of the vehicle scanned for curvature [s]
    pub lookahead_time: f64,
    /// Minimum number of segments scanned for curvature
    pub safe_index: usize,
    /// Lateral acceleration allowed in curves [m/s²]
    pub lateral_acceleration: f64,
    /// Floor of the curvature speed bound [m/s]
    pub minimum_velocity_in_curve: f64,
    /// Standstill gap to a vehicle ahead [m]
    pub min_distance_to_vehicle_ahead: f64,
    /// Desired time headway [s]
    pub desired_time_headway: f64,
    /// Comfortable acceleration [m/s²]
    pub max_acceleration: f64,
    /// Comfortable deceleration [m/s²]
    pub max_deceleration: f64,
    /// Assumed speed of the vehicle ahead [m/s]
    pub front_vehicle_velocity: f64,
    /// Speed response time constant while speeding up [s]
    pub accelerating_time_constant: f64,
    /// Speed response time constant while slowing down [s]
    pub braking_time_constant: f64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            maximum_velocity: 5.0,
            lookahead_time: 3.0,
            safe_index: 3,
            lateral_acceleration: 2.0,
            minimum_velocity_in_curve: 3.0,
            min_distance_to_vehicle_ahead: 10.0,
            desired_time_headway: 1.5,
            max_acceleration: 2.0,
            max_deceleration: 2.5,
            front_vehicle_velocity: 0.0,
            accelerating_time_constant: 2.5,
            braking_time_constant: 1.25,
        }
    }
}

/// Reference route construction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Arc-length spacing of resampled route points [m]
    pub resample_spacing: f64,
    /// Shortest horizon route length worth planning on [m]
    pub min_route_length: f64,
    /// Smoothing factor of the x(s) and y(s) splines
    pub position_smoothing: f64,
    /// Smoothing factor of the heading(s) spline
    pub heading_smoothing: f64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            resample_spacing: 0.75,
            min_route_length: 5.0,
            position_smoothing: 0.9,
            heading_smoothing: 0.9,
        }
    }
}

/// Solver configuration, passed through to the OCP solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Integration sub-steps per shooting interval
    pub intermediate_integration: usize,
    /// Convergence tolerance
    pub tolerance: f64,
    /// Maximum outer iterations per solve
    pub max_iterations: usize,
    /// Maximum damping increases per outer iteration
    pub qp_max_iterations: usize,
    /// Log every iteration
    pub verbose: bool,
    /// Finite-difference perturbation
    pub perturbation: f64,
    /// Wall-clock budget per solve [s]
    ///
    /// `None` or a non-positive value leaves the solve bounded by
    /// `max_iterations` only, which keeps plans reproducible.
    pub time_limit: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            intermediate_integration: 2,
            tolerance: 1e-4,
            max_iterations: 500,
            qp_max_iterations: 500,
            verbose: false,
            perturbation: 1e-6,
            time_limit: Some(0.09),
        }
    }
}

/// Post-solve validation thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Objective above which a solution is rejected
    pub bad_output_threshold: f64,
    /// Consecutive rejected cycles after which the failure counter resets
    pub max_consecutive_failures: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            bad_output_threshold: 5000.0,
            max_consecutive_failures: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_time_step() {
        let config = PlannerConfig::default();
        assert_relative_eq!(config.horizon.time_step(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(config.required_route_length(), 40.8, epsilon = 1e-9);
    }

    #[test]
    fn test_apply_tuning_recognised_keys() {
        let mut config = PlannerConfig::default();
        let params: TuningParameters = [
            ("wheel_base", 2.8),
            ("lateral_weight", 0.5),
            ("heading_weight", 0.7),
            ("maximum_velocity", 12.0),
            ("min_distance_to_vehicle_ahead", 6.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        config.apply_tuning(&params);

        assert_relative_eq!(config.vehicle.wheel_base, 2.8);
        assert_relative_eq!(config.weights.lateral_weight, 0.5);
        assert_relative_eq!(config.weights.heading_weight, 0.7);
        assert_relative_eq!(config.velocity.maximum_velocity, 12.0);
        assert_relative_eq!(config.velocity.min_distance_to_vehicle_ahead, 6.0);
        assert_relative_eq!(config.bicycle_model().wheelbase, 2.8);
    }

    #[test]
    fn test_apply_tuning_ignores_unknown_keys() {
        let mut config = PlannerConfig::default();
        let mut params = TuningParameters::new();
        params.insert("steering_weight".to_string(), 99.0);
        params.insert("wheelbase".to_string(), 99.0);

        config.apply_tuning(&params);
        assert_eq!(config, PlannerConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let text = r#"
            [horizon]
            control_points = 20

            [velocity]
            maximum_velocity = 8.0

            [solver]
            verbose = true
        "#;
        let config = PlannerConfig::from_toml_str(text).unwrap();
        assert_eq!(config.horizon.control_points, 20);
        assert_relative_eq!(config.horizon.horizon_time, 3.0);
        assert_relative_eq!(config.velocity.maximum_velocity, 8.0);
        assert_relative_eq!(config.velocity.lookahead_time, 3.0);
        assert!(config.solver.verbose);
        assert_eq!(config.solver.max_iterations, 500);
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let config = PlannerConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed = PlannerConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_toml() {
        let result = PlannerConfig::from_toml_str("[horizon]\ncontrol_points = \"many\"");
        assert!(matches!(result, Err(ConfigError::Deserialise(_))));
    }

    #[test]
    fn test_zero_failure_limit_rejected() {
        let result = PlannerConfig::from_toml_str("[validation]\nmax_consecutive_failures = 0");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: "validation.max_consecutive_failures", .. })
        ));
        let config = PlannerConfig::from_toml_str("[validation]\nmax_consecutive_failures = 1").unwrap();
        assert_eq!(config.validation.max_consecutive_failures, 1);
    }

    #[test]
    fn test_degenerate_horizon_rejected() {
        let result = PlannerConfig::from_toml_str("[horizon]\ncontrol_points = 1");
        assert!(matches!(result, Err(ConfigError::Invalid { key: "horizon.control_points", .. })));
        let result = PlannerConfig::from_toml_str("[horizon]\nhorizon_time = 0.0");
        assert!(matches!(result, Err(ConfigError::Invalid { key: "horizon.horizon_time", .. })));
    }

    #[test]
    fn test_time_limit_optional() {
        assert_eq!(PlannerConfig::default().solver.time_limit, Some(0.09));
        let config = PlannerConfig::from_toml_str("[solver]\ntime_limit = 0.5").unwrap();
        assert_eq!(config.solver.time_limit, Some(0.5));
    }

    #[test]
    fn test_missing_file() {
        let result = PlannerConfig::load("/nonexistent/planner.toml");
        assert!(matches!(result, Err(ConfigError::FileLoad(_))));
    }
}
