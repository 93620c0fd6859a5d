//! Post-solve validation of OCP solutions
//!
//! A solution is rejected when any of these checks is violated:
//! - objective above `bad_output_threshold`
//! - velocity outside `[max_reverse_speed, max_forward_speed]`
//! - steering rate magnitude above `max_steering_velocity`
//! - non-finite states or objective
//! - number of states different from `control_points`

use trajopt_core::dynamics::{D_DELTA, V};

use crate::config::{PlannerConfig, ValidationConfig, VehicleLimits};
use crate::solver::SolverOutput;

/// Result of constraint evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintEvaluation {
    /// Constraint values (non-positive = satisfied, positive = violated)
    pub values: Vec<f64>,
    /// Names for debugging
    pub names: Vec<&'static str>,
    /// Whether all constraints are satisfied
    pub all_satisfied: bool,
    /// Maximum violation (0 if all satisfied)
    pub max_violation: f64,
}

impl ConstraintEvaluation {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            names: Vec::new(),
            all_satisfied: true,
            max_violation: 0.0,
        }
    }

    pub fn add(&mut self, name: &'static str, value: f64) {
        self.names.push(name);
        self.values.push(value);
        if value > 0.0 {
            self.all_satisfied = false;
            self.max_violation = self.max_violation.max(value);
        }
    }

    /// Names of the violated constraints
    pub fn violated(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.names
            .iter()
            .zip(&self.values)
            .filter(|&(_, &v)| v > 0.0)
            .map(|(&n, _)| n)
    }
}

impl Default for ConstraintEvaluation {
    fn default() -> Self {
        Self::new()
    }
}

/// Validity checks applied to every solver output
#[derive(Debug, Clone, Copy)]
pub struct SolutionValidator {
    limits: VehicleLimits,
    threshold: f64,
    control_points: usize,
}

impl SolutionValidator {
    pub fn new(limits: VehicleLimits, validation: &ValidationConfig, control_points: usize) -> Self {
        Self {
            limits,
            threshold: validation.bad_output_threshold,
            control_points,
        }
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self::new(config.vehicle, &config.validation, config.horizon.control_points)
    }

    /// Evaluate all checks on a solver output
    pub fn evaluate(&self, output: &SolverOutput) -> ConstraintEvaluation {
        let mut eval = ConstraintEvaluation::new();

        let non_finite = output.states.iter().flat_map(|x| x.iter()).any(|v| !v.is_finite())
            || !output.objective.is_finite();
        eval.add("non_finite", if non_finite { 1.0 } else { 0.0 });

        eval.add(
            "solution_length",
            output.states.len().abs_diff(self.control_points) as f64,
        );

        eval.add("objective", output.objective - self.threshold);

        let (mut v_low, mut v_high, mut steering_rate) = (f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for x in &output.states {
            v_low = v_low.max(self.limits.max_reverse_speed - x[V]);
            v_high = v_high.max(x[V] - self.limits.max_forward_speed);
            steering_rate = steering_rate.max(x[D_DELTA].abs() - self.limits.max_steering_velocity);
        }
        eval.add("velocity_min", v_low);
        eval.add("velocity_max", v_high);
        eval.add("steering_rate", steering_rate);

        eval
    }
}
