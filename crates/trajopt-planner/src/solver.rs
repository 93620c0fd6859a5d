//! OCP solver interface
//!
//! [`OcpSolver`] is the seam between the planner and a numerical engine.
//! [`ShootingSolver`] is the built-in engine: single shooting over
//! piecewise-constant inputs, RK4 rollouts and Levenberg-Marquardt steps on
//! the tracking residuals, projected onto the input box. State bounds enter
//! as a quadratic penalty; rolled-out states are never clamped, so a plan
//! that leaves its box is reported as such.

use std::time::{Duration, Instant};

use log::trace;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use trajopt_core::dynamics::{InputVector, StateVector, INPUT_SIZE, STATE_SIZE};
use trajopt_core::math::rk4_substeps;

use crate::config::PlannerConfig;
use crate::ocp::OcpProblem;

/// Solver errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("Horizon needs at least 2 control points, got {0}")]
    InvalidHorizon(usize),
    #[error("Time step must be positive and finite, got {0}")]
    InvalidTimeStep(f64),
    #[error("Initial state contains non-finite values")]
    NonFiniteInitialState,
    #[error("Objective diverged to a non-finite value")]
    NonFiniteObjective,
}

/// Configuration for a single solve call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOptions {
    /// Number of shooting nodes (states in the solution)
    pub control_points: usize,
    /// Node spacing [s]
    pub time_step: f64,
    /// Integration sub-steps per interval
    pub intermediate_integration: usize,
    /// Stop once the largest input change of an iteration is below this
    pub tolerance: f64,
    /// Maximum Gauss-Newton iterations
    pub max_iterations: usize,
    /// Maximum damping increases per iteration
    pub qp_max_iterations: usize,
    /// Trace every iteration
    pub verbose: bool,
    /// Finite-difference perturbation
    pub perturbation: f64,
    /// Wall-clock budget [s]; unlimited when `None`
    pub time_limit: Option<f64>,
}

impl SolveOptions {
    pub fn from_config(config: &PlannerConfig) -> Self {
        let solver = &config.solver;
        Self {
            control_points: config.horizon.control_points,
            time_step: config.horizon.time_step(),
            intermediate_integration: solver.intermediate_integration,
            tolerance: solver.tolerance,
            max_iterations: solver.max_iterations,
            qp_max_iterations: solver.qp_max_iterations,
            verbose: solver.verbose,
            perturbation: solver.perturbation,
            time_limit: solver.time_limit.filter(|limit| *limit > 0.0),
        }
    }
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self::from_config(&PlannerConfig::default())
    }
}

/// Why the solver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopReason {
    /// Input change fell below the tolerance
    #[default]
    Converged,
    /// No descent step was found
    Stalled,
    MaxIterations,
    TimeLimit,
}

/// Solution statistics from the solver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveStatistics {
    /// Descent iterations taken
    pub iterations: usize,
    /// Damping trials over all iterations
    pub damping_trials: usize,
    /// Total solve time [ms]
    pub solve_time_ms: f64,
    /// Largest input change of the last iteration
    pub last_step: f64,
    /// Penalised merit value at the solution
    pub merit: f64,
    pub stop_reason: StopReason,
}

/// Solver result
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    /// Optimal states at the shooting nodes
    pub states: Vec<StateVector>,
    /// Piecewise-constant inputs, one per interval
    pub inputs: Vec<InputVector>,
    /// Node time stamps [s]
    pub times: Vec<f64>,
    /// Final objective value
    pub objective: f64,
    pub stats: SolveStatistics,
}

/// Numerical OCP engine
pub trait OcpSolver {
    /// Solve `problem` from initial state `x0` at time `t0`
    ///
    /// `u0` is the initial guess applied on every interval.
    fn solve(
        &mut self,
        problem: &OcpProblem<'_>,
        t0: f64,
        x0: &StateVector,
        u0: &InputVector,
        options: &SolveOptions,
    ) -> Result<SolverOutput, SolverError>;

    /// Drop anything carried over from earlier solves
    fn reset(&mut self) {}
}

/// Weight of the squared state-bound violation in the merit function
const PENALTY_WEIGHT: f64 = 1.0e3;
/// Residuals per shooting node: lateral error, heading error, one bound
/// violation per state
const NODE_RESIDUALS: usize = 2 + STATE_SIZE;
/// Levenberg-Marquardt damping at the start of a solve
const INITIAL_DAMPING: f64 = 1.0e-3;
const MIN_DAMPING: f64 = 1.0e-9;
/// Damping above which no descent step is expected
const MAX_DAMPING: f64 = 1.0e16;
/// Keeps the damped normal matrix positive definite for inactive inputs
const REGULARIZATION: f64 = 1.0e-9;

/// Single-shooting Gauss-Newton solver
///
/// The tracking cost is a weighted sum of squares, so the solver works on
/// the residual vector of all nodes: Levenberg-Marquardt steps from a
/// forward-difference Jacobian, projected onto the input box. State bounds
/// enter as penalty residuals; rolled-out states are reported as integrated.
///
/// The inputs of each solve, shifted by one interval, are kept as a second
/// starting guess for the next one. Whichever of that guess and `u0` has the
/// lower merit is iterated on.
#[derive(Debug, Clone, Default)]
pub struct ShootingSolver {
    last_stats: SolveStatistics,
    warm_start: Option<Vec<InputVector>>,
}

/// States and residuals of one rollout
struct Rollout {
    states: Vec<StateVector>,
    residuals: DVector<f64>,
}

impl Rollout {
    fn new(problem: &OcpProblem<'_>, states: Vec<StateVector>, time_step: f64) -> Self {
        let residuals = residuals(problem, &states, time_step);
        Self { states, residuals }
    }

    fn merit(&self) -> f64 {
        self.residuals.norm_squared()
    }
}

/// Residual vector of the nodes after the initial one
///
/// The squared norm approximates the accumulated cost plus the bound
/// penalty.
fn residuals(problem: &OcpProblem<'_>, states: &[StateVector], time_step: f64) -> DVector<f64> {
    let weights = &problem.context.weights;
    let lateral = (weights.lateral_weight.max(0.0) * time_step).sqrt();
    let heading = (weights.heading_weight.max(0.0) * time_step).sqrt();
    let penalty = PENALTY_WEIGHT.sqrt();
    let bounds = problem.state_bounds();

    let nodes = states.len().saturating_sub(1);
    let mut r = DVector::zeros(nodes * NODE_RESIDUALS);
    for (j, x) in states.iter().skip(1).enumerate() {
        let row = j * NODE_RESIDUALS;
        let error = problem.tracking_error(x);
        r[row] = lateral * error.lateral;
        r[row + 1] = heading * error.heading;
        for (i, v) in bounds.violation(x).iter().enumerate() {
            r[row + 2 + i] = penalty * v;
        }
    }
    r
}

impl ShootingSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics of the last solve
    pub fn statistics(&self) -> &SolveStatistics {
        &self.last_stats
    }

    /// Starting guess kept from the last solve
    pub fn warm_start(&self) -> Option<&[InputVector]> {
        self.warm_start.as_deref()
    }

    /// Integrate from node `start` onwards, keeping `prefix[..=start]`
    fn rollout(
        problem: &OcpProblem<'_>,
        t0: f64,
        prefix: &[StateVector],
        inputs: &[InputVector],
        start: usize,
        options: &SolveOptions,
    ) -> Vec<StateVector> {
        let mut states = Vec::with_capacity(inputs.len() + 1);
        states.extend_from_slice(&prefix[..=start]);
        let mut x = prefix[start];

        for (k, u) in inputs.iter().enumerate().skip(start) {
            let t = t0 + k as f64 * options.time_step;
            x = rk4_substeps(&x, t, options.time_step, options.intermediate_integration, |_, s| {
                problem.dynamics(s, u)
            });
            states.push(x);
        }
        states
    }

    /// Forward-difference Jacobian of the residuals with respect to the inputs
    ///
    /// An input only moves the nodes after it, so each column re-integrates
    /// the tail of the horizon.
    fn jacobian(
        problem: &OcpProblem<'_>,
        t0: f64,
        nominal: &Rollout,
        inputs: &[InputVector],
        options: &SolveOptions,
    ) -> DMatrix<f64> {
        let h = options.perturbation;
        let mut jacobian = DMatrix::zeros(nominal.residuals.len(), inputs.len() * INPUT_SIZE);
        let mut perturbed = inputs.to_vec();

        for k in 0..inputs.len() {
            for i in 0..INPUT_SIZE {
                perturbed[k][i] += h;
                let states = Self::rollout(problem, t0, &nominal.states, &perturbed, k, options);
                let r = residuals(problem, &states, options.time_step);
                perturbed[k][i] = inputs[k][i];
                jacobian.set_column(k * INPUT_SIZE + i, &((r - &nominal.residuals) / h));
            }
        }
        jacobian
    }
}

impl OcpSolver for ShootingSolver {
    fn solve(
        &mut self,
        problem: &OcpProblem<'_>,
        t0: f64,
        x0: &StateVector,
        u0: &InputVector,
        options: &SolveOptions,
    ) -> Result<SolverOutput, SolverError> {
        if options.control_points < 2 {
            return Err(SolverError::InvalidHorizon(options.control_points));
        }
        if !(options.time_step > 0.0) || !options.time_step.is_finite() {
            return Err(SolverError::InvalidTimeStep(options.time_step));
        }
        if x0.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::NonFiniteInitialState);
        }

        let start = Instant::now();
        let budget = options
            .time_limit
            .map(|limit| Duration::from_secs_f64(limit.max(0.0)));
        let input_bounds = problem.input_bounds();

        let intervals = options.control_points - 1;
        let mut inputs = vec![input_bounds.project(u0); intervals];
        let mut current = Rollout::new(
            problem,
            Self::rollout(problem, t0, &[*x0], &inputs, 0, options),
            options.time_step,
        );
        let mut merit = current.merit();

        if let Some(warm) = self.warm_start.take().filter(|w| w.len() == intervals) {
            let rollout = Rollout::new(
                problem,
                Self::rollout(problem, t0, &[*x0], &warm, 0, options),
                options.time_step,
            );
            let warm_merit = rollout.merit();
            if warm_merit.is_finite() && (warm_merit < merit || !merit.is_finite()) {
                trace!("Warm start accepted, merit {warm_merit:.6e} against {merit:.6e}");
                inputs = warm;
                current = rollout;
                merit = warm_merit;
            }
        }
        if !merit.is_finite() {
            return Err(SolverError::NonFiniteObjective);
        }

        let mut stats = SolveStatistics {
            stop_reason: StopReason::MaxIterations,
            ..Default::default()
        };
        let mut damping = INITIAL_DAMPING;

        for iteration in 0..options.max_iterations {
            if iteration > 0 && budget.is_some_and(|b| start.elapsed() > b) {
                stats.stop_reason = StopReason::TimeLimit;
                break;
            }
            stats.iterations = iteration + 1;

            let jacobian = Self::jacobian(problem, t0, &current, &inputs, options);
            let gradient = jacobian.tr_mul(&current.residuals);
            if gradient.amax() == 0.0 {
                stats.stop_reason = StopReason::Converged;
                break;
            }
            let normal = jacobian.tr_mul(&jacobian);

            let mut accepted = None;
            for _ in 0..options.qp_max_iterations.max(1) {
                if damping > MAX_DAMPING {
                    break;
                }
                stats.damping_trials += 1;

                let mut damped = normal.clone();
                for i in 0..damped.nrows() {
                    damped[(i, i)] += damping * (normal[(i, i)] + REGULARIZATION);
                }
                let Some(cholesky) = damped.cholesky() else {
                    damping *= 10.0;
                    continue;
                };
                let step = cholesky.solve(&(-&gradient));

                let candidate: Vec<InputVector> = inputs
                    .iter()
                    .enumerate()
                    .map(|(k, u)| {
                        let delta = InputVector::from_fn(|i, _| step[k * INPUT_SIZE + i]);
                        input_bounds.project(&(u + delta))
                    })
                    .collect();
                let rollout = Rollout::new(
                    problem,
                    Self::rollout(problem, t0, &[*x0], &candidate, 0, options),
                    options.time_step,
                );
                let candidate_merit = rollout.merit();
                if candidate_merit.is_finite() && candidate_merit < merit {
                    accepted = Some((candidate, rollout, candidate_merit));
                    break;
                }
                damping *= 10.0;
            }

            let Some((candidate, rollout, candidate_merit)) = accepted else {
                stats.stop_reason = StopReason::Stalled;
                break;
            };

            let change = inputs
                .iter()
                .zip(&candidate)
                .map(|(u, c)| (u - c).amax())
                .fold(0.0, f64::max);
            if options.verbose {
                trace!(
                    "Iteration {iteration}: merit {candidate_merit:.6e}, damping {damping:.1e}, input change {change:.3e}"
                );
            }

            inputs = candidate;
            current = rollout;
            merit = candidate_merit;
            stats.last_step = change;
            damping = (damping / 10.0).max(MIN_DAMPING);

            if change < options.tolerance {
                stats.stop_reason = StopReason::Converged;
                break;
            }
        }

        let objective = current.states.last().map(|x| problem.objective(x)).unwrap_or(0.0);
        let mut shifted = inputs[1..].to_vec();
        shifted.push(inputs[intervals - 1]);
        self.warm_start = Some(shifted);
        stats.merit = merit;
        stats.solve_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.last_stats = stats.clone();

        let times = (0..options.control_points)
            .map(|k| t0 + k as f64 * options.time_step)
            .collect();

        Ok(SolverOutput {
            states: current.states,
            inputs,
            times,
            objective,
            stats,
        })
    }

    fn reset(&mut self) {
        self.warm_start = None;
    }
}
