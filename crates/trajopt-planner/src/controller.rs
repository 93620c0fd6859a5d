//! Receding-horizon trajectory planner
//!
//! Main interface of the planner. Each call to
//! [`TrajectoryPlanner::plan_trajectory`] runs one planning cycle:
//!
//! ```text
//! Idle → BuildingReference → Solving → Validating → Accepted | Rejected
//! ```
//!
//! A rejected cycle returns the last accepted trajectory (empty until one
//! exists), so the caller always receives something it can follow.

use std::time::Instant;

use log::{debug, warn};

use trajopt_core::dynamics::{initial_state, InputVector};
use trajopt_core::vehicle::{Trajectory, VehicleState};

use crate::config::{PlannerConfig, TuningParameters};
use crate::constraints::SolutionValidator;
use crate::map::{RoadMap, TrafficParticipantSet};
use crate::ocp::{CycleContext, OcpProblem};
use crate::reference::build_reference;
use crate::route::Route;
use crate::solver::{OcpSolver, ShootingSolver, SolveOptions, SolveStatistics, SolverError};
use crate::trajectory::to_trajectory;
use crate::velocity::{VelocityBounds, VelocityPlanner};

/// Stage reached by the current or last planning cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanningPhase {
    /// No cycle has run yet
    #[default]
    Idle,
    BuildingReference,
    Solving,
    Validating,
    /// New trajectory accepted and stored as fallback
    Accepted,
    /// Previous trajectory returned
    Rejected,
}

/// Consecutive-failure bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTracker {
    consecutive: u32,
    current_invalid: bool,
    limit: u32,
}

impl FailureTracker {
    /// Tracker that wraps after `limit` bad cycles; a limit of 0 acts as 1
    pub fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            current_invalid: false,
            limit: limit.max(1),
        }
    }

    /// Record the outcome of a cycle and return whether it is accepted
    ///
    /// A bad cycle increments the counter; once the counter passes
    /// `limit - 1` it wraps back to zero within the same cycle. A good cycle
    /// is accepted while the counter is below `limit` and clears it.
    pub fn record(&mut self, bad: bool) -> bool {
        self.current_invalid = bad;
        if bad {
            self.consecutive += 1;
        }
        if self.consecutive > self.limit.saturating_sub(1) {
            self.consecutive = 0;
        }

        let accepted = !bad && self.consecutive < self.limit;
        if accepted {
            self.consecutive = 0;
        }
        accepted
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    /// Whether the last recorded cycle was bad
    pub fn is_current_invalid(&self) -> bool {
        self.current_invalid
    }

    fn set_limit(&mut self, limit: u32) {
        self.limit = limit.max(1);
    }
}

/// Outcome of one planning cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Final phase of the cycle
    pub phase: PlanningPhase,
    pub bounds: Option<VelocityBounds>,
    /// Objective of the solver output, if the solver returned one
    pub objective: Option<f64>,
    pub stats: Option<SolveStatistics>,
    pub solver_error: Option<SolverError>,
    /// Names of the failed validity checks
    pub violations: Vec<&'static str>,
    /// Consecutive bad cycles after this one
    pub consecutive_failures: u32,
    /// Wall-clock duration of the cycle [ms]
    pub elapsed_ms: f64,
}

/// Online receding-horizon trajectory planner
///
/// Holds the configuration, the solver, the last accepted trajectory and
/// the failure counter. Nothing else survives between cycles.
pub struct TrajectoryPlanner<S: OcpSolver = ShootingSolver> {
    config: PlannerConfig,
    solver: S,
    previous: Option<Trajectory>,
    failures: FailureTracker,
    phase: PlanningPhase,
    last_report: CycleReport,
}

impl TrajectoryPlanner<ShootingSolver> {
    /// Planner with the built-in shooting solver
    pub fn new(config: PlannerConfig) -> Self {
        Self::with_solver(config, ShootingSolver::new())
    }
}

impl Default for TrajectoryPlanner<ShootingSolver> {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl<S: OcpSolver> TrajectoryPlanner<S> {
    /// Planner with a custom solver
    pub fn with_solver(config: PlannerConfig, solver: S) -> Self {
        let failures = FailureTracker::new(config.validation.max_consecutive_failures);
        Self {
            config,
            solver,
            previous: None,
            failures,
            phase: PlanningPhase::Idle,
            last_report: CycleReport::default(),
        }
    }

    /// Apply named tuning values, effective from the next cycle
    pub fn set_parameters(&mut self, params: &TuningParameters) {
        self.config.apply_tuning(params);
    }

    /// Replace the whole configuration
    pub fn set_config(&mut self, config: PlannerConfig) {
        self.failures.set_limit(config.validation.max_consecutive_failures);
        self.config = config;
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn phase(&self) -> PlanningPhase {
        self.phase
    }

    pub fn last_report(&self) -> &CycleReport {
        &self.last_report
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    /// Last accepted trajectory
    pub fn previous_trajectory(&self) -> Option<&Trajectory> {
        self.previous.as_ref()
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    /// Forget the fallback trajectory, the failure count and any solver
    /// warm start
    pub fn reset(&mut self) {
        self.solver.reset();
        self.previous = None;
        self.failures = FailureTracker::new(self.config.validation.max_consecutive_failures);
        self.phase = PlanningPhase::Idle;
        self.last_report = CycleReport::default();
    }

    /// Run one planning cycle
    ///
    /// Returns the new trajectory when it passes validation, otherwise the
    /// last accepted one (empty if there is none).
    pub fn plan_trajectory<R, M>(
        &mut self,
        route: &R,
        vehicle: &VehicleState,
        map: &M,
        traffic: &TrafficParticipantSet,
    ) -> Trajectory
    where
        R: Route + ?Sized,
        M: RoadMap + ?Sized,
    {
        let start = Instant::now();
        let mut report = CycleReport::default();

        self.phase = PlanningPhase::BuildingReference;
        let Some(reference) = build_reference(route, vehicle, &self.config) else {
            report.consecutive_failures = self.failures.consecutive_failures();
            return self.finish(PlanningPhase::Rejected, report, start);
        };

        let bounds = VelocityPlanner::new(&self.config).plan(route, &reference, vehicle, map, traffic);
        report.bounds = Some(bounds);

        self.phase = PlanningPhase::Solving;
        let context = CycleContext::new(&self.config, bounds.reference);
        let problem = OcpProblem::new(context, &reference);
        let options = SolveOptions::from_config(&self.config);
        let x0 = initial_state(vehicle);
        let result = self
            .solver
            .solve(&problem, vehicle.time, &x0, &InputVector::zeros(), &options);

        self.phase = PlanningPhase::Validating;
        let candidate = match result {
            Ok(output) => {
                let evaluation = SolutionValidator::from_config(&self.config).evaluate(&output);
                report.objective = Some(output.objective);
                report.violations = evaluation.violated().collect();
                report.stats = Some(output.stats.clone());
                evaluation
                    .all_satisfied
                    .then(|| to_trajectory(&output, options.time_step))
            }
            Err(e) => {
                warn!("Solver failed: {e}");
                report.solver_error = Some(e);
                None
            }
        };

        let accepted = self.failures.record(candidate.is_none());
        report.consecutive_failures = self.failures.consecutive_failures();

        match candidate {
            Some(trajectory) if accepted => {
                self.previous = Some(trajectory);
                self.finish(PlanningPhase::Accepted, report, start)
            }
            _ => {
                if !report.violations.is_empty() {
                    debug!("Rejected solution, failed checks: {:?}", report.violations);
                }
                self.finish(PlanningPhase::Rejected, report, start)
            }
        }
    }

    fn finish(&mut self, phase: PlanningPhase, mut report: CycleReport, start: Instant) -> Trajectory {
        self.phase = phase;
        report.phase = phase;
        report.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "Planning cycle {:?} in {:.2} ms: reference velocity {:?}, objective {:?}, failures {}",
            phase,
            report.elapsed_ms,
            report.bounds.map(|b| b.reference),
            report.objective,
            report.consecutive_failures
        );
        self.last_report = report;
        self.previous.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Lane, LaneMap};
    use crate::route::PolylineRoute;
    use crate::solver::SolverOutput;
    use nalgebra::Point2;
    use trajopt_core::dynamics::StateVector;

    /// Solver returning a fixed objective with constant states
    struct FixedSolver {
        objective: f64,
        calls: usize,
    }

    impl OcpSolver for FixedSolver {
        fn solve(
            &mut self,
            _problem: &OcpProblem<'_>,
            t0: f64,
            x0: &StateVector,
            _u0: &InputVector,
            options: &SolveOptions,
        ) -> Result<SolverOutput, SolverError> {
            self.calls += 1;
            Ok(SolverOutput {
                states: vec![*x0; options.control_points],
                inputs: vec![InputVector::zeros(); options.control_points - 1],
                times: (0..options.control_points)
                    .map(|k| t0 + k as f64 * options.time_step)
                    .collect(),
                objective: self.objective,
                stats: SolveStatistics::default(),
            })
        }
    }

    fn scene() -> (PolylineRoute, LaneMap) {
        let route = PolylineRoute::from_points((0..=100).map(|i| Point2::new(i as f64, 0.0)), 1);
        let map = LaneMap::new().with_lane(Lane::new(1, vec![Point2::new(0.0, 0.0), Point2::new(100.0, 0.0)], 3.5));
        (route, map)
    }

    #[test]
    fn test_failure_tracker_wraps_after_limit() {
        let mut tracker = FailureTracker::new(5);
        for expected in [1, 2, 3, 4, 0, 1] {
            assert!(!tracker.record(true));
            assert_eq!(tracker.consecutive_failures(), expected);
            assert!(tracker.is_current_invalid());
        }
        assert!(tracker.record(false));
        assert_eq!(tracker.consecutive_failures(), 0);
        assert!(!tracker.is_current_invalid());
    }

    #[test]
    fn test_failure_tracker_zero_limit_still_accepts() {
        let mut tracker = FailureTracker::new(0);
        assert!(!tracker.record(true));
        assert_eq!(tracker.consecutive_failures(), 0);
        assert!(tracker.record(false));
    }

    #[test]
    fn test_initial_phase() {
        let planner = TrajectoryPlanner::new(PlannerConfig::default());
        assert_eq!(planner.phase(), PlanningPhase::Idle);
        assert!(planner.previous_trajectory().is_none());
    }

    #[test]
    fn test_accepts_good_solution() {
        let (route, map) = scene();
        let mut planner = TrajectoryPlanner::with_solver(
            PlannerConfig::default(),
            FixedSolver {
                objective: 1.0,
                calls: 0,
            },
        );
        let vehicle = VehicleState::at_pose(0.0, 0.0, 0.0).with_velocity(2.0);

        let trajectory = planner.plan_trajectory(&route, &vehicle, &map, &TrafficParticipantSet::new());

        assert_eq!(planner.phase(), PlanningPhase::Accepted);
        assert_eq!(trajectory.len(), 30);
        assert_eq!(planner.previous_trajectory(), Some(&trajectory));
        assert_eq!(planner.solver().calls, 1);
        assert!(planner.last_report().bounds.is_some());
    }

    #[test]
    fn test_reference_failure_skips_solver() {
        let mut planner = TrajectoryPlanner::with_solver(
            PlannerConfig::default(),
            FixedSolver {
                objective: 1.0,
                calls: 0,
            },
        );
        let trajectory = planner.plan_trajectory(
            &PolylineRoute::default(),
            &VehicleState::default(),
            &LaneMap::new(),
            &TrafficParticipantSet::new(),
        );

        assert!(trajectory.is_empty());
        assert_eq!(planner.phase(), PlanningPhase::Rejected);
        assert_eq!(planner.solver().calls, 0);
        assert_eq!(planner.failures().consecutive_failures(), 0);
    }

    #[test]
    fn test_bad_objective_rejected() {
        let (route, map) = scene();
        let mut planner = TrajectoryPlanner::with_solver(
            PlannerConfig::default(),
            FixedSolver {
                objective: 1.0e4,
                calls: 0,
            },
        );
        let trajectory = planner.plan_trajectory(&route, &VehicleState::default(), &map, &TrafficParticipantSet::new());

        assert!(trajectory.is_empty());
        assert_eq!(planner.phase(), PlanningPhase::Rejected);
        assert_eq!(planner.failures().consecutive_failures(), 1);
        assert_eq!(planner.last_report().violations, vec!["objective"]);
    }

    #[test]
    fn test_set_parameters() {
        let mut planner = TrajectoryPlanner::new(PlannerConfig::default());
        let params: TuningParameters = [("maximum_velocity".to_string(), 9.0)].into_iter().collect();
        planner.set_parameters(&params);
        assert_eq!(planner.config().velocity.maximum_velocity, 9.0);
    }

    #[test]
    fn test_reset() {
        let (route, map) = scene();
        let mut planner = TrajectoryPlanner::with_solver(
            PlannerConfig::default(),
            FixedSolver {
                objective: 1.0,
                calls: 0,
            },
        );
        planner.plan_trajectory(&route, &VehicleState::default(), &map, &TrafficParticipantSet::new());
        assert!(planner.previous_trajectory().is_some());

        planner.reset();
        assert!(planner.previous_trajectory().is_none());
        assert_eq!(planner.phase(), PlanningPhase::Idle);
    }
}
