//! Closed-loop planning demo
//!
//! Drives a vehicle through the S-curve scenario by replanning every
//! 100 ms and following the returned trajectory.
//!
//! ```text
//! plan_demo [config.toml]
//! ```

use std::time::Instant;

use log::{info, warn, LevelFilter};
use thiserror::Error;

use trajopt_planner::config::ConfigError;
use trajopt_planner::route::Route;
use trajopt_planner::scenarios;
use trajopt_planner::{PlannerConfig, TrajectoryPlanner};

/// Time between planning cycles [s]
const PLANNING_PERIOD: f64 = 0.1;
const MAX_CYCLES: usize = 600;
/// Remaining route length at which the demo stops [m]
const GOAL_TOLERANCE: f64 = 5.0;

#[derive(Debug, Error)]
enum DemoError {
    #[error("An error occurred while setting up the logger: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn logger_init(min_level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let start = Instant::now();
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{:10.6} {:5}] {}: {}",
                start.elapsed().as_secs_f64(),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(min_level)
        .chain(std::io::stdout())
        .apply()
}

fn main() -> Result<(), DemoError> {
    logger_init(LevelFilter::Info)?;

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {path}");
            PlannerConfig::load(path)?
        }
        None => PlannerConfig::default(),
    };

    let scenario = scenarios::s_curve(20.0);
    info!(
        "Scenario {}: route length {:.1} m, {} centerline points",
        scenario.name,
        scenario.route.length(),
        scenario.route.centerline().len()
    );

    let mut planner = TrajectoryPlanner::new(config);
    let mut vehicle = scenario.start;

    for cycle in 0..MAX_CYCLES {
        let trajectory = planner.plan_trajectory(&scenario.route, &vehicle, &scenario.map, &scenario.traffic);
        let report = planner.last_report();

        let Some(next) = trajectory.state_at(vehicle.time + PLANNING_PERIOD) else {
            warn!("No trajectory available at cycle {cycle}, stopping");
            break;
        };

        info!(
            "cycle {cycle:3} {:?}: pos ({:7.2}, {:7.2}) v {:5.2} m/s, v_ref {:5.2}, objective {:.4}, {:.1} ms",
            report.phase,
            vehicle.x,
            vehicle.y,
            vehicle.vx,
            report.bounds.map(|b| b.reference).unwrap_or(0.0),
            report.objective.unwrap_or(f64::NAN),
            report.elapsed_ms
        );

        vehicle = next;
        if scenario.route.length() - scenario.route.project(&vehicle.position()) < GOAL_TOLERANCE {
            info!("Reached the end of the route after {} cycles", cycle + 1);
            break;
        }
    }

    Ok(())
}
