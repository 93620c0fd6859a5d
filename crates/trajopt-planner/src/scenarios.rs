//! Canned road scenarios
//!
//! Single-lane routes built from constant-curvature pieces, with a matching
//! lane map. Used by the integration tests and the demo binary.

use nalgebra::Point2;

use trajopt_core::vehicle::VehicleState;

use crate::map::{Lane, LaneId, LaneMap, ParticipantId, TrafficParticipant, TrafficParticipantSet};
use crate::route::{PolylineRoute, Route};

/// Lane width of every scenario [m]
pub const LANE_WIDTH: f64 = 3.5;
/// Arc-length between centerline samples [m]
pub const SAMPLE_SPACING: f64 = 0.1;

const LANE: LaneId = 1;

/// Route, map, traffic and start state of a driving scenario
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub route: PolylineRoute,
    pub map: LaneMap,
    pub traffic: TrafficParticipantSet,
    /// Vehicle state at the start of the route, at rest
    pub start: VehicleState,
}

impl Scenario {
    fn from_points(name: &'static str, points: Vec<Point2<f64>>) -> Self {
        let route = PolylineRoute::from_points(points.iter().copied(), LANE);
        let map = LaneMap::new().with_lane(Lane::new(LANE, points, LANE_WIDTH));
        let start = match route.pose_at(0.0) {
            Some(pose) => VehicleState::at_pose(pose.position.x, pose.position.y, pose.heading),
            None => VehicleState::default(),
        };
        Self {
            name,
            route,
            map,
            traffic: TrafficParticipantSet::new(),
            start,
        }
    }

    /// Set the lane speed limit [m/s]
    pub fn with_speed_limit(mut self, limit: f64) -> Self {
        if let Some(lane) = self.map.lane(LANE).cloned() {
            self.map.add_lane(lane.with_speed_limit(limit));
        }
        self
    }

    /// Add a participant standing on the centerline `s` meters along the route
    pub fn with_stationary_participant(mut self, id: ParticipantId, s: f64) -> Self {
        if let Some(pose) = self.route.pose_at(s) {
            let state = VehicleState::at_pose(pose.position.x, pose.position.y, pose.heading);
            self.traffic.insert(id, TrafficParticipant::new(id, state));
        }
        self
    }

    /// Start the vehicle moving at `vx`
    pub fn with_start_velocity(mut self, vx: f64) -> Self {
        self.start.vx = vx;
        self
    }
}

/// Sample a path of constant-curvature pieces `(length, curvature)`
///
/// Starts at the origin heading along +x; positive curvature turns left.
pub fn trace_path(pieces: &[(f64, f64)]) -> Vec<Point2<f64>> {
    let mut points = vec![Point2::origin()];
    let (mut x, mut y, mut heading) = (0.0_f64, 0.0_f64, 0.0_f64);

    for &(length, curvature) in pieces {
        let steps = (length / SAMPLE_SPACING).ceil().max(1.0) as usize;
        let ds = length / steps as f64;
        for _ in 0..steps {
            let next_heading = heading + curvature * ds;
            if curvature.abs() < 1e-12 {
                x += ds * heading.cos();
                y += ds * heading.sin();
            } else {
                x += (next_heading.sin() - heading.sin()) / curvature;
                y += (heading.cos() - next_heading.cos()) / curvature;
            }
            heading = next_heading;
            points.push(Point2::new(x, y));
        }
    }

    points
}

/// Straight road along +x
pub fn straight(length: f64) -> Scenario {
    Scenario::from_points("straight", trace_path(&[(length, 0.0)]))
}

/// Left-hand arc of constant radius
pub fn arc(radius: f64, angle: f64) -> Scenario {
    Scenario::from_points("arc", trace_path(&[(radius * angle, 1.0 / radius)]))
}

/// Straight lead-in, quarter turn left, quarter turn right, straight exit
pub fn s_curve(radius: f64) -> Scenario {
    let quarter = radius * std::f64::consts::FRAC_PI_2;
    Scenario::from_points(
        "s_curve",
        trace_path(&[(10.0, 0.0), (quarter, 1.0 / radius), (quarter, -1.0 / radius), (40.0, 0.0)]),
    )
}
