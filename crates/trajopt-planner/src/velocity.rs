//! Reference velocity planning
//!
//! The reference velocity for a cycle is the smallest of four bounds:
//!
//! - the configured cruise speed `maximum_velocity`
//! - a curvature bound `sqrt(a_lat / κmax)` over the lookahead window
//! - an intelligent-driver-model (IDM) bound from the closest in-lane
//!   participant ahead or the end of the route
//! - the speed limit of the lane nearest to the vehicle
//!
//! All bounds are non-negative, and so is the result.

use log::debug;
use serde::{Deserialize, Serialize};

use trajopt_core::vehicle::VehicleState;

use crate::config::PlannerConfig;
use crate::map::{RoadMap, TrafficParticipantSet};
use crate::reference::ReferenceRoute;
use crate::route::Route;

/// Individual velocity bounds of one cycle [m/s]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityBounds {
    /// Configured cruise speed
    pub maximum: f64,
    /// Curvature bound, infinite on straight references
    pub curvature: f64,
    /// Car-following bound
    pub idm: f64,
    /// Lane speed limit at the vehicle, if the map has one
    pub speed_limit: Option<f64>,
    /// Minimum of the above
    pub reference: f64,
}

impl VelocityBounds {
    fn combine(maximum: f64, curvature: f64, idm: f64, speed_limit: Option<f64>) -> Self {
        let mut reference = maximum.min(curvature).min(idm);
        if let Some(limit) = speed_limit {
            reference = reference.min(limit);
        }
        Self {
            maximum,
            curvature,
            idm,
            speed_limit,
            reference: reference.max(0.0),
        }
    }
}

/// Computes the reference velocity from route, map and traffic
#[derive(Debug, Clone, Copy)]
pub struct VelocityPlanner<'a> {
    config: &'a PlannerConfig,
}

impl<'a> VelocityPlanner<'a> {
    pub fn new(config: &'a PlannerConfig) -> Self {
        Self { config }
    }

    /// Reference velocity and the bounds it came from
    pub fn plan<R, M>(
        &self,
        route: &R,
        reference: &ReferenceRoute,
        vehicle: &VehicleState,
        map: &M,
        traffic: &TrafficParticipantSet,
    ) -> VelocityBounds
    where
        R: Route + ?Sized,
        M: RoadMap + ?Sized,
    {
        let curvature = self.curvature_velocity(reference, vehicle.vx);
        let idm = self.idm_velocity(route, vehicle, map, traffic);
        let speed_limit = map
            .nearest_point(&vehicle.position())
            .and_then(|p| map.lane_speed_limit(p.lane));

        let bounds = VelocityBounds::combine(self.config.velocity.maximum_velocity, curvature, idm, speed_limit);
        debug!(
            "Velocity bounds: max {:.2}, curvature {:.2}, idm {:.2}, limit {:?} -> {:.2}",
            bounds.maximum, bounds.curvature, bounds.idm, bounds.speed_limit, bounds.reference
        );
        bounds
    }

    /// Speed bound from the sharpest curve within the lookahead window
    ///
    /// Returns `f64::INFINITY` when the window has no curvature.
    pub fn curvature_velocity(&self, reference: &ReferenceRoute, velocity: f64) -> f64 {
        let params = &self.config.velocity;
        let s = &reference.samples.s;
        let segments = s.len().saturating_sub(1);
        if segments == 0 {
            return f64::INFINITY;
        }

        let lookahead = reference.x.find_segment(params.lookahead_time * velocity);
        let index = lookahead.max(params.safe_index).min(segments);

        let headings: Vec<f64> = s[..=index].iter().map(|&si| reference.heading.evaluate(si)).collect();
        let max_curvature = (0..index)
            .map(|i| ((headings[i + 1] - headings[i]) / (s[i + 1] - s[i])).abs())
            .fold(0.0, f64::max);

        if !(max_curvature > 0.0) || !max_curvature.is_finite() {
            return f64::INFINITY;
        }
        (params.lateral_acceleration / max_curvature)
            .sqrt()
            .max(params.minimum_velocity_in_curve)
    }

    /// Car-following bound from the intelligent driver model
    ///
    /// The gap is the distance to the closest in-lane participant ahead, or
    /// to the end of the route when that is closer. The result is clamped to
    /// `[0, max_forward_speed]`; degenerate inputs yield 0.
    pub fn idm_velocity<R, M>(
        &self,
        route: &R,
        vehicle: &VehicleState,
        map: &M,
        traffic: &TrafficParticipantSet,
    ) -> f64
    where
        R: Route + ?Sized,
        M: RoadMap + ?Sized,
    {
        let params = &self.config.velocity;
        let state_s = route.project(&vehicle.position());

        let distance_to_object = traffic
            .values()
            .filter_map(|participant| {
                let position = participant.state.position();
                let object_s = route.project(&position);
                let pose = route.pose_at(object_s)?;
                let map_point = route.map_point_at(object_s)?;
                let width = map.lane_width(map_point.lane, map_point.s)?;
                let offset = (position - pose.position).norm();
                let distance = object_s - state_s;
                (offset < width && distance > 0.0).then_some(distance)
            })
            .fold(f64::INFINITY, f64::min);

        let distance_to_goal = route.length() - state_s;
        let distance = distance_to_object.min(distance_to_goal);
        let gap = if distance_to_goal < distance_to_object {
            self.config.vehicle.wheel_base / 2.0
        } else {
            params.min_distance_to_vehicle_ahead
        };

        if !(distance > 0.0) || !(params.maximum_velocity > 0.0) {
            return 0.0;
        }

        let v = vehicle.vx;
        let s_star = gap
            + v * params.desired_time_headway
            + v * (v - params.front_vehicle_velocity)
                / (2.0 * (params.max_acceleration * params.max_deceleration).sqrt());
        let ratio = v / params.maximum_velocity;
        let acceleration = params.max_acceleration * (1.0 - ratio.powi(4) - (s_star / distance).powi(2));
        let velocity = v + acceleration;

        if !velocity.is_finite() {
            return 0.0;
        }
        velocity.clamp(0.0, self.config.vehicle.max_forward_speed.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Lane, LaneMap, TrafficParticipant};
    use crate::route::PolylineRoute;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    fn straight_route(length: f64) -> PolylineRoute {
        PolylineRoute::from_points((0..=length as usize).map(|i| Point2::new(i as f64, 0.0)), 1)
    }

    fn straight_map(length: f64) -> LaneMap {
        LaneMap::new().with_lane(Lane::new(1, vec![Point2::new(0.0, 0.0), Point2::new(length, 0.0)], 3.5))
    }

    #[test]
    fn test_straight_has_no_curvature_bound() {
        let config = PlannerConfig::default();
        let route = straight_route(100.0);
        let vehicle = VehicleState::default().with_velocity(4.0);
        let reference = ReferenceRoute::build(&route, &vehicle, &config).unwrap();

        let planner = VelocityPlanner::new(&config);
        assert_eq!(planner.curvature_velocity(&reference, 4.0), f64::INFINITY);
    }

    #[test]
    fn test_free_road_uses_maximum_velocity() {
        let config = PlannerConfig::default();
        let route = straight_route(200.0);
        let vehicle = VehicleState::default().with_velocity(4.0);
        let reference = ReferenceRoute::build(&route, &vehicle, &config).unwrap();

        let bounds = VelocityPlanner::new(&config).plan(
            &route,
            &reference,
            &vehicle,
            &straight_map(200.0),
            &TrafficParticipantSet::new(),
        );
        assert_relative_eq!(bounds.reference, config.velocity.maximum_velocity);
        assert!(bounds.idm > bounds.reference);
        assert_eq!(bounds.speed_limit, None);
    }

    #[test]
    fn test_idm_goal_reached_stops() {
        let config = PlannerConfig::default();
        let route = straight_route(50.0);
        let vehicle = VehicleState::at_pose(50.0, 0.0, 0.0).with_velocity(3.0);
        let idm = VelocityPlanner::new(&config).idm_velocity(&route, &vehicle, &straight_map(50.0), &TrafficParticipantSet::new());
        assert_eq!(idm, 0.0);
    }

    #[test]
    fn test_idm_ignores_participants_behind_and_off_lane() {
        let config = PlannerConfig::default();
        let route = straight_route(200.0);
        let map = straight_map(200.0);
        let vehicle = VehicleState::at_pose(50.0, 0.0, 0.0).with_velocity(3.0);
        let planner = VelocityPlanner::new(&config);

        let free = planner.idm_velocity(&route, &vehicle, &map, &TrafficParticipantSet::new());

        let mut traffic = TrafficParticipantSet::new();
        traffic.insert(1, TrafficParticipant::new(1, VehicleState::at_pose(40.0, 0.0, 0.0)));
        traffic.insert(2, TrafficParticipant::new(2, VehicleState::at_pose(60.0, 8.0, 0.0)));
        assert_relative_eq!(planner.idm_velocity(&route, &vehicle, &map, &traffic), free);

        traffic.insert(3, TrafficParticipant::new(3, VehicleState::at_pose(70.0, 0.5, 0.0)));
        assert!(planner.idm_velocity(&route, &vehicle, &map, &traffic) < free);
    }

    #[test]
    fn test_idm_unknown_lane_is_not_in_lane() {
        let config = PlannerConfig::default();
        let route = straight_route(200.0);
        let vehicle = VehicleState::default().with_velocity(3.0);
        let planner = VelocityPlanner::new(&config);

        let mut traffic = TrafficParticipantSet::new();
        traffic.insert(1, TrafficParticipant::new(1, VehicleState::at_pose(12.0, 0.0, 0.0)));

        let no_lanes = LaneMap::new();
        assert_relative_eq!(
            planner.idm_velocity(&route, &vehicle, &no_lanes, &traffic),
            planner.idm_velocity(&route, &vehicle, &no_lanes, &TrafficParticipantSet::new())
        );
    }

    #[test]
    fn test_idm_non_positive_maximum_velocity() {
        let mut config = PlannerConfig::default();
        config.velocity.maximum_velocity = 0.0;
        let route = straight_route(100.0);
        let vehicle = VehicleState::default().with_velocity(1.0);
        let idm = VelocityPlanner::new(&config).idm_velocity(&route, &vehicle, &straight_map(100.0), &TrafficParticipantSet::new());
        assert_eq!(idm, 0.0);
    }

    #[test]
    fn test_lane_speed_limit_binds() {
        let mut config = PlannerConfig::default();
        config.velocity.maximum_velocity = 10.0;
        let route = straight_route(200.0);
        let map = LaneMap::new().with_lane(
            Lane::new(1, vec![Point2::new(0.0, 0.0), Point2::new(200.0, 0.0)], 3.5).with_speed_limit(4.0),
        );
        let vehicle = VehicleState::default().with_velocity(4.0);
        let reference = ReferenceRoute::build(&route, &vehicle, &config).unwrap();

        let bounds = VelocityPlanner::new(&config).plan(&route, &reference, &vehicle, &map, &TrafficParticipantSet::new());
        assert_eq!(bounds.speed_limit, Some(4.0));
        assert_relative_eq!(bounds.reference, 4.0);
    }

    #[test]
    fn test_plan_is_idempotent() {
        let config = PlannerConfig::default();
        let route = straight_route(100.0);
        let map = straight_map(100.0);
        let vehicle = VehicleState::at_pose(5.0, 0.2, 0.0).with_velocity(3.5);
        let reference = ReferenceRoute::build(&route, &vehicle, &config).unwrap();
        let mut traffic = TrafficParticipantSet::new();
        traffic.insert(4, TrafficParticipant::new(4, VehicleState::at_pose(35.0, 0.0, 0.0)));

        let planner = VelocityPlanner::new(&config);
        let a = planner.plan(&route, &reference, &vehicle, &map, &traffic);
        let b = planner.plan(&route, &reference, &vehicle, &map, &traffic);
        assert_eq!(a, b);
    }
}
