//! Road map and traffic ports
//!
//! [`RoadMap`] answers the lane queries the velocity planner needs. The
//! in-memory [`LaneMap`] stores each lane as a polyline and does a linear
//! scan for nearest-point queries.

use std::collections::BTreeMap;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use trajopt_core::vehicle::VehicleState;

/// Lane identifier
pub type LaneId = u64;

/// Traffic participant identifier
pub type ParticipantId = u64;

/// Point on a lane centerline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub position: Point2<f64>,
    pub lane: LaneId,
    /// Arc-length along the lane [m]
    pub s: f64,
}

/// Lane queries used by the planner
pub trait RoadMap {
    /// Closest lane centerline point to `point`
    fn nearest_point(&self, point: &Point2<f64>) -> Option<MapPoint>;

    /// Lane width at lane arc-length `s`, `None` for unknown lanes
    fn lane_width(&self, lane: LaneId, s: f64) -> Option<f64>;

    /// Speed limit of a lane [m/s], `None` when the lane has none
    fn lane_speed_limit(&self, lane: LaneId) -> Option<f64>;
}

/// Single lane of a [`LaneMap`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneId,
    /// Centerline samples
    pub centerline: Vec<Point2<f64>>,
    /// Constant lane width [m]
    pub width: f64,
    /// Speed limit [m/s]
    pub speed_limit: Option<f64>,
}

impl Lane {
    pub fn new(id: LaneId, centerline: Vec<Point2<f64>>, width: f64) -> Self {
        Self {
            id,
            centerline,
            width,
            speed_limit: None,
        }
    }

    pub fn with_speed_limit(mut self, speed_limit: f64) -> Self {
        self.speed_limit = Some(speed_limit);
        self
    }

    /// Centerline length [m]
    pub fn length(&self) -> f64 {
        self.centerline.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// Closest centerline point and its distance to `point`
    fn nearest(&self, point: &Point2<f64>) -> Option<(MapPoint, f64)> {
        let first = self.centerline.first()?;
        let mut best = (
            MapPoint {
                position: *first,
                lane: self.id,
                s: 0.0,
            },
            (point - first).norm(),
        );

        let mut lane_s = 0.0;
        for w in self.centerline.windows(2) {
            let segment = w[1] - w[0];
            let length = segment.norm();
            if length <= f64::EPSILON {
                continue;
            }
            let t = ((point - w[0]).dot(&segment) / (length * length)).clamp(0.0, 1.0);
            let foot = w[0] + segment * t;
            let distance = (point - foot).norm();
            if distance < best.1 {
                best = (
                    MapPoint {
                        position: foot,
                        lane: self.id,
                        s: lane_s + t * length,
                    },
                    distance,
                );
            }
            lane_s += length;
        }

        Some(best)
    }
}

/// In-memory road map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneMap {
    lanes: BTreeMap<LaneId, Lane>,
}

impl LaneMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a lane, replacing any lane with the same id
    pub fn add_lane(&mut self, lane: Lane) {
        self.lanes.insert(lane.id, lane);
    }

    pub fn with_lane(mut self, lane: Lane) -> Self {
        self.add_lane(lane);
        self
    }

    pub fn lane(&self, id: LaneId) -> Option<&Lane> {
        self.lanes.get(&id)
    }

    pub fn num_lanes(&self) -> usize {
        self.lanes.len()
    }
}

impl RoadMap for LaneMap {
    fn nearest_point(&self, point: &Point2<f64>) -> Option<MapPoint> {
        self.lanes
            .values()
            .filter_map(|lane| lane.nearest(point))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(map_point, _)| map_point)
    }

    fn lane_width(&self, lane: LaneId, _s: f64) -> Option<f64> {
        self.lanes.get(&lane).map(|l| l.width)
    }

    fn lane_speed_limit(&self, lane: LaneId) -> Option<f64> {
        self.lanes.get(&lane).and_then(|l| l.speed_limit)
    }
}

/// Other road user observed in the scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficParticipant {
    pub id: ParticipantId,
    pub state: VehicleState,
}

impl TrafficParticipant {
    pub fn new(id: ParticipantId, state: VehicleState) -> Self {
        Self { id, state }
    }
}

/// Traffic snapshot keyed by participant id
pub type TrafficParticipantSet = BTreeMap<ParticipantId, TrafficParticipant>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_lane_map() -> LaneMap {
        LaneMap::new()
            .with_lane(Lane::new(
                1,
                vec![Point2::new(0.0, 0.0), Point2::new(50.0, 0.0)],
                3.5,
            ))
            .with_lane(
                Lane::new(2, vec![Point2::new(0.0, 4.0), Point2::new(50.0, 4.0)], 3.0)
                    .with_speed_limit(8.0),
            )
    }

    #[test]
    fn test_nearest_point_picks_closest_lane() {
        let map = two_lane_map();

        let p = map.nearest_point(&Point2::new(12.0, 0.5)).unwrap();
        assert_eq!(p.lane, 1);
        assert_relative_eq!(p.s, 12.0, epsilon = 1e-12);
        assert_relative_eq!(p.position.y, 0.0, epsilon = 1e-12);

        let q = map.nearest_point(&Point2::new(30.0, 3.4)).unwrap();
        assert_eq!(q.lane, 2);
        assert_relative_eq!(q.s, 30.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lane_attributes() {
        let map = two_lane_map();
        assert_eq!(map.num_lanes(), 2);
        assert_eq!(map.lane_width(1, 10.0), Some(3.5));
        assert_eq!(map.lane_speed_limit(1), None);
        assert_eq!(map.lane_speed_limit(2), Some(8.0));
        assert_eq!(map.lane_width(9, 0.0), None);
        assert_relative_eq!(map.lane(2).unwrap().length(), 50.0);
    }

    #[test]
    fn test_empty_map() {
        let map = LaneMap::new();
        assert!(map.nearest_point(&Point2::origin()).is_none());
    }

    #[test]
    fn test_participant_set_is_ordered() {
        let mut traffic = TrafficParticipantSet::new();
        for id in [7, 2, 5] {
            traffic.insert(id, TrafficParticipant::new(id, VehicleState::default()));
        }
        let ids: Vec<_> = traffic.keys().copied().collect();
        assert_eq!(ids, vec![2, 5, 7]);
    }
}
