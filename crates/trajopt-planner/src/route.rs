//! Route geometry port
//!
//! The planner reads the route it has to follow through the [`Route`]
//! trait. [`PolylineRoute`] is an in-memory implementation over a sampled
//! centerline.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::map::{LaneId, MapPoint};

/// One sample of the route centerline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenterlinePoint {
    /// Arc-length along the route [m]
    pub s: f64,
    /// Position in the map frame
    pub position: Point2<f64>,
    /// Lane the sample belongs to
    pub lane: LaneId,
    /// Arc-length along that lane [m]
    pub lane_s: f64,
}

/// Position and tangent heading at an arc-length
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutePose {
    pub position: Point2<f64>,
    pub heading: f64,
}

/// Route geometry queried by the planner
pub trait Route {
    /// Centerline samples ordered by strictly increasing arc-length
    fn centerline(&self) -> &[CenterlinePoint];

    /// Total route length [m]
    fn length(&self) -> f64;

    /// Arc-length of the closest centerline point to `point`
    fn project(&self, point: &Point2<f64>) -> f64;

    /// Pose on the centerline at arc-length `s`
    fn pose_at(&self, s: f64) -> Option<RoutePose>;

    /// Map point (lane and lane arc-length) at route arc-length `s`
    fn map_point_at(&self, s: f64) -> Option<MapPoint>;
}

/// Route over a piecewise-linear centerline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolylineRoute {
    points: Vec<CenterlinePoint>,
}

impl PolylineRoute {
    /// Build a route from positions tagged with their lane
    ///
    /// Consecutive duplicate positions are dropped so arc-length stays
    /// strictly increasing. Lane arc-length restarts at every lane change.
    pub fn new(samples: impl IntoIterator<Item = (Point2<f64>, LaneId)>) -> Self {
        let mut points: Vec<CenterlinePoint> = Vec::new();
        let mut lane_start = 0.0;

        for (position, lane) in samples {
            let point = match points.last() {
                None => CenterlinePoint {
                    s: 0.0,
                    position,
                    lane,
                    lane_s: 0.0,
                },
                Some(prev) => {
                    let step = (position - prev.position).norm();
                    if step <= f64::EPSILON {
                        continue;
                    }
                    let s = prev.s + step;
                    if lane != prev.lane {
                        lane_start = s;
                    }
                    CenterlinePoint {
                        s,
                        position,
                        lane,
                        lane_s: s - lane_start,
                    }
                }
            };
            points.push(point);
        }

        Self { points }
    }

    /// Build a single-lane route
    pub fn from_points(positions: impl IntoIterator<Item = Point2<f64>>, lane: LaneId) -> Self {
        Self::new(positions.into_iter().map(|p| (p, lane)))
    }

    /// Index of the centerline segment containing `s`
    fn segment_at(&self, s: f64) -> Option<usize> {
        match self.points.len() {
            0 => None,
            1 => Some(0),
            n => Some(self.points.partition_point(|p| p.s <= s).saturating_sub(1).min(n - 2)),
        }
    }
}

impl Route for PolylineRoute {
    fn centerline(&self) -> &[CenterlinePoint] {
        &self.points
    }

    fn length(&self) -> f64 {
        self.points.last().map(|p| p.s).unwrap_or(0.0)
    }

    fn project(&self, point: &Point2<f64>) -> f64 {
        if self.points.len() < 2 {
            return self.points.first().map(|p| p.s).unwrap_or(0.0);
        }

        let mut best_s = 0.0;
        let mut best_distance = f64::INFINITY;
        for w in self.points.windows(2) {
            let segment = w[1].position - w[0].position;
            let length_sq = segment.norm_squared();
            let t = ((point - w[0].position).dot(&segment) / length_sq).clamp(0.0, 1.0);
            let foot = w[0].position + segment * t;
            let distance = (point - foot).norm();
            if distance < best_distance {
                best_distance = distance;
                best_s = w[0].s + t * (w[1].s - w[0].s);
            }
        }
        best_s
    }

    fn pose_at(&self, s: f64) -> Option<RoutePose> {
        let idx = self.segment_at(s)?;
        let a = &self.points[idx];
        let Some(b) = self.points.get(idx + 1) else {
            return Some(RoutePose {
                position: a.position,
                heading: 0.0,
            });
        };

        let t = ((s - a.s) / (b.s - a.s)).clamp(0.0, 1.0);
        let direction = b.position - a.position;
        Some(RoutePose {
            position: a.position + direction * t,
            heading: direction.y.atan2(direction.x),
        })
    }

    fn map_point_at(&self, s: f64) -> Option<MapPoint> {
        let idx = self.segment_at(s)?;
        let a = &self.points[idx];
        let clamped = s.clamp(0.0, self.length());
        let position = self.pose_at(clamped)?.position;

        // A lane-change segment belongs to whichever end is nearer
        let (lane, lane_s) = match self.points.get(idx + 1) {
            Some(b) if b.lane != a.lane && b.s - clamped < clamped - a.s => {
                (b.lane, (b.lane_s - (b.s - clamped)).max(0.0))
            }
            _ => (a.lane, a.lane_s + (clamped - a.s).max(0.0)),
        };
        Some(MapPoint { position, lane, s: lane_s })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn l_shaped_route() -> PolylineRoute {
        PolylineRoute::new(vec![
            (Point2::new(0.0, 0.0), 1),
            (Point2::new(10.0, 0.0), 1),
            (Point2::new(10.0, 10.0), 2),
            (Point2::new(10.0, 20.0), 2),
        ])
    }

    #[test]
    fn test_arc_length_accumulates() {
        let route = l_shaped_route();
        let s: Vec<f64> = route.centerline().iter().map(|p| p.s).collect();
        assert_eq!(s, vec![0.0, 10.0, 20.0, 30.0]);
        assert_relative_eq!(route.length(), 30.0);
    }

    #[test]
    fn test_lane_arc_length_restarts_on_lane_change() {
        let route = l_shaped_route();
        let lane_s: Vec<f64> = route.centerline().iter().map(|p| p.lane_s).collect();
        assert_eq!(lane_s, vec![0.0, 10.0, 0.0, 10.0]);
    }

    #[test]
    fn test_duplicate_points_dropped() {
        let route = PolylineRoute::from_points(
            vec![Point2::new(0.0, 0.0), Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)],
            7,
        );
        assert_eq!(route.centerline().len(), 2);
    }

    #[test]
    fn test_project() {
        let route = l_shaped_route();
        assert_relative_eq!(route.project(&Point2::new(4.0, 1.5)), 4.0, epsilon = 1e-12);
        assert_relative_eq!(route.project(&Point2::new(11.0, 15.0)), 25.0, epsilon = 1e-12);
        assert_relative_eq!(route.project(&Point2::new(-3.0, 0.0)), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pose_at() {
        let route = l_shaped_route();
        let pose = route.pose_at(15.0).unwrap();
        assert_relative_eq!(pose.position.x, 10.0, epsilon = 1e-12);
        assert_relative_eq!(pose.position.y, 5.0, epsilon = 1e-12);
        assert_relative_eq!(pose.heading, std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_map_point_at() {
        let route = l_shaped_route();
        let first = route.map_point_at(4.0).unwrap();
        assert_eq!(first.lane, 1);
        assert_relative_eq!(first.s, 4.0, epsilon = 1e-12);

        let second = route.map_point_at(27.0).unwrap();
        assert_eq!(second.lane, 2);
        assert_relative_eq!(second.s, 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_map_point_on_lane_change_segment() {
        let route = l_shaped_route();
        let early = route.map_point_at(12.0).unwrap();
        assert_eq!(early.lane, 1);
        assert_relative_eq!(early.s, 12.0, epsilon = 1e-12);

        let late = route.map_point_at(18.0).unwrap();
        assert_eq!(late.lane, 2);
        assert_relative_eq!(late.s, 0.0, epsilon = 1e-12);
        assert_relative_eq!(late.position.y, 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_route() {
        let route = PolylineRoute::default();
        assert!(route.centerline().is_empty());
        assert_relative_eq!(route.length(), 0.0);
        assert!(route.pose_at(1.0).is_none());
        assert!(route.map_point_at(1.0).is_none());
    }
}
