//! Route congestion segments.
//!
//! A routing engine returns a path; a congestion service returns a loose set of
//! points where traffic is slow. To draw the path in two colours, every pair
//! of adjacent route points becomes a [`RouteSegment`] that is congested when
//! either endpoint is near a congested point.
//!
//! "Near" is a box test, not a distance: both the latitude and the longitude
//! difference must be strictly below the tolerance (in degrees).
//!
//! ```rust
//! use fleet_geofence::{Coordinate, congestion};
//!
//! let route = vec![
//!     Coordinate::new(0.0, 0.0),
//!     Coordinate::new(0.0, 1.0),
//!     Coordinate::new(0.0, 2.0),
//! ];
//! let slow = vec![Coordinate::new(5.0, 5.0)];
//!
//! let segments = congestion::match_segments(&route, &slow, congestion::DEFAULT_TOLERANCE);
//! assert_eq!(segments.len(), 2);
//! assert!(segments.iter().all(|s| !s.congested));
//! ```

use log::debug;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_distance;
use crate::Coordinate;

/// Tolerance used when drawing a freshly requested route (degrees).
pub const DEFAULT_TOLERANCE: f64 = 0.0005;

/// Tighter tolerance used by the precomputed test route view (degrees).
pub const STRICT_TOLERANCE: f64 = 0.0001;

/// Configuration for congestion matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct CongestionConfig {
    /// Maximum per-axis difference, in degrees, for a route point to count
    /// as coincident with a congested point (exclusive).
    /// Default: 0.0005 (~55 m of latitude)
    pub tolerance: f64,
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Two adjacent route points and whether traffic is slow between them.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RouteSegment {
    pub start: Coordinate,
    pub end: Coordinate,
    pub congested: bool,
}

/// Box proximity test used for matching.
#[inline]
pub fn is_near(p: &Coordinate, c: &Coordinate, tolerance: f64) -> bool {
    (p.latitude - c.latitude).abs() < tolerance && (p.longitude - c.longitude).abs() < tolerance
}

/// Spatial index over reported congested points.
///
/// Build it once when the same report is matched against several routes.
pub struct CongestionIndex {
    tree: RTree<[f64; 2]>,
}

impl CongestionIndex {
    /// Index `congested_points`. Points with a non-finite coordinate can
    /// never be near anything and are left out.
    pub fn new(congested_points: &[Coordinate]) -> Self {
        let entries: Vec<[f64; 2]> = congested_points
            .iter()
            .filter(|c| c.latitude.is_finite() && c.longitude.is_finite())
            .map(|c| [c.latitude, c.longitude])
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Whether any indexed point is near `p`.
    ///
    /// The envelope query is inclusive, so every candidate is re-checked with
    /// the strict [`is_near`] test.
    pub fn is_congested(&self, p: &Coordinate, tolerance: f64) -> bool {
        if self.is_empty() {
            return false;
        }
        let envelope = AABB::from_corners(
            [p.latitude - tolerance, p.longitude - tolerance],
            [p.latitude + tolerance, p.longitude + tolerance],
        );
        self.tree
            .locate_in_envelope(&envelope)
            .any(|c| is_near(p, &Coordinate::new(c[0], c[1]), tolerance))
    }

    /// Split `route` into tagged segments against this index.
    pub fn match_route(&self, route: &[Coordinate], tolerance: f64) -> Vec<RouteSegment> {
        if route.len() < 2 {
            return Vec::new();
        }

        let flags: Vec<bool> = route
            .iter()
            .map(|p| self.is_congested(p, tolerance))
            .collect();

        route
            .windows(2)
            .zip(flags.windows(2))
            .map(|(pair, near)| RouteSegment {
                start: pair[0],
                end: pair[1],
                congested: near[0] || near[1],
            })
            .collect()
    }
}

/// Tag every consecutive pair of `route` as congested or not.
///
/// Routes with fewer than two points give no segments; otherwise there are
/// exactly `route.len() - 1`, in traversal order. With no congested points
/// every segment is clear. Inputs are not modified.
pub fn match_segments(
    route: &[Coordinate],
    congested_points: &[Coordinate],
    tolerance: f64,
) -> Vec<RouteSegment> {
    let segments = CongestionIndex::new(congested_points).match_route(route, tolerance);
    debug!(
        "[CongestionMatcher] {} route points, {} congested points -> {} segments ({} congested)",
        route.len(),
        congested_points.len(),
        segments.len(),
        segments.iter().filter(|s| s.congested).count()
    );
    segments
}

pub fn match_segments_with_config(
    route: &[Coordinate],
    congested_points: &[Coordinate],
    config: &CongestionConfig,
) -> Vec<RouteSegment> {
    match_segments(route, congested_points, config.tolerance)
}

/// Match many routes against one congestion report in parallel.
#[cfg(feature = "parallel")]
pub fn match_segments_batch(
    routes: &[Vec<Coordinate>],
    congested_points: &[Coordinate],
    tolerance: f64,
) -> Vec<Vec<RouteSegment>> {
    use rayon::prelude::*;

    let index = CongestionIndex::new(congested_points);
    routes
        .par_iter()
        .map(|route| index.match_route(route, tolerance))
        .collect()
}

/// Only the congested segments, in route order.
pub fn congested_segments(segments: &[RouteSegment]) -> Vec<RouteSegment> {
    segments.iter().filter(|s| s.congested).copied().collect()
}

/// A maximal stretch of consecutive segments with the same congestion state,
/// ready to be drawn as one polyline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct CongestionRun {
    pub congested: bool,
    pub points: Vec<Coordinate>,
}

/// Coalesce adjacent segments sharing a congestion state.
///
/// A run always holds at least two points; neighbouring runs share their
/// boundary point so the drawn line has no gaps.
pub fn congestion_runs(segments: &[RouteSegment]) -> Vec<CongestionRun> {
    let mut runs: Vec<CongestionRun> = Vec::new();

    for seg in segments {
        let extends_last = matches!(
            runs.last(),
            Some(run) if run.congested == seg.congested && run.points.last() == Some(&seg.start)
        );
        match runs.last_mut() {
            Some(run) if extends_last => run.points.push(seg.end),
            _ => runs.push(CongestionRun {
                congested: seg.congested,
                points: vec![seg.start, seg.end],
            }),
        }
    }

    runs
}

/// Length statistics over a tagged route.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RouteSummary {
    /// Total route length in meters
    pub total_meters: f64,
    /// Length of congested segments in meters
    pub congested_meters: f64,
    /// `congested_meters / total_meters`, 0 for a zero-length route
    pub congested_share: f64,
    pub segment_count: u64,
    pub congested_segment_count: u64,
}

impl RouteSummary {
    pub fn from_segments(segments: &[RouteSegment]) -> Self {
        let mut total_meters = 0.0;
        let mut congested_meters = 0.0;
        let mut congested_segment_count = 0u64;

        for seg in segments {
            let d = haversine_distance(&seg.start, &seg.end);
            total_meters += d;
            if seg.congested {
                congested_meters += d;
                congested_segment_count += 1;
            }
        }

        let congested_share = if total_meters > 0.0 {
            congested_meters / total_meters
        } else {
            0.0
        };

        Self {
            total_meters,
            congested_meters,
            congested_share,
            segment_count: segments.len() as u64,
            congested_segment_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_route() -> Vec<Coordinate> {
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 1.0),
            Coordinate::new(0.0, 2.0),
        ]
    }

    #[test]
    fn test_shared_endpoint_marks_both_segments() {
        let segments = match_segments(&straight_route(), &[Coordinate::new(0.0, 1.0)], 0.0005);
        assert_eq!(segments.len(), 2);
        assert!(segments[0].congested);
        assert!(segments[1].congested);
        assert_eq!(segments[0].start, Coordinate::new(0.0, 0.0));
        assert_eq!(segments[0].end, Coordinate::new(0.0, 1.0));
        assert_eq!(segments[1].end, Coordinate::new(0.0, 2.0));
    }

    #[test]
    fn test_far_point_marks_nothing() {
        let segments = match_segments(&straight_route(), &[Coordinate::new(5.0, 5.0)], 0.0005);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| !s.congested));
    }

    #[test]
    fn test_degenerate_routes_have_no_segments() {
        let slow = [Coordinate::new(0.0, 0.0)];
        assert!(match_segments(&[], &slow, DEFAULT_TOLERANCE).is_empty());
        assert!(match_segments(&[Coordinate::new(0.0, 0.0)], &slow, DEFAULT_TOLERANCE).is_empty());
    }

    #[test]
    fn test_segment_count_is_len_minus_one() {
        let route: Vec<Coordinate> = (0..25)
            .map(|i| Coordinate::new(33.6 + i as f64 * 0.001, 73.0))
            .collect();
        assert_eq!(match_segments(&route, &[], DEFAULT_TOLERANCE).len(), 24);
        let slow = [Coordinate::new(33.605, 73.0)];
        assert_eq!(match_segments(&route, &slow, DEFAULT_TOLERANCE).len(), 24);
    }

    #[test]
    fn test_tolerance_is_strict_and_per_axis() {
        let route = vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)];

        // Within tolerance on both axes
        let near = [Coordinate::new(0.0004, -0.0004)];
        assert!(match_segments(&route, &near, 0.0005)[0].congested);

        // Exactly on the tolerance is not near
        let edge = [Coordinate::new(0.25, 0.0)];
        assert!(!match_segments(&route, &edge, 0.25)[0].congested);

        // Close on latitude only
        let one_axis = [Coordinate::new(0.0001, 0.01)];
        assert!(!match_segments(&route, &one_axis, 0.0005)[0].congested);
    }

    #[test]
    fn test_tolerance_choice_changes_result() {
        let route = vec![Coordinate::new(33.6, 73.0), Coordinate::new(33.7, 73.1)];
        let slow = [Coordinate::new(33.6003, 73.0003)];
        assert!(match_segments(&route, &slow, DEFAULT_TOLERANCE)[0].congested);
        assert!(!match_segments(&route, &slow, STRICT_TOLERANCE)[0].congested);
    }

    #[test]
    fn test_index_agrees_with_brute_force() {
        let route: Vec<Coordinate> = (0..40)
            .map(|i| Coordinate::new(33.60 + i as f64 * 0.0003, 73.05 - i as f64 * 0.0002))
            .collect();
        let slow: Vec<Coordinate> = (0..15)
            .map(|i| Coordinate::new(33.6001 + i as f64 * 0.0007, 73.0499 - i as f64 * 0.0005))
            .collect();

        let segments = match_segments(&route, &slow, DEFAULT_TOLERANCE);
        for (i, seg) in segments.iter().enumerate() {
            let expected = slow.iter().any(|c| {
                is_near(&route[i], c, DEFAULT_TOLERANCE) || is_near(&route[i + 1], c, DEFAULT_TOLERANCE)
            });
            assert_eq!(seg.congested, expected, "segment {}", i);
        }
    }

    #[test]
    fn test_non_finite_congested_points_are_ignored() {
        let route = vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0)];
        let mut slow: Vec<Coordinate> = (0..200)
            .map(|i| Coordinate::new(10.0 + i as f64 * 0.01, 20.0 - i as f64 * 0.01))
            .collect();
        slow[7] = Coordinate::new(f64::NAN, 0.0);
        slow[42] = Coordinate::new(0.0, f64::INFINITY);

        let segments = match_segments(&route, &slow, DEFAULT_TOLERANCE);
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].congested);

        slow[150] = Coordinate::new(0.0, 1.0);
        let segments = match_segments(&route, &slow, DEFAULT_TOLERANCE);
        assert!(segments[0].congested);
    }

    #[test]
    fn test_config_default_tolerance() {
        let config = CongestionConfig::default();
        assert_eq!(config.tolerance, DEFAULT_TOLERANCE);
        let parsed: CongestionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, config);
        let strict: CongestionConfig = serde_json::from_str(r#"{"tolerance": 0.0001}"#).unwrap();
        assert_eq!(strict.tolerance, STRICT_TOLERANCE);
    }

    #[test]
    fn test_congested_segments_keeps_order() {
        let route: Vec<Coordinate> = (0..6).map(|i| Coordinate::new(0.0, i as f64)).collect();
        let slow = [Coordinate::new(0.0, 1.0), Coordinate::new(0.0, 5.0)];
        let segments = match_segments(&route, &slow, DEFAULT_TOLERANCE);
        let hot = congested_segments(&segments);
        let starts: Vec<f64> = hot.iter().map(|s| s.start.longitude).collect();
        assert_eq!(starts, vec![0.0, 1.0, 4.0]);
    }

    #[test]
    fn test_congestion_runs_coalesce() {
        let route: Vec<Coordinate> = (0..6).map(|i| Coordinate::new(0.0, i as f64)).collect();
        let slow = [Coordinate::new(0.0, 1.0)];
        let runs = congestion_runs(&match_segments(&route, &slow, DEFAULT_TOLERANCE));

        assert_eq!(runs.len(), 2);
        assert!(runs[0].congested);
        assert_eq!(runs[0].points.len(), 3);
        assert!(!runs[1].congested);
        assert_eq!(runs[1].points.len(), 4);
        assert_eq!(runs[0].points.last(), runs[1].points.first());
        assert!(congestion_runs(&[]).is_empty());
    }

    #[test]
    fn test_route_summary() {
        let route: Vec<Coordinate> = (0..5).map(|i| Coordinate::new(0.0, i as f64 * 0.01)).collect();
        let slow = [Coordinate::new(0.0, 0.0)];
        let summary = RouteSummary::from_segments(&match_segments(&route, &slow, DEFAULT_TOLERANCE));

        assert_eq!(summary.segment_count, 4);
        assert_eq!(summary.congested_segment_count, 1);
        assert!((summary.congested_share - 0.25).abs() < 1e-9);
        assert!(summary.total_meters > 4_000.0 && summary.total_meters < 5_000.0);

        let empty = RouteSummary::from_segments(&[]);
        assert_eq!(empty.congested_share, 0.0);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_batch_matches_sequential() {
        let routes = vec![straight_route(), vec![Coordinate::new(0.0, 1.0)], straight_route()];
        let slow = [Coordinate::new(0.0, 2.0)];
        let batch = match_segments_batch(&routes, &slow, DEFAULT_TOLERANCE);
        assert_eq!(batch.len(), 3);
        assert!(batch[1].is_empty());
        assert_eq!(batch[0], match_segments(&routes[0], &slow, DEFAULT_TOLERANCE));
        assert!(!batch[2][0].congested);
        assert!(batch[2][1].congested);
    }
}
