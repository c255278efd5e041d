//! # Geographic Utilities
//!
//! Small conversions and measurements shared by the geofence and congestion
//! modules.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two coordinates |
//! | [`route_length`] | Total length of a route in meters |
//! | [`to_point`] | Coordinate as a `geo` point (x = longitude) |
//! | [`to_polygon`] | Geofence boundary ring as a `geo` polygon |
//!
//! All functions expect WGS84 latitude/longitude in degrees.
//!
//! ## Example
//!
//! ```rust
//! use fleet_geofence::{Coordinate, geo_utils};
//!
//! let route = vec![
//!     Coordinate::new(33.5954, 73.0512),
//!     Coordinate::new(33.6001, 73.0473),
//!     Coordinate::new(33.6194, 73.0200),
//! ];
//!
//! let length = geo_utils::route_length(&route);
//! assert!(length > 3_500.0 && length < 4_500.0);
//! ```

use geo::{Coord, Distance, Haversine, LineString, Point, Polygon};

use crate::Coordinate;

/// Great-circle distance in meters between two coordinates (spherical Earth,
/// radius 6,371 km).
#[inline]
pub fn haversine_distance(p1: &Coordinate, p2: &Coordinate) -> f64 {
    Haversine::distance(to_point(p1), to_point(p2))
}

/// Sum of the haversine distances between consecutive route points.
///
/// Empty and single-point routes have zero length.
pub fn route_length(points: &[Coordinate]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Convert to a `geo` point. `geo` stores longitude in `x`.
#[inline]
pub fn to_point(p: &Coordinate) -> Point<f64> {
    Point::new(p.longitude, p.latitude)
}

/// Build a polygon from a boundary ring.
///
/// The ring does not need to repeat its first vertex; `geo` closes it.
pub fn to_polygon(boundary: &[Coordinate]) -> Polygon<f64> {
    let ring: Vec<Coord> = boundary
        .iter()
        .map(|p| Coord { x: p.longitude, y: p.latitude })
        .collect();
    Polygon::new(LineString::new(ring), vec![])
}
