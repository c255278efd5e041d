//! # Fleet Geofence
//!
//! Computational core of a fleet/workforce geofencing dashboard.
//!
//! This library provides:
//! - Geofence activity windows (date range + daily time window + enable flag)
//! - Encoded polyline decoding for routing engine responses
//! - Route congestion matching for two-colour route rendering
//! - Validated conversion of the dashboard backend's JSON payloads
//!
//! The core functions are pure: they take every input (including "now") as a
//! parameter and never perform I/O.
//!
//! ## Features
//!
//! - **`parallel`** - Batch congestion matching with rayon
//! - **`http`** - Client for the dashboard backend and routing engine
//! - **`ffi`** - FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use fleet_geofence::{polyline, match_segments, Coordinate, DEFAULT_TOLERANCE};
//!
//! let route = polyline::decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
//! let slow = vec![Coordinate::new(40.7, -120.95)];
//!
//! let segments = match_segments(&route, &slow, DEFAULT_TOLERANCE);
//! assert_eq!(segments.len(), 2);
//! assert!(segments.iter().all(|s| s.congested));
//! ```

pub mod congestion;
pub mod error;
pub mod geo_utils;
pub mod geofence;
pub mod polyline;
pub mod violations;
pub mod wire;

// HTTP module for the dashboard backend
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{ClientConfig, DashboardClient, PollConfig, PollHandle, Poller};

pub use congestion::{
    congested_segments, congestion_runs, match_segments, match_segments_with_config,
    CongestionConfig, CongestionIndex, CongestionRun, RouteSegment, RouteSummary,
    DEFAULT_TOLERANCE, STRICT_TOLERANCE,
};
#[cfg(feature = "parallel")]
pub use congestion::match_segments_batch;
pub use error::{GeofenceError, Result};
pub use geofence::{
    active_geofences, combined_bounds, evaluate_location, is_active, Geofence, GeofenceWindow,
    ZoneKind,
};
pub use polyline::decode;
pub use violations::{filter_violations, ViolationFilter, ViolationRecord, ViolationType};

use serde::{Deserialize, Serialize};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("FleetGeofenceRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in degrees.
///
/// # Example
/// ```
/// use fleet_geofence::Coordinate;
/// let point = Coordinate::new(33.6844, 73.0479); // Islamabad
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box, used to fit the map view around geofences and routes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points. `None` for an empty slice.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Whether `p` lies inside or on the box.
    pub fn contains(&self, p: &Coordinate) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lng
            && p.longitude <= self.max_lng
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use chrono::NaiveDateTime;
    use log::{debug, info};

    /// A geofence window as plain strings, the way mobile hosts hold it.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiGeofenceWindow {
        pub start_date: String,
        pub end_date: String,
        pub start_time: String,
        pub end_time: String,
        pub is_active_flag: bool,
    }

    /// Whether a geofence window is open.
    ///
    /// `now` is a local wall-clock timestamp, `YYYY-MM-DDTHH:MM[:SS]`.
    #[uniffi::export]
    pub fn is_geofence_active(
        window: FfiGeofenceWindow,
        now: String,
    ) -> std::result::Result<bool, GeofenceError> {
        init_logging();
        let window = GeofenceWindow::new(
            &window.start_date,
            &window.end_date,
            &window.start_time,
            &window.end_time,
            window.is_active_flag,
        )?;
        let now = NaiveDateTime::parse_from_str(&now, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(&now, "%Y-%m-%dT%H:%M"))
            .map_err(|_| GeofenceError::InvalidFormatError(format!("expected local timestamp, got {:?}", now)))?;
        let active = is_active(&window, now)?;
        debug!("[FleetGeofenceRust] is_geofence_active at {} -> {}", now, active);
        Ok(active)
    }

    /// Decode an encoded polyline.
    #[uniffi::export]
    pub fn decode_polyline(encoded: String) -> std::result::Result<Vec<Coordinate>, GeofenceError> {
        init_logging();
        let points = polyline::decode(&encoded)?;
        info!("[FleetGeofenceRust] Decoded polyline into {} points", points.len());
        Ok(points)
    }

    /// Encode a route as a polyline.
    #[uniffi::export]
    pub fn encode_polyline(points: Vec<Coordinate>) -> String {
        init_logging();
        polyline::encode(&points)
    }

    /// Tag route segments as congested.
    #[uniffi::export]
    pub fn match_route_segments(
        route: Vec<Coordinate>,
        congested_points: Vec<Coordinate>,
        config: CongestionConfig,
    ) -> Vec<RouteSegment> {
        init_logging();
        let segments = match_segments_with_config(&route, &congested_points, &config);
        info!(
            "[FleetGeofenceRust] Matched {} segments against {} congested points",
            segments.len(),
            congested_points.len()
        );
        segments
    }

    /// Tag segments for many routes against one congestion report.
    #[uniffi::export]
    pub fn match_route_segments_batch(
        routes: Vec<Vec<Coordinate>>,
        congested_points: Vec<Coordinate>,
        config: CongestionConfig,
    ) -> Vec<Vec<RouteSegment>> {
        init_logging();
        let start = std::time::Instant::now();
        let result = match_segments_batch(&routes, &congested_points, config.tolerance);
        info!(
            "[FleetGeofenceRust] Batch matched {} routes in {:?}",
            routes.len(),
            start.elapsed()
        );
        result
    }

    /// Coalesce tagged segments into drawable runs.
    #[uniffi::export]
    pub fn route_congestion_runs(segments: Vec<RouteSegment>) -> Vec<CongestionRun> {
        init_logging();
        congestion_runs(&segments)
    }

    /// Length statistics for tagged segments.
    #[uniffi::export]
    pub fn route_summary(segments: Vec<RouteSegment>) -> RouteSummary {
        init_logging();
        RouteSummary::from_segments(&segments)
    }

    /// Box around a route or a geofence ring, for fitting the map view.
    #[uniffi::export]
    pub fn route_bounds(points: Vec<Coordinate>) -> Option<Bounds> {
        init_logging();
        Bounds::from_points(&points)
    }

    /// Get default congestion configuration.
    #[uniffi::export]
    pub fn default_congestion_config() -> CongestionConfig {
        init_logging();
        CongestionConfig::default()
    }
}

// ============================================================================
// Tests
// ============================================================================
