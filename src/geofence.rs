//! Geofence activity windows and boundary checks.
//!
//! An employee's geofence assignment is only enforced while its window is
//! open: the calendar date must fall inside `[start_date, end_date]`, the time
//! of day inside `[start_time, end_time]`, and the assignment must be switched
//! on. Both ranges are inclusive. Times are compared at minute granularity and
//! a window whose start is after its end is never open (there is no wrap past
//! midnight).
//!
//! The evaluation instant is always passed in. Nothing here reads the clock.
//!
//! ```rust
//! use chrono::NaiveDate;
//! use fleet_geofence::geofence::{is_active, GeofenceWindow};
//!
//! let window = GeofenceWindow::new("2024-01-01", "2024-01-31", "09:00", "17:00", true).unwrap();
//! let now = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
//! assert!(is_active(&window, now).unwrap());
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use geo::Contains;
use log::debug;

use crate::error::{GeofenceError, Result};
use crate::geo_utils::{to_point, to_polygon};
use crate::violations::ViolationType;
use crate::{Bounds, Coordinate};

/// Temporal access rule of one employee-geofence assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceWindow {
    /// First day the assignment applies (inclusive)
    pub start_date: NaiveDate,
    /// Last day the assignment applies (inclusive)
    pub end_date: NaiveDate,
    /// Daily opening time, `HH:MM`
    pub start_time: String,
    /// Daily closing time, `HH:MM`
    pub end_time: String,
    /// Administrative enable switch
    pub is_active_flag: bool,
}

impl GeofenceWindow {
    /// Build a window from the string forms the backend sends.
    ///
    /// Dates and times are validated here so a bad record fails once, at
    /// construction, rather than on every evaluation.
    pub fn new(
        start_date: &str,
        end_date: &str,
        start_time: &str,
        end_time: &str,
        is_active_flag: bool,
    ) -> Result<Self> {
        parse_time_of_day(start_time)?;
        parse_time_of_day(end_time)?;
        Ok(Self {
            start_date: parse_calendar_date(start_date)?,
            end_date: parse_calendar_date(end_date)?,
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            is_active_flag,
        })
    }

    /// Method form of [`is_active`].
    pub fn is_active_at(&self, now: NaiveDateTime) -> Result<bool> {
        is_active(self, now)
    }
}

/// Whether `window` is open at `now`.
///
/// Fails with [`GeofenceError::InvalidFormatError`] if either time bound is
/// not `HH:MM` (or `HH:MM:SS`). Dates outside the range are simply `false`.
pub fn is_active(window: &GeofenceWindow, now: NaiveDateTime) -> Result<bool> {
    let start = minute_of_day(parse_time_of_day(&window.start_time)?);
    let end = minute_of_day(parse_time_of_day(&window.end_time)?);
    let current = minute_of_day(now.time());

    let within_time_window = current >= start && current <= end;

    let today = now.date();
    let within_date_range = today >= window.start_date && today <= window.end_date;

    Ok(within_time_window && within_date_range && window.is_active_flag)
}

/// Minutes since midnight; seconds and below are ignored.
#[inline]
fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Parse a time of day in `HH:MM` form.
///
/// `HH:MM:SS` is accepted as well since database `TIME` columns serialise that
/// way; the seconds are dropped.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    let invalid = || GeofenceError::InvalidFormatError(format!("expected HH:MM time, got {:?}", s));

    if !s.is_ascii() {
        return Err(invalid());
    }
    let parsed = match s.len() {
        5 => NaiveTime::parse_from_str(s, "%H:%M"),
        8 => NaiveTime::parse_from_str(s, "%H:%M:%S"),
        _ => return Err(invalid()),
    }
    .map_err(|_| invalid())?;

    NaiveTime::from_hms_opt(parsed.hour(), parsed.minute(), 0).ok_or_else(invalid)
}

/// Parse a calendar date.
///
/// Accepts `YYYY-MM-DD` and full timestamps (RFC 3339, or ISO 8601 without an
/// offset); for timestamps only the date part in the stated offset is kept.
pub fn parse_calendar_date(s: &str) -> Result<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.date());
    }
    Err(GeofenceError::InvalidFormatError(format!(
        "expected YYYY-MM-DD date, got {:?}",
        s
    )))
}

// ============================================================================
// Assigned geofences
// ============================================================================

/// A geofence assigned to an employee: its polygon plus its access window.
#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    pub id: String,
    pub name: String,
    pub window: GeofenceWindow,
    /// Boundary ring in drawing order; need not repeat the first vertex
    pub boundary: Vec<Coordinate>,
    /// Violation flag last reported by the backend
    pub is_violating: bool,
}

impl Geofence {
    /// Whether `point` lies strictly inside the boundary.
    ///
    /// Boundaries with fewer than three vertices enclose nothing.
    pub fn contains(&self, point: &Coordinate) -> bool {
        if self.boundary.len() < 3 {
            return false;
        }
        to_polygon(&self.boundary).contains(&to_point(point))
    }

    /// Bounding box of the boundary, `None` when it has no vertices.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.boundary)
    }

    pub fn is_active_at(&self, now: NaiveDateTime) -> Result<bool> {
        is_active(&self.window, now)
    }
}

/// Geofences whose window is open at `now`, in input order.
pub fn active_geofences(geofences: &[Geofence], now: NaiveDateTime) -> Result<Vec<&Geofence>> {
    let mut active = Vec::new();
    for g in geofences {
        if g.is_active_at(now)? {
            active.push(g);
        }
    }
    debug!(
        "[GeofenceActivity] {}/{} geofences active at {}",
        active.len(),
        geofences.len(),
        now
    );
    Ok(active)
}

/// Bounding box around every boundary vertex of every geofence.
pub fn combined_bounds(geofences: &[Geofence]) -> Option<Bounds> {
    let all: Vec<Coordinate> = geofences
        .iter()
        .flat_map(|g| g.boundary.iter().copied())
        .collect();
    Bounds::from_points(&all)
}

/// How a zone constrains the tracked employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    /// The employee must stay inside while the window is open
    Authorized,
    /// The employee must stay outside while the window is open
    Restricted,
}

/// Check a reported location against one zone.
///
/// Returns the violation it constitutes, if any. Zones whose window is closed
/// at `now` never produce a violation.
pub fn evaluate_location(
    geofence: &Geofence,
    kind: ZoneKind,
    point: &Coordinate,
    now: NaiveDateTime,
) -> Result<Option<ViolationType>> {
    if !geofence.is_active_at(now)? {
        return Ok(None);
    }
    let inside = geofence.contains(point);
    Ok(match (kind, inside) {
        (ZoneKind::Authorized, false) => Some(ViolationType::Exit),
        (ZoneKind::Restricted, true) => Some(ViolationType::Entry),
        _ => None,
    })
}
