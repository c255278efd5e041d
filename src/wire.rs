//! Backend JSON shapes and their conversion into domain types.
//!
//! The dashboard backend is loose about types: ids arrive as numbers or
//! strings, coordinates sometimes as decimal strings, and optional fields are
//! simply left out. Everything is accepted leniently by serde here and then
//! validated once by the `into_*` conversions, which fail with
//! [`GeofenceError::ValidationError`] naming the offending field. Domain code
//! never sees an unvalidated record.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GeofenceError, Result};
use crate::geofence::{Geofence, GeofenceWindow};
use crate::polyline;
use crate::violations::{ViolationRecord, ViolationType};
use crate::Coordinate;

/// Status string the congestion service uses when the route is slow.
pub const CONGESTED_STATUS: &str = "Segment is Congested";

/// An identifier sent either as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Number(n) => write!(f, "{}", n),
            IdValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A number sent either as a JSON number or a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberValue {
    Number(f64),
    Text(String),
}

impl NumberValue {
    fn to_f64(&self, field: &str) -> Result<f64> {
        match self {
            NumberValue::Number(n) => Ok(*n),
            NumberValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid(format!("{} is not a number: {:?}", field, s))),
        }
    }
}

fn invalid(msg: impl Into<String>) -> GeofenceError {
    GeofenceError::ValidationError(msg.into())
}

fn require<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| invalid(format!("missing required field `{}`", field)))
}

// ============================================================================
// Geofence assignments
// ============================================================================

/// Vertex of a geofence boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryPoint {
    pub latitude: NumberValue,
    pub longitude: NumberValue,
}

/// One employee-geofence assignment as listed by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceRecord {
    pub geo_id: Option<IdValue>,
    pub geo_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_active: Option<bool>,
    pub is_violating: Option<bool>,
    pub geofence_boundary: Option<Vec<BoundaryPoint>>,
}

impl GeofenceRecord {
    /// Validate the record's temporal fields.
    pub fn window(&self) -> Result<GeofenceWindow> {
        GeofenceWindow::new(
            require(self.start_date.as_deref(), "start_date")?,
            require(self.end_date.as_deref(), "end_date")?,
            require(self.start_time.as_deref(), "start_time")?,
            require(self.end_time.as_deref(), "end_time")?,
            require(self.is_active, "is_active")?,
        )
        .map_err(|e| match e {
            GeofenceError::InvalidFormatError(msg) => invalid(msg),
            other => other,
        })
    }

    /// Validate the whole record.
    ///
    /// Boundary vertices must be finite, in-range coordinates. A missing
    /// boundary is allowed and yields an empty ring.
    pub fn into_geofence(self) -> Result<Geofence> {
        let id = require(self.geo_id.as_ref(), "geo_id")?.to_string();
        let window = self.window()?;

        let boundary = self
            .geofence_boundary
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let point = Coordinate::new(
                    p.latitude.to_f64("latitude")?,
                    p.longitude.to_f64("longitude")?,
                );
                if !point.is_valid() {
                    return Err(invalid(format!(
                        "geofence {}: boundary vertex {} out of range: {:?}",
                        id, i, point
                    )));
                }
                Ok(point)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Geofence {
            id,
            name: self.geo_name.unwrap_or_default(),
            window,
            boundary,
            is_violating: self.is_violating.unwrap_or(false),
        })
    }
}

/// Body of the employee geofence listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeofencesResponse {
    #[serde(default)]
    pub geofences: Vec<GeofenceRecord>,
}

impl GeofencesResponse {
    pub fn into_geofences(self) -> Result<Vec<Geofence>> {
        self.geofences
            .into_iter()
            .map(GeofenceRecord::into_geofence)
            .collect()
    }
}

// ============================================================================
// Routing engine
// ============================================================================

/// Turn-by-turn instruction attached to a route path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instruction {
    pub text: String,
    /// Meters
    pub distance: f64,
    /// Milliseconds
    pub time: u64,
    pub sign: i32,
    pub street_name: String,
}

/// One alternative path from the routing engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutePath {
    /// Encoded polyline
    pub points: Option<String>,
    pub instructions: Vec<Instruction>,
    pub distance: Option<f64>,
    pub time: Option<u64>,
}

/// Routing engine response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    #[serde(default)]
    pub paths: Vec<RoutePath>,
}

/// A route ready for congestion matching and rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRoute {
    pub points: Vec<Coordinate>,
    pub instructions: Vec<Instruction>,
    pub distance: Option<f64>,
    pub time: Option<u64>,
}

impl RouteResponse {
    /// Decode the first path.
    ///
    /// Fails with a validation error when there is no path or it carries no
    /// geometry, and with a malformed polyline error when the geometry does
    /// not decode.
    pub fn into_route(self) -> Result<DecodedRoute> {
        let path = self
            .paths
            .into_iter()
            .next()
            .ok_or_else(|| invalid("route response contains no paths"))?;
        let encoded = require(path.points, "paths[0].points")?;

        Ok(DecodedRoute {
            points: polyline::decode(&encoded)?,
            instructions: path.instructions,
            distance: path.distance,
            time: path.time,
        })
    }
}

// ============================================================================
// Congestion service
// ============================================================================

/// Request body for the congestion check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongestionRequest {
    /// `[lat, lng]` pairs in route order
    pub graphhopper_coordinates: Vec<[f64; 2]>,
}

impl CongestionRequest {
    pub fn from_route(route: &[Coordinate]) -> Self {
        Self {
            graphhopper_coordinates: route.iter().map(|p| [p.latitude, p.longitude]).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionResult {
    pub status: String,
    #[serde(rename = "matchedPoints")]
    pub matched_points: Vec<LatLon>,
}

/// Congestion service response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CongestionResponse {
    #[serde(default)]
    pub result: Option<CongestionResult>,
}

impl CongestionResponse {
    /// Reported congested points; empty unless the status says congested.
    pub fn into_congested_points(self) -> Vec<Coordinate> {
        match self.result {
            Some(r) if r.status == CONGESTED_STATUS => r
                .matched_points
                .into_iter()
                .map(|p| Coordinate::new(p.lat, p.lon))
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Employee location
// ============================================================================

/// Last reported position of an employee.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationRecord {
    pub latitude: Option<NumberValue>,
    pub longitude: Option<NumberValue>,
    pub location_timestamp: Option<String>,
}

/// Body of the employee location endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationResponse {
    #[serde(default, rename = "employeeLocations")]
    pub employee_locations: Option<LocationRecord>,
}

impl LocationResponse {
    /// Validated position. An employee who has never reported a location
    /// comes back without one and is a validation error.
    pub fn into_coordinate(self) -> Result<Coordinate> {
        let record = require(self.employee_locations, "employeeLocations")?;
        let point = Coordinate::new(
            require(record.latitude, "latitude")?.to_f64("latitude")?,
            require(record.longitude, "longitude")?.to_f64("longitude")?,
        );
        if !point.is_valid() {
            return Err(invalid(format!("employee location out of range: {:?}", point)));
        }
        Ok(point)
    }
}

// ============================================================================
// Violations
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationJson {
    pub employee_id: Option<IdValue>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub geo_id: Option<IdValue>,
    pub geo_name: Option<String>,
    pub violation_type: Option<String>,
    pub violation_time: Option<String>,
}

impl ViolationJson {
    pub fn into_record(self) -> Result<ViolationRecord> {
        let violation_type: ViolationType = require(self.violation_type, "violation_type")?.parse()?;
        let raw_time = require(self.violation_time, "violation_time")?;

        Ok(ViolationRecord {
            employee_id: require(self.employee_id, "employee_id")?.to_string(),
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            geo_id: require(self.geo_id, "geo_id")?.to_string(),
            geo_name: self.geo_name.unwrap_or_default(),
            violation_type,
            violation_time: parse_timestamp(&raw_time)?,
        })
    }
}

/// Violation listing. The manager-wide endpoint names the array `violation`,
/// the per-employee one `violations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationsResponse {
    #[serde(default, alias = "violations")]
    pub violation: Vec<ViolationJson>,
}

impl ViolationsResponse {
    pub fn into_records(self) -> Result<Vec<ViolationRecord>> {
        self.violation
            .into_iter()
            .map(ViolationJson::into_record)
            .collect()
    }
}

/// Wall-clock time of a timestamp, in its own offset when it has one.
fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| invalid(format!("violation_time is not a timestamp: {:?}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn geofence_json() -> serde_json::Value {
        json!({
            "geo_id": 12,
            "geo_name": "North Depot",
            "start_date": "2024-01-01T00:00:00.000Z",
            "end_date": "2024-01-31",
            "start_time": "09:00:00",
            "end_time": "17:00",
            "is_active": true,
            "is_violating": false,
            "geofence_boundary": [
                { "latitude": 33.60, "longitude": 73.00 },
                { "latitude": "33.60", "longitude": "73.10" },
                { "latitude": 33.70, "longitude": 73.10 }
            ]
        })
    }

    #[test]
    fn test_geofence_record_converts() {
        let record: GeofenceRecord = serde_json::from_value(geofence_json()).unwrap();
        let g = record.into_geofence().unwrap();
        assert_eq!(g.id, "12");
        assert_eq!(g.name, "North Depot");
        assert_eq!(g.window.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(g.boundary.len(), 3);
        assert_eq!(g.boundary[1], Coordinate::new(33.60, 73.10));
        assert!(!g.is_violating);
    }

    #[test]
    fn test_missing_field_is_validation_error() {
        let mut value = geofence_json();
        value.as_object_mut().unwrap().remove("start_time");
        let record: GeofenceRecord = serde_json::from_value(value).unwrap();
        match record.into_geofence() {
            Err(GeofenceError::ValidationError(msg)) => assert!(msg.contains("start_time"), "{}", msg),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_fields_are_validation_errors() {
        let mut bad_time = geofence_json();
        bad_time["end_time"] = json!("5pm");
        let record: GeofenceRecord = serde_json::from_value(bad_time).unwrap();
        assert!(matches!(record.into_geofence(), Err(GeofenceError::ValidationError(_))));

        let mut bad_vertex = geofence_json();
        bad_vertex["geofence_boundary"][0]["latitude"] = json!(123.0);
        let record: GeofenceRecord = serde_json::from_value(bad_vertex).unwrap();
        assert!(matches!(record.into_geofence(), Err(GeofenceError::ValidationError(_))));

        let mut bad_number = geofence_json();
        bad_number["geofence_boundary"][0]["longitude"] = json!("east");
        let record: GeofenceRecord = serde_json::from_value(bad_number).unwrap();
        assert!(matches!(record.into_geofence(), Err(GeofenceError::ValidationError(_))));
    }

    #[test]
    fn test_geofences_response() {
        let body = json!({ "geofences": [geofence_json(), geofence_json()] });
        let response: GeofencesResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.into_geofences().unwrap().len(), 2);
    }

    #[test]
    fn test_route_response_decodes_first_path() {
        let body = json!({
            "paths": [{
                "points": "_p~iF~ps|U_ulLnnqC_mqNvxq`@",
                "distance": 1234.5,
                "time": 98000,
                "instructions": [
                    { "text": "Continue onto Murree Road", "distance": 812.0, "time": 61000, "sign": 0, "street_name": "Murree Road" },
                    { "text": "Arrive at destination", "sign": 4 }
                ]
            }]
        });
        let response: RouteResponse = serde_json::from_value(body).unwrap();
        let route = response.into_route().unwrap();
        assert_eq!(route.points.len(), 3);
        assert_eq!(route.instructions.len(), 2);
        assert_eq!(route.instructions[1].sign, 4);
        assert_eq!(route.instructions[1].distance, 0.0);
        assert_eq!(route.distance, Some(1234.5));
    }

    #[test]
    fn test_route_response_without_paths() {
        let response: RouteResponse = serde_json::from_str(r#"{"paths": []}"#).unwrap();
        assert!(matches!(response.into_route(), Err(GeofenceError::ValidationError(_))));

        let response: RouteResponse = serde_json::from_str(r#"{"paths": [{"points": "_p~i"}]}"#).unwrap();
        assert!(matches!(
            response.into_route(),
            Err(GeofenceError::MalformedPolylineError { .. })
        ));
    }

    #[test]
    fn test_congestion_response_status_gate() {
        let congested: CongestionResponse = serde_json::from_value(json!({
            "result": {
                "status": "Segment is Congested",
                "matchedPoints": [ { "lat": 33.6, "lon": 73.05 }, { "lat": 33.61, "lon": 73.04 } ]
            }
        }))
        .unwrap();
        assert_eq!(
            congested.into_congested_points(),
            vec![Coordinate::new(33.6, 73.05), Coordinate::new(33.61, 73.04)]
        );

        let clear: CongestionResponse = serde_json::from_value(json!({
            "result": { "status": "Segment is Clear", "matchedPoints": [ { "lat": 1.0, "lon": 1.0 } ] }
        }))
        .unwrap();
        assert!(clear.into_congested_points().is_empty());

        let empty: CongestionResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.into_congested_points().is_empty());
    }

    #[test]
    fn test_congestion_request_shape() {
        let request = CongestionRequest::from_route(&[Coordinate::new(33.6, 73.05)]);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "graphhopper_coordinates": [[33.6, 73.05]] })
        );
    }

    #[test]
    fn test_location_response() {
        let response: LocationResponse = serde_json::from_value(json!({
            "employeeLocations": {
                "latitude": "33.6844",
                "longitude": 73.0479,
                "location_timestamp": "2024-03-04T14:30:00.000Z"
            }
        }))
        .unwrap();
        assert_eq!(response.into_coordinate().unwrap(), Coordinate::new(33.6844, 73.0479));

        let never_reported: LocationResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            never_reported.into_coordinate(),
            Err(GeofenceError::ValidationError(_))
        ));

        let out_of_range: LocationResponse = serde_json::from_value(json!({
            "employeeLocations": { "latitude": 95.0, "longitude": 73.0 }
        }))
        .unwrap();
        assert!(matches!(
            out_of_range.into_coordinate(),
            Err(GeofenceError::ValidationError(_))
        ));
    }

    #[test]
    fn test_violations_response_accepts_both_keys() {
        let entry = json!({
            "employee_id": "E-17",
            "first_name": "Ayesha",
            "last_name": "Khan",
            "geo_id": 3,
            "geo_name": "Warehouse",
            "violation_type": "Exit",
            "violation_time": "2024-03-04T14:30:00+05:00"
        });
        for key in ["violation", "violations"] {
            let mut body = serde_json::Map::new();
            body.insert(key.to_string(), json!([entry.clone()]));
            let response: ViolationsResponse =
                serde_json::from_value(serde_json::Value::Object(body)).unwrap();
            let records = response.into_records().unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].geo_id, "3");
            assert_eq!(records[0].violation_type, ViolationType::Exit);
            assert_eq!(
                records[0].violation_time,
                NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(14, 30, 0).unwrap()
            );
        }
    }

    #[test]
    fn test_violation_with_unknown_type_is_rejected() {
        let json = json!({
            "employee_id": 1, "geo_id": 3, "violation_type": "Loiter",
            "violation_time": "2024-03-04 14:30:00"
        });
        let v: ViolationJson = serde_json::from_value(json).unwrap();
        assert!(matches!(v.into_record(), Err(GeofenceError::ValidationError(_))));
    }
}
