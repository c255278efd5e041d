//! # Encoded Polylines
//!
//! Decoding (and encoding) of the compact polyline format used by GraphHopper,
//! OSRM and the Google Maps APIs to ship route geometry as ASCII text.
//!
//! Each coordinate component is stored as the delta from the previous point,
//! scaled by 1e5, zig-zag signed and split into 5-bit groups. Every group is
//! offset by 63 so it lands in the printable range `?`..`~`; bit `0x20` marks
//! that another group follows.
//!
//! ## Example
//!
//! ```rust
//! use fleet_geofence::polyline;
//!
//! let route = polyline::decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").unwrap();
//! assert_eq!(route.len(), 3);
//! assert!((route[0].latitude - 38.5).abs() < 1e-9);
//! assert!((route[2].longitude - -126.453).abs() < 1e-9);
//! ```

use log::debug;

use crate::error::{GeofenceError, Result};
use crate::Coordinate;

/// Scale between degrees and the integer units carried in the string.
const PRECISION: f64 = 1e5;

/// Offset added to every 5-bit group to make it printable.
const CHAR_OFFSET: u8 = 63;

/// Highest byte a group can encode to (`63 + 0x3f`).
const MAX_CHAR: u8 = 126;

/// Largest shift a group may start at. Seven groups carry 35 bits, which
/// covers every 32-bit delta; anything longer cannot be a coordinate.
const MAX_SHIFT: u32 = 30;

/// Decode an encoded polyline into a route.
///
/// Returns an empty route for an empty string. Fails with
/// [`GeofenceError::MalformedPolylineError`] when the input ends in the middle
/// of a value group, contains a byte outside the polyline alphabet, or holds
/// a group too long to be a coordinate delta. A string that ends after a
/// latitude but before its longitude is also malformed.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::with_capacity(bytes.len() / 4);

    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        lat += read_delta(bytes, &mut index)?;
        lng += read_delta(bytes, &mut index)?;
        points.push(Coordinate::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    debug!(
        "[PolylineDecoder] Decoded {} points from {} bytes",
        points.len(),
        bytes.len()
    );

    Ok(points)
}

/// Read one zig-zag encoded delta starting at `index`, advancing it past the
/// final group.
fn read_delta(bytes: &[u8], index: &mut usize) -> Result<i64> {
    let mut shift = 0u32;
    let mut result: i64 = 0;

    loop {
        let byte = match bytes.get(*index) {
            Some(&b) => b,
            None => return Err(malformed(*index, "input ended inside a value group")),
        };
        if !(CHAR_OFFSET..=MAX_CHAR).contains(&byte) {
            return Err(malformed(
                *index,
                format!("byte 0x{:02x} is outside the polyline alphabet", byte),
            ));
        }
        if shift > MAX_SHIFT {
            return Err(malformed(*index, "value group is longer than 32 bits"));
        }

        let chunk = i64::from(byte - CHAR_OFFSET);
        *index += 1;
        result |= (chunk & 0x1f) << shift;
        shift += 5;

        if chunk < 0x20 {
            break;
        }
    }

    Ok(if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

fn malformed(position: usize, reason: impl Into<String>) -> GeofenceError {
    GeofenceError::MalformedPolylineError {
        position,
        reason: reason.into(),
    }
}

/// Encode a route as a polyline string at 1e-5 degree precision.
///
/// Inverse of [`decode`]: decoding the output reproduces the input rounded to
/// five decimal places.
pub fn encode(points: &[Coordinate]) -> String {
    let mut out = String::with_capacity(points.len() * 8);
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;

    for p in points {
        let lat = (p.latitude * PRECISION).round() as i64;
        let lng = (p.longitude * PRECISION).round() as i64;
        write_delta(lat - prev_lat, &mut out);
        write_delta(lng - prev_lng, &mut out);
        prev_lat = lat;
        prev_lng = lng;
    }

    out
}

fn write_delta(delta: i64, out: &mut String) {
    let mut value = if delta < 0 { !(delta << 1) } else { delta << 1 };
    while value >= 0x20 {
        out.push(char::from((0x20 | (value & 0x1f)) as u8 + CHAR_OFFSET));
        value >>= 5;
    }
    out.push(char::from(value as u8 + CHAR_OFFSET));
}
