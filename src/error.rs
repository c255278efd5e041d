//! Error type shared by every fallible operation in the crate.

/// Errors raised by geofence evaluation, polyline decoding and the JSON edge.
///
/// Variants carry strings rather than source errors so the type stays `Clone`
/// and can cross the FFI boundary unchanged.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error), uniffi(flat_error))]
pub enum GeofenceError {
    #[error("Invalid time or date format: {0}")]
    InvalidFormatError(String),
    #[error("Malformed polyline at byte {position}: {reason}")]
    MalformedPolylineError { position: usize, reason: String },
    #[error("Invalid backend payload: {0}")]
    ValidationError(String),
    #[error("HTTP request failed: {0}")]
    HttpError(String),
    #[error("Failed to parse JSON response: {0}")]
    JsonError(String),
}

impl From<serde_json::Error> for GeofenceError {
    fn from(e: serde_json::Error) -> Self {
        GeofenceError::JsonError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeofenceError>;
