//! Geofence violation records and the dashboard's violation filter.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GeofenceError;

/// Kind of boundary crossing that broke an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationType {
    /// Entered a restricted zone
    Entry,
    /// Left an authorised zone
    Exit,
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationType::Entry => write!(f, "Entry"),
            ViolationType::Exit => write!(f, "Exit"),
        }
    }
}

impl FromStr for ViolationType {
    type Err = GeofenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(ViolationType::Entry),
            "exit" => Ok(ViolationType::Exit),
            other => Err(GeofenceError::ValidationError(format!(
                "unknown violation type {:?}",
                other
            ))),
        }
    }
}

/// One violation as listed for a branch manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationRecord {
    pub employee_id: String,
    pub first_name: String,
    pub last_name: String,
    pub geo_id: String,
    pub geo_name: String,
    pub violation_type: ViolationType,
    pub violation_time: NaiveDateTime,
}

impl ViolationRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Criteria for narrowing the violation list. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViolationFilter {
    /// Case-insensitive substring of the employee's full name
    pub employee: Option<String>,
    pub violation_type: Option<ViolationType>,
    /// Calendar day the violation happened on
    pub date: Option<NaiveDate>,
}

impl ViolationFilter {
    pub fn matches(&self, record: &ViolationRecord) -> bool {
        let name_ok = match &self.employee {
            Some(needle) if !needle.is_empty() => record
                .full_name()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        };
        let type_ok = self
            .violation_type
            .map_or(true, |t| t == record.violation_type);
        let date_ok = self
            .date
            .map_or(true, |d| d == record.violation_time.date());

        name_ok && type_ok && date_ok
    }
}

/// Records matching `filter`, preserving input order.
pub fn filter_violations<'a>(
    records: &'a [ViolationRecord],
    filter: &ViolationFilter,
) -> Vec<&'a ViolationRecord> {
    records.iter().filter(|r| filter.matches(r)).collect()
}
