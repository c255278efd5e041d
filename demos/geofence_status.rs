//! Evaluate an employee's geofence assignments at a few instants.
//!
//! Run with: cargo run --example geofence_status

use chrono::NaiveDate;
use fleet_geofence::wire::GeofencesResponse;
use fleet_geofence::{active_geofences, evaluate_location, Coordinate, ZoneKind};

const BODY: &str = r#"{
  "geofences": [
    {
      "geo_id": 1,
      "geo_name": "Head Office",
      "start_date": "2024-01-01",
      "end_date": "2024-12-31",
      "start_time": "09:00:00",
      "end_time": "17:00:00",
      "is_active": true,
      "is_violating": false,
      "geofence_boundary": [
        { "latitude": 33.70, "longitude": 73.04 },
        { "latitude": 33.70, "longitude": 73.06 },
        { "latitude": 33.72, "longitude": 73.06 },
        { "latitude": 33.72, "longitude": 73.04 }
      ]
    },
    {
      "geo_id": 2,
      "geo_name": "Night Depot",
      "start_date": "2024-01-01",
      "end_date": "2024-06-30",
      "start_time": "22:00",
      "end_time": "06:00",
      "is_active": true,
      "geofence_boundary": []
    }
  ]
}"#;

fn main() {
    let response: GeofencesResponse = match serde_json::from_str(BODY) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Bad payload: {}", e);
            return;
        }
    };
    let geofences = match response.into_geofences() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Invalid geofences: {}", e);
            return;
        }
    };

    let day = NaiveDate::from_ymd_opt(2024, 3, 12).expect("valid date");
    let employee = Coordinate::new(33.73, 73.05);

    for hour in [8, 12, 23] {
        let now = day.and_hms_opt(hour, 0, 0).expect("valid time");
        let active = match active_geofences(&geofences, now) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("Evaluation failed: {}", e);
                return;
            }
        };
        let names: Vec<&str> = active.iter().map(|g| g.name.as_str()).collect();
        println!("{}: active = {:?}", now, names);

        for g in &geofences {
            if let Ok(Some(violation)) = evaluate_location(g, ZoneKind::Authorized, &employee, now) {
                println!("  {} violation at {}", violation, g.name);
            }
        }
    }
}
