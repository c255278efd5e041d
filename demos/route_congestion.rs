//! Decode a route and colour its segments by congestion.
//!
//! Run with: cargo run --example route_congestion

use fleet_geofence::{
    congestion_runs, match_segments, polyline, Coordinate, RouteSummary, DEFAULT_TOLERANCE,
    STRICT_TOLERANCE,
};

fn main() {
    // Encoded the way the routing engine ships it
    let encoded = polyline::encode(&[
        Coordinate::new(33.59541, 73.05125),
        Coordinate::new(33.59702, 73.04981),
        Coordinate::new(33.60012, 73.04731),
        Coordinate::new(33.60544, 73.04102),
        Coordinate::new(33.61218, 73.03077),
        Coordinate::new(33.61941, 73.02003),
    ]);
    println!("Encoded route: {}\n", encoded);

    let route = match polyline::decode(&encoded) {
        Ok(route) => route,
        Err(e) => {
            eprintln!("Could not decode route: {}", e);
            return;
        }
    };

    // Points the congestion service reported as slow
    let slow = vec![
        Coordinate::new(33.60015, 73.04728),
        Coordinate::new(33.61220, 73.03080),
    ];

    for (label, tolerance) in [("default", DEFAULT_TOLERANCE), ("strict", STRICT_TOLERANCE)] {
        let segments = match_segments(&route, &slow, tolerance);
        let summary = RouteSummary::from_segments(&segments);

        println!("Tolerance {} ({}):", label, tolerance);
        for (i, seg) in segments.iter().enumerate() {
            println!(
                "  segment {}: ({:.5}, {:.5}) -> ({:.5}, {:.5}) {}",
                i,
                seg.start.latitude,
                seg.start.longitude,
                seg.end.latitude,
                seg.end.longitude,
                if seg.congested { "CONGESTED" } else { "clear" }
            );
        }
        println!(
            "  {} runs, {:.0}m of {:.0}m congested ({:.0}%)\n",
            congestion_runs(&segments).len(),
            summary.congested_meters,
            summary.total_meters,
            summary.congested_share * 100.0
        );
    }
}
