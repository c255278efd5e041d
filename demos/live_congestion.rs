//! Poll the backend for a route and its congestion every few seconds.
//!
//! Needs a routing engine on :8989 and the dashboard API on :3000.
//! Run with: cargo run --example live_congestion --features http

use fleet_geofence::{
    congestion_runs, ClientConfig, CongestionConfig, Coordinate, DashboardClient, PollConfig,
    Poller,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let client = match DashboardClient::new(ClientConfig::default()) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let source = Coordinate::new(33.5954056, 73.0512473);
    let destination = Coordinate::new(33.6194097, 73.0200321);
    let config = CongestionConfig::default();

    let handle = Poller::new(&PollConfig { interval_secs: 5 }).spawn(move || {
        let client = Arc::clone(&client);
        let config = config.clone();
        async move {
            match client.route_with_congestion(source, destination, &config).await {
                Ok((route, segments)) => {
                    let runs = congestion_runs(&segments);
                    println!(
                        "{} points, {} segments, {} congested runs",
                        route.points.len(),
                        segments.len(),
                        runs.iter().filter(|r| r.congested).count()
                    );
                }
                Err(e) => eprintln!("Route refresh failed: {}", e),
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(16)).await;
    handle.cancel();
    println!("Stopped polling");
}
