//! HTTP client for the dashboard backend and the routing engine.
//!
//! This module provides:
//! - Route requests against a GraphHopper-compatible engine, decoded on arrival
//! - Congestion checks for a route, degraded to "no congestion" on failure
//! - Geofence listings for one or many employees with bounded concurrency
//! - Last reported employee locations and violation histories
//! - A cancellable poller for live-tracking refreshes
//!
//! Transport errors are retried with exponential backoff. HTTP error statuses
//! and payload errors are not, since repeating them cannot succeed.

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::congestion::{match_segments_with_config, CongestionConfig, RouteSegment};
use crate::error::{GeofenceError, Result};
use crate::geofence::Geofence;
use crate::violations::ViolationRecord;
use crate::wire::{
    CongestionRequest, CongestionResponse, DecodedRoute, GeofencesResponse, LocationResponse,
    RouteResponse, ViolationsResponse,
};
use crate::Coordinate;

/// Connection settings for [`DashboardClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Dashboard REST API root. Default: `http://localhost:3000/api`
    pub api_base_url: String,
    /// Routing engine root. Default: `http://localhost:8989`
    pub routing_base_url: String,
    /// Routing profile. Default: `car`
    pub routing_profile: String,
    /// Per-request timeout. Default: 30 seconds
    pub timeout_secs: u64,
    /// Retries after a transport error. Default: 3
    pub max_retries: u32,
    /// In-flight requests for multi-employee fetches. Default: 16
    pub max_concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            routing_base_url: "http://localhost:8989".to_string(),
            routing_profile: "car".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            max_concurrency: 16,
        }
    }
}

/// Client for the route, congestion, geofence and violation endpoints.
pub struct DashboardClient {
    client: Client,
    config: ClientConfig,
}

impl DashboardClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.max_concurrency.max(1) * 2)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GeofenceError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn route_url(&self, source: &Coordinate, destination: &Coordinate) -> String {
        format!(
            "{}/route?point={},{}&point={},{}&type=json&profile={}",
            self.config.routing_base_url.trim_end_matches('/'),
            source.latitude,
            source.longitude,
            destination.latitude,
            destination.longitude,
            self.config.routing_profile
        )
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// Request a route and decode its geometry.
    pub async fn fetch_route(&self, source: Coordinate, destination: Coordinate) -> Result<DecodedRoute> {
        let url = self.route_url(&source, &destination);
        let response: RouteResponse = self.get_json(&url).await?;
        let route = response.into_route()?;
        info!(
            "[DashboardClient] Route with {} points, {} instructions",
            route.points.len(),
            route.instructions.len()
        );
        Ok(route)
    }

    /// Ask the congestion service which route points are slow.
    ///
    /// Any failure is logged and reported as no congestion so the route can
    /// still be drawn.
    pub async fn check_congestion(&self, route: &[Coordinate]) -> Vec<Coordinate> {
        let url = self.api_url("location/check-congestion");
        let body = CongestionRequest::from_route(route);
        match self.post_json::<_, CongestionResponse>(&url, &body).await {
            Ok(response) => response.into_congested_points(),
            Err(e) => {
                warn!("[DashboardClient] Congestion check failed, assuming clear: {}", e);
                Vec::new()
            }
        }
    }

    /// Fetch a route, check it for congestion and tag its segments.
    pub async fn route_with_congestion(
        &self,
        source: Coordinate,
        destination: Coordinate,
        config: &CongestionConfig,
    ) -> Result<(DecodedRoute, Vec<RouteSegment>)> {
        let route = self.fetch_route(source, destination).await?;
        let congested = self.check_congestion(&route.points).await;
        let segments = match_segments_with_config(&route.points, &congested, config);
        Ok((route, segments))
    }

    /// Geofences assigned to one employee.
    pub async fn fetch_geofences(&self, employee_id: &str) -> Result<Vec<Geofence>> {
        let url = self.api_url(&format!("employee/my-geofences/{}", employee_id));
        let response: GeofencesResponse = self.get_json(&url).await?;
        response.into_geofences()
    }

    /// Geofences for several employees, fetched concurrently.
    ///
    /// Results come back in completion order, each paired with its employee
    /// id. One employee failing does not affect the others.
    pub async fn fetch_geofences_for(
        &self,
        employee_ids: Vec<String>,
    ) -> Vec<(String, Result<Vec<Geofence>>)> {
        let total = employee_ids.len();
        let start = Instant::now();

        let results: Vec<(String, Result<Vec<Geofence>>)> = stream::iter(employee_ids)
            .map(|id| async move {
                let result = self.fetch_geofences(&id).await;
                if let Err(ref e) = result {
                    warn!("[DashboardClient] Geofences for employee {} failed: {}", id, e);
                }
                (id, result)
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(
            "[DashboardClient] Geofences for {}/{} employees in {:.2}s",
            ok,
            total,
            start.elapsed().as_secs_f64()
        );
        results
    }

    /// Every violation under a branch manager.
    pub async fn fetch_violations(&self, manager_id: &str) -> Result<Vec<ViolationRecord>> {
        let url = self.api_url(&format!("manager/{}/view-violations", manager_id));
        let response: ViolationsResponse = self.get_json(&url).await?;
        response.into_records()
    }

    /// Violations recorded for one employee.
    pub async fn fetch_employee_violations(&self, employee_id: &str) -> Result<Vec<ViolationRecord>> {
        let url = self.api_url(&format!("manager/violations-by-employee/{}", employee_id));
        let response: ViolationsResponse = self.get_json(&url).await?;
        response.into_records()
    }

    /// Last reported position of an employee, ready for
    /// [`evaluate_location`](crate::geofence::evaluate_location).
    pub async fn fetch_employee_location(&self, employee_id: &str) -> Result<Coordinate> {
        let url = self.api_url(&format!("manager/employee/{}/location", employee_id));
        let response: LocationResponse = self.get_json(&url).await?;
        let location = response.into_coordinate()?;
        debug!("[DashboardClient] Employee {} at {:?}", employee_id, location);
        Ok(location)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let bytes = self.send_with_retry(url, || self.client.get(url)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T> {
        let bytes = self
            .send_with_retry(url, || self.client.post(url).json(body))
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Vec<u8>>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let req_start = Instant::now();

        loop {
            match build().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(GeofenceError::HttpError(format!("HTTP {} from {}", status, url)));
                    }
                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| GeofenceError::HttpError(format!("Body download error: {}", e)))?;
                    debug!(
                        "[DashboardClient] {} -> {:.1}KB in {:?}",
                        url,
                        bytes.len() as f64 / 1024.0,
                        req_start.elapsed()
                    );
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(GeofenceError::HttpError(format!("Request error: {}", e)));
                    }
                    let wait = Duration::from_millis(200 * (1 << retries.min(5)));
                    warn!(
                        "[DashboardClient] {} failed: {}, retry {} after {:?}",
                        url, e, retries, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

// ============================================================================
// Polling
// ============================================================================

/// Refresh cadence for live views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between refreshes. Default: 30
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Runs a refresh task on a fixed period until its handle is cancelled or
/// dropped.
pub struct Poller {
    period: Duration,
}

impl Poller {
    pub fn new(config: &PollConfig) -> Self {
        Self::every(config.interval())
    }

    pub fn every(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Start polling on the current tokio runtime. The first run is
    /// immediate; a slow run delays the next tick rather than bunching them.
    pub fn spawn<F, Fut>(self, mut task: F) -> PollHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = self.period;
        debug!("[Poller] Starting with period {:?}", period);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task().await;
            }
        });

        PollHandle { handle }
    }
}

/// Owner of a running poll loop. Dropping it stops the loop, so a view that
/// owns the handle can never be updated after it is torn down.
pub struct PollHandle {
    handle: JoinHandle<()>,
}

impl PollHandle {
    /// Stop polling. An in-flight run is abandoned at its next await point.
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            debug!("[Poller] Cancelled");
        }
        self.handle.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
