//! Read-only client for the time-series service that persists device
//! events. Used to browse historical measurements from the console; never
//! authoritative for the live session counters.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_POINT_LIMIT: usize = 50;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub type Point = Map<String, Value>;

#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementsResponse {
    #[serde(default)]
    pub measurements: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointsResponse {
    #[serde(default)]
    pub points: Vec<Point>,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct HistoryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HistoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub async fn measurements(&self) -> Result<Vec<String>, HistoryError> {
        let url = format!("{}/api/measurements", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let body: MeasurementsResponse = response.json().await?;
        Ok(body.measurements)
    }

    /// Points are returned newest first by the service.
    pub async fn points(&self, measurement: &str, limit: usize) -> Result<Vec<Point>, HistoryError> {
        let url = format!("{}/api/points", self.base_url);
        let limit = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("measurement", measurement), ("limit", limit.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let body: PointsResponse = response.json().await?;
        Ok(body.points)
    }
}

/// One display line per point: the `time` column first, then the remaining
/// fields as `key=value`, sorted for stable output.
pub fn format_point(point: &Point) -> String {
    let mut parts = Vec::with_capacity(point.len());
    if let Some(time) = point.get("time") {
        parts.push(render_value(time));
    }
    let mut keys: Vec<_> = point.keys().filter(|key| *key != "time").collect();
    keys.sort();
    for key in keys {
        if let Some(value) = point.get(key) {
            parts.push(format!("{key}={}", render_value(value)));
        }
    }
    parts.join("  ")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
