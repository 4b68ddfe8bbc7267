//! Open-Meteo forecast client.
//!
//! One GET per call, certificate validation on, bounded timeout, no retry.
//! Every outcome is folded into a [`FetchEnvelope`].

use std::collections::HashMap;

use crate::config::FetchConfig;
use crate::coordinate::{Coordinate, CoordinateError};
use crate::envelope::FetchEnvelope;
use crate::forecast::TemperatureSource;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("upstream body is not JSON: {0}")]
    InvalidBody(String),

    #[error("upstream body has no samples in hourly.temperature_2m")]
    MissingSeries,

    #[error("{0}")]
    Coordinate(#[from] CoordinateError),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Stateless forecast client; cheap to share.
#[derive(Debug, Clone)]
pub struct WeatherFetcher {
    client: reqwest::Client,
    base_url: String,
    source: TemperatureSource,
    fallback: Coordinate,
}

impl WeatherFetcher {
    /// Build a client from the `fetch` section.
    ///
    /// `fallback` is used for coordinates a trigger leaves unset.
    pub fn new(config: &FetchConfig, fallback: Coordinate) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("meteoloop/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('?').to_string(),
            source: config.temperature_source,
            fallback,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query parameters for one request, in wire order.
    pub fn query(&self, coordinate: &Coordinate) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("latitude", coordinate.latitude.to_string()),
            ("longitude", coordinate.longitude.to_string()),
            ("hourly", "temperature_2m".to_string()),
        ];
        params.extend(
            self.source
                .query_params()
                .iter()
                .map(|(k, v)| (*k, v.to_string())),
        );
        params
    }

    /// Fetch the forecast for `coordinate`.
    pub async fn fetch(&self, coordinate: &Coordinate) -> FetchEnvelope {
        match self.try_fetch(coordinate).await {
            Ok(body) => {
                log::info!("Fetched forecast for {} ({} bytes)", coordinate, body.len());
                FetchEnvelope::ok(body)
            }
            Err(e) => {
                log::error!("Fetch for {} failed: {}", coordinate, e);
                FetchEnvelope::failed(e)
            }
        }
    }

    /// Resolve optional `latitude`/`longitude` trigger parameters, then fetch.
    ///
    /// Invalid parameters produce the error envelope without any request.
    pub async fn fetch_from_query(&self, params: &HashMap<String, String>) -> FetchEnvelope {
        match Coordinate::from_query(params, &self.fallback) {
            Ok(coordinate) => self.fetch(&coordinate).await,
            Err(e) => {
                log::warn!("Rejected trigger parameters: {}", e);
                FetchEnvelope::failed(FetchError::from(e))
            }
        }
    }

    /// Fetch and return the upstream JSON re-serialized as a string.
    pub async fn try_fetch(&self, coordinate: &Coordinate) -> Result<String> {
        log::debug!("GET {} for {}", self.base_url, coordinate);
        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query(coordinate))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: upstream_reason(&text),
            });
        }

        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| FetchError::InvalidBody(e.to_string()))?;
        check_series(&value)?;
        Ok(value.to_string())
    }
}

/// A success body must carry a non-empty `hourly.temperature_2m` array.
fn check_series(value: &serde_json::Value) -> Result<()> {
    let samples = value
        .get("hourly")
        .and_then(|h| h.get("temperature_2m"))
        .and_then(serde_json::Value::as_array);
    match samples {
        Some(a) if !a.is_empty() => Ok(()),
        _ => Err(FetchError::MissingSeries),
    }
}

/// Open-Meteo reports errors as `{"error": true, "reason": "..."}`.
fn upstream_reason(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("reason").and_then(|r| r.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        })
}
