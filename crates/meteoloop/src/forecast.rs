//! Typed view of the Open-Meteo forecast response.
//!
//! Only the fields the pipeline reads are modelled; anything else the API
//! returns is ignored. Required fields are `Option` on the wire so their
//! absence surfaces as a named [`ExtractError::MissingField`] instead of a
//! generic decode failure.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Errors from decoding a forecast body into a reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("unexpected forecast shape: {0}")]
    Shape(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("'{0}' is empty")]
    EmptySeries(&'static str),

    #[error("'{0}' is null")]
    NullSample(&'static str),

    #[error("'{field}' value {value} cannot be represented as a decimal")]
    NotDecimal { field: &'static str, value: String },
}

/// Which upstream value is taken as the observation's temperature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureSource {
    /// First sample of `hourly.temperature_2m`: the forecast for the first
    /// hour of the returned day, not necessarily the current conditions.
    #[default]
    FirstHourly,
    /// `current_weather.temperature`; requires `current_weather=true` on the request.
    Current,
}

impl TemperatureSource {
    /// Extra query parameters this source needs on the upstream request.
    pub fn query_params(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            TemperatureSource::FirstHourly => &[],
            TemperatureSource::Current => &[("current_weather", "true")],
        }
    }
}

/// Wire format of the forecast response (subset).
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub hourly: Option<HourlySeries>,
    pub current_weather: Option<CurrentWeather>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub time: Vec<String>,
    pub temperature_2m: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeather {
    pub temperature: Option<f64>,
    pub time: Option<String>,
}

/// The values an observation is built from, as exact decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub temperature: Decimal,
    pub latitude: Decimal,
    pub longitude: Decimal,
}

impl ForecastResponse {
    /// Decode a JSON body.
    pub fn parse(body: &str) -> Result<Self, ExtractError> {
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| ExtractError::InvalidJson(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| ExtractError::Shape(e.to_string()))
    }

    /// Select the reading according to `source`.
    pub fn reading(&self, source: TemperatureSource) -> Result<Reading, ExtractError> {
        let temperature = match source {
            TemperatureSource::FirstHourly => {
                let hourly = self
                    .hourly
                    .as_ref()
                    .ok_or(ExtractError::MissingField("hourly"))?;
                let series = hourly
                    .temperature_2m
                    .as_ref()
                    .ok_or(ExtractError::MissingField("hourly.temperature_2m"))?;
                let first = series
                    .first()
                    .ok_or(ExtractError::EmptySeries("hourly.temperature_2m"))?;
                first.ok_or(ExtractError::NullSample("hourly.temperature_2m[0]"))?
            }
            TemperatureSource::Current => self
                .current_weather
                .as_ref()
                .ok_or(ExtractError::MissingField("current_weather"))?
                .temperature
                .ok_or(ExtractError::MissingField("current_weather.temperature"))?,
        };

        let latitude = self.latitude.ok_or(ExtractError::MissingField("latitude"))?;
        let longitude = self
            .longitude
            .ok_or(ExtractError::MissingField("longitude"))?;

        Ok(Reading {
            temperature: to_decimal("temperature", temperature)?,
            latitude: to_decimal("latitude", latitude)?,
            longitude: to_decimal("longitude", longitude)?,
        })
    }
}

/// Convert through the shortest text form, so `18.3` becomes exactly `18.3`.
fn to_decimal(field: &'static str, value: f64) -> Result<Decimal, ExtractError> {
    let text = value.to_string();
    Decimal::from_str(&text).map_err(|_| ExtractError::NotDecimal { field, value: text })
}

/// Extract a reading from a raw forecast body.
pub fn extract_reading(body: &str, source: TemperatureSource) -> Result<Reading, ExtractError> {
    ForecastResponse::parse(body)?.reading(source)
}
