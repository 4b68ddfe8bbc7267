//! Coordinate pair handling for the trigger boundary.
//!
//! Triggers carry `latitude`/`longitude` as optional query-style strings.
//! Absent values fall back to the default location; present values must parse
//! as decimals and fall inside the valid geographic range.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Default latitude when the trigger carries none.
pub const DEFAULT_LATITUDE: &str = "35.8245";

/// Default longitude when the trigger carries none.
pub const DEFAULT_LONGITUDE: &str = "10.6346";

/// Errors from coordinate parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinateError {
    #[error("invalid {field} '{value}': not a decimal number")]
    NotANumber { field: &'static str, value: String },

    #[error("{field} {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: Decimal,
        min: i64,
        max: i64,
    },
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: Decimal,
    pub longitude: Decimal,
}

impl Default for Coordinate {
    fn default() -> Self {
        // Must stay in sync with DEFAULT_LATITUDE / DEFAULT_LONGITUDE.
        Self {
            latitude: Decimal::new(358_245, 4),
            longitude: Decimal::new(106_346, 4),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

impl Coordinate {
    /// Build a validated coordinate.
    pub fn new(latitude: Decimal, longitude: Decimal) -> Result<Self, CoordinateError> {
        check_range("latitude", latitude, 90)?;
        check_range("longitude", longitude, 180)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Parse both components from strings.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self, CoordinateError> {
        Self::new(
            parse_component("latitude", latitude)?,
            parse_component("longitude", longitude)?,
        )
    }

    /// Resolve a coordinate from optional trigger parameters.
    ///
    /// Missing or blank parameters take the value from `fallback`.
    pub fn from_query(
        params: &HashMap<String, String>,
        fallback: &Coordinate,
    ) -> Result<Self, CoordinateError> {
        let latitude = match non_blank(params.get("latitude")) {
            Some(raw) => parse_component("latitude", raw)?,
            None => fallback.latitude,
        };
        let longitude = match non_blank(params.get("longitude")) {
            Some(raw) => parse_component("longitude", raw)?,
            None => fallback.longitude,
        };
        Self::new(latitude, longitude)
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_component(field: &'static str, raw: &str) -> Result<Decimal, CoordinateError> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| CoordinateError::NotANumber {
            field,
            value: raw.to_string(),
        })
}

fn check_range(field: &'static str, value: Decimal, bound: i64) -> Result<(), CoordinateError> {
    if value < Decimal::from(-bound) || value > Decimal::from(bound) {
        return Err(CoordinateError::OutOfRange {
            field,
            value,
            min: -bound,
            max: bound,
        });
    }
    Ok(())
}
