//! The persisted weather reading.

use chrono::{SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::forecast::Reading;

/// Prefix of every observation object in the blob store.
pub const BLOB_PREFIX: &str = "weather_data";

/// `message` field of the notification body.
pub const NOTIFICATION_MESSAGE: &str = "New weather data stored";

/// Default subject of the notification.
pub const NOTIFICATION_SUBJECT: &str = "New Weather Data Notification";

/// One persisted reading with its assigned identity.
///
/// Decimal fields serialize as strings so the JSON copy in the blob store
/// carries exactly the digits written to the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub record_id: String,
    /// ISO-8601 UTC instant at which the observation was persisted.
    pub timestamp: String,
    pub temperature: Decimal,
    pub latitude: Decimal,
    pub longitude: Decimal,
}

impl Observation {
    /// Assign a fresh random id and the current UTC time.
    ///
    /// Nothing ties the id to the triggering tick: persisting the same
    /// reading twice yields two observations.
    pub fn new(reading: Reading) -> Self {
        Self::with_identity(uuid::Uuid::new_v4().to_string(), now_iso8601(), reading)
    }

    pub fn with_identity(record_id: String, timestamp: String, reading: Reading) -> Self {
        Self {
            record_id,
            timestamp,
            temperature: reading.temperature,
            latitude: reading.latitude,
            longitude: reading.longitude,
        }
    }

    /// Blob-store key: `weather_data/{record_id}.json`.
    pub fn blob_key(&self) -> String {
        format!("{}/{}.json", BLOB_PREFIX, self.record_id)
    }

    /// JSON document written to the blob store.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Notification body: a subset of the observation, every value a string.
    pub fn notification_body(&self) -> String {
        json!({
            "message": NOTIFICATION_MESSAGE,
            "record_id": self.record_id,
            "timestamp": self.timestamp,
            "temperature": self.temperature.to_string(),
            "latitude": self.latitude.to_string(),
            "longitude": self.longitude.to_string(),
        })
        .to_string()
    }
}

/// Current UTC time, e.g. `2024-03-01T09:00:00.123456Z`.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
