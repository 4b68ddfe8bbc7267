//! Status envelopes exchanged between pipeline stages.
//!
//! Every stage returns `{statusCode, body}`; no error crosses a stage boundary
//! in any other shape. The Fetcher's body is the raw upstream JSON (or a plain
//! error string), the Persister's body is always a JSON document.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const STATUS_OK: u16 = 200;
pub const STATUS_ERROR: u16 = 500;

/// Message carried by a successful [`PersistEnvelope`].
pub const STORED_MESSAGE: &str = "Data stored successfully!";

fn is_success_status(status_code: u16) -> bool {
    (200..300).contains(&status_code)
}

/// Output of the Fetcher, input of the Persister.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl FetchEnvelope {
    /// Successful fetch wrapping the upstream JSON text.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status_code: STATUS_OK,
            body: body.into(),
        }
    }

    /// Failed fetch; the body is a plain, human-readable string.
    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self {
            status_code: STATUS_ERROR,
            body: format!("Error fetching weather data: {message}"),
        }
    }

    pub fn is_success(&self) -> bool {
        is_success_status(self.status_code)
    }
}

/// Errors from decoding a Persister input document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Missing '{0}' in event.")]
    MissingField(&'static str),

    #[error("'{field}' has the wrong type: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

impl FetchEnvelope {
    /// Decode a Persister input document.
    ///
    /// Accepts a bare envelope `{"statusCode", "body"}` or the orchestration
    /// state event `{"weather_data": {"Payload": {"statusCode", "body"}}}`.
    /// A missing `statusCode` is read as success, matching state events that
    /// only forward the body.
    pub fn from_event(event: &Value) -> Result<Self, InputError> {
        let payload = match event.get("weather_data") {
            Some(weather_data) => weather_data
                .get("Payload")
                .ok_or(InputError::MissingField("weather_data.Payload"))?,
            None => event,
        };

        let body = match payload.get("body") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => return Err(InputError::MissingField("body")),
            Some(_) => {
                return Err(InputError::WrongType {
                    field: "body",
                    expected: "a JSON-encoded string",
                })
            }
        };

        let status_code = match payload.get("statusCode") {
            None | Some(Value::Null) => STATUS_OK,
            Some(v) => v
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .ok_or(InputError::WrongType {
                    field: "statusCode",
                    expected: "an HTTP status code",
                })?,
        };

        Ok(Self { status_code, body })
    }
}

/// Terminal output of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl PersistEnvelope {
    /// Success envelope naming the stored record.
    pub fn stored(record_id: &str) -> Self {
        Self {
            status_code: STATUS_OK,
            body: json!({ "message": STORED_MESSAGE, "record_id": record_id }).to_string(),
        }
    }

    /// Error envelope; the body is `{"error": message}` and nothing else.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            status_code: STATUS_ERROR,
            body: json!({ "error": message.to_string() }).to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        is_success_status(self.status_code)
    }

    /// Parse the body back into JSON.
    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }

    /// The stored record id, for success envelopes.
    pub fn record_id(&self) -> Option<String> {
        self.body_json()
            .ok()?
            .get("record_id")?
            .as_str()
            .map(str::to_string)
    }

    /// The error message, for failure envelopes.
    pub fn error_message(&self) -> Option<String> {
        self.body_json()
            .ok()?
            .get("error")?
            .as_str()
            .map(str::to_string)
    }
}
