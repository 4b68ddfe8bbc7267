//! Turns a fetch envelope into one stored observation.
//!
//! ```text
//! FetchEnvelope
//!   │ gate 1: success status, JSON body
//!   │ gate 2: typed decode, required fields present
//!   ▼
//! Reading ──► Observation (uuid v4, UTC now)
//!   │
//!   ├─► record store     ─┐
//!   ├─► blob store        ├─ sequential, no compensation
//!   └─► notification     ─┘
//! ```
//!
//! A failure after the first write leaves the earlier writes in place; the
//! error records which stages committed so the caller can reconcile.

use serde_json::Value;

use crate::envelope::{FetchEnvelope, InputError, PersistEnvelope};
use crate::forecast::{extract_reading, ExtractError, TemperatureSource};
use crate::observation::{Observation, NOTIFICATION_SUBJECT};
use crate::sinks::{Notification, SinkError, SinkStage, Sinks};

pub const BLOB_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("{0}")]
    Input(#[from] InputError),

    #[error("Upstream fetch failed with status {status}: {body}")]
    UpstreamFailed { status: u16, body: String },

    #[error("Fetch body is not valid JSON: {0}")]
    NotJson(String),

    #[error("Malformed weather data: {0}")]
    Malformed(#[from] ExtractError),

    /// The rendered message omits `record_id`; it reaches the caller's
    /// envelope, which must not echo partial observation data.
    #[error("Failed to write to {stage}: {source}")]
    Sink {
        stage: SinkStage,
        record_id: String,
        /// Stages that completed before the failure.
        committed: Vec<SinkStage>,
        #[source]
        source: SinkError,
    },
}

impl PersistError {
    /// True when nothing was written to any sink.
    pub fn is_clean(&self) -> bool {
        match self {
            PersistError::Sink { committed, .. } => committed.is_empty(),
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

/// Writes observations to the three sinks.
pub struct Persister {
    sinks: Sinks,
    source: TemperatureSource,
    subject: String,
}

impl Persister {
    pub fn new(sinks: Sinks, source: TemperatureSource) -> Self {
        Self {
            sinks,
            source,
            subject: NOTIFICATION_SUBJECT.to_string(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn sinks(&self) -> &Sinks {
        &self.sinks
    }

    /// Persist an envelope and fold the outcome into a [`PersistEnvelope`].
    pub async fn persist(&self, envelope: &FetchEnvelope) -> PersistEnvelope {
        match self.try_persist(envelope).await {
            Ok(observation) => PersistEnvelope::stored(&observation.record_id),
            Err(e) => {
                report(&e);
                PersistEnvelope::error(e)
            }
        }
    }

    /// Persist a raw input document: a bare envelope or a state event.
    pub async fn persist_event(&self, event: &Value) -> PersistEnvelope {
        match FetchEnvelope::from_event(event) {
            Ok(envelope) => self.persist(&envelope).await,
            Err(e) => {
                let e = PersistError::from(e);
                report(&e);
                PersistEnvelope::error(e)
            }
        }
    }

    /// Persist an envelope, returning the stored observation or a typed error.
    pub async fn try_persist(&self, envelope: &FetchEnvelope) -> Result<Observation> {
        if !envelope.is_success() {
            return Err(PersistError::UpstreamFailed {
                status: envelope.status_code,
                body: envelope.body.clone(),
            });
        }
        serde_json::from_str::<Value>(&envelope.body)
            .map_err(|e| PersistError::NotJson(e.to_string()))?;

        let reading = extract_reading(&envelope.body, self.source)?;
        let observation = Observation::new(reading);
        log::debug!(
            "Extracted observation {}: temperature={} at ({}, {})",
            observation.record_id,
            observation.temperature,
            observation.latitude,
            observation.longitude
        );

        let mut committed = Vec::with_capacity(3);

        self.sinks
            .records
            .put(&observation)
            .await
            .map_err(|e| sink_failure(SinkStage::RecordStore, &observation, &committed, e))?;
        committed.push(SinkStage::RecordStore);

        let body = observation
            .to_json_bytes()
            .map_err(|e| sink_failure(SinkStage::BlobStore, &observation, &committed, e.into()))?;
        self.sinks
            .blobs
            .put(&observation.blob_key(), body, BLOB_CONTENT_TYPE)
            .await
            .map_err(|e| sink_failure(SinkStage::BlobStore, &observation, &committed, e))?;
        committed.push(SinkStage::BlobStore);

        let notification = Notification {
            subject: self.subject.clone(),
            message: observation.notification_body(),
        };
        self.sinks
            .notifier
            .publish(&notification)
            .await
            .map_err(|e| sink_failure(SinkStage::Notification, &observation, &committed, e))?;

        log::info!(
            "Stored observation {} (temperature={})",
            observation.record_id,
            observation.temperature
        );
        Ok(observation)
    }
}

fn sink_failure(
    stage: SinkStage,
    observation: &Observation,
    committed: &[SinkStage],
    source: SinkError,
) -> PersistError {
    PersistError::Sink {
        stage,
        record_id: observation.record_id.clone(),
        committed: committed.to_vec(),
        source,
    }
}

fn report(error: &PersistError) {
    match error {
        PersistError::Sink {
            stage,
            record_id,
            committed,
            source,
        } => log::error!(
            "Persist failed at {} for record {}: {} (already committed: {:?})",
            stage,
            record_id,
            source,
            committed
        ),
        other => log::warn!("Rejected input, nothing written: {}", other),
    }
}
