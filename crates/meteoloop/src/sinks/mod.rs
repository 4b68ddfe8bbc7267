//! Downstream sinks the Persister writes to.
//!
//! ```text
//! Observation ──► RecordStore   (row keyed by record_id)      1st, ordering anchor
//!             ──► BlobStore     (weather_data/{id}.json)      2nd
//!             ──► Notifier      (subject + stringified body)  3rd
//! ```
//!
//! Each sink is a trait so the Persister can run against SQLite / filesystem /
//! Zenoh in production and against the in-memory implementations in tests and
//! dry runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::observation::Observation;

pub mod fs_blob;
pub mod memory;
pub mod sqlite;
pub mod zenoh_notify;

pub use fs_blob::FsBlobStore;
pub use memory::{MemoryBlobStore, MemoryNotifier, MemoryRecordStore};
pub use sqlite::SqliteRecordStore;
pub use zenoh_notify::ZenohNotifier;

/// Errors raised by sink implementations.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zenoh error: {0}")]
    Zenoh(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid key '{0}'")]
    InvalidKey(String),

    #[error("Content type '{given}' does not match stored type '{stored}'")]
    ContentType { given: String, stored: &'static str },

    #[error("Corrupt record '{record_id}': {reason}")]
    Corrupt { record_id: String, reason: String },

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, SinkError>;

/// The three write stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkStage {
    RecordStore,
    BlobStore,
    Notification,
}

impl fmt::Display for SinkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkStage::RecordStore => "record store",
            SinkStage::BlobStore => "blob store",
            SinkStage::Notification => "notification",
        };
        f.write_str(name)
    }
}

/// A message published on the notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    /// JSON-encoded body.
    pub message: String,
}

/// Structured, keyed store of observations.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write one observation keyed by its `record_id`.
    async fn put(&self, observation: &Observation) -> Result<()>;

    /// Read an observation back by id.
    async fn get(&self, record_id: &str) -> Result<Option<Observation>>;
}

/// Object store for the JSON copy of each observation.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Publish/subscribe notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<()>;
}

/// Handles to the three sinks, built once at startup.
#[derive(Clone)]
pub struct Sinks {
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl Sinks {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            records,
            blobs,
            notifier,
        }
    }

    /// Open the production sinks: SQLite, filesystem blobs, Zenoh.
    pub async fn open(config: &PipelineConfig) -> Result<Self> {
        let records = SqliteRecordStore::open(&config.store.database_path)?;
        log::info!("Record store: {}", config.store.database_path.display());

        let blobs = FsBlobStore::new(&config.blob.root);
        log::info!("Blob store: {}", blobs.root().display());

        let session = zenoh_notify::open_session(config.notify.zenoh_endpoint.as_deref()).await?;
        let notifier = ZenohNotifier::new(session, &config.notify.key_expr)?;
        log::info!("Notifications on: {}", notifier.key_expr());

        Ok(Self::new(Arc::new(records), Arc::new(blobs), Arc::new(notifier)))
    }

    /// Fresh in-memory sinks; nothing outlives the process.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemoryNotifier::new()),
        )
    }
}
