//! Meteoloop: scheduled Open-Meteo ingestion.
//!
//! A cron trigger runs a two-stage pipeline. The Fetcher pulls the hourly
//! forecast for one coordinate pair; the Persister turns it into a single
//! [`Observation`](observation::Observation) and writes it to three sinks.
//!
//! # Architecture
//!
//! ```text
//! Scheduler ──► Fetcher ──FetchEnvelope──► Persister ──PersistEnvelope──► log / CLI
//!   (cron)     (reqwest)                      │
//!                                             ├─► RecordStore  (SQLite)
//!                                             ├─► BlobStore    (filesystem)
//!                                             └─► Notifier     (Zenoh)
//! ```
//!
//! Stages only talk through `{statusCode, body}` envelopes; the Persister
//! never fetches and the Fetcher never writes.
//!
//! # Modules
//!
//! - [`config`]: YAML configuration with per-section defaults.
//! - [`coordinate`]: Trigger coordinate parsing and range checks.
//! - [`envelope`]: Status envelopes exchanged between stages.
//! - [`fetcher`]: Open-Meteo HTTP client.
//! - [`forecast`]: Typed forecast response and reading extraction.
//! - [`observation`]: The persisted record.
//! - [`persister`]: Gates, identity assignment and the three-sink write.
//! - [`pipeline`]: One Fetcher → Persister tick.
//! - [`scheduler`]: Cron loop with graceful shutdown.
//! - [`sinks`]: Sink traits plus SQLite, filesystem, Zenoh and in-memory implementations.

pub mod config;
pub mod coordinate;
pub mod envelope;
pub mod fetcher;
pub mod forecast;
pub mod observation;
pub mod persister;
pub mod pipeline;
pub mod scheduler;
pub mod sinks;

pub use config::PipelineConfig;
pub use coordinate::Coordinate;
pub use envelope::{FetchEnvelope, PersistEnvelope};
pub use fetcher::WeatherFetcher;
pub use observation::Observation;
pub use persister::Persister;
pub use pipeline::Pipeline;
