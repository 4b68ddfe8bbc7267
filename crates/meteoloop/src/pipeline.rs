//! One tick: Fetcher then Persister.

use std::collections::HashMap;

use crate::config::PipelineConfig;
use crate::coordinate::Coordinate;
use crate::envelope::PersistEnvelope;
use crate::fetcher::{self, WeatherFetcher};
use crate::persister::Persister;
use crate::sinks::Sinks;

pub struct Pipeline {
    fetcher: WeatherFetcher,
    persister: Persister,
    location: Coordinate,
}

impl Pipeline {
    pub fn new(fetcher: WeatherFetcher, persister: Persister, location: Coordinate) -> Self {
        Self {
            fetcher,
            persister,
            location,
        }
    }

    /// Wire a pipeline from a validated config and already-open sinks.
    pub fn from_config(config: &PipelineConfig, sinks: Sinks) -> fetcher::Result<Self> {
        let location = config.location.coordinate()?;
        let fetcher = WeatherFetcher::new(&config.fetch, location)?;
        let persister = Persister::new(sinks, config.fetch.temperature_source)
            .with_subject(config.notify.subject.clone());
        Ok(Self::new(fetcher, persister, location))
    }

    pub fn fetcher(&self) -> &WeatherFetcher {
        &self.fetcher
    }

    pub fn persister(&self) -> &Persister {
        &self.persister
    }

    /// Configured default location.
    pub fn location(&self) -> Coordinate {
        self.location
    }

    /// Fetch for `coordinate` and persist the result.
    ///
    /// A failed fetch still flows into the Persister, which rejects it.
    pub async fn run_once(&self, coordinate: &Coordinate) -> PersistEnvelope {
        let fetched = self.fetcher.fetch(coordinate).await;
        self.persister.persist(&fetched).await
    }

    /// Same as [`run_once`](Self::run_once), resolving optional trigger parameters first.
    pub async fn run_query(&self, params: &HashMap<String, String>) -> PersistEnvelope {
        let fetched = self.fetcher.fetch_from_query(params).await;
        self.persister.persist(&fetched).await
    }
}
