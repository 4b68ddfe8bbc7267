//! Pipeline configuration loaded from YAML.
//!
//! Every section and field is optional; an empty file yields the defaults.
//!
//! ```yaml
//! location:
//!   latitude: "35.8245"
//!   longitude: "10.6346"
//! fetch:
//!   base_url: https://api.open-meteo.com/v1/forecast
//!   timeout_secs: 10
//!   temperature_source: first_hourly   # or: current
//! store:
//!   database_path: data/meteoloop.db
//! blob:
//!   root: data/blobs
//! notify:
//!   key_expr: meteoloop/{machine_id}/weather
//!   zenoh_endpoint: tcp/127.0.0.1:7447
//! schedule:
//!   cron: "0 0 * * * *"
//!   run_on_start: false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::coordinate::{Coordinate, CoordinateError, DEFAULT_LATITUDE, DEFAULT_LONGITUDE};
use crate::forecast::TemperatureSource;
use crate::observation::NOTIFICATION_SUBJECT;

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CRON: &str = "0 0 * * * *";
pub const DEFAULT_KEY_EXPR: &str = "meteoloop/{machine_id}/weather";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid location: {0}")]
    Location(#[from] CoordinateError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub location: LocationConfig,
    pub fetch: FetchConfig,
    pub store: StoreConfig,
    pub blob: BlobConfig,
    pub notify: NotifyConfig,
    pub schedule: ScheduleConfig,
}

/// Location used when a trigger carries no coordinates.
///
/// Kept as strings so the configured digits reach the request unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: String,
    pub longitude: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: DEFAULT_LATITUDE.to_string(),
            longitude: DEFAULT_LONGITUDE.to_string(),
        }
    }
}

impl LocationConfig {
    pub fn coordinate(&self) -> std::result::Result<Coordinate, CoordinateError> {
        Coordinate::parse(&self.latitude, &self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature_source: TemperatureSource,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            temperature_source: TemperatureSource::default(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/meteoloop.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub root: PathBuf,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/blobs"),
        }
    }
}

/// Notification channel settings.
///
/// `ZENOH_ENDPOINT` / `METEOLOOP_ZENOH_ENDPOINT` take precedence over
/// `zenoh_endpoint`. `{machine_id}` in `key_expr` expands to the hostname.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub key_expr: String,
    pub zenoh_endpoint: Option<String>,
    pub subject: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            key_expr: DEFAULT_KEY_EXPR.to_string(),
            zenoh_endpoint: None,
            subject: NOTIFICATION_SUBJECT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 5- or 6-field cron expression, evaluated in UTC.
    pub cron: String,
    /// Run one tick immediately instead of waiting for the first occurrence.
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: DEFAULT_CRON.to_string(),
            run_on_start: false,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate YAML text.
    pub fn parse(yaml: &str) -> Result<Self> {
        // serde_yaml reads an empty document as unit, not as an empty map
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.location.coordinate()?;

        let url = self.fetch.base_url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "fetch.base_url must be an http(s) URL, got '{}'",
                self.fetch.base_url
            )));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch.timeout_secs must be greater than zero".to_string(),
            ));
        }

        let cron_expr = crate::scheduler::normalize_cron_expr(&self.schedule.cron);
        cron::Schedule::from_str(&cron_expr).map_err(|e| {
            ConfigError::Invalid(format!("schedule.cron '{}': {}", self.schedule.cron, e))
        })?;

        if self.notify.key_expr.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notify.key_expr must not be empty".to_string(),
            ));
        }
        if self.notify.subject.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notify.subject must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = PipelineConfig::parse("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.fetch.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.fetch.timeout(), Duration::from_secs(10));
        assert_eq!(config.schedule.cron, "0 0 * * * *");
        assert_eq!(config.notify.subject, "New Weather Data Notification");
        assert_eq!(config.location.coordinate().unwrap(), Coordinate::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
location:
  latitude: "35.6895"
fetch:
  temperature_source: current
schedule:
  cron: "*/15 * * * *"
  run_on_start: true
"#;
        let config = PipelineConfig::parse(yaml).unwrap();
        assert_eq!(config.location.latitude, "35.6895");
        assert_eq!(config.location.longitude, DEFAULT_LONGITUDE);
        assert_eq!(config.fetch.temperature_source, TemperatureSource::Current);
        assert_eq!(config.fetch.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(config.schedule.run_on_start);
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = PipelineConfig::parse("fetch:\n  timeout_secs: 0\n").unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn rejects_bad_cron() {
        let err = PipelineConfig::parse("schedule:\n  cron: \"every hour\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("schedule.cron"));
    }

    #[test]
    fn rejects_out_of_range_location() {
        let err = PipelineConfig::parse("location:\n  latitude: \"91\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Location(CoordinateError::OutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = PipelineConfig::parse("fetch:\n  base_url: ftp://example.com\n").unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn rejects_unknown_temperature_source() {
        let err =
            PipelineConfig::parse("fetch:\n  temperature_source: max_daily\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reads_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "blob:\n  root: /var/lib/meteoloop/blobs").unwrap();
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.blob.root, PathBuf::from("/var/lib/meteoloop/blobs"));
    }

    #[test]
    fn from_file_missing_names_path() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/meteoloop.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/meteoloop.yaml"));
    }

    #[test]
    fn shipped_config_parses() {
        let config = PipelineConfig::parse(include_str!("../configs/meteoloop.yaml")).unwrap();
        assert_eq!(
            config.notify.zenoh_endpoint.as_deref(),
            Some("tcp/127.0.0.1:7447")
        );
        assert_eq!(config.fetch, FetchConfig::default());
        assert_eq!(config.schedule, ScheduleConfig::default());
    }

    #[test]
    fn load_without_path_is_default() {
        assert_eq!(PipelineConfig::load(None).unwrap(), PipelineConfig::default());
    }
}
