//! End-to-end pipeline tests against an in-process upstream.
//!
//! An axum server plays Open-Meteo; SQLite and the filesystem blob store run
//! in a temp dir; notifications go to the in-memory notifier.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use meteoloop::config::FetchConfig;
use meteoloop::coordinate::Coordinate;
use meteoloop::forecast::TemperatureSource;
use meteoloop::sinks::{
    BlobStore, FsBlobStore, MemoryNotifier, RecordStore, Sinks, SqliteRecordStore,
};
use meteoloop::{FetchEnvelope, Observation, Persister, Pipeline, WeatherFetcher};

#[derive(Clone)]
struct Upstream {
    status: StatusCode,
    body: String,
    requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn forecast(
    State(upstream): State<Upstream>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    upstream.requests.lock().unwrap().push(params);
    (upstream.status, upstream.body.clone())
}

/// Start a fake forecast API; returns its URL and the recorded query params.
async fn spawn_upstream(
    status: StatusCode,
    body: impl Into<String>,
) -> (String, Arc<Mutex<Vec<HashMap<String, String>>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = Upstream {
        status,
        body: body.into(),
        requests: requests.clone(),
    };
    let app = Router::new()
        .route("/v1/forecast", get(forecast))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1/forecast"), requests)
}

fn tokyo_body() -> String {
    json!({
        "latitude": 35.7,
        "longitude": 139.6875,
        "generationtime_ms": 0.03,
        "timezone": "GMT",
        "hourly_units": {"time": "iso8601", "temperature_2m": "°C"},
        "hourly": {
            "time": ["2024-03-01T00:00", "2024-03-01T01:00", "2024-03-01T02:00"],
            "temperature_2m": [18.3, 17.9, 17.4]
        }
    })
    .to_string()
}

struct Harness {
    _dir: TempDir,
    records: Arc<SqliteRecordStore>,
    blobs: Arc<FsBlobStore>,
    notifier: Arc<MemoryNotifier>,
    pipeline: Pipeline,
}

fn harness(base_url: &str, blob_root: Option<std::path::PathBuf>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let records = Arc::new(SqliteRecordStore::open(&dir.path().join("obs.db")).unwrap());
    let blobs = Arc::new(FsBlobStore::new(
        blob_root.unwrap_or_else(|| dir.path().join("blobs")),
    ));
    let notifier = Arc::new(MemoryNotifier::new());
    let sinks = Sinks::new(records.clone(), blobs.clone(), notifier.clone());

    let config = FetchConfig {
        base_url: base_url.to_string(),
        timeout_secs: 5,
        temperature_source: TemperatureSource::FirstHourly,
    };
    let location = Coordinate::default();
    let fetcher = WeatherFetcher::new(&config, location).unwrap();
    let persister = Persister::new(sinks, config.temperature_source);
    Harness {
        _dir: dir,
        records,
        blobs,
        notifier,
        pipeline: Pipeline::new(fetcher, persister, location),
    }
}

fn blob_count(h: &Harness) -> usize {
    let dir = h.blobs.root().join("weather_data");
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn tokyo_end_to_end() {
    let (url, requests) = spawn_upstream(StatusCode::OK, tokyo_body()).await;
    let h = harness(&url, None);

    let coordinate = Coordinate::parse("35.6895", "139.6917").unwrap();
    let out = h.pipeline.run_once(&coordinate).await;

    assert_eq!(out.status_code, 200, "body: {}", out.body);
    let body = out.body_json().unwrap();
    assert_eq!(body["message"], "Data stored successfully!");
    let record_id = out.record_id().unwrap();

    // Upstream saw exactly one request with the right parameters.
    let seen = requests.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["latitude"], "35.6895");
    assert_eq!(seen[0]["longitude"], "139.6917");
    assert_eq!(seen[0]["hourly"], "temperature_2m");
    assert!(!seen[0].contains_key("current_weather"));

    // One row, one object, one message.
    assert_eq!(h.records.count().unwrap(), 1);
    assert_eq!(blob_count(&h), 1);
    assert_eq!(h.notifier.len(), 1);

    let row = h.records.get(&record_id).await.unwrap().unwrap();
    assert_eq!(row.temperature.to_string(), "18.3");
    assert_eq!(row.latitude.to_string(), "35.7");
    assert_eq!(row.longitude.to_string(), "139.6875");

    let blob = h
        .blobs
        .get(&format!("weather_data/{record_id}.json"))
        .await
        .unwrap()
        .unwrap();
    let blob_obs: Observation = serde_json::from_slice(&blob).unwrap();
    assert_eq!(blob_obs, row);

    let sent = &h.notifier.sent()[0];
    assert_eq!(sent.subject, "New Weather Data Notification");
    let msg: Value = serde_json::from_str(&sent.message).unwrap();
    assert_eq!(msg["message"], "New weather data stored");
    assert_eq!(msg["record_id"], record_id.as_str());
    assert_eq!(msg["temperature"], "18.3");
}

#[tokio::test]
async fn repeated_ticks_store_duplicates() {
    let (url, _) = spawn_upstream(StatusCode::OK, tokyo_body()).await;
    let h = harness(&url, None);

    let a = h.pipeline.run_once(&h.pipeline.location()).await;
    let b = h.pipeline.run_once(&h.pipeline.location()).await;
    assert!(a.is_success() && b.is_success());
    assert_ne!(a.record_id(), b.record_id());

    assert_eq!(h.records.count().unwrap(), 2);
    assert_eq!(blob_count(&h), 2);
    assert_eq!(h.notifier.len(), 2);
}

#[tokio::test]
async fn stored_decimals_reread_identically() {
    let body = json!({
        "latitude": -33.875,
        "longitude": 151.25,
        "hourly": {"temperature_2m": [0.30000000000000004]}
    })
    .to_string();
    let (url, _) = spawn_upstream(StatusCode::OK, body).await;
    let h = harness(&url, None);

    let out = h.pipeline.run_once(&h.pipeline.location()).await;
    let id = out.record_id().unwrap();

    let first = h.records.get(&id).await.unwrap().unwrap();
    let second = h.records.get(&id).await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.temperature.to_string(), "0.30000000000000004");
    assert_eq!(first.latitude.to_string(), "-33.875");
}

#[tokio::test]
async fn blob_failure_after_row_commit() {
    let (url, _) = spawn_upstream(StatusCode::OK, tokyo_body()).await;
    // A regular file where the blob root directory should be.
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let h = harness(&url, Some(blocker.path().to_path_buf()));

    let out = h.pipeline.run_once(&h.pipeline.location()).await;
    assert_eq!(out.status_code, 500);
    assert!(out.error_message().unwrap().contains("blob store"));
    assert!(out.record_id().is_none());

    // The row stays; nothing downstream of the blob store ran.
    let rows = h.records.recent(10).unwrap();
    assert_eq!(rows.len(), 1);
    assert!(
        !out.body.contains(&rows[0].record_id),
        "error body echoes the stored id: {}",
        out.body
    );
    assert!(h
        .blobs
        .get(&rows[0].blob_key())
        .await
        .map(|b| b.is_none())
        .unwrap_or(true));
    assert!(h.notifier.is_empty());
}

#[tokio::test]
async fn missing_hourly_is_a_fetch_failure() {
    let (url, _) = spawn_upstream(
        StatusCode::OK,
        json!({"latitude": 35.7, "longitude": 139.6875}).to_string(),
    )
    .await;
    let h = harness(&url, None);

    let fetched = h.pipeline.fetcher().fetch(&h.pipeline.location()).await;
    assert_eq!(fetched.status_code, 500);
    assert!(fetched.body.starts_with("Error fetching weather data: "));
    assert!(fetched.body.contains("hourly.temperature_2m"));

    let out = h.pipeline.run_once(&h.pipeline.location()).await;
    assert_eq!(out.status_code, 500);
    assert_eq!(h.records.count().unwrap(), 0);
    assert_eq!(blob_count(&h), 0);
    assert!(h.notifier.is_empty());
}

#[tokio::test]
async fn persister_rejects_success_without_hourly() {
    // Hand the Persister a success envelope the Fetcher would have refused.
    let h = harness("http://127.0.0.1:9/v1/forecast", None);
    let body = json!({"latitude": 35.7, "longitude": 139.6875}).to_string();

    let out = h.pipeline.persister().persist(&FetchEnvelope::ok(body)).await;
    assert_eq!(out.status_code, 500);
    assert!(out.error_message().unwrap().contains("hourly"));

    assert_eq!(h.records.count().unwrap(), 0);
    assert_eq!(blob_count(&h), 0);
    assert!(h.notifier.is_empty());
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let app = Router::new().route(
        "/v1/forecast",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, tokyo_body())
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = FetchConfig {
        base_url: format!("http://{addr}/v1/forecast"),
        timeout_secs: 1,
        temperature_source: TemperatureSource::FirstHourly,
    };
    let fetcher = WeatherFetcher::new(&config, Coordinate::default()).unwrap();

    let started = Instant::now();
    let fetched = fetcher.fetch(&Coordinate::default()).await;
    let elapsed = started.elapsed();

    assert_eq!(fetched.status_code, 500);
    assert!(fetched.body.starts_with("Error fetching weather data: "));
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
}

#[tokio::test]
async fn upstream_error_status_is_a_fetch_failure() {
    let (url, _) = spawn_upstream(
        StatusCode::BAD_REQUEST,
        r#"{"error":true,"reason":"Latitude must be in range of -90 to 90°."}"#,
    )
    .await;
    let h = harness(&url, None);

    let fetched = h.pipeline.fetcher().fetch(&h.pipeline.location()).await;
    assert_eq!(fetched.status_code, 500);
    assert!(fetched.body.starts_with("Error fetching weather data: "));
    assert!(fetched.body.contains("Latitude must be in range"));

    let out = h.pipeline.persister().persist(&fetched).await;
    assert_eq!(out.status_code, 500);
    assert_eq!(h.records.count().unwrap(), 0);
}

#[tokio::test]
async fn non_json_success_is_a_fetch_failure() {
    let (url, _) = spawn_upstream(StatusCode::OK, "<html>maintenance</html>").await;
    let h = harness(&url, None);

    let fetched = h.pipeline.fetcher().fetch(&h.pipeline.location()).await;
    assert_eq!(fetched.status_code, 500);
    assert!(fetched.body.contains("not JSON"));
}

#[tokio::test]
async fn success_body_is_reserialized_upstream_json() {
    let (url, _) = spawn_upstream(StatusCode::OK, tokyo_body()).await;
    let h = harness(&url, None);

    let fetched = h.pipeline.fetcher().fetch(&h.pipeline.location()).await;
    assert_eq!(fetched.status_code, 200);
    let v: Value = serde_json::from_str(&fetched.body).unwrap();
    assert_eq!(v["hourly"]["temperature_2m"][0], 18.3);
}

#[tokio::test]
async fn query_defaults_fill_missing_coordinates() {
    let (url, requests) = spawn_upstream(StatusCode::OK, tokyo_body()).await;
    let h = harness(&url, None);

    let params = HashMap::from([("latitude".to_string(), "48.8566".to_string())]);
    let out = h.pipeline.run_query(&params).await;
    assert!(out.is_success());

    let seen = requests.lock().unwrap().clone();
    assert_eq!(seen[0]["latitude"], "48.8566");
    assert_eq!(seen[0]["longitude"], "10.6346");
}
