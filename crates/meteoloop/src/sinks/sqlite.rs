//! SQLite record store.
//!
//! One `observations` table keyed by `record_id`. Decimal columns are stored
//! as TEXT: SQLite's REAL affinity is binary floating point and would drift
//! on re-read.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use super::{RecordStore, Result, SinkError};
use crate::observation::Observation;

/// SQLite-backed observation table.
///
/// The connection sits behind a `Mutex` that is locked only for the
/// synchronous rusqlite calls, never across an `.await`.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS observations (
                record_id   TEXT PRIMARY KEY,
                timestamp   TEXT NOT NULL,
                temperature TEXT NOT NULL,
                latitude    TEXT NOT NULL,
                longitude   TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_obs_ts ON observations(timestamp);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SinkError::Unavailable(format!("record store lock poisoned: {e}")))
    }

    /// Number of stored observations.
    pub fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Most recent observations first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Observation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, timestamp, temperature, latitude, longitude \
             FROM observations ORDER BY timestamp DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], raw_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(decode_row(row?)?);
        }
        Ok(out)
    }

    fn insert(&self, obs: &Observation) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO observations (record_id, timestamp, temperature, latitude, longitude) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                obs.record_id,
                obs.timestamp,
                obs.temperature.to_string(),
                obs.latitude.to_string(),
                obs.longitude.to_string(),
            ],
        )?;
        Ok(())
    }

    fn select(&self, record_id: &str) -> Result<Option<Observation>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT record_id, timestamp, temperature, latitude, longitude \
                 FROM observations WHERE record_id = ?1",
                params![record_id],
                raw_row,
            )
            .optional()?;
        row.map(decode_row).transpose()
    }
}

type RawRow = (String, String, String, String, String);

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_row(
    (record_id, timestamp, temperature, latitude, longitude): RawRow,
) -> Result<Observation> {
    let decimal = |column: &str, text: &str| {
        Decimal::from_str(text).map_err(|e| SinkError::Corrupt {
            record_id: record_id.clone(),
            reason: format!("{column} '{text}': {e}"),
        })
    };
    Ok(Observation {
        temperature: decimal("temperature", &temperature)?,
        latitude: decimal("latitude", &latitude)?,
        longitude: decimal("longitude", &longitude)?,
        record_id: record_id.clone(),
        timestamp,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn put(&self, observation: &Observation) -> Result<()> {
        self.insert(observation)
    }

    async fn get(&self, record_id: &str) -> Result<Option<Observation>> {
        self.select(record_id)
    }
}
