//! In-memory sinks for tests and `--dry-run`.
//!
//! Each one can be told to fail its next writes with [`fail_with`], which is
//! how partial-write behavior is exercised.
//!
//! [`fail_with`]: MemoryRecordStore::fail_with

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{BlobStore, Notification, Notifier, RecordStore, Result, SinkError};
use crate::observation::Observation;

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn check(failure: &Mutex<Option<String>>) -> Result<()> {
    match guard(failure).as_ref() {
        Some(msg) => Err(SinkError::Unavailable(msg.clone())),
        None => Ok(()),
    }
}

// ── Record store ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRecordStore {
    rows: Mutex<Vec<Observation>>,
    failure: Mutex<Option<String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *guard(&self.failure) = Some(message.into());
    }

    pub fn records(&self) -> Vec<Observation> {
        guard(&self.rows).clone()
    }

    pub fn len(&self) -> usize {
        guard(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(&self, observation: &Observation) -> Result<()> {
        check(&self.failure)?;
        let mut rows = guard(&self.rows);
        if rows.iter().any(|o| o.record_id == observation.record_id) {
            return Err(SinkError::Unavailable("record id already exists".to_string()));
        }
        rows.push(observation.clone());
        Ok(())
    }

    async fn get(&self, record_id: &str) -> Result<Option<Observation>> {
        Ok(guard(&self.rows)
            .iter()
            .find(|o| o.record_id == record_id)
            .cloned())
    }
}

// ── Blob store ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failure: Mutex<Option<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *guard(&self.failure) = Some(message.into());
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        guard(&self.objects).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        guard(&self.objects).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        guard(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        check(&self.failure)?;
        guard(&self.objects).insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(guard(&self.objects).get(key).map(|o| o.body.clone()))
    }
}

// ── Notifier ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    failure: Mutex<Option<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *guard(&self.failure) = Some(message.into());
    }

    pub fn sent(&self) -> Vec<Notification> {
        guard(&self.sent).clone()
    }

    pub fn len(&self) -> usize {
        guard(&self.sent).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        check(&self.failure)?;
        guard(&self.sent).push(notification.clone());
        Ok(())
    }
}
