//! Filesystem-backed blob store.
//!
//! Keys are `/`-separated relative paths below a root directory. Objects are
//! written to a sibling temp file and renamed into place, so readers never
//! observe a partial object.
//!
//! Nothing is stored beside the bytes: an object's content type is derived
//! from its key's extension (see [`content_type_for`]), and a put whose
//! declared type disagrees is refused.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use super::{BlobStore, Result, SinkError};

/// Content type an object under `key` is served as.
pub fn content_type_for(key: &str) -> &'static str {
    match Path::new(key).extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root, rejecting anything that would
    /// land outside it.
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('\\') || key.ends_with('/') {
            return Err(SinkError::InvalidKey(key.to_string()));
        }
        let rel = Path::new(key);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(SinkError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let path = self.resolve(key)?;
        let stored = content_type_for(key);
        if stored != content_type {
            return Err(SinkError::ContentType {
                given: content_type.to_string(),
                stored,
            });
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SinkError::InvalidKey(key.to_string()))?;
        let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&tmp, &body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        log::debug!("Stored blob {} ({} bytes, {})", path.display(), body.len(), stored);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
