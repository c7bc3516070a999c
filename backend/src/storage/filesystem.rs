//! Filesystem storage backend.
//!
//! Buckets map to directories under the base path and keys to relative paths
//! inside them. Content types are not recorded.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{StorageBackend, StoredObject};
use crate::error::{AppError, Result};

/// Filesystem-based storage backend
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    /// Create new filesystem storage
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket.starts_with('.') {
            return Err(AppError::Validation(format!("Invalid bucket name '{}'", bucket)));
        }
        Ok(self.base_path.join(bucket))
    }

    /// Map a key onto a path, refusing anything that could leave the bucket.
    fn key_to_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let clean = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(AppError::Validation(format!("Invalid storage key '{}'", key)));
        }
        Ok(self.bucket_path(bucket)?.join(relative))
    }
}

fn io_error(op: &str, key: &str, e: std::io::Error) -> AppError {
    if e.kind() == std::io::ErrorKind::NotFound {
        AppError::NotFound(format!("Storage key not found: {}", key))
    } else {
        AppError::StorageUnavailable(format!("Failed to {} {}: {}", op, key, e))
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        let path = self.bucket_path(bucket)?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| io_error("create bucket", bucket, e))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        _content_type: Option<&str>,
    ) -> Result<()> {
        let path = self.key_to_path(bucket, key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("write", key, e))?;
        }

        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| io_error("write", key, e))?;
        file.write_all(&content)
            .await
            .map_err(|e| io_error("write", key, e))?;
        file.sync_all().await.map_err(|e| io_error("write", key, e))?;

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let path = self.key_to_path(bucket, key)?;
        let content = fs::read(&path)
            .await
            .map_err(|e| io_error("read", key, e))?;
        Ok(StoredObject {
            data: Bytes::from(content),
            content_type: None,
        })
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let path = self.key_to_path(bucket, key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.key_to_path(bucket, key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| io_error("delete", key, e))
    }
}
