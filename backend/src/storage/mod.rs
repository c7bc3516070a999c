//! Blob storage backends.
//!
//! Objects are addressed by (bucket, key). Backends never interpret keys
//! beyond mapping them onto their own namespace.

pub mod filesystem;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::error::Result;

pub use filesystem::FilesystemBackend;
pub use s3::{S3Backend, S3Config};

/// Result of a presigned URL request
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    /// The presigned URL for direct access
    pub url: String,
    /// How long the URL stays valid
    pub expires_in: Duration,
}

/// Object bytes plus whatever content type the backend recorded
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// Storage backend trait
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Create the bucket if it does not exist. Safe to call concurrently.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    /// Store content under the key, replacing any existing object
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> Result<()>;

    /// Retrieve content by key. Missing objects are `NotFound`.
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject>;

    /// Check if key exists
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Delete content by key
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Get a presigned URL for direct download (if supported)
    ///
    /// Returns `Ok(None)` when the backend cannot issue presigned URLs.
    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<Option<PresignedUrl>> {
        let _ = (bucket, key, expires_in);
        Ok(None)
    }

    /// Get a presigned URL for direct upload (if supported)
    async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<Option<PresignedUrl>> {
        let _ = (bucket, key, expires_in);
        Ok(None)
    }
}
