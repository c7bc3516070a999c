//! S3 storage backend using rust-s3 crate.
//!
//! Supports AWS S3 and S3-compatible services (MinIO, etc.). A custom
//! endpoint switches the client to path-style addressing.

use async_trait::async_trait;
use bytes::Bytes;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use s3::BucketConfiguration;
use std::time::Duration;

use super::{PresignedUrl, StorageBackend, StoredObject};
use crate::config::Config;
use crate::error::{AppError, Result};

/// S3 presigned URLs cannot outlive seven days
const MAX_PRESIGN_SECS: u64 = 604_800;

/// S3 storage backend configuration
#[derive(Clone)]
pub struct S3Config {
    /// AWS region
    pub region: String,
    /// Custom endpoint URL (for MinIO compatibility)
    pub endpoint: Option<String>,
    /// Static access key; the default credential chain is used when unset
    pub access_key: Option<String>,
    /// Static secret key
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key.as_ref().map(|_| "[REDACTED]"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl S3Config {
    pub fn from_config(config: &Config) -> Self {
        Self {
            region: config.s3_region.clone(),
            endpoint: config.s3_endpoint.clone(),
            access_key: config.s3_access_key.clone(),
            secret_key: config.s3_secret_key.clone(),
        }
    }
}

/// S3-compatible storage backend
pub struct S3Backend {
    region: Region,
    credentials: Credentials,
    /// Whether to use path-style access (for MinIO)
    use_path_style: bool,
}

impl S3Backend {
    /// Create new S3 backend from configuration
    pub fn new(config: S3Config) -> Result<Self> {
        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(ak), Some(sk)) => {
                Credentials::new(Some(ak.as_str()), Some(sk.as_str()), None, None, None)
                    .map_err(|e| AppError::Config(format!("Invalid S3 credentials: {}", e)))?
            }
            // env vars -> ~/.aws/credentials -> container credentials -> instance metadata
            _ => Credentials::default()
                .map_err(|e| AppError::Config(format!("Failed to load AWS credentials: {}", e)))?,
        };

        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|_| AppError::Config(format!("Invalid S3 region: {}", config.region)))?,
        };

        let use_path_style = config.endpoint.is_some();

        tracing::info!(
            region = %config.region,
            endpoint = ?config.endpoint,
            path_style = use_path_style,
            "S3 storage backend configured"
        );

        Ok(Self {
            region,
            credentials,
            use_path_style,
        })
    }

    /// Bucket handle for a name. Handles are cheap and not cached.
    fn bucket(&self, name: &str) -> Result<Box<Bucket>> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| AppError::Config(format!("Failed to create S3 bucket handle: {}", e)))?;
        Ok(if self.use_path_style {
            bucket.with_path_style()
        } else {
            bucket
        })
    }

    async fn create_bucket(&self, name: &str) -> Result<()> {
        let config = BucketConfiguration::default();
        let created = if self.use_path_style {
            Bucket::create_with_path_style(
                name,
                self.region.clone(),
                self.credentials.clone(),
                config,
            )
            .await
        } else {
            Bucket::create(name, self.region.clone(), self.credentials.clone(), config).await
        };

        match created {
            Ok(resp) if resp.success() => {
                tracing::info!(bucket = %name, "Created storage bucket");
                Ok(())
            }
            Ok(resp) if is_already_exists(&resp.response_text) => Ok(()),
            Ok(resp) => Err(AppError::StorageUnavailable(format!(
                "Failed to create bucket '{}': {} {}",
                name, resp.response_code, resp.response_text
            ))),
            Err(e) if is_already_exists(&e.to_string()) => Ok(()),
            Err(e) => Err(AppError::StorageUnavailable(format!(
                "Failed to create bucket '{}': {}",
                name, e
            ))),
        }
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("404") || message.contains("NoSuchKey") || message.contains("Not Found")
}

/// Another caller won the creation race, or we already own it
fn is_already_exists(message: &str) -> bool {
    message.contains("BucketAlreadyOwnedByYou") || message.contains("BucketAlreadyExists")
}

fn classify(op: &str, key: &str, e: S3Error) -> AppError {
    let message = e.to_string();
    if is_not_found(&message) {
        AppError::NotFound(format!("Storage key not found: {}", key))
    } else {
        AppError::StorageUnavailable(format!("Failed to {} '{}': {}", op, key, message))
    }
}

fn presign_secs(expires_in: Duration) -> u32 {
    expires_in.as_secs().clamp(1, MAX_PRESIGN_SECS) as u32
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        let handle = self.bucket(bucket)?;
        match handle.exists().await {
            Ok(true) => Ok(()),
            Ok(false) => self.create_bucket(bucket).await,
            Err(e) => Err(AppError::StorageUnavailable(format!(
                "Failed to check bucket '{}': {}",
                bucket, e
            ))),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> Result<()> {
        let handle = self.bucket(bucket)?;
        let content_type = content_type.unwrap_or("application/octet-stream");

        handle
            .put_object_with_content_type(key, &content, content_type)
            .await
            .map_err(|e| classify("put object", key, e))?;

        tracing::debug!(bucket = %bucket, key = %key, size = content.len(), "S3 put object successful");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let handle = self.bucket(bucket)?;
        let response = handle
            .get_object(key)
            .await
            .map_err(|e| classify("get object", key, e))?;

        if response.status_code() == 404 {
            return Err(AppError::NotFound(format!("Storage key not found: {}", key)));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .cloned()
            .filter(|ct| ct != "binary/octet-stream");

        tracing::debug!(bucket = %bucket, key = %key, size = response.bytes().len(), "S3 get object successful");
        Ok(StoredObject {
            data: Bytes::from(response.to_vec()),
            content_type,
        })
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let handle = self.bucket(bucket)?;
        match handle.head_object(key).await {
            Ok((_, 404)) => Ok(false),
            Ok(_) => Ok(true),
            Err(e) => match classify("check existence of", key, e) {
                AppError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let handle = self.bucket(bucket)?;
        handle
            .delete_object(key)
            .await
            .map_err(|e| classify("delete object", key, e))?;

        tracing::debug!(bucket = %bucket, key = %key, "S3 delete object successful");
        Ok(())
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<Option<PresignedUrl>> {
        let handle = self.bucket(bucket)?;
        let url = handle
            .presign_get(key, presign_secs(expires_in), None)
            .await
            .map_err(|e| {
                AppError::StorageUnavailable(format!(
                    "Failed to generate presigned URL for '{}': {}",
                    key, e
                ))
            })?;

        tracing::debug!(key = %key, expires_in_secs = expires_in.as_secs(), "Generated S3 presigned GET URL");
        Ok(Some(PresignedUrl { url, expires_in }))
    }

    async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<Option<PresignedUrl>> {
        let handle = self.bucket(bucket)?;
        let url = handle
            .presign_put(key, presign_secs(expires_in), None, None)
            .await
            .map_err(|e| {
                AppError::StorageUnavailable(format!(
                    "Failed to generate presigned upload URL for '{}': {}",
                    key, e
                ))
            })?;

        tracing::debug!(key = %key, expires_in_secs = expires_in.as_secs(), "Generated S3 presigned PUT URL");
        Ok(Some(PresignedUrl { url, expires_in }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> S3Config {
        S3Config {
            region: "us-east-1".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(is_not_found("Got HTTP 404 with content 'NoSuchKey'"));
        assert!(!is_not_found("Got HTTP 403 with content 'AccessDenied'"));
        assert!(is_already_exists("<Code>BucketAlreadyOwnedByYou</Code>"));
        assert!(!is_already_exists("<Code>AccessDenied</Code>"));
    }

    #[test]
    fn test_presign_secs_is_clamped() {
        assert_eq!(presign_secs(Duration::from_secs(0)), 1);
        assert_eq!(presign_secs(Duration::from_secs(3600)), 3600);
        assert_eq!(presign_secs(Duration::from_secs(10 * 86_400)), 604_800);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let output = format!("{:?}", local_config());
        assert!(!output.contains("minioadmin"));
        assert!(output.contains("localhost:9000"));
    }

    #[tokio::test]
    async fn test_presigned_get_url_is_signed_locally() {
        let backend = S3Backend::new(local_config()).unwrap();
        let presigned = backend
            .presigned_get_url("visomaster", "uploads/abc/cat.png", Duration::from_secs(300))
            .await
            .unwrap()
            .unwrap();

        assert!(presigned.url.starts_with("http://localhost:9000/visomaster/"));
        assert!(presigned.url.contains("X-Amz-Signature"));
        assert_eq!(presigned.expires_in, Duration::from_secs(300));
    }

    /// Run with: S3_ENDPOINT=http://localhost:9000 cargo test s3_round_trip --lib -- --ignored
    #[tokio::test]
    #[ignore] // Requires a reachable S3-compatible service
    async fn test_s3_round_trip() {
        let mut config = local_config();
        if let Ok(endpoint) = std::env::var("S3_ENDPOINT") {
            config.endpoint = Some(endpoint);
        }
        let backend = S3Backend::new(config).unwrap();
        backend.ensure_bucket("viso-admin-test").await.unwrap();
        backend.ensure_bucket("viso-admin-test").await.unwrap();

        let key = format!("tests/{}.txt", uuid::Uuid::new_v4());
        backend
            .put("viso-admin-test", &key, Bytes::from_static(b"hello"), Some("text/plain"))
            .await
            .unwrap();
        let object = backend.get("viso-admin-test", &key).await.unwrap();
        assert_eq!(object.data.as_ref(), b"hello");
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));

        backend.delete("viso-admin-test", &key).await.unwrap();
        assert!(!backend.exists("viso-admin-test", &key).await.unwrap());
    }
}
