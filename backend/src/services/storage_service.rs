//! Object storage gateway.
//!
//! Owns object placement (bucket/key layout), presigned URL issuance, proxied
//! downloads and the thumbnail cache. Blob writes always happen before the
//! metadata row is committed, so metadata never points at a missing object.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::image::{Image, NewImage};
use crate::services::thumbnail::{make_thumbnail, sniff_mime, thumbnail_key};
use crate::storage::{PresignedUrl, StorageBackend};
use crate::store::Store;

const DEFAULT_UPLOAD_DIR: &str = "uploads";
const OCTET_STREAM: &str = "application/octet-stream";

/// Column widths of the `images` table
const MAX_BUCKET_LEN: usize = 128;
const MAX_KEY_LEN: usize = 255;
const MAX_FILENAME_LEN: usize = 255;
const MAX_MIME_LEN: usize = 128;
const MAX_CHECKSUM_LEN: usize = 128;

/// Object bytes ready to be sent to a client
#[derive(Debug, Clone)]
pub struct ObjectDownload {
    pub data: Bytes,
    pub content_type: String,
    pub filename: Option<String>,
}

/// A freshly stored image and its eagerly derived thumbnail, if any
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub image: Image,
    pub thumbnail_key: Option<String>,
}

/// Input for a direct (proxied) upload
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub directory: Option<String>,
    pub data: Bytes,
    pub uploader_admin_id: Option<i64>,
}

/// Metadata for an object the client already uploaded through a presigned URL
#[derive(Debug, Clone)]
pub struct ImageRegistration {
    pub bucket: Option<String>,
    pub key: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub checksum_sha256: Option<String>,
    pub uploader_admin_id: Option<i64>,
}

/// Storage service
pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
    store: Arc<dyn Store>,
    config: Arc<Config>,
}

impl StorageService {
    pub fn new(backend: Arc<dyn StorageBackend>, store: Arc<dyn Store>, config: Arc<Config>) -> Self {
        Self {
            backend,
            store,
            config,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Bucket that receives new uploads
    pub fn default_bucket(&self) -> &str {
        &self.config.s3_bucket
    }

    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.config.presign_expiry_secs)
    }

    /// Idempotent bucket provisioning
    pub async fn ensure_bucket_exists(&self, bucket: &str) -> Result<()> {
        self.backend.ensure_bucket(bucket).await?;
        tracing::info!(
            bucket = %bucket,
            region = %self.config.s3_region,
            backend = self.backend.name(),
            "Storage bucket ready"
        );
        Ok(())
    }

    /// Upload bytes, replacing any object at the key
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<()> {
        self.backend.put(bucket, key, data, content_type).await
    }

    /// Direct-to-storage upload URL for a fresh key in the default bucket
    pub async fn presigned_put_url(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<PresignedUrl> {
        self.backend
            .presigned_put_url(self.default_bucket(), key, ttl)
            .await?
            .ok_or_else(|| {
                AppError::StorageUnavailable(format!(
                    "{} storage does not issue presigned upload URLs",
                    self.backend.name()
                ))
            })
    }

    /// Direct download URL, or `None` when the backend cannot presign
    pub async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<PresignedUrl>> {
        self.backend.presigned_get_url(bucket, key, ttl).await
    }

    /// Fetch an image's bytes for relaying to the client
    pub async fn proxy_download(&self, image: &Image) -> Result<ObjectDownload> {
        let object = self.backend.get(&image.bucket, &image.key).await?;
        let content_type = image
            .mime_type
            .clone()
            .or(object.content_type)
            .unwrap_or_else(|| OCTET_STREAM.to_string());

        Ok(ObjectDownload {
            data: object.data,
            content_type,
            filename: Some(image.filename.clone()),
        })
    }

    /// Serve the cached thumbnail, deriving and storing it on a miss.
    ///
    /// Concurrent misses may each derive and write the same key; the output
    /// is identical so the last write wins harmlessly.
    pub async fn get_or_create_thumbnail(
        &self,
        bucket: &str,
        key: &str,
        max_dimension: u32,
    ) -> Result<ObjectDownload> {
        let thumb_key = thumbnail_key(key);

        match self.backend.get(bucket, &thumb_key).await {
            Ok(cached) => {
                let content_type = cached
                    .content_type
                    .or_else(|| sniff_mime(&cached.data).map(str::to_string))
                    .unwrap_or_else(|| OCTET_STREAM.to_string());
                return Ok(ObjectDownload {
                    data: cached.data,
                    content_type,
                    filename: None,
                });
            }
            Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let original = self.backend.get(bucket, key).await?;
        let thumb = make_thumbnail(&original.data, max_dimension, Some(key)).map_err(|e| {
            tracing::warn!(bucket = %bucket, key = %key, error = %e, "Thumbnail derivation failed");
            AppError::NotFound(format!("No thumbnail available for {}", key))
        })?;

        self.backend
            .put(bucket, &thumb_key, thumb.data.clone(), Some(thumb.mime_type))
            .await?;
        tracing::debug!(bucket = %bucket, key = %thumb_key, "Stored derived thumbnail");

        Ok(ObjectDownload {
            data: thumb.data,
            content_type: thumb.mime_type.to_string(),
            filename: None,
        })
    }

    /// Store the bytes, derive a thumbnail if possible, then record metadata.
    pub async fn upload_image(&self, upload: ImageUpload) -> Result<UploadedImage> {
        if upload.data.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }

        let bucket = self.default_bucket().to_string();
        let key = new_upload_key(upload.directory.as_deref(), &upload.filename)?;
        let filename = base_filename(&upload.filename)?;
        let content_type = upload
            .content_type
            .filter(|ct| !ct.is_empty() && ct != OCTET_STREAM)
            .or_else(|| sniff_mime(&upload.data).map(str::to_string));
        check_len("content type", content_type.as_deref(), MAX_MIME_LEN)?;

        self.backend
            .put(&bucket, &key, upload.data.clone(), content_type.as_deref())
            .await?;

        let checksum = hex_sha256(&upload.data);
        let thumbnail_key = self.store_eager_thumbnail(&bucket, &key, &upload.data).await;

        let image = self
            .store
            .create_image(NewImage {
                bucket,
                key,
                filename,
                mime_type: content_type,
                size_bytes: Some(upload.data.len() as i64),
                checksum_sha256: Some(checksum),
                uploader_admin_id: upload.uploader_admin_id,
            })
            .await?;

        tracing::info!(
            image_id = image.id,
            key = %image.key,
            size = upload.data.len(),
            thumbnail = thumbnail_key.is_some(),
            "Image uploaded"
        );

        Ok(UploadedImage {
            image,
            thumbnail_key,
        })
    }

    /// Best-effort thumbnail at upload time; failures only lose the thumbnail.
    async fn store_eager_thumbnail(&self, bucket: &str, key: &str, data: &[u8]) -> Option<String> {
        let thumb = match make_thumbnail(data, self.config.thumbnail_max_dimension, Some(key)) {
            Ok(thumb) => thumb,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Skipping thumbnail for upload");
                return None;
            }
        };

        let thumb_key = thumbnail_key(key);
        match self
            .backend
            .put(bucket, &thumb_key, thumb.data, Some(thumb.mime_type))
            .await
        {
            Ok(()) => Some(thumb_key),
            Err(e) => {
                tracing::warn!(key = %thumb_key, error = %e, "Failed to store thumbnail");
                None
            }
        }
    }

    /// Record metadata for an object uploaded through a presigned URL.
    /// The object must already exist.
    pub async fn register_image(&self, registration: ImageRegistration) -> Result<Image> {
        let bucket = registration
            .bucket
            .unwrap_or_else(|| self.default_bucket().to_string());
        check_len("bucket", Some(bucket.as_str()), MAX_BUCKET_LEN)?;
        validate_key(&registration.key)?;
        let filename = base_filename(&registration.filename)?;
        check_len("content type", registration.mime_type.as_deref(), MAX_MIME_LEN)?;
        check_len(
            "checksum",
            registration.checksum_sha256.as_deref(),
            MAX_CHECKSUM_LEN,
        )?;

        if !self.backend.exists(&bucket, &registration.key).await? {
            return Err(AppError::NotFound(format!(
                "Object {}/{} has not been uploaded",
                bucket, registration.key
            )));
        }

        let image = self
            .store
            .create_image(NewImage {
                bucket,
                key: registration.key,
                filename,
                mime_type: registration.mime_type,
                size_bytes: registration.size_bytes,
                checksum_sha256: registration.checksum_sha256,
                uploader_admin_id: registration.uploader_admin_id,
            })
            .await?;

        tracing::info!(image_id = image.id, key = %image.key, "Image registered");
        Ok(image)
    }

    /// Live image by id; soft-deleted images are `NotFound`
    pub async fn find_live_image(&self, image_id: i64) -> Result<Image> {
        self.store
            .find_image(image_id)
            .await?
            .filter(|image| !image.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", image_id)))
    }

    pub async fn list_images(&self) -> Result<Vec<Image>> {
        self.store.list_images().await
    }

    /// Hide the image from listings and delivery. Bytes stay in storage.
    pub async fn soft_delete_image(&self, image_id: i64) -> Result<()> {
        self.store.soft_delete_image(image_id, Utc::now()).await?;
        tracing::info!(image_id = image_id, "Image soft-deleted");
        Ok(())
    }
}

/// `{directory}/{uuid}/{basename}`, with `uploads` as the default directory
pub fn new_upload_key(directory: Option<&str>, filename: &str) -> Result<String> {
    let directory = directory
        .map(|d| d.trim_matches('/'))
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_UPLOAD_DIR);
    validate_key(directory)?;
    let basename = base_filename(filename)?;
    let key = format!("{}/{}/{}", directory, Uuid::new_v4(), basename);
    validate_key(&key)?;
    Ok(key)
}

/// Last path segment of a client-supplied filename
fn base_filename(filename: &str) -> Result<String> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(AppError::Validation("A filename is required".to_string()));
    }
    check_len("filename", Some(name), MAX_FILENAME_LEN)?;
    Ok(name.to_string())
}

/// Keys are relative paths without empty, `.` or `..` segments
fn validate_key(key: &str) -> Result<()> {
    check_len("storage key", Some(key), MAX_KEY_LEN)?;
    let valid = !key.is_empty()
        && !Path::new(key).is_absolute()
        && key
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Invalid storage key '{}'", key)))
    }
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    match value {
        Some(v) if v.len() > max => Err(AppError::Validation(format!(
            "The {} is longer than {} bytes",
            field, max
        ))),
        _ => Ok(()),
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FilesystemBackend, StoredObject};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts reads of non-thumbnail keys
    struct CountingBackend {
        inner: FilesystemBackend,
        original_reads: AtomicUsize,
    }

    #[async_trait]
    impl StorageBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
            self.inner.ensure_bucket(bucket).await
        }

        async fn put(
            &self,
            bucket: &str,
            key: &str,
            content: Bytes,
            content_type: Option<&str>,
        ) -> Result<()> {
            self.inner.put(bucket, key, content, content_type).await
        }

        async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject> {
            if !key.ends_with(".thumb") {
                self.original_reads.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.get(bucket, key).await
        }

        async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
            self.inner.exists(bucket, key).await
        }

        async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
            self.inner.delete(bucket, key).await
        }
    }

    fn png(width: u32, height: u32) -> Bytes {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 7]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        Bytes::from(out.into_inner())
    }

    fn setup(dir: &TempDir) -> (StorageService, Arc<CountingBackend>) {
        let backend = Arc::new(CountingBackend {
            inner: FilesystemBackend::new(dir.path()),
            original_reads: AtomicUsize::new(0),
        });
        let config = Arc::new(Config::local("secret", dir.path().to_string_lossy()));
        let service = StorageService::new(backend.clone(), Arc::new(MemoryStore::new()), config);
        (service, backend)
    }

    #[test]
    fn test_new_upload_key_layout() {
        let key = new_upload_key(None, "C:\\photos\\cat.png").unwrap();
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "uploads");
        assert!(Uuid::parse_str(parts[1]).is_ok());
        assert_eq!(parts[2], "cat.png");

        let key = new_upload_key(Some("/faces/2024/"), "a.jpg").unwrap();
        assert!(key.starts_with("faces/2024/"));
    }

    #[test]
    fn test_new_upload_key_rejects_bad_input() {
        assert!(new_upload_key(Some("../etc"), "a.png").is_err());
        assert!(new_upload_key(None, "").is_err());
        assert!(new_upload_key(None, "dir/").is_err());
    }

    #[test]
    fn test_new_upload_key_bounds_length() {
        let long_name = format!("{}.png", "a".repeat(230));
        assert!(matches!(
            new_upload_key(None, &long_name),
            Err(AppError::Validation(_))
        ));

        let long_dir = "d".repeat(240);
        assert!(matches!(
            new_upload_key(Some(&long_dir), "a.png"),
            Err(AppError::Validation(_))
        ));

        let too_long_name = "b".repeat(MAX_FILENAME_LEN + 1);
        assert!(matches!(
            base_filename(&too_long_name),
            Err(AppError::Validation(_))
        ));

        let fits = format!("{}.png", "a".repeat(MAX_KEY_LEN - "uploads/".len() - 37 - 4));
        assert_eq!(new_upload_key(None, &fits).unwrap().len(), MAX_KEY_LEN);
    }

    #[tokio::test]
    async fn test_oversized_upload_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (service, _) = setup(&dir);

        let err = service
            .upload_image(ImageUpload {
                filename: format!("{}.png", "a".repeat(230)),
                content_type: None,
                directory: None,
                data: png(8, 8),
                uploader_admin_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .upload_image(ImageUpload {
                filename: "a.png".into(),
                content_type: Some(format!("image/{}", "x".repeat(MAX_MIME_LEN))),
                directory: None,
                data: png(8, 8),
                uploader_admin_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        assert!(!dir.path().join("visomaster").join("uploads").exists());
        assert!(service.list_images().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_rejects_oversized_fields() {
        let dir = TempDir::new().unwrap();
        let (service, _) = setup(&dir);
        let registration = ImageRegistration {
            bucket: None,
            key: format!("uploads/{}", "k".repeat(MAX_KEY_LEN)),
            filename: "a.png".into(),
            mime_type: None,
            size_bytes: None,
            checksum_sha256: None,
            uploader_admin_id: None,
        };
        let err = service.register_image(registration.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .register_image(ImageRegistration {
                key: "uploads/x/a.png".into(),
                mime_type: Some("m".repeat(MAX_MIME_LEN + 1)),
                ..registration
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_upload_stores_checksum_and_thumbnail() {
        let dir = TempDir::new().unwrap();
        let (service, backend) = setup(&dir);
        let data = png(800, 400);

        let uploaded = service
            .upload_image(ImageUpload {
                filename: "wide.png".into(),
                content_type: None,
                directory: None,
                data: data.clone(),
                uploader_admin_id: None,
            })
            .await
            .unwrap();

        assert_eq!(uploaded.image.mime_type.as_deref(), Some("image/png"));
        assert_eq!(uploaded.image.size_bytes, Some(data.len() as i64));
        assert_eq!(uploaded.image.checksum_sha256, Some(hex_sha256(&data)));
        let thumb_key = uploaded.thumbnail_key.unwrap();
        assert_eq!(thumb_key, format!("{}.thumb", uploaded.image.key));
        assert!(backend.inner.exists("visomaster", &thumb_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_of_non_image_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let (service, _) = setup(&dir);

        let uploaded = service
            .upload_image(ImageUpload {
                filename: "notes.txt".into(),
                content_type: Some("text/plain".into()),
                directory: Some("docs".into()),
                data: Bytes::from_static(b"plain text"),
                uploader_admin_id: None,
            })
            .await
            .unwrap();

        assert!(uploaded.thumbnail_key.is_none());
        assert!(uploaded.image.key.starts_with("docs/"));
    }

    #[tokio::test]
    async fn test_thumbnail_second_fetch_hits_cache() {
        let dir = TempDir::new().unwrap();
        let (service, backend) = setup(&dir);
        service
            .put_object("visomaster", "raw/big.png", png(1000, 500), Some("image/png"))
            .await
            .unwrap();

        let first = service
            .get_or_create_thumbnail("visomaster", "raw/big.png", 400)
            .await
            .unwrap();
        assert_eq!(backend.original_reads.load(Ordering::SeqCst), 1);

        let second = service
            .get_or_create_thumbnail("visomaster", "raw/big.png", 400)
            .await
            .unwrap();
        assert_eq!(backend.original_reads.load(Ordering::SeqCst), 1);

        assert_eq!(first.data, second.data);
        assert_eq!(first.content_type, "image/png");
        assert_eq!(second.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_thumbnail_of_missing_original_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (service, _) = setup(&dir);
        let err = service
            .get_or_create_thumbnail("visomaster", "raw/none.png", 400)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_register_requires_uploaded_object() {
        let dir = TempDir::new().unwrap();
        let (service, _) = setup(&dir);
        let registration = ImageRegistration {
            bucket: None,
            key: "uploads/x/a.png".into(),
            filename: "a.png".into(),
            mime_type: Some("image/png".into()),
            size_bytes: None,
            checksum_sha256: None,
            uploader_admin_id: None,
        };

        let err = service.register_image(registration.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        service
            .put_object("visomaster", "uploads/x/a.png", png(4, 4), None)
            .await
            .unwrap();
        let image = service.register_image(registration.clone()).await.unwrap();
        assert_eq!(image.bucket, "visomaster");

        let err = service.register_image(registration).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_soft_deleted_image_is_hidden() {
        let dir = TempDir::new().unwrap();
        let (service, _) = setup(&dir);
        let uploaded = service
            .upload_image(ImageUpload {
                filename: "a.png".into(),
                content_type: None,
                directory: None,
                data: png(10, 10),
                uploader_admin_id: None,
            })
            .await
            .unwrap();

        service.soft_delete_image(uploaded.image.id).await.unwrap();
        assert!(matches!(
            service.find_live_image(uploaded.image.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(service.list_images().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filesystem_cannot_presign_uploads() {
        let dir = TempDir::new().unwrap();
        let (service, _) = setup(&dir);
        let err = service
            .presigned_put_url("uploads/x/a.png", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }
}
