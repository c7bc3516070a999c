//! Image metadata model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Image entity. The bytes live in object storage under (`bucket`, `key`).
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Image {
    pub id: i64,
    pub bucket: String,
    pub key: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub checksum_sha256: Option<String>,
    pub uploader_admin_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Image {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn mime_or_default(&self) -> &str {
        self.mime_type.as_deref().unwrap_or("application/octet-stream")
    }
}

/// Fields for a new image row
#[derive(Debug, Clone)]
pub struct NewImage {
    pub bucket: String,
    pub key: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub checksum_sha256: Option<String>,
    pub uploader_admin_id: Option<i64>,
}
