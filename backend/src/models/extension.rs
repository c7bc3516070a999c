//! Audited user-expiry extension record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Append-only row written each time a user's expiry is changed.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct ExtensionRecord {
    pub id: i64,
    pub user_id: i64,
    pub old_expires_at: Option<DateTime<Utc>>,
    pub new_expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub operated_by_admin_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Input for an expiry extension
#[derive(Debug, Clone)]
pub struct UserExtension {
    pub user_id: i64,
    pub new_expires_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub operated_by_admin_id: Option<i64>,
}
