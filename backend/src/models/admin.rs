//! Admin (operator) model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use super::principal::AccountStatus;

/// Admin entity
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_superadmin: bool,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Fields for a new admin row
#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub username: String,
    pub password_hash: String,
    pub is_superadmin: bool,
    pub status: AccountStatus,
}

/// Partial update; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct AdminChanges {
    pub password_hash: Option<String>,
    pub is_superadmin: Option<bool>,
    pub status: Option<AccountStatus>,
}
