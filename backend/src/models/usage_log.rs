//! Usage log model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Append-only audit row for authentication and sensitive actions
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct UsageLogEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub admin_id: Option<i64>,
    pub action: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new usage log row
#[derive(Debug, Clone)]
pub struct NewUsageLogEntry {
    pub user_id: Option<i64>,
    pub admin_id: Option<i64>,
    pub action: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
}
