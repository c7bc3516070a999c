//! Dashboard statistics.

use serde::Serialize;
use utoipa::ToSchema;

/// Aggregate counts for the dashboard
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct StatsSummary {
    pub total_users: i64,
    pub active_users: i64,
    pub disabled_users: i64,
    pub expiring_users: i64,
    pub total_images: i64,
}
