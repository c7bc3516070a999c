//! Dashboard counts and the usage log.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use crate::api::SharedState;
use crate::error::Result;
use crate::models::stats::StatsSummary;
use crate::models::usage_log::UsageLogEntry;

const DEFAULT_USAGE_LIMIT: i64 = 100;

pub fn router() -> Router<SharedState> {
    Router::new().route("/summary", get(summary))
}

pub fn usage_router() -> Router<SharedState> {
    Router::new().route("/", get(usage_logs))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UsageLogQuery {
    /// Most recent entries to return (1-1000, default 100)
    pub limit: Option<i64>,
}

/// User and image counts
#[utoipa::path(
    get,
    path = "/summary",
    context_path = "/api/stats",
    tag = "stats",
    responses(
        (status = 200, description = "Summary counts", body = StatsSummary),
    ),
    security(("bearer_auth" = []))
)]
pub async fn summary(State(state): State<SharedState>) -> Result<Json<StatsSummary>> {
    Ok(Json(state.accounts.stats_summary().await?))
}

/// Recent usage log entries, newest first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/usage-logs",
    tag = "stats",
    params(UsageLogQuery),
    responses(
        (status = 200, description = "Usage log", body = Vec<UsageLogEntry>),
    ),
    security(("bearer_auth" = []))
)]
pub async fn usage_logs(
    State(state): State<SharedState>,
    Query(query): Query<UsageLogQuery>,
) -> Result<Json<Vec<UsageLogEntry>>> {
    let limit = query.limit.unwrap_or(DEFAULT_USAGE_LIMIT);
    Ok(Json(state.audit.recent(limit).await?))
}

#[derive(OpenApi)]
#[openapi(
    paths(summary, usage_logs),
    components(schemas(StatsSummary, UsageLogEntry))
)]
pub struct StatsApiDoc;
