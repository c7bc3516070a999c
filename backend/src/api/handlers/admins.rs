//! Admin account handlers. Creating and editing admins needs a superadmin.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::{OpenApi, ToSchema};

use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::admin::Admin;
use crate::models::principal::AccountStatus;
use crate::services::access_guard::AccessGuard;
use crate::services::account_service::{CreateAdmin, UpdateAdmin};
use crate::services::audit_service::{AuditAction, AuditEntry, ClientInfo};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/me", get(me))
        .route("/", post(create_admin))
        .route("/:id", patch(update_admin))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAdminRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_superadmin: bool,
    pub status: Option<AccountStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAdminRequest {
    pub password: Option<String>,
    pub status: Option<AccountStatus>,
    pub is_superadmin: Option<bool>,
}

fn require_admin(auth: &AuthExtension) -> Result<&Admin> {
    auth.admin()
        .ok_or_else(|| AppError::Forbidden("Admin token required".to_string()))
}

/// The calling admin
#[utoipa::path(
    get,
    path = "/me",
    context_path = "/api/admins",
    tag = "admins",
    responses(
        (status = 200, description = "Current admin", body = Admin),
        (status = 401, description = "Not authenticated", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(Extension(auth): Extension<AuthExtension>) -> Result<Json<Admin>> {
    Ok(Json(require_admin(&auth)?.clone()))
}

/// Create an admin
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/admins",
    tag = "admins",
    request_body = CreateAdminRequest,
    responses(
        (status = 201, description = "Admin created", body = Admin),
        (status = 403, description = "Superadmin required", body = crate::api::openapi::ErrorResponse),
        (status = 409, description = "Username taken", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_admin(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Json(payload): Json<CreateAdminRequest>,
) -> Result<(StatusCode, Json<Admin>)> {
    AccessGuard::require_superadmin(&auth.principal)?;

    let admin = state
        .accounts
        .create_admin(CreateAdmin {
            username: payload.username,
            password: payload.password,
            is_superadmin: payload.is_superadmin,
            status: payload.status.unwrap_or(AccountStatus::Active),
        })
        .await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::AdminCreated)
                .actor(&auth.principal)
                .client(&client),
        )
        .await;

    Ok((StatusCode::CREATED, Json(admin)))
}

/// Change another admin's password, status or superadmin flag
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/admins",
    tag = "admins",
    params(("id" = i64, Path, description = "Admin ID")),
    request_body = UpdateAdminRequest,
    responses(
        (status = 200, description = "Admin updated", body = Admin),
        (status = 403, description = "Superadmin required", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "Admin not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_admin(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAdminRequest>,
) -> Result<Json<Admin>> {
    let caller = AccessGuard::require_superadmin(&auth.principal)?;
    let demotes_self = payload.is_superadmin == Some(false)
        || payload.status == Some(AccountStatus::Disabled);
    if caller.id == id && demotes_self {
        return Err(AppError::Validation(
            "Cannot revoke your own superadmin access".to_string(),
        ));
    }

    let admin = state
        .accounts
        .update_admin(
            id,
            UpdateAdmin {
                password: payload.password,
                status: payload.status,
                is_superadmin: payload.is_superadmin,
            },
        )
        .await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::AdminUpdated)
                .actor(&auth.principal)
                .client(&client),
        )
        .await;

    Ok(Json(admin))
}

#[derive(OpenApi)]
#[openapi(
    paths(me, create_admin, update_admin),
    components(schemas(Admin, AccountStatus, CreateAdminRequest, UpdateAdminRequest))
)]
pub struct AdminsApiDoc;
