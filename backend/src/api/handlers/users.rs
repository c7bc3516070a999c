//! End-user account handlers (admin only).

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::extension::ExtensionRecord;
use crate::models::principal::AccountStatus;
use crate::models::user::User;
use crate::services::account_service::{CreateUser, UpdateUser};
use crate::services::audit_service::{AuditAction, AuditEntry, ClientInfo};

/// Create user routes
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).patch(update_user))
        .route("/:id/extend", post(extend_user))
        .route("/:id/extensions", get(list_extensions))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub status: Option<AccountStatus>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub password: Option<String>,
    pub status: Option<AccountStatus>,
    pub notes: Option<String>,
    /// Recorded as an extension attributed to the calling admin
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExtendUserRequest {
    pub new_expires_at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExtendUserResponse {
    pub user: User,
    pub extension: ExtensionRecord,
}

/// List users, newest first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/users",
    tag = "users",
    responses(
        (status = 200, description = "All users", body = Vec<User>),
        (status = 403, description = "Admin token required", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(State(state): State<SharedState>) -> Result<Json<Vec<User>>> {
    Ok(Json(state.accounts.list_users().await?))
}

/// Create an end user
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid username or password", body = crate::api::openapi::ErrorResponse),
        (status = 409, description = "Username taken", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state
        .accounts
        .create_user(CreateUser {
            username: payload.username,
            password: payload.password,
            status: payload.status.unwrap_or(AccountStatus::Active),
            expires_at: payload.expires_at,
            notes: payload.notes,
        })
        .await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::UserCreated)
                .actor(&auth.principal)
                .user(user.id)
                .client(&client),
        )
        .await;

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/users",
    tag = "users",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 404, description = "User not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(State(state): State<SharedState>, Path(id): Path<i64>) -> Result<Json<User>> {
    Ok(Json(state.accounts.get_user(id).await?))
}

/// Partial update of status, notes, password or expiry
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/users",
    tag = "users",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    let user = state
        .accounts
        .update_user(
            id,
            UpdateUser {
                password: payload.password,
                status: payload.status,
                notes: payload.notes,
                expires_at: payload.expires_at,
            },
            auth.admin_id(),
        )
        .await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::UserUpdated)
                .actor(&auth.principal)
                .user(user.id)
                .client(&client),
        )
        .await;

    Ok(Json(user))
}

/// Move a user's expiry, keeping an audit record of the change
#[utoipa::path(
    post,
    path = "/{id}/extend",
    context_path = "/api/users",
    tag = "users",
    params(("id" = i64, Path, description = "User ID")),
    request_body = ExtendUserRequest,
    responses(
        (status = 200, description = "User extended", body = ExtendUserResponse),
        (status = 404, description = "User not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn extend_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Path(id): Path<i64>,
    Json(payload): Json<ExtendUserRequest>,
) -> Result<Json<ExtendUserResponse>> {
    let (user, extension) = state
        .entitlements
        .extend_user(id, payload.new_expires_at, payload.reason, auth.admin_id())
        .await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::UserExtended)
                .actor(&auth.principal)
                .user(user.id)
                .client(&client),
        )
        .await;

    Ok(Json(ExtendUserResponse { user, extension }))
}

/// Extension history, oldest first
#[utoipa::path(
    get,
    path = "/{id}/extensions",
    context_path = "/api/users",
    tag = "users",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Extension records", body = Vec<ExtensionRecord>),
        (status = 404, description = "User not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_extensions(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ExtensionRecord>>> {
    Ok(Json(state.entitlements.list_extensions(id).await?))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_users, create_user, get_user, update_user, extend_user, list_extensions),
    components(schemas(
        User,
        ExtensionRecord,
        CreateUserRequest,
        UpdateUserRequest,
        ExtendUserRequest,
        ExtendUserResponse,
    ))
)]
pub struct UsersApiDoc;
