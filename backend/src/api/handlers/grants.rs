//! Entitlement handlers: granting images to users and listing grants.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::api::handlers::images::{image_responses, ImageResponse, IncludeUrlsQuery};
use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::grant::GrantedImage;
use crate::models::principal::Principal;
use crate::models::user::User;
use crate::services::access_guard::AccessGuard;
use crate::services::audit_service::{AuditAction, AuditEntry, ClientInfo};

/// Admin-only assignment routes
pub fn admin_router() -> Router<SharedState> {
    Router::new()
        .route("/images/:image_id/assign-users", post(assign_users))
        .route("/users/:user_id/assign-images", post(assign_images))
        .route("/users/:user_id/images/:image_id", delete(revoke))
        .route("/images/:image_id/users", get(list_image_users))
}

/// Routes open to admins and to the owning user
pub fn owner_router() -> Router<SharedState> {
    Router::new().route("/users/:user_id/images", get(list_user_images))
}

/// Self-service routes for end users
pub fn me_router() -> Router<SharedState> {
    Router::new().route("/images", get(my_images))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignUsersRequest {
    pub user_ids: Vec<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignImagesRequest {
    pub image_ids: Vec<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignResponse {
    /// Grants that did not exist before
    pub created: usize,
    pub requested: usize,
}

/// Grant one image to several users. Re-granting is a no-op.
#[utoipa::path(
    post,
    path = "/images/{image_id}/assign-users",
    context_path = "/api/assignments",
    tag = "assignments",
    params(("image_id" = i64, Path, description = "Image ID")),
    request_body = AssignUsersRequest,
    responses(
        (status = 200, description = "Grants recorded", body = AssignResponse),
        (status = 404, description = "Unknown image or user", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn assign_users(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Path(image_id): Path<i64>,
    Json(payload): Json<AssignUsersRequest>,
) -> Result<Json<AssignResponse>> {
    let created = state
        .entitlements
        .grant_image_to_users(image_id, &payload.user_ids, payload.expires_at, auth.admin_id())
        .await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::ImagesGranted)
                .actor(&auth.principal)
                .client(&client),
        )
        .await;

    Ok(Json(AssignResponse {
        created,
        requested: payload.user_ids.len(),
    }))
}

/// Grant several images to one user. Re-granting is a no-op.
#[utoipa::path(
    post,
    path = "/users/{user_id}/assign-images",
    context_path = "/api/assignments",
    tag = "assignments",
    params(("user_id" = i64, Path, description = "User ID")),
    request_body = AssignImagesRequest,
    responses(
        (status = 200, description = "Grants recorded", body = AssignResponse),
        (status = 404, description = "Unknown user or image", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn assign_images(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Path(user_id): Path<i64>,
    Json(payload): Json<AssignImagesRequest>,
) -> Result<Json<AssignResponse>> {
    let created = state
        .entitlements
        .grant_images_to_user(user_id, &payload.image_ids, payload.expires_at, auth.admin_id())
        .await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::ImagesGranted)
                .actor(&auth.principal)
                .user(user_id)
                .client(&client),
        )
        .await;

    Ok(Json(AssignResponse {
        created,
        requested: payload.image_ids.len(),
    }))
}

/// Revoke a single grant
#[utoipa::path(
    delete,
    path = "/users/{user_id}/images/{image_id}",
    context_path = "/api/assignments",
    tag = "assignments",
    params(
        ("user_id" = i64, Path, description = "User ID"),
        ("image_id" = i64, Path, description = "Image ID"),
    ),
    responses(
        (status = 204, description = "Grant revoked"),
        (status = 404, description = "Assignment not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Path((user_id, image_id)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    state.entitlements.revoke_grant(user_id, image_id).await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::GrantRevoked)
                .actor(&auth.principal)
                .user(user_id)
                .client(&client),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Users holding a grant on the image
#[utoipa::path(
    get,
    path = "/images/{image_id}/users",
    context_path = "/api/assignments",
    tag = "assignments",
    params(("image_id" = i64, Path, description = "Image ID")),
    responses(
        (status = 200, description = "Granted users", body = Vec<User>),
        (status = 404, description = "Image not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_image_users(
    State(state): State<SharedState>,
    Path(image_id): Path<i64>,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.entitlements.list_users_for_image(image_id).await?))
}

/// Admins see every grant. End users see theirs, minus lapsed grants when
/// grant expiry is enforced.
async fn granted_images_for(
    state: &SharedState,
    principal: &Principal,
    user_id: i64,
) -> Result<Vec<GrantedImage>> {
    match principal {
        Principal::User(_) if state.config.enforce_grant_expiry => {
            state
                .entitlements
                .list_active_images_for_user(user_id, Utc::now())
                .await
        }
        _ => state.entitlements.list_images_for_user(user_id).await,
    }
}

/// Images granted to a user. Users may only list their own.
#[utoipa::path(
    get,
    path = "/users/{user_id}/images",
    context_path = "/api/assignments",
    tag = "assignments",
    params(
        ("user_id" = i64, Path, description = "User ID"),
        IncludeUrlsQuery,
    ),
    responses(
        (status = 200, description = "Granted images", body = Vec<ImageResponse>),
        (status = 403, description = "Another user's images", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "User not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_user_images(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(user_id): Path<i64>,
    Query(query): Query<IncludeUrlsQuery>,
) -> Result<Json<Vec<ImageResponse>>> {
    // An unknown id never matches a user's own name, so users get 403 here
    // and admins get 404 from the listing below.
    let owner_username = state
        .store
        .find_user(user_id)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();
    AccessGuard::scope_to_owner(&auth.principal, &owner_username)?;

    let granted = granted_images_for(&state, &auth.principal, user_id).await?;
    Ok(Json(
        image_responses(&state.storage, granted, query.include_urls).await?,
    ))
}

/// The calling user's granted images
#[utoipa::path(
    get,
    path = "/images",
    context_path = "/api/me",
    tag = "assignments",
    params(IncludeUrlsQuery),
    responses(
        (status = 200, description = "Granted images", body = Vec<ImageResponse>),
        (status = 403, description = "Not an end-user token", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn my_images(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Query(query): Query<IncludeUrlsQuery>,
) -> Result<Json<Vec<ImageResponse>>> {
    let user_id = auth
        .user()
        .map(|u| u.id)
        .ok_or_else(|| AppError::Forbidden("End-user token required".to_string()))?;

    let granted = granted_images_for(&state, &auth.principal, user_id).await?;
    Ok(Json(
        image_responses(&state.storage, granted, query.include_urls).await?,
    ))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        assign_users,
        assign_images,
        revoke,
        list_image_users,
        list_user_images,
        my_images,
    ),
    components(schemas(AssignUsersRequest, AssignImagesRequest, AssignResponse))
)]
pub struct GrantsApiDoc;
