//! Login handlers for both principal kinds.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::api::SharedState;
use crate::error::Result;
use crate::models::principal::Role;
use crate::services::audit_service::ClientInfo;

/// Public auth routes (no token required)
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/admin/login", post(admin_login))
        .route("/user/login", post(user_login))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "bearer"
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl TokenResponse {
    fn new(access_token: String, ttl_minutes: i64, user_id: Option<i64>) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: ttl_minutes * 60,
            user_id,
        }
    }
}

/// Operator login
#[utoipa::path(
    post,
    path = "/admin/login",
    context_path = "/api/auth",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Admin token issued", body = TokenResponse),
        (status = 401, description = "Incorrect username or password", body = crate::api::openapi::ErrorResponse),
        (status = 403, description = "Account disabled", body = crate::api::openapi::ErrorResponse),
    )
)]
pub async fn admin_login(
    State(state): State<SharedState>,
    client: ClientInfo,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let (_admin, token) = state
        .auth
        .authenticate_admin(&payload.username, &payload.password, &client)
        .await?;

    Ok(Json(TokenResponse::new(
        token,
        state.auth.default_ttl_minutes(Role::Admin),
        None,
    )))
}

/// End-user login
#[utoipa::path(
    post,
    path = "/user/login",
    context_path = "/api/auth",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "User token issued", body = TokenResponse),
        (status = 401, description = "Incorrect username or password", body = crate::api::openapi::ErrorResponse),
        (status = 403, description = "Account disabled or expired", body = crate::api::openapi::ErrorResponse),
    )
)]
pub async fn user_login(
    State(state): State<SharedState>,
    client: ClientInfo,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let (user, token) = state
        .auth
        .authenticate_user(&payload.username, &payload.password, &client)
        .await?;

    Ok(Json(TokenResponse::new(
        token,
        state.auth.default_ttl_minutes(Role::User),
        Some(user.id),
    )))
}

#[derive(OpenApi)]
#[openapi(
    paths(admin_login, user_login),
    components(schemas(LoginRequest, TokenResponse))
)]
pub struct AuthApiDoc;
