//! Authentication middleware.
//!
//! Resolves `Authorization: Bearer <jwt>` through the [`AccessGuard`] and
//! stores the resulting principal in the request extensions. Each protected
//! route group picks the role it admits.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::models::admin::Admin;
use crate::models::principal::Principal;
use crate::models::user::User;
use crate::services::access_guard::{bearer_token, AccessGuard, RequiredRole};

/// Extension that holds the authenticated principal
#[derive(Debug, Clone)]
pub struct AuthExtension {
    pub principal: Principal,
}

impl AuthExtension {
    pub fn admin(&self) -> Option<&Admin> {
        self.principal.as_admin()
    }

    pub fn user(&self) -> Option<&User> {
        self.principal.as_user()
    }

    /// Admin id for attribution; `None` for end users
    pub fn admin_id(&self) -> Option<i64> {
        self.admin().map(|a| a.id)
    }
}

/// Bearer token from the Authorization header, if well formed
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
}

async fn guard_request(
    guard: &AccessGuard,
    required: RequiredRole,
    mut request: Request,
    next: Next,
) -> Response {
    let token = bearer_from_headers(request.headers());
    match guard.authorize(token, required).await {
        Ok(principal) => {
            request.extensions_mut().insert(AuthExtension { principal });
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Admits admin tokens only
pub async fn admin_middleware(
    State(guard): State<Arc<AccessGuard>>,
    request: Request,
    next: Next,
) -> Response {
    guard_request(&guard, RequiredRole::Admin, request, next).await
}

/// Admits end-user tokens only
pub async fn user_middleware(
    State(guard): State<Arc<AccessGuard>>,
    request: Request,
    next: Next,
) -> Response {
    guard_request(&guard, RequiredRole::User, request, next).await
}

/// Admits either role; handlers scope further
pub async fn principal_middleware(
    State(guard): State<Arc<AccessGuard>>,
    request: Request,
    next: Next,
) -> Response {
    guard_request(&guard, RequiredRole::Any, request, next).await
}
