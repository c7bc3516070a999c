//! Route definitions for the API.

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Json, Router};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::auth::{admin_middleware, principal_middleware, user_middleware};
use super::middleware::request_id::request_id_middleware;
use super::SharedState;

/// JSON bodies on non-upload routes
const JSON_BODY_LIMIT: usize = 1024 * 1024;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    let openapi = super::openapi::build_openapi();

    Router::new()
        .route("/healthz", get(handlers::health::health_check))
        .route(
            "/api/openapi.json",
            get(move || {
                let doc = openapi.clone();
                async move { Json(doc) }
            }),
        )
        .nest("/api", api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

fn api_routes(state: SharedState) -> Router<SharedState> {
    let guard = state.guard.clone();

    Router::new()
        .nest(
            "/auth",
            handlers::auth::router().layer(DefaultBodyLimit::max(JSON_BODY_LIMIT)),
        )
        .nest(
            "/admins",
            handlers::admins::router()
                .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
                .layer(middleware::from_fn_with_state(guard.clone(), admin_middleware)),
        )
        .nest(
            "/users",
            handlers::users::router()
                .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
                .layer(middleware::from_fn_with_state(guard.clone(), admin_middleware)),
        )
        .nest(
            "/assignments",
            handlers::grants::admin_router()
                .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
                .layer(middleware::from_fn_with_state(guard.clone(), admin_middleware)),
        )
        // Admins read anyone's grants; users only their own (checked in the handler)
        .nest(
            "/assignments",
            handlers::grants::owner_router().layer(middleware::from_fn_with_state(
                guard.clone(),
                principal_middleware,
            )),
        )
        .nest(
            "/me",
            handlers::grants::me_router()
                .layer(middleware::from_fn_with_state(guard.clone(), user_middleware)),
        )
        .nest(
            "/images",
            handlers::images::router()
                .layer(middleware::from_fn_with_state(guard.clone(), admin_middleware)),
        )
        // Delivery is gated per request by the configured policy
        .nest("/images", handlers::images::delivery_router())
        .nest(
            "/stats",
            handlers::stats::router()
                .layer(middleware::from_fn_with_state(guard.clone(), admin_middleware)),
        )
        .nest(
            "/usage-logs",
            handlers::stats::usage_router()
                .layer(middleware::from_fn_with_state(guard, admin_middleware)),
        )
}
