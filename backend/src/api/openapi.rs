//! OpenAPI document generated from handler annotations via utoipa.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Root document; each handler module merges its own paths and schemas in.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Viso Admin API",
        description = "Admin backend granting users time-bounded access to images in object storage.",
        version = "0.3.0",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Current server"),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Admin and end-user login"),
        (name = "admins", description = "Admin account management"),
        (name = "users", description = "End-user accounts and expiry extensions"),
        (name = "assignments", description = "Image grants"),
        (name = "images", description = "Image catalogue, upload and delivery"),
        (name = "stats", description = "Dashboard counts and usage log"),
        (name = "health", description = "Health check"),
    ),
    components(schemas(ErrorResponse))
)]
pub struct ApiDoc;

/// Error body returned by every endpoint on failure.
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Merge every handler module's document into the root.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    doc.merge(super::handlers::auth::AuthApiDoc::openapi());
    doc.merge(super::handlers::admins::AdminsApiDoc::openapi());
    doc.merge(super::handlers::users::UsersApiDoc::openapi());
    doc.merge(super::handlers::grants::GrantsApiDoc::openapi());
    doc.merge(super::handlers::images::ImagesApiDoc::openapi());
    doc.merge(super::handlers::stats::StatsApiDoc::openapi());
    doc.merge(super::handlers::health::HealthApiDoc::openapi());

    doc
}
