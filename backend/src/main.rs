//! Viso Admin - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use viso_admin_backend::{
    api,
    config::Config,
    db,
    error::{AppError, Result},
    storage::{FilesystemBackend, S3Backend, S3Config, StorageBackend},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _otel_guard = telemetry::init_tracing(config.otel_endpoint.as_deref(), "viso-admin-backend")?;
    tracing::info!(config = ?config, "Starting Viso Admin");

    let store = db::open_store(&config).await?;
    let backend = storage_backend(&config)?;
    let state = Arc::new(api::AppState::new(config.clone(), store, backend));

    // Storage may come up after us; uploads will fail until it does.
    if let Err(e) = state
        .storage
        .ensure_bucket_exists(state.storage.default_bucket())
        .await
    {
        tracing::warn!(bucket = %state.storage.default_bucket(), error = %e, "Could not ensure bucket exists");
    }

    provision_admin(&state, &config).await?;

    let app = api::routes::create_router(state).layer(cors_layer(&config));

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn storage_backend(config: &Config) -> Result<Arc<dyn StorageBackend>> {
    match config.storage_backend.as_str() {
        "s3" => Ok(Arc::new(S3Backend::new(S3Config::from_config(config))?)),
        "filesystem" => {
            tracing::info!(path = %config.storage_path, "Filesystem storage backend configured");
            Ok(Arc::new(FilesystemBackend::new(&config.storage_path)))
        }
        other => Err(AppError::Config(format!(
            "Unknown STORAGE_BACKEND '{}': expected 's3' or 'filesystem'",
            other
        ))),
    }
}

/// Create the superadmin on first boot. A generated password is logged once.
async fn provision_admin(state: &api::AppState, config: &Config) -> Result<()> {
    let seeded = state
        .accounts
        .seed_admin(
            &config.seed_admin_username,
            config.seed_admin_password.as_deref(),
        )
        .await?;

    match seeded {
        Some((admin, Some(password))) => {
            tracing::warn!(
                "\n\
                ===========================================================\n\
                \n\
                  Initial superadmin created.\n\
                \n\
                  Username:  {}\n\
                  Password:  {}\n\
                \n\
                  This password is not shown again. Change it after login\n\
                  with PATCH /api/admins/{}.\n\
                \n\
                ===========================================================",
                admin.username,
                password,
                admin.id,
            );
        }
        Some((admin, None)) => {
            tracing::info!(username = %admin.username, "Superadmin created with password from SEED_ADMIN_PASSWORD");
        }
        None => tracing::debug!("Admin accounts already exist; skipping seed"),
    }
    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}
