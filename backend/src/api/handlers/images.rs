//! Image catalogue and delivery handlers.
//!
//! Catalogue routes are admin only. Delivery routes (`download`, `thumb`,
//! `presigned`) check the caller themselves according to the configured
//! delivery policy.

use axum::{
    extract::{DefaultBodyLimit, Extension, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::api::download_response::DownloadResponse;
use crate::api::middleware::auth::{bearer_from_headers, AuthExtension};
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::grant::GrantedImage;
use crate::models::image::Image;
use crate::services::audit_service::{AuditAction, AuditEntry, ClientInfo};
use crate::services::storage_service::{
    new_upload_key, ImageRegistration, ImageUpload, StorageService,
};

/// Largest accepted multipart upload
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Admin catalogue routes
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_images).post(register_image))
        .route(
            "/upload-file",
            post(upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/upload-url", post(create_upload_url))
        .route("/:id", delete(delete_image))
}

/// Delivery routes, gated per request
pub fn delivery_router() -> Router<SharedState> {
    Router::new()
        .route("/:id/download", get(download_image))
        .route("/:id/thumb", get(image_thumbnail))
        .route("/:id/presigned", get(presigned_redirect))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IncludeUrlsQuery {
    /// Add a presigned GET URL to each item
    #[serde(default)]
    pub include_urls: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageResponse {
    pub id: i64,
    pub bucket: String,
    pub key: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub checksum_sha256: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Proxied download through this service
    pub download_url: String,
    pub thumb_url: String,
    /// Only with `include_urls=true`; null when the backend cannot presign
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub presigned_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_expires_at: Option<DateTime<Utc>>,
}

impl From<Image> for ImageResponse {
    fn from(image: Image) -> Self {
        Self {
            download_url: format!("/api/images/{}/download", image.id),
            thumb_url: format!("/api/images/{}/thumb", image.id),
            id: image.id,
            bucket: image.bucket,
            key: image.key,
            filename: image.filename,
            mime_type: image.mime_type,
            size_bytes: image.size_bytes,
            checksum_sha256: image.checksum_sha256,
            created_at: image.created_at,
            presigned_url: None,
            granted_at: None,
            grant_expires_at: None,
        }
    }
}

impl From<GrantedImage> for ImageResponse {
    fn from(granted: GrantedImage) -> Self {
        Self {
            granted_at: Some(granted.granted_at),
            grant_expires_at: granted.grant_expires_at,
            ..ImageResponse::from(granted.image)
        }
    }
}

/// Convert to responses, presigning each when asked
pub async fn image_responses<T>(
    storage: &StorageService,
    items: Vec<T>,
    include_urls: bool,
) -> Result<Vec<ImageResponse>>
where
    T: Into<ImageResponse>,
{
    let ttl = storage.presign_ttl();
    let mut responses = Vec::with_capacity(items.len());
    for item in items {
        let mut response: ImageResponse = item.into();
        if include_urls {
            let url = storage
                .presigned_get_url(&response.bucket, &response.key, ttl)
                .await?
                .map(|p| p.url);
            response.presigned_url = Some(url);
        }
        responses.push(response);
    }
    Ok(responses)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadFileResponse {
    pub id: i64,
    pub bucket: String,
    pub key: String,
    pub filename: String,
    pub size_bytes: Option<i64>,
    pub checksum_sha256: Option<String>,
    pub download_url: String,
    /// Present only when a thumbnail was produced at upload time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadUrlRequest {
    pub filename: String,
    pub directory: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadUrlResponse {
    pub url: String,
    pub bucket: String,
    pub key: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterImageRequest {
    pub key: String,
    pub filename: String,
    pub bucket: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub checksum_sha256: Option<String>,
}

/// Upload an image through the service (multipart `file`, optional `directory`)
#[utoipa::path(
    post,
    path = "/upload-file",
    context_path = "/api/images",
    tag = "images",
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "Fields: file, directory"),
    responses(
        (status = 201, description = "Image stored", body = UploadFileResponse),
        (status = 400, description = "Missing or empty file", body = crate::api::openapi::ErrorResponse),
        (status = 502, description = "Storage unavailable", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_file(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadFileResponse>)> {
    let mut file: Option<(String, Option<String>, Bytes)> = None;
    let mut directory: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Validation("File field needs a filename".into()))?;
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?;
                file = Some((filename, content_type, data));
            }
            Some("directory") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid directory field: {}", e)))?;
                directory = Some(value);
            }
            _ => {}
        }
    }

    let (filename, content_type, data) =
        file.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;

    let uploaded = state
        .storage
        .upload_image(ImageUpload {
            filename,
            content_type,
            directory,
            data,
            uploader_admin_id: auth.admin_id(),
        })
        .await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::ImageUploaded)
                .actor(&auth.principal)
                .client(&client),
        )
        .await;

    let image = uploaded.image;
    Ok((
        StatusCode::CREATED,
        Json(UploadFileResponse {
            download_url: format!("/api/images/{}/download", image.id),
            thumb_url: uploaded
                .thumbnail_key
                .map(|_| format!("/api/images/{}/thumb", image.id)),
            id: image.id,
            bucket: image.bucket,
            key: image.key,
            filename: image.filename,
            size_bytes: image.size_bytes,
            checksum_sha256: image.checksum_sha256,
        }),
    ))
}

/// Presigned PUT URL for a direct upload; register the key afterwards
#[utoipa::path(
    post,
    path = "/upload-url",
    context_path = "/api/images",
    tag = "images",
    request_body = UploadUrlRequest,
    responses(
        (status = 200, description = "Upload URL issued", body = UploadUrlResponse),
        (status = 502, description = "Backend cannot presign", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_upload_url(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Json(payload): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>> {
    let key = new_upload_key(payload.directory.as_deref(), &payload.filename)?;
    let presigned = state
        .storage
        .presigned_put_url(&key, state.storage.presign_ttl())
        .await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::UploadUrlIssued)
                .actor(&auth.principal)
                .client(&client),
        )
        .await;

    Ok(Json(UploadUrlResponse {
        url: presigned.url,
        bucket: state.storage.default_bucket().to_string(),
        key,
        expires_in: presigned.expires_in.as_secs(),
    }))
}

/// Record metadata for an object already uploaded to storage
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/images",
    tag = "images",
    request_body = RegisterImageRequest,
    responses(
        (status = 201, description = "Image registered", body = ImageResponse),
        (status = 404, description = "Object not in storage", body = crate::api::openapi::ErrorResponse),
        (status = 409, description = "Key already registered", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn register_image(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Json(payload): Json<RegisterImageRequest>,
) -> Result<(StatusCode, Json<ImageResponse>)> {
    let image = state
        .storage
        .register_image(ImageRegistration {
            bucket: payload.bucket,
            key: payload.key,
            filename: payload.filename,
            mime_type: payload.mime_type,
            size_bytes: payload.size_bytes,
            checksum_sha256: payload.checksum_sha256,
            uploader_admin_id: auth.admin_id(),
        })
        .await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::ImageRegistered)
                .actor(&auth.principal)
                .client(&client),
        )
        .await;

    Ok((StatusCode::CREATED, Json(image.into())))
}

/// Live images, newest first
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/images",
    tag = "images",
    params(IncludeUrlsQuery),
    responses(
        (status = 200, description = "Images", body = Vec<ImageResponse>),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_images(
    State(state): State<SharedState>,
    Query(query): Query<IncludeUrlsQuery>,
) -> Result<Json<Vec<ImageResponse>>> {
    let images = state.storage.list_images().await?;
    Ok(Json(
        image_responses(&state.storage, images, query.include_urls).await?,
    ))
}

/// Soft delete: the image leaves every listing and delivery path
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/images",
    tag = "images",
    params(("id" = i64, Path, description = "Image ID")),
    responses(
        (status = 204, description = "Image deleted"),
        (status = 404, description = "Image not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_image(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    client: ClientInfo,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.storage.soft_delete_image(id).await?;

    state
        .audit
        .log(
            AuditEntry::new(AuditAction::ImageDeleted)
                .actor(&auth.principal)
                .client(&client),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

async fn deliverable_image(state: &SharedState, headers: &HeaderMap, id: i64) -> Result<Image> {
    state
        .guard
        .authorize_delivery(bearer_from_headers(headers), id)
        .await?;
    state.storage.find_live_image(id).await
}

/// Original bytes relayed through the service
#[utoipa::path(
    get,
    path = "/{id}/download",
    context_path = "/api/images",
    tag = "images",
    params(("id" = i64, Path, description = "Image ID")),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 403, description = "No grant on this image", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "Image not found", body = crate::api::openapi::ErrorResponse),
    ),
    security((), ("bearer_auth" = []))
)]
pub async fn download_image(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<DownloadResponse> {
    let image = deliverable_image(&state, &headers, id).await?;
    let download = state.storage.proxy_download(&image).await?;
    Ok(DownloadResponse::original(download))
}

/// Cached thumbnail, derived on first request
#[utoipa::path(
    get,
    path = "/{id}/thumb",
    context_path = "/api/images",
    tag = "images",
    params(("id" = i64, Path, description = "Image ID")),
    responses(
        (status = 200, description = "Thumbnail bytes"),
        (status = 404, description = "Image not found or not an image", body = crate::api::openapi::ErrorResponse),
    ),
    security((), ("bearer_auth" = []))
)]
pub async fn image_thumbnail(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<DownloadResponse> {
    let image = deliverable_image(&state, &headers, id).await?;
    let thumb = state
        .storage
        .get_or_create_thumbnail(&image.bucket, &image.key, state.config.thumbnail_max_dimension)
        .await?;
    Ok(DownloadResponse::thumbnail(thumb, state.config.delivery_policy))
}

/// Redirect to a presigned GET URL, or relay the bytes when the backend
/// cannot presign
#[utoipa::path(
    get,
    path = "/{id}/presigned",
    context_path = "/api/images",
    tag = "images",
    params(("id" = i64, Path, description = "Image ID")),
    responses(
        (status = 302, description = "Redirect to storage"),
        (status = 200, description = "Image bytes"),
        (status = 404, description = "Image not found", body = crate::api::openapi::ErrorResponse),
    ),
    security((), ("bearer_auth" = []))
)]
pub async fn presigned_redirect(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<DownloadResponse> {
    let image = deliverable_image(&state, &headers, id).await?;
    match state
        .storage
        .presigned_get_url(&image.bucket, &image.key, state.storage.presign_ttl())
        .await?
    {
        Some(presigned) => Ok(DownloadResponse::redirect(presigned)),
        None => Ok(DownloadResponse::original(
            state.storage.proxy_download(&image).await?,
        )),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_file,
        create_upload_url,
        register_image,
        list_images,
        delete_image,
        download_image,
        image_thumbnail,
        presigned_redirect,
    ),
    components(schemas(
        ImageResponse,
        UploadFileResponse,
        UploadUrlRequest,
        UploadUrlResponse,
        RegisterImageRequest,
    ))
)]
pub struct ImagesApiDoc;
