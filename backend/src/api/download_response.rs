//! Image delivery responses.
//!
//! Handlers return either:
//! - 302 redirect to a presigned URL
//! - the object bytes relayed through this service

use axum::body::Body;
use axum::http::header::{
    CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::config::DeliveryPolicy;
use crate::services::storage_service::ObjectDownload;
use crate::storage::PresignedUrl;

/// Header to indicate how the object was served
pub const X_OBJECT_DELIVERY: &str = "x-object-delivery";

/// Thumbnails are immutable per key. Shared caches may only keep them when
/// delivery needs no credential.
pub const PUBLIC_THUMBNAIL_CACHE_CONTROL: &str = "public, max-age=86400";
pub const PRIVATE_THUMBNAIL_CACHE_CONTROL: &str = "private, max-age=86400";

pub enum DownloadResponse {
    /// 302 redirect to presigned URL
    Redirect(PresignedUrl),
    /// Relay content directly
    Content {
        data: Bytes,
        content_type: String,
        filename: Option<String>,
        cache_control: Option<&'static str>,
    },
}

impl DownloadResponse {
    pub fn redirect(url: PresignedUrl) -> Self {
        Self::Redirect(url)
    }

    /// Original bytes, offered inline under the stored filename
    pub fn original(download: ObjectDownload) -> Self {
        Self::Content {
            data: download.data,
            content_type: download.content_type,
            filename: download.filename,
            cache_control: None,
        }
    }

    pub fn thumbnail(download: ObjectDownload, policy: DeliveryPolicy) -> Self {
        let cache_control = match policy {
            DeliveryPolicy::Public => PUBLIC_THUMBNAIL_CACHE_CONTROL,
            DeliveryPolicy::Gated => PRIVATE_THUMBNAIL_CACHE_CONTROL,
        };
        Self::Content {
            data: download.data,
            content_type: download.content_type,
            filename: None,
            cache_control: Some(cache_control),
        }
    }
}

/// Quotes and control characters cannot appear inside the quoted filename
fn disposition(filename: &str) -> Option<HeaderValue> {
    let safe: String = filename
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    HeaderValue::from_str(&format!("inline; filename=\"{}\"", safe)).ok()
}

impl IntoResponse for DownloadResponse {
    fn into_response(self) -> Response {
        match self {
            DownloadResponse::Redirect(presigned) => {
                let mut response = StatusCode::FOUND.into_response();
                let headers = response.headers_mut();
                if let Ok(location) = HeaderValue::from_str(&presigned.url) {
                    headers.insert(LOCATION, location);
                }
                headers.insert(X_OBJECT_DELIVERY, HeaderValue::from_static("redirect"));
                if let Ok(cache) = HeaderValue::from_str(&format!(
                    "private, max-age={}",
                    presigned.expires_in.as_secs()
                )) {
                    headers.insert(CACHE_CONTROL, cache);
                }
                response
            }
            DownloadResponse::Content {
                data,
                content_type,
                filename,
                cache_control,
            } => {
                let len = data.len();
                let mut response = Body::from(data).into_response();
                let headers = response.headers_mut();
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_str(&content_type)
                        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
                );
                headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
                headers.insert(X_OBJECT_DELIVERY, HeaderValue::from_static("proxy"));
                if let Some(value) = filename.as_deref().and_then(disposition) {
                    headers.insert(CONTENT_DISPOSITION, value);
                }
                if let Some(cache) = cache_control {
                    headers.insert(CACHE_CONTROL, HeaderValue::from_static(cache));
                }
                response
            }
        }
    }
}
