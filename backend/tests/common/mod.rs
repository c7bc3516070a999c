//! Shared harness for in-process API tests.
//!
//! Each `TestApp` owns an in-memory store, a filesystem object store under a
//! temporary directory, and a seeded superadmin `root`.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use viso_admin_backend::api::{routes::create_router, AppState, SharedState};
use viso_admin_backend::config::Config;
use viso_admin_backend::storage::FilesystemBackend;
use viso_admin_backend::store::MemoryStore;

pub const ROOT_USERNAME: &str = "root";
pub const ROOT_PASSWORD: &str = "root-password";

pub struct TestApp {
    pub router: Router,
    pub state: SharedState,
    pub dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::local("integration-test-secret", dir.path().to_string_lossy());
        adjust(&mut config);

        let state = Arc::new(AppState::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(FilesystemBackend::new(dir.path())),
        ));
        state
            .accounts
            .seed_admin(ROOT_USERNAME, Some(ROOT_PASSWORD))
            .await
            .expect("seed admin");

        Self {
            router: create_router(state.clone()),
            state,
            dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.expect("oneshot")
    }

    /// JSON request; returns status and parsed body (`Null` when empty)
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.send(request).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get_bytes(&self, uri: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).expect("request")).await
    }

    pub async fn login(&self, kind: &str, username: &str, password: &str) -> (StatusCode, Value) {
        self.json(
            Method::POST,
            &format!("/api/auth/{}/login", kind),
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await
    }

    pub async fn root_token(&self) -> String {
        let (status, body) = self.login("admin", ROOT_USERNAME, ROOT_PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "root login failed: {}", body);
        body["access_token"].as_str().expect("token").to_string()
    }

    pub async fn user_token(&self, username: &str, password: &str) -> String {
        let (status, body) = self.login("user", username, password).await;
        assert_eq!(status, StatusCode::OK, "user login failed: {}", body);
        body["access_token"].as_str().expect("token").to_string()
    }

    pub async fn create_user(
        &self,
        admin_token: &str,
        username: &str,
        password: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> i64 {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/users",
                Some(admin_token),
                Some(json!({
                    "username": username,
                    "password": password,
                    "expires_at": expires_at,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create user failed: {}", body);
        body["id"].as_i64().expect("user id")
    }

    /// Multipart upload through `/api/images/upload-file`
    pub async fn upload(
        &self,
        admin_token: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> (StatusCode, Value) {
        let (boundary, body) = fixtures::multipart_body(filename, content_type, data);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/images/upload-file")
            .header(header::AUTHORIZATION, format!("Bearer {}", admin_token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .expect("request");

        let response = self.send(request).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    pub async fn upload_png(&self, admin_token: &str, filename: &str, width: u32, height: u32) -> i64 {
        let png = fixtures::png(width, height);
        let (status, body) = self.upload(admin_token, filename, "image/png", &png).await;
        assert_eq!(status, StatusCode::CREATED, "upload failed: {}", body);
        body["id"].as_i64().expect("image id")
    }

    pub async fn assign_users(&self, admin_token: &str, image_id: i64, user_ids: &[i64]) {
        let (status, body) = self
            .json(
                Method::POST,
                &format!("/api/assignments/images/{}/assign-users", image_id),
                Some(admin_token),
                Some(json!({ "user_ids": user_ids })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "assign failed: {}", body);
    }
}

/// Ids out of a JSON array of objects
pub fn ids(value: &Value) -> Vec<i64> {
    let mut ids: Vec<i64> = value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v["id"].as_i64()).collect())
        .unwrap_or_default();
    ids.sort_unstable();
    ids
}
