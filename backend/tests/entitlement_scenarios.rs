//! End-to-end entitlement flows through the HTTP API.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;

use common::{ids, TestApp};
use viso_admin_backend::models::principal::Role;

#[tokio::test]
async fn test_grant_list_revoke_round() {
    let app = TestApp::new().await;
    let root = app.root_token().await;
    let u1 = app.create_user(&root, "user-one", "password1", None).await;
    let u2 = app.create_user(&root, "user-two", "password2", None).await;
    let image = app.upload_png(&root, "scene.png", 64, 64).await;

    app.assign_users(&root, image, &[u1, u2]).await;

    let users_uri = format!("/api/assignments/images/{}/users", image);
    let (status, body) = app.json(Method::GET, &users_uri, Some(&root), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![u1, u2]);

    let revoke_uri = format!("/api/assignments/users/{}/images/{}", u1, image);
    let (status, _) = app.json(Method::DELETE, &revoke_uri, Some(&root), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app.json(Method::GET, &users_uri, Some(&root), None).await;
    assert_eq!(ids(&body), vec![u2]);

    let (status, body) = app.json(Method::DELETE, &revoke_uri, Some(&root), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_regrant_is_idempotent() {
    let app = TestApp::new().await;
    let root = app.root_token().await;
    let user = app.create_user(&root, "repeat", "password1", None).await;
    let image = app.upload_png(&root, "a.png", 16, 16).await;

    let uri = format!("/api/assignments/users/{}/assign-images", user);
    let (status, first) = app
        .json(Method::POST, &uri, Some(&root), Some(json!({ "image_ids": [image] })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["created"], 1);

    let (_, second) = app
        .json(Method::POST, &uri, Some(&root), Some(json!({ "image_ids": [image] })))
        .await;
    assert_eq!(second["created"], 0);
    assert_eq!(second["requested"], 1);

    let (_, listed) = app
        .json(
            Method::GET,
            &format!("/api/assignments/users/{}/images", user),
            Some(&root),
            None,
        )
        .await;
    assert_eq!(ids(&listed), vec![image]);
}

#[tokio::test]
async fn test_grant_to_unknown_parties_is_not_found() {
    let app = TestApp::new().await;
    let root = app.root_token().await;
    let user = app.create_user(&root, "known", "password1", None).await;
    let image = app.upload_png(&root, "a.png", 16, 16).await;

    let (status, _) = app
        .json(
            Method::POST,
            &format!("/api/assignments/images/{}/assign-users", image),
            Some(&root),
            Some(json!({ "user_ids": [9999] })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .json(
            Method::POST,
            &format!("/api/assignments/images/{}/assign-users", 9999),
            Some(&root),
            Some(json!({ "user_ids": [user] })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// Current behavior: a lapsed account keeps listing its grants for as long as
// its token is valid. Only login refuses expired accounts.
#[tokio::test]
async fn test_expired_account_still_lists_granted_images() {
    let app = TestApp::new().await;
    let root = app.root_token().await;
    let yesterday = Utc::now() - Duration::days(1);
    let alice = app
        .create_user(&root, "alice", "alice-password", Some(yesterday))
        .await;
    let image = app.upload_png(&root, "alice.png", 32, 32).await;
    app.assign_users(&root, image, &[alice]).await;

    let token = app
        .state
        .auth
        .issue_default_token("alice", Role::User)
        .unwrap();

    let (status, body) = app.json(Method::GET, "/api/me/images", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec![image]);

    let (status, body) = app.login("user", "alice", "alice-password").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_users_cannot_list_each_others_images() {
    let app = TestApp::new().await;
    let root = app.root_token().await;
    let alice = app.create_user(&root, "alice", "alice-password", None).await;
    let bob = app.create_user(&root, "bob", "bob-password", None).await;
    let bob_token = app.user_token("bob", "bob-password").await;

    let (status, _) = app
        .json(
            Method::GET,
            &format!("/api/assignments/users/{}/images", alice),
            Some(&bob_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .json(
            Method::GET,
            &format!("/api/assignments/users/{}/images", bob),
            Some(&bob_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    // Unknown ids do not leak existence to users
    let (status, _) = app
        .json(Method::GET, "/api/assignments/users/9999/images", Some(&bob_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .json(Method::GET, "/api/assignments/users/9999/images", Some(&root), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_token_roles_do_not_cross() {
    let app = TestApp::new().await;
    let root = app.root_token().await;
    app.create_user(&root, "carol", "carol-password", None).await;
    let carol = app.user_token("carol", "carol-password").await;

    let (status, _) = app.json(Method::GET, "/api/users", Some(&carol), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.json(Method::GET, "/api/me/images", Some(&root), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.json(Method::GET, "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_enforced_grant_expiry_hides_lapsed_grants() {
    let app = TestApp::with_config(|c| c.enforce_grant_expiry = true).await;
    let root = app.root_token().await;
    let dave = app.create_user(&root, "dave", "dave-password", None).await;
    let lapsed = app.upload_png(&root, "old.png", 16, 16).await;
    let current = app.upload_png(&root, "new.png", 16, 16).await;

    let uri = format!("/api/assignments/users/{}/assign-images", dave);
    let past = Utc::now() - Duration::hours(1);
    app.json(
        Method::POST,
        &uri,
        Some(&root),
        Some(json!({ "image_ids": [lapsed], "expires_at": past })),
    )
    .await;
    app.json(Method::POST, &uri, Some(&root), Some(json!({ "image_ids": [current] })))
        .await;

    let token = app.user_token("dave", "dave-password").await;
    let (_, mine) = app.json(Method::GET, "/api/me/images", Some(&token), None).await;
    assert_eq!(ids(&mine), vec![current]);

    // Admins still see every grant
    let (_, all) = app
        .json(
            Method::GET,
            &format!("/api/assignments/users/{}/images", dave),
            Some(&root),
            None,
        )
        .await;
    assert_eq!(ids(&all), vec![lapsed, current]);
}

#[tokio::test]
async fn test_deleted_image_leaves_listings() {
    let app = TestApp::new().await;
    let root = app.root_token().await;
    let erin = app.create_user(&root, "erin", "erin-password", None).await;
    let image = app.upload_png(&root, "gone.png", 16, 16).await;
    app.assign_users(&root, image, &[erin]).await;

    let (status, _) = app
        .json(Method::DELETE, &format!("/api/images/{}", image), Some(&root), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, images) = app.json(Method::GET, "/api/images", Some(&root), None).await;
    assert!(ids(&images).is_empty());

    let token = app.user_token("erin", "erin-password").await;
    let (_, mine) = app.json(Method::GET, "/api/me/images", Some(&token), None).await;
    assert!(ids(&mine).is_empty());

    let (status, _) = app
        .json(
            Method::GET,
            &format!("/api/assignments/images/{}/users", image),
            Some(&root),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
