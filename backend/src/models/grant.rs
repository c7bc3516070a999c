//! Grant (user to image entitlement) model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use super::image::Image;

/// A directed (user, image) edge. At most one per pair.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Grant {
    pub id: i64,
    pub user_id: i64,
    pub image_id: i64,
    pub granted_by_admin_id: Option<i64>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Grant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Fields for a new grant row
#[derive(Debug, Clone)]
pub struct NewGrant {
    pub user_id: i64,
    pub image_id: i64,
    pub granted_by_admin_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// An image reached through a grant, with the grant's own attributes.
#[derive(Debug, Clone)]
pub struct GrantedImage {
    pub image: Image,
    pub granted_at: DateTime<Utc>,
    pub grant_expires_at: Option<DateTime<Utc>>,
}

impl GrantedImage {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.grant_expires_at.is_some_and(|at| at <= now)
    }
}
