//! End-user model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

use super::principal::AccountStatus;

/// User entity
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub extended_until: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl User {
    /// Account expiry has passed. A missing expiry never lapses.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

/// Fields for a new user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub status: AccountStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Partial update; `None` leaves a column untouched.
///
/// Expiry is deliberately absent: it only changes through the audited
/// extension path.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub password_hash: Option<String>,
    pub status: Option<AccountStatus>,
    pub notes: Option<String>,
}
