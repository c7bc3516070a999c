//! Persistence backends for accounts, image metadata, grants and audit rows.
//!
//! `PgStore` is the production implementation; `MemoryStore` keeps the same
//! semantics in process for local runs and tests. Uniqueness of
//! (user, image) grants, usernames and (bucket, key) is enforced here, not by
//! callers.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::admin::{Admin, AdminChanges, NewAdmin};
use crate::models::extension::{ExtensionRecord, UserExtension};
use crate::models::grant::{Grant, GrantedImage, NewGrant};
use crate::models::image::{Image, NewImage};
use crate::models::stats::StatsSummary;
use crate::models::usage_log::{NewUsageLogEntry, UsageLogEntry};
use crate::models::user::{NewUser, User, UserChanges};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store trait
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity check
    async fn ping(&self) -> Result<()>;

    async fn find_admin(&self, id: i64) -> Result<Option<Admin>>;

    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>>;

    /// Fails with `Conflict` when the username is taken
    async fn create_admin(&self, admin: NewAdmin) -> Result<Admin>;

    /// Fails with `NotFound` for an unknown id
    async fn update_admin(&self, id: i64, changes: AdminChanges) -> Result<Admin>;

    async fn record_admin_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn count_admins(&self) -> Result<i64>;

    async fn find_user(&self, id: i64) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Fails with `Conflict` when the username is taken
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Fails with `NotFound` for an unknown id
    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<User>;

    /// Newest first
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Fails with `Conflict` when (bucket, key) is already registered
    async fn create_image(&self, image: NewImage) -> Result<Image>;

    /// Returns soft-deleted rows too; callers decide visibility
    async fn find_image(&self, id: i64) -> Result<Option<Image>>;

    /// Live images only, newest first
    async fn list_images(&self) -> Result<Vec<Image>>;

    async fn soft_delete_image(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Insert-if-absent. `Ok(false)` when the pair already had a grant;
    /// `NotFound` when the user or image does not exist.
    async fn insert_grant(&self, grant: NewGrant) -> Result<bool>;

    /// `Ok(false)` when there was nothing to delete
    async fn delete_grant(&self, user_id: i64, image_id: i64) -> Result<bool>;

    async fn find_grant(&self, user_id: i64, image_id: i64) -> Result<Option<Grant>>;

    /// Live images granted to the user, in grant order. Grant expiry is not applied.
    async fn images_for_user(&self, user_id: i64) -> Result<Vec<GrantedImage>>;

    /// Users holding a grant on the image, by user id
    async fn users_for_image(&self, image_id: i64) -> Result<Vec<User>>;

    /// Atomically append an extension record capturing the previous expiry
    /// and move the user's `expires_at` and `extended_until` to the new value.
    async fn extend_user(
        &self,
        extension: UserExtension,
        at: DateTime<Utc>,
    ) -> Result<(User, ExtensionRecord)>;

    /// Oldest first
    async fn list_extensions(&self, user_id: i64) -> Result<Vec<ExtensionRecord>>;

    async fn append_usage(&self, entry: NewUsageLogEntry) -> Result<()>;

    /// Newest first
    async fn recent_usage(&self, limit: i64) -> Result<Vec<UsageLogEntry>>;

    /// `expiring_before` bounds the "expiring soon" count
    async fn stats_summary(&self, expiring_before: DateTime<Utc>) -> Result<StatsSummary>;
}
