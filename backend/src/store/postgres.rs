//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::Store;
use crate::error::{AppError, Result};
use crate::models::admin::{Admin, AdminChanges, NewAdmin};
use crate::models::extension::{ExtensionRecord, UserExtension};
use crate::models::grant::{Grant, GrantedImage, NewGrant};
use crate::models::image::{Image, NewImage};
use crate::models::stats::StatsSummary;
use crate::models::usage_log::{NewUsageLogEntry, UsageLogEntry};
use crate::models::user::{NewUser, User, UserChanges};

const ADMIN_COLUMNS: &str =
    "id, username, password_hash, is_superadmin, status, created_at, last_login_at";
const USER_COLUMNS: &str =
    "id, username, password_hash, status, created_at, expires_at, extended_until, notes";
const IMAGE_COLUMNS: &str = "id, bucket, key, filename, mime_type, size_bytes, checksum_sha256, \
     uploader_admin_id, created_at, deleted_at";
const EXTENSION_COLUMNS: &str =
    "id, user_id, old_expires_at, new_expires_at, reason, operated_by_admin_id, created_at";

/// Row shape for the grant/image join
#[derive(FromRow)]
struct GrantedImageRow {
    #[sqlx(flatten)]
    image: Image,
    granted_at: DateTime<Utc>,
    grant_expires_at: Option<DateTime<Utc>>,
}

impl From<GrantedImageRow> for GrantedImage {
    fn from(row: GrantedImageRow) -> Self {
        GrantedImage {
            image: row.image,
            granted_at: row.granted_at,
            grant_expires_at: row.grant_expires_at,
        }
    }
}

/// Translate constraint violations into the domain taxonomy.
fn map_constraint(err: sqlx::Error, what: &str) -> AppError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return AppError::Conflict(format!("{} already exists", what));
        }
        if db_err.is_foreign_key_violation() {
            return AppError::NotFound(format!("{} references a missing row", what));
        }
    }
    AppError::Database(err)
}

/// Store over a Postgres connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_admin(&self, id: i64) -> Result<Option<Admin>> {
        let sql = format!("SELECT {} FROM admins WHERE id = $1", ADMIN_COLUMNS);
        Ok(sqlx::query_as::<_, Admin>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let sql = format!("SELECT {} FROM admins WHERE username = $1", ADMIN_COLUMNS);
        Ok(sqlx::query_as::<_, Admin>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_admin(&self, admin: NewAdmin) -> Result<Admin> {
        let sql = format!(
            "INSERT INTO admins (username, password_hash, is_superadmin, status) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            ADMIN_COLUMNS
        );
        sqlx::query_as::<_, Admin>(&sql)
            .bind(&admin.username)
            .bind(&admin.password_hash)
            .bind(admin.is_superadmin)
            .bind(admin.status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_constraint(e, &format!("Admin '{}'", admin.username)))
    }

    async fn update_admin(&self, id: i64, changes: AdminChanges) -> Result<Admin> {
        let sql = format!(
            "UPDATE admins SET \
                password_hash = COALESCE($2, password_hash), \
                is_superadmin = COALESCE($3, is_superadmin), \
                status = COALESCE($4, status) \
             WHERE id = $1 RETURNING {}",
            ADMIN_COLUMNS
        );
        sqlx::query_as::<_, Admin>(&sql)
            .bind(id)
            .bind(changes.password_hash)
            .bind(changes.is_superadmin)
            .bind(changes.status)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Admin {} not found", id)))
    }

    async fn record_admin_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE admins SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_admins(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admins")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let sql = format!(
            "INSERT INTO users (username, password_hash, status, expires_at, notes) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.status)
            .bind(user.expires_at)
            .bind(&user.notes)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_constraint(e, &format!("User '{}'", user.username)))
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<User> {
        let sql = format!(
            "UPDATE users SET \
                password_hash = COALESCE($2, password_hash), \
                status = COALESCE($3, status), \
                notes = COALESCE($4, notes) \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.password_hash)
            .bind(changes.status)
            .bind(changes.notes)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY id DESC", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?)
    }

    async fn create_image(&self, image: NewImage) -> Result<Image> {
        let sql = format!(
            "INSERT INTO images \
                (bucket, key, filename, mime_type, size_bytes, checksum_sha256, uploader_admin_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            IMAGE_COLUMNS
        );
        sqlx::query_as::<_, Image>(&sql)
            .bind(&image.bucket)
            .bind(&image.key)
            .bind(&image.filename)
            .bind(&image.mime_type)
            .bind(image.size_bytes)
            .bind(&image.checksum_sha256)
            .bind(image.uploader_admin_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_constraint(e, &format!("Object {}/{}", image.bucket, image.key)))
    }

    async fn find_image(&self, id: i64) -> Result<Option<Image>> {
        let sql = format!("SELECT {} FROM images WHERE id = $1", IMAGE_COLUMNS);
        Ok(sqlx::query_as::<_, Image>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let sql = format!(
            "SELECT {} FROM images WHERE deleted_at IS NULL ORDER BY id DESC",
            IMAGE_COLUMNS
        );
        Ok(sqlx::query_as::<_, Image>(&sql).fetch_all(&self.pool).await?)
    }

    async fn soft_delete_image(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let result =
            sqlx::query("UPDATE images SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Image {} not found", id)));
        }
        Ok(())
    }

    async fn insert_grant(&self, grant: NewGrant) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO user_images (user_id, image_id, granted_by_admin_id, expires_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, image_id) DO NOTHING",
        )
        .bind(grant.user_id)
        .bind(grant.image_id)
        .bind(grant.granted_by_admin_id)
        .bind(grant.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_constraint(
                e,
                &format!("Grant of image {} to user {}", grant.image_id, grant.user_id),
            )
        })?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_grant(&self, user_id: i64, image_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_images WHERE user_id = $1 AND image_id = $2")
            .bind(user_id)
            .bind(image_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_grant(&self, user_id: i64, image_id: i64) -> Result<Option<Grant>> {
        Ok(sqlx::query_as::<_, Grant>(
            "SELECT id, user_id, image_id, granted_by_admin_id, granted_at, expires_at \
             FROM user_images WHERE user_id = $1 AND image_id = $2",
        )
        .bind(user_id)
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn images_for_user(&self, user_id: i64) -> Result<Vec<GrantedImage>> {
        let rows = sqlx::query_as::<_, GrantedImageRow>(
            "SELECT i.id, i.bucket, i.key, i.filename, i.mime_type, i.size_bytes, \
                    i.checksum_sha256, i.uploader_admin_id, i.created_at, i.deleted_at, \
                    ui.granted_at, ui.expires_at AS grant_expires_at \
             FROM user_images ui \
             JOIN images i ON i.id = ui.image_id \
             WHERE ui.user_id = $1 AND i.deleted_at IS NULL \
             ORDER BY ui.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(GrantedImage::from).collect())
    }

    async fn users_for_image(&self, image_id: i64) -> Result<Vec<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT u.id, u.username, u.password_hash, u.status, u.created_at, \
                    u.expires_at, u.extended_until, u.notes \
             FROM user_images ui \
             JOIN users u ON u.id = ui.user_id \
             WHERE ui.image_id = $1 \
             ORDER BY u.id",
        )
        .bind(image_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn extend_user(
        &self,
        extension: UserExtension,
        at: DateTime<Utc>,
    ) -> Result<(User, ExtensionRecord)> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT expires_at FROM users WHERE id = $1 FOR UPDATE")
                .bind(extension.user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (old_expires_at,) = previous.ok_or_else(|| {
            AppError::NotFound(format!("User {} not found", extension.user_id))
        })?;

        let sql = format!(
            "INSERT INTO user_extensions \
                (user_id, old_expires_at, new_expires_at, reason, operated_by_admin_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            EXTENSION_COLUMNS
        );
        let record = sqlx::query_as::<_, ExtensionRecord>(&sql)
            .bind(extension.user_id)
            .bind(old_expires_at)
            .bind(extension.new_expires_at)
            .bind(&extension.reason)
            .bind(extension.operated_by_admin_id)
            .bind(at)
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            "UPDATE users SET expires_at = $2, extended_until = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(extension.user_id)
            .bind(extension.new_expires_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((user, record))
    }

    async fn list_extensions(&self, user_id: i64) -> Result<Vec<ExtensionRecord>> {
        let sql = format!(
            "SELECT {} FROM user_extensions WHERE user_id = $1 ORDER BY id",
            EXTENSION_COLUMNS
        );
        Ok(sqlx::query_as::<_, ExtensionRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn append_usage(&self, entry: NewUsageLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO usage_logs (user_id, admin_id, action, ip, user_agent, success) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.user_id)
        .bind(entry.admin_id)
        .bind(&entry.action)
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .bind(entry.success)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_usage(&self, limit: i64) -> Result<Vec<UsageLogEntry>> {
        Ok(sqlx::query_as::<_, UsageLogEntry>(
            "SELECT id, user_id, admin_id, action, ip, user_agent, success, created_at \
             FROM usage_logs ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn stats_summary(&self, expiring_before: DateTime<Utc>) -> Result<StatsSummary> {
        let (total_users, active_users, expiring_users, total_images): (i64, i64, i64, i64) =
            sqlx::query_as(
                "SELECT \
                    (SELECT COUNT(*) FROM users), \
                    (SELECT COUNT(*) FROM users WHERE status = 'active'), \
                    (SELECT COUNT(*) FROM users \
                        WHERE expires_at IS NOT NULL AND expires_at <= $1), \
                    (SELECT COUNT(*) FROM images WHERE deleted_at IS NULL)",
            )
            .bind(expiring_before)
            .fetch_one(&self.pool)
            .await?;

        Ok(StatsSummary {
            total_users,
            active_users,
            disabled_users: total_users - active_users,
            expiring_users,
            total_images,
        })
    }
}
