//! In-process store with the same constraint semantics as Postgres.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::Store;
use crate::error::{AppError, Result};
use crate::models::admin::{Admin, AdminChanges, NewAdmin};
use crate::models::extension::{ExtensionRecord, UserExtension};
use crate::models::grant::{Grant, GrantedImage, NewGrant};
use crate::models::image::{Image, NewImage};
use crate::models::stats::StatsSummary;
use crate::models::usage_log::{NewUsageLogEntry, UsageLogEntry};
use crate::models::user::{NewUser, User, UserChanges};

#[derive(Default)]
struct Tables {
    admins: BTreeMap<i64, Admin>,
    users: BTreeMap<i64, User>,
    images: BTreeMap<i64, Image>,
    grants: BTreeMap<(i64, i64), Grant>,
    extensions: Vec<ExtensionRecord>,
    usage: Vec<UsageLogEntry>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store backed by maps behind a single lock, so every operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_admin(&self, id: i64) -> Result<Option<Admin>> {
        Ok(self.tables.read().await.admins.get(&id).cloned())
    }

    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let tables = self.tables.read().await;
        Ok(tables
            .admins
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn create_admin(&self, admin: NewAdmin) -> Result<Admin> {
        let mut tables = self.tables.write().await;
        if tables.admins.values().any(|a| a.username == admin.username) {
            return Err(AppError::Conflict(format!(
                "Admin '{}' already exists",
                admin.username
            )));
        }
        let row = Admin {
            id: tables.next_id(),
            username: admin.username,
            password_hash: admin.password_hash,
            is_superadmin: admin.is_superadmin,
            status: admin.status,
            created_at: Utc::now(),
            last_login_at: None,
        };
        tables.admins.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_admin(&self, id: i64, changes: AdminChanges) -> Result<Admin> {
        let mut tables = self.tables.write().await;
        let admin = tables
            .admins
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Admin {} not found", id)))?;
        if let Some(hash) = changes.password_hash {
            admin.password_hash = hash;
        }
        if let Some(flag) = changes.is_superadmin {
            admin.is_superadmin = flag;
        }
        if let Some(status) = changes.status {
            admin.status = status;
        }
        Ok(admin.clone())
    }

    async fn record_admin_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(admin) = self.tables.write().await.admins.get_mut(&id) {
            admin.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn count_admins(&self) -> Result<i64> {
        Ok(self.tables.read().await.admins.len() as i64)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(AppError::Conflict(format!(
                "User '{}' already exists",
                user.username
            )));
        }
        let row = User {
            id: tables.next_id(),
            username: user.username,
            password_hash: user.password_hash,
            status: user.status,
            created_at: Utc::now(),
            expires_at: user.expires_at,
            extended_until: None,
            notes: user.notes,
        };
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<User> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(status) = changes.status {
            user.status = status;
        }
        if let Some(notes) = changes.notes {
            user.notes = Some(notes);
        }
        Ok(user.clone())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.tables.read().await.users.values().rev().cloned().collect())
    }

    async fn create_image(&self, image: NewImage) -> Result<Image> {
        let mut tables = self.tables.write().await;
        if tables
            .images
            .values()
            .any(|i| i.bucket == image.bucket && i.key == image.key)
        {
            return Err(AppError::Conflict(format!(
                "Object {}/{} is already registered",
                image.bucket, image.key
            )));
        }
        let row = Image {
            id: tables.next_id(),
            bucket: image.bucket,
            key: image.key,
            filename: image.filename,
            mime_type: image.mime_type,
            size_bytes: image.size_bytes,
            checksum_sha256: image.checksum_sha256,
            uploader_admin_id: image.uploader_admin_id,
            created_at: Utc::now(),
            deleted_at: None,
        };
        tables.images.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_image(&self, id: i64) -> Result<Option<Image>> {
        Ok(self.tables.read().await.images.get(&id).cloned())
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let tables = self.tables.read().await;
        Ok(tables
            .images
            .values()
            .rev()
            .filter(|i| !i.is_deleted())
            .cloned()
            .collect())
    }

    async fn soft_delete_image(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.images.get_mut(&id) {
            Some(image) if !image.is_deleted() => {
                image.deleted_at = Some(at);
                Ok(())
            }
            _ => Err(AppError::NotFound(format!("Image {} not found", id))),
        }
    }

    async fn insert_grant(&self, grant: NewGrant) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&grant.user_id) {
            return Err(AppError::NotFound(format!("User {} not found", grant.user_id)));
        }
        if !tables.images.contains_key(&grant.image_id) {
            return Err(AppError::NotFound(format!("Image {} not found", grant.image_id)));
        }
        let pair = (grant.user_id, grant.image_id);
        if tables.grants.contains_key(&pair) {
            return Ok(false);
        }
        let row = Grant {
            id: tables.next_id(),
            user_id: grant.user_id,
            image_id: grant.image_id,
            granted_by_admin_id: grant.granted_by_admin_id,
            granted_at: Utc::now(),
            expires_at: grant.expires_at,
        };
        tables.grants.insert(pair, row);
        Ok(true)
    }

    async fn delete_grant(&self, user_id: i64, image_id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.grants.remove(&(user_id, image_id)).is_some())
    }

    async fn find_grant(&self, user_id: i64, image_id: i64) -> Result<Option<Grant>> {
        Ok(self
            .tables
            .read()
            .await
            .grants
            .get(&(user_id, image_id))
            .cloned())
    }

    async fn images_for_user(&self, user_id: i64) -> Result<Vec<GrantedImage>> {
        let tables = self.tables.read().await;
        let mut grants: Vec<&Grant> = tables
            .grants
            .range((user_id, i64::MIN)..=(user_id, i64::MAX))
            .map(|(_, g)| g)
            .collect();
        grants.sort_by_key(|g| g.id);

        Ok(grants
            .into_iter()
            .filter_map(|g| {
                let image = tables.images.get(&g.image_id)?;
                if image.is_deleted() {
                    return None;
                }
                Some(GrantedImage {
                    image: image.clone(),
                    granted_at: g.granted_at,
                    grant_expires_at: g.expires_at,
                })
            })
            .collect())
    }

    async fn users_for_image(&self, image_id: i64) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .grants
            .values()
            .filter(|g| g.image_id == image_id)
            .filter_map(|g| tables.users.get(&g.user_id).cloned())
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn extend_user(
        &self,
        extension: UserExtension,
        at: DateTime<Utc>,
    ) -> Result<(User, ExtensionRecord)> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let user = tables
            .users
            .get_mut(&extension.user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", extension.user_id)))?;

        let record = ExtensionRecord {
            id,
            user_id: user.id,
            old_expires_at: user.expires_at,
            new_expires_at: Some(extension.new_expires_at),
            reason: extension.reason,
            operated_by_admin_id: extension.operated_by_admin_id,
            created_at: at,
        };
        user.expires_at = Some(extension.new_expires_at);
        user.extended_until = Some(extension.new_expires_at);
        let user = user.clone();

        tables.extensions.push(record.clone());
        Ok((user, record))
    }

    async fn list_extensions(&self, user_id: i64) -> Result<Vec<ExtensionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .extensions
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn append_usage(&self, entry: NewUsageLogEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = UsageLogEntry {
            id: tables.next_id(),
            user_id: entry.user_id,
            admin_id: entry.admin_id,
            action: entry.action,
            ip: entry.ip,
            user_agent: entry.user_agent,
            success: entry.success,
            created_at: Utc::now(),
        };
        tables.usage.push(row);
        Ok(())
    }

    async fn recent_usage(&self, limit: i64) -> Result<Vec<UsageLogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .usage
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn stats_summary(&self, expiring_before: DateTime<Utc>) -> Result<StatsSummary> {
        let tables = self.tables.read().await;
        let total_users = tables.users.len() as i64;
        let active_users = tables
            .users
            .values()
            .filter(|u| u.status.is_active())
            .count() as i64;
        let expiring_users = tables
            .users
            .values()
            .filter(|u| u.expires_at.is_some_and(|at| at <= expiring_before))
            .count() as i64;
        let total_images = tables.images.values().filter(|i| !i.is_deleted()).count() as i64;

        Ok(StatsSummary {
            total_users,
            active_users,
            disabled_users: total_users - active_users,
            expiring_users,
            total_images,
        })
    }
}
