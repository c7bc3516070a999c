//! Entitlement service.
//!
//! Grants are insert-if-absent; the store's (user, image) uniqueness
//! constraint is what makes concurrent re-grants safe. Batch grants apply
//! item by item and stop at the first failure.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::extension::{ExtensionRecord, UserExtension};
use crate::models::grant::{GrantedImage, NewGrant};
use crate::models::image::Image;
use crate::models::user::User;
use crate::store::Store;

/// Entitlement service
#[derive(Clone)]
pub struct EntitlementService {
    store: Arc<dyn Store>,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn live_image(&self, image_id: i64) -> Result<Image> {
        self.store
            .find_image(image_id)
            .await?
            .filter(|image| !image.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", image_id)))
    }

    async fn user(&self, user_id: i64) -> Result<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    /// Grant one image to many users. Returns how many grants were new.
    pub async fn grant_image_to_users(
        &self,
        image_id: i64,
        user_ids: &[i64],
        expires_at: Option<DateTime<Utc>>,
        granting_admin_id: Option<i64>,
    ) -> Result<usize> {
        self.live_image(image_id).await?;

        let mut created = 0;
        for &user_id in user_ids {
            let inserted = self
                .store
                .insert_grant(NewGrant {
                    user_id,
                    image_id,
                    granted_by_admin_id: granting_admin_id,
                    expires_at,
                })
                .await?;
            if inserted {
                created += 1;
            }
        }

        tracing::info!(
            image_id = image_id,
            requested = user_ids.len(),
            created = created,
            admin_id = ?granting_admin_id,
            "Granted image to users"
        );
        Ok(created)
    }

    /// Grant many images to one user. Returns how many grants were new.
    pub async fn grant_images_to_user(
        &self,
        user_id: i64,
        image_ids: &[i64],
        expires_at: Option<DateTime<Utc>>,
        granting_admin_id: Option<i64>,
    ) -> Result<usize> {
        self.user(user_id).await?;

        let mut created = 0;
        for &image_id in image_ids {
            self.live_image(image_id).await?;
            let inserted = self
                .store
                .insert_grant(NewGrant {
                    user_id,
                    image_id,
                    granted_by_admin_id: granting_admin_id,
                    expires_at,
                })
                .await?;
            if inserted {
                created += 1;
            }
        }

        tracing::info!(
            user_id = user_id,
            requested = image_ids.len(),
            created = created,
            admin_id = ?granting_admin_id,
            "Granted images to user"
        );
        Ok(created)
    }

    /// Remove a grant. A missing grant is `NotFound`.
    pub async fn revoke_grant(&self, user_id: i64, image_id: i64) -> Result<()> {
        if !self.store.delete_grant(user_id, image_id).await? {
            return Err(AppError::NotFound("Assignment not found".to_string()));
        }
        tracing::info!(user_id = user_id, image_id = image_id, "Revoked grant");
        Ok(())
    }

    /// Every granted image regardless of grant or account expiry
    pub async fn list_images_for_user(&self, user_id: i64) -> Result<Vec<GrantedImage>> {
        self.user(user_id).await?;
        self.store.images_for_user(user_id).await
    }

    /// Granted images whose grant has not lapsed at `now`
    pub async fn list_active_images_for_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<GrantedImage>> {
        Ok(self
            .list_images_for_user(user_id)
            .await?
            .into_iter()
            .filter(|granted| !granted.is_expired_at(now))
            .collect())
    }

    pub async fn list_users_for_image(&self, image_id: i64) -> Result<Vec<User>> {
        self.live_image(image_id).await?;
        self.store.users_for_image(image_id).await
    }

    /// Whether the user may fetch the image's bytes. With `enforce_expiry`,
    /// a lapsed grant counts as no grant.
    pub async fn user_can_access(
        &self,
        user_id: i64,
        image_id: i64,
        enforce_expiry: bool,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(match self.store.find_grant(user_id, image_id).await? {
            Some(grant) => !(enforce_expiry && grant.is_expired_at(now)),
            None => false,
        })
    }

    /// Audited expiry change. The only path that moves a user's expiry.
    pub async fn extend_user(
        &self,
        user_id: i64,
        new_expires_at: DateTime<Utc>,
        reason: Option<String>,
        operating_admin_id: Option<i64>,
    ) -> Result<(User, ExtensionRecord)> {
        let (user, record) = self
            .store
            .extend_user(
                UserExtension {
                    user_id,
                    new_expires_at,
                    reason,
                    operated_by_admin_id: operating_admin_id,
                },
                Utc::now(),
            )
            .await?;

        tracing::info!(
            user_id = user_id,
            old_expires_at = ?record.old_expires_at,
            new_expires_at = %new_expires_at,
            admin_id = ?operating_admin_id,
            "Extended user"
        );
        Ok((user, record))
    }

    pub async fn list_extensions(&self, user_id: i64) -> Result<Vec<ExtensionRecord>> {
        self.user(user_id).await?;
        self.store.list_extensions(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::image::NewImage;
    use crate::models::principal::AccountStatus;
    use crate::models::user::NewUser;
    use crate::store::MemoryStore;
    use chrono::Duration;

    async fn fixture() -> (EntitlementService, Arc<dyn Store>, Vec<User>, Vec<Image>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut users = Vec::new();
        for name in ["alice", "bob", "carol"] {
            users.push(
                store
                    .create_user(NewUser {
                        username: name.into(),
                        password_hash: "hash".into(),
                        status: AccountStatus::Active,
                        expires_at: None,
                        notes: None,
                    })
                    .await
                    .unwrap(),
            );
        }
        let mut images = Vec::new();
        for key in ["a.png", "b.png"] {
            images.push(
                store
                    .create_image(NewImage {
                        bucket: "visomaster".into(),
                        key: key.into(),
                        filename: key.into(),
                        mime_type: None,
                        size_bytes: None,
                        checksum_sha256: None,
                        uploader_admin_id: None,
                    })
                    .await
                    .unwrap(),
            );
        }
        (EntitlementService::new(store.clone()), store, users, images)
    }

    #[tokio::test]
    async fn test_regrant_is_noop() {
        let (svc, _, users, images) = fixture().await;
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();

        assert_eq!(svc.grant_image_to_users(images[0].id, &ids[..2], None, None).await.unwrap(), 2);
        assert_eq!(svc.grant_image_to_users(images[0].id, &ids, None, None).await.unwrap(), 1);

        let holders = svc.list_users_for_image(images[0].id).await.unwrap();
        assert_eq!(holders.len(), 3);
    }

    #[tokio::test]
    async fn test_grant_images_to_user_is_symmetric() {
        let (svc, _, users, images) = fixture().await;
        let image_ids: Vec<i64> = images.iter().map(|i| i.id).collect();

        assert_eq!(svc.grant_images_to_user(users[0].id, &image_ids, None, None).await.unwrap(), 2);
        assert_eq!(svc.grant_images_to_user(users[0].id, &image_ids, None, None).await.unwrap(), 0);
        assert_eq!(svc.list_images_for_user(users[0].id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_targets_are_not_found() {
        let (svc, _, users, images) = fixture().await;
        assert!(matches!(
            svc.grant_image_to_users(9_999, &[users[0].id], None, None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.grant_images_to_user(9_999, &[images[0].id], None, None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.list_images_for_user(9_999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_then_relist() {
        let (svc, _, users, images) = fixture().await;
        svc.grant_image_to_users(images[0].id, &[users[0].id], None, None)
            .await
            .unwrap();

        svc.revoke_grant(users[0].id, images[0].id).await.unwrap();
        assert!(svc.list_images_for_user(users[0].id).await.unwrap().is_empty());
        assert!(matches!(
            svc.revoke_grant(users[0].id, images[0].id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_grants_are_listed_unless_filtered() {
        let (svc, _, users, images) = fixture().await;
        let now = Utc::now();
        svc.grant_image_to_users(images[0].id, &[users[0].id], Some(now - Duration::hours(1)), None)
            .await
            .unwrap();
        svc.grant_image_to_users(images[1].id, &[users[0].id], Some(now + Duration::hours(1)), None)
            .await
            .unwrap();

        assert_eq!(svc.list_images_for_user(users[0].id).await.unwrap().len(), 2);
        let active = svc.list_active_images_for_user(users[0].id, now).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].image.id, images[1].id);

        assert!(svc.user_can_access(users[0].id, images[0].id, false, now).await.unwrap());
        assert!(!svc.user_can_access(users[0].id, images[0].id, true, now).await.unwrap());
        assert!(!svc.user_can_access(users[1].id, images[0].id, false, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_extend_user_writes_history() {
        let (svc, _, users, _) = fixture().await;
        let first = Utc::now() + Duration::days(30);
        let second = first + Duration::days(30);

        svc.extend_user(users[0].id, first, Some("trial".into()), None)
            .await
            .unwrap();
        let (user, record) = svc
            .extend_user(users[0].id, second, None, None)
            .await
            .unwrap();

        assert_eq!(user.expires_at, Some(second));
        assert_eq!(record.old_expires_at, Some(first));
        let history = svc.list_extensions(users[0].id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].old_expires_at, None);
        assert!(matches!(
            svc.extend_user(9_999, second, None, None).await,
            Err(AppError::NotFound(_))
        ));
    }
}
