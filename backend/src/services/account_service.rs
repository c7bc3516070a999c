//! Account administration: user and admin records, dashboard stats, and the
//! first-boot superadmin.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::error::{AppError, Result};
use crate::models::admin::{Admin, AdminChanges, NewAdmin};
use crate::models::principal::AccountStatus;
use crate::models::stats::StatsSummary;
use crate::models::user::{NewUser, User, UserChanges};
use crate::services::auth_service::AuthService;
use crate::services::entitlement_service::EntitlementService;
use crate::store::Store;

pub const MIN_PASSWORD_LEN: usize = 6;
/// bcrypt ignores everything past this many bytes
pub const MAX_PASSWORD_BYTES: usize = 72;
const MAX_USERNAME_LEN: usize = 64;
const EXPIRING_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    pub status: AccountStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub password: Option<String>,
    pub status: Option<AccountStatus>,
    pub notes: Option<String>,
    /// Routed through the audited extension path
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CreateAdmin {
    pub username: String,
    pub password: String,
    pub is_superadmin: bool,
    pub status: AccountStatus,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAdmin {
    pub password: Option<String>,
    pub status: Option<AccountStatus>,
    pub is_superadmin: Option<bool>,
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty()
        || username.len() > MAX_USERNAME_LEN
        || username.chars().any(char::is_whitespace)
    {
        return Err(AppError::Validation(format!(
            "Username must be 1-{} characters without whitespace",
            MAX_USERNAME_LEN
        )));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::Validation(format!(
            "Password must be at most {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

/// Random password for the seeded superadmin
fn generate_password() -> String {
    const CHARSET: &[u8] = b"abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789!@#$%&*";
    let mut rng = rand::rng();
    (0..20)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Account service
pub struct AccountService {
    store: Arc<dyn Store>,
    auth: Arc<AuthService>,
    entitlements: EntitlementService,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, auth: Arc<AuthService>, entitlements: EntitlementService) -> Self {
        Self {
            store,
            auth,
            entitlements,
        }
    }

    pub async fn create_user(&self, input: CreateUser) -> Result<User> {
        validate_username(&input.username)?;
        validate_password(&input.password)?;

        let user = self
            .store
            .create_user(NewUser {
                username: input.username,
                password_hash: self.auth.hash_password(&input.password)?,
                status: input.status,
                expires_at: input.expires_at,
                notes: input.notes,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "Created user");
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.store.list_users().await
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Apply a partial update. A new expiry is written as an extension
    /// record attributed to `operating_admin_id`.
    pub async fn update_user(
        &self,
        user_id: i64,
        input: UpdateUser,
        operating_admin_id: Option<i64>,
    ) -> Result<User> {
        let password_hash = match input.password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(self.auth.hash_password(password)?)
            }
            None => None,
        };

        let mut user = self
            .store
            .update_user(
                user_id,
                UserChanges {
                    password_hash,
                    status: input.status,
                    notes: input.notes,
                },
            )
            .await?;

        if let Some(expires_at) = input.expires_at {
            if user.expires_at != Some(expires_at) {
                let (extended, _) = self
                    .entitlements
                    .extend_user(
                        user_id,
                        expires_at,
                        Some("Expiry changed via account update".to_string()),
                        operating_admin_id,
                    )
                    .await?;
                user = extended;
            }
        }

        tracing::info!(user_id = user.id, "Updated user");
        Ok(user)
    }

    pub async fn get_admin(&self, admin_id: i64) -> Result<Admin> {
        self.store
            .find_admin(admin_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Admin not found".to_string()))
    }

    pub async fn create_admin(&self, input: CreateAdmin) -> Result<Admin> {
        validate_username(&input.username)?;
        validate_password(&input.password)?;

        let admin = self
            .store
            .create_admin(NewAdmin {
                username: input.username,
                password_hash: self.auth.hash_password(&input.password)?,
                is_superadmin: input.is_superadmin,
                status: input.status,
            })
            .await?;

        tracing::info!(admin_id = admin.id, username = %admin.username, "Created admin");
        Ok(admin)
    }

    pub async fn update_admin(&self, admin_id: i64, input: UpdateAdmin) -> Result<Admin> {
        let password_hash = match input.password.as_deref() {
            Some(password) => {
                validate_password(password)?;
                Some(self.auth.hash_password(password)?)
            }
            None => None,
        };

        let admin = self
            .store
            .update_admin(
                admin_id,
                AdminChanges {
                    password_hash,
                    is_superadmin: input.is_superadmin,
                    status: input.status,
                },
            )
            .await?;

        tracing::info!(admin_id = admin.id, "Updated admin");
        Ok(admin)
    }

    /// Dashboard counts; "expiring" means expiry within the next seven days
    /// (already-lapsed accounts included).
    pub async fn stats_summary(&self) -> Result<StatsSummary> {
        self.store
            .stats_summary(Utc::now() + Duration::days(EXPIRING_WINDOW_DAYS))
            .await
    }

    /// Create a superadmin when the admin table is empty.
    ///
    /// Returns the created admin and, when no password was supplied, the
    /// generated one so the caller can show it once.
    pub async fn seed_admin(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<Option<(Admin, Option<String>)>> {
        if self.store.count_admins().await? > 0 {
            return Ok(None);
        }

        let (password, generated) = match password {
            Some(p) => (p.to_string(), false),
            None => (generate_password(), true),
        };

        let admin = self
            .create_admin(CreateAdmin {
                username: username.to_string(),
                password: password.clone(),
                is_superadmin: true,
                status: AccountStatus::Active,
            })
            .await?;

        Ok(Some((admin, generated.then_some(password))))
    }
}
