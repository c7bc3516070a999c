//! Authentication service.
//!
//! Password hashing, role-tagged access tokens, and the two login flows.
//! Admins and users share one token format; the `role` claim keeps them apart.

use std::sync::Arc;

use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::admin::Admin;
use crate::models::principal::Role;
use crate::models::user::User;
use crate::services::audit_service::{AuditAction, AuditEntry, AuditService, ClientInfo};
use crate::store::Store;

const BAD_CREDENTIALS: &str = "Incorrect username or password";

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Which principal table the subject lives in
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Contents of a token that passed signature and expiry checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service
pub struct AuthService {
    store: Arc<dyn Store>,
    audit: AuditService,
    config: Arc<Config>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(store: Arc<dyn Store>, audit: AuditService, config: Arc<Config>) -> Self {
        let secret = config.jwt_secret.clone();
        Self {
            store,
            audit,
            config,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Session lifetime for a role when the caller does not pick one
    pub fn default_ttl_minutes(&self, role: Role) -> i64 {
        match role {
            Role::Admin => self.config.admin_token_expiry_minutes,
            Role::User => self.config.user_token_expiry_minutes,
        }
    }

    /// Sign a token for `subject` valid for `ttl_minutes` from now
    pub fn issue_token(&self, subject: &str, role: Role, ttl_minutes: i64) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(ttl_minutes)).timestamp(),
        };

        encode(
            &Header::new(self.config.jwt_algorithm),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Sign a token with the role's default lifetime
    pub fn issue_default_token(&self, subject: &str, role: Role) -> Result<String> {
        self.issue_token(subject, role, self.default_ttl_minutes(role))
    }

    /// Validate signature, algorithm and expiry, returning the claims
    pub fn verify_token(&self, token: &str) -> Result<VerifiedToken> {
        let mut validation = Validation::new(self.config.jwt_algorithm);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Unauthenticated(format!("Invalid token: {}", e)))?;

        let expires_at = Utc
            .timestamp_opt(data.claims.exp, 0)
            .single()
            .ok_or_else(|| AppError::Unauthenticated("Invalid token expiry".to_string()))?;

        Ok(VerifiedToken {
            subject: data.claims.sub,
            role: data.claims.role,
            expires_at,
        })
    }

    /// Hash a password with the configured cost
    pub fn hash_password(&self, password: &str) -> Result<String> {
        Self::hash_password_with_cost(password, self.config.bcrypt_cost)
    }

    /// Hash a password
    pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String> {
        hash(password, cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }

    /// Operator login. Records a usage row and stamps `last_login_at` on success.
    pub async fn authenticate_admin(
        &self,
        username: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<(Admin, String)> {
        let entry = AuditEntry::new(AuditAction::AdminLogin).client(client);

        let admin = match self.store.find_admin_by_username(username).await? {
            Some(admin) => admin,
            None => {
                self.audit.log(entry.success(false)).await;
                return Err(AppError::Unauthenticated(BAD_CREDENTIALS.to_string()));
            }
        };
        let entry = entry.admin(admin.id);

        if !Self::verify_password(password, &admin.password_hash)? {
            self.audit.log(entry.success(false)).await;
            return Err(AppError::Unauthenticated(BAD_CREDENTIALS.to_string()));
        }

        if !admin.status.is_active() {
            self.audit.log(entry.success(false)).await;
            return Err(AppError::Forbidden("Admin account disabled".to_string()));
        }

        let now = Utc::now();
        self.store.record_admin_login(admin.id, now).await?;
        self.audit.log(entry).await;

        let token = self.issue_default_token(&admin.username, Role::Admin)?;
        tracing::info!(admin = %admin.username, "Admin logged in");

        Ok((
            Admin {
                last_login_at: Some(now),
                ..admin
            },
            token,
        ))
    }

    /// End-user login. Disabled and expired accounts are refused.
    pub async fn authenticate_user(
        &self,
        username: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<(User, String)> {
        let entry = AuditEntry::new(AuditAction::UserLogin).client(client);

        let user = match self.store.find_user_by_username(username).await? {
            Some(user) => user,
            None => {
                self.audit.log(entry.success(false)).await;
                return Err(AppError::Unauthenticated(BAD_CREDENTIALS.to_string()));
            }
        };
        let entry = entry.user(user.id);

        if !Self::verify_password(password, &user.password_hash)? {
            self.audit.log(entry.success(false)).await;
            return Err(AppError::Unauthenticated(BAD_CREDENTIALS.to_string()));
        }

        if !user.status.is_active() {
            self.audit.log(entry.success(false)).await;
            return Err(AppError::Forbidden("Account disabled".to_string()));
        }

        if user.is_expired_at(Utc::now()) {
            self.audit.log(entry.success(false)).await;
            return Err(AppError::Forbidden("Account expired".to_string()));
        }

        self.audit.log(entry).await;
        let token = self.issue_default_token(&user.username, Role::User)?;
        tracing::info!(user = %user.username, "User logged in");

        Ok((user, token))
    }
}
