//! Request authorization.
//!
//! Every guarded request walks the same stages:
//! `Unauthenticated -> TokenPresented -> TokenValid -> RoleChecked -> ResourceScoped`.
//! Nothing is persisted between requests.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::config::{Config, DeliveryPolicy};
use crate::error::{AppError, Result};
use crate::models::admin::Admin;
use crate::models::principal::{Principal, Role};
use crate::services::auth_service::AuthService;
use crate::services::entitlement_service::EntitlementService;
use crate::store::Store;

/// How far a request got through authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    Unauthenticated,
    TokenPresented,
    TokenValid,
    RoleChecked,
    ResourceScoped,
}

impl fmt::Display for GuardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GuardStage::Unauthenticated => "unauthenticated",
            GuardStage::TokenPresented => "token_presented",
            GuardStage::TokenValid => "token_valid",
            GuardStage::RoleChecked => "role_checked",
            GuardStage::ResourceScoped => "resource_scoped",
        };
        f.write_str(name)
    }
}

/// Role an endpoint demands of its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredRole {
    Admin,
    User,
    /// Either principal type; used by endpoints that scope by resource owner
    Any,
}

impl RequiredRole {
    fn admits(self, role: Role) -> bool {
        matches!(
            (self, role),
            (RequiredRole::Any, _)
                | (RequiredRole::Admin, Role::Admin)
                | (RequiredRole::User, Role::User)
        )
    }
}

fn reject(stage: GuardStage, err: AppError) -> AppError {
    tracing::debug!(stage = %stage, error = %err, "Authorization rejected");
    err
}

/// Extract the credential from an `Authorization: Bearer <token>` value
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Access-control guard
pub struct AccessGuard {
    auth: Arc<AuthService>,
    store: Arc<dyn Store>,
    entitlements: EntitlementService,
    config: Arc<Config>,
}

impl AccessGuard {
    pub fn new(
        auth: Arc<AuthService>,
        store: Arc<dyn Store>,
        entitlements: EntitlementService,
        config: Arc<Config>,
    ) -> Self {
        Self {
            auth,
            store,
            entitlements,
            config,
        }
    }

    /// Resolve a bearer token into an active principal of the required role.
    ///
    /// Account expiry is not checked here: a user whose account lapses keeps
    /// working until their token expires.
    pub async fn authorize(&self, token: Option<&str>, required: RequiredRole) -> Result<Principal> {
        let token = token.ok_or_else(|| {
            reject(
                GuardStage::Unauthenticated,
                AppError::Unauthenticated("Not authenticated".to_string()),
            )
        })?;

        let verified = self
            .auth
            .verify_token(token)
            .map_err(|e| reject(GuardStage::TokenPresented, e))?;

        if !required.admits(verified.role) {
            return Err(reject(
                GuardStage::TokenValid,
                AppError::Forbidden(format!(
                    "A {} token cannot access this endpoint",
                    verified.role.as_str()
                )),
            ));
        }

        let principal = match verified.role {
            Role::Admin => self
                .store
                .find_admin_by_username(&verified.subject)
                .await?
                .map(Principal::Admin),
            Role::User => self
                .store
                .find_user_by_username(&verified.subject)
                .await?
                .map(Principal::User),
        }
        .ok_or_else(|| {
            reject(
                GuardStage::TokenValid,
                AppError::Forbidden("Account not found".to_string()),
            )
        })?;

        let active = match &principal {
            Principal::Admin(admin) => admin.status.is_active(),
            Principal::User(user) => user.status.is_active(),
        };
        if !active {
            return Err(reject(
                GuardStage::TokenValid,
                AppError::Forbidden("Account disabled".to_string()),
            ));
        }

        Ok(principal)
    }

    /// Admin principal with the superadmin flag set
    pub fn require_superadmin(principal: &Principal) -> Result<&Admin> {
        match principal {
            Principal::Admin(admin) if admin.is_superadmin => Ok(admin),
            _ => Err(reject(
                GuardStage::RoleChecked,
                AppError::Forbidden("Superadmin privileges required".to_string()),
            )),
        }
    }

    /// Users may only read their own resources; admins read anyone's.
    pub fn scope_to_owner(principal: &Principal, owner_username: &str) -> Result<()> {
        match principal {
            Principal::Admin(_) => Ok(()),
            Principal::User(user) if user.username == owner_username => Ok(()),
            Principal::User(_) => Err(reject(
                GuardStage::RoleChecked,
                AppError::Forbidden("Cannot access another user's resources".to_string()),
            )),
        }
    }

    /// Gate raw-byte and thumbnail delivery according to the deployment's
    /// policy. Returns the caller when one was required.
    pub async fn authorize_delivery(
        &self,
        token: Option<&str>,
        image_id: i64,
    ) -> Result<Option<Principal>> {
        if self.config.delivery_policy == DeliveryPolicy::Public {
            return Ok(None);
        }

        let principal = self.authorize(token, RequiredRole::Any).await?;
        if let Principal::User(user) = &principal {
            let allowed = self
                .entitlements
                .user_can_access(user.id, image_id, self.config.enforce_grant_expiry, Utc::now())
                .await?;
            if !allowed {
                return Err(reject(
                    GuardStage::RoleChecked,
                    AppError::Forbidden("No access to this image".to_string()),
                ));
            }
        }
        Ok(Some(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::admin::NewAdmin;
    use crate::models::image::NewImage;
    use crate::models::principal::AccountStatus;
    use crate::models::user::NewUser;
    use crate::services::audit_service::AuditService;
    use crate::store::MemoryStore;

    struct Harness {
        guard: AccessGuard,
        auth: Arc<AuthService>,
        store: Arc<dyn Store>,
        entitlements: EntitlementService,
    }

    fn harness(policy: DeliveryPolicy) -> Harness {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut config = Config::local("guard-secret", "/tmp/unused");
        config.delivery_policy = policy;
        let config = Arc::new(config);
        let auth = Arc::new(AuthService::new(
            store.clone(),
            AuditService::new(store.clone()),
            config.clone(),
        ));
        let entitlements = EntitlementService::new(store.clone());
        let guard = AccessGuard::new(auth.clone(), store.clone(), entitlements.clone(), config);
        Harness {
            guard,
            auth,
            store,
            entitlements,
        }
    }

    async fn add_user(store: &Arc<dyn Store>, name: &str, status: AccountStatus) -> i64 {
        store
            .create_user(NewUser {
                username: name.into(),
                password_hash: "x".into(),
                status,
                expires_at: None,
                notes: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn add_admin(store: &Arc<dyn Store>, name: &str, superadmin: bool) {
        store
            .create_admin(NewAdmin {
                username: name.into(),
                password_hash: "x".into(),
                is_superadmin: superadmin,
                status: AccountStatus::Active,
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer   xyz "), Some("xyz"));
        assert_eq!(bearer_token("Basic dXNlcg=="), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("token"), None);
    }

    #[tokio::test]
    async fn test_missing_and_invalid_tokens_are_unauthenticated() {
        let h = harness(DeliveryPolicy::Gated);
        assert!(matches!(
            h.guard.authorize(None, RequiredRole::Admin).await,
            Err(AppError::Unauthenticated(_))
        ));
        assert!(matches!(
            h.guard.authorize(Some("garbage"), RequiredRole::Admin).await,
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_token_type_cannot_cross_endpoints() {
        let h = harness(DeliveryPolicy::Gated);
        add_user(&h.store, "alice", AccountStatus::Active).await;
        add_admin(&h.store, "root", false).await;

        let user_token = h.auth.issue_token("alice", Role::User, 5).unwrap();
        let admin_token = h.auth.issue_token("root", Role::Admin, 5).unwrap();

        assert!(matches!(
            h.guard.authorize(Some(&user_token), RequiredRole::Admin).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            h.guard.authorize(Some(&admin_token), RequiredRole::User).await,
            Err(AppError::Forbidden(_))
        ));
        let p = h.guard.authorize(Some(&admin_token), RequiredRole::Any).await.unwrap();
        assert_eq!(p.role(), Role::Admin);
    }

    #[tokio::test]
    async fn test_disabled_or_unknown_account_is_forbidden() {
        let h = harness(DeliveryPolicy::Gated);
        add_user(&h.store, "bob", AccountStatus::Disabled).await;

        let token = h.auth.issue_token("bob", Role::User, 5).unwrap();
        assert!(matches!(
            h.guard.authorize(Some(&token), RequiredRole::User).await,
            Err(AppError::Forbidden(_))
        ));
        let ghost = h.auth.issue_token("ghost", Role::User, 5).unwrap();
        assert!(matches!(
            h.guard.authorize(Some(&ghost), RequiredRole::User).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_superadmin_and_owner_scoping() {
        let h = harness(DeliveryPolicy::Gated);
        add_admin(&h.store, "ops", false).await;
        add_admin(&h.store, "root", true).await;
        add_user(&h.store, "alice", AccountStatus::Active).await;

        let ops = h
            .guard
            .authorize(Some(&h.auth.issue_token("ops", Role::Admin, 5).unwrap()), RequiredRole::Admin)
            .await
            .unwrap();
        let root = h
            .guard
            .authorize(Some(&h.auth.issue_token("root", Role::Admin, 5).unwrap()), RequiredRole::Admin)
            .await
            .unwrap();
        let alice = h
            .guard
            .authorize(Some(&h.auth.issue_token("alice", Role::User, 5).unwrap()), RequiredRole::User)
            .await
            .unwrap();

        assert!(AccessGuard::require_superadmin(&ops).is_err());
        assert!(AccessGuard::require_superadmin(&root).is_ok());
        assert!(AccessGuard::require_superadmin(&alice).is_err());

        assert!(AccessGuard::scope_to_owner(&alice, "alice").is_ok());
        assert!(matches!(
            AccessGuard::scope_to_owner(&alice, "bob"),
            Err(AppError::Forbidden(_))
        ));
        assert!(AccessGuard::scope_to_owner(&ops, "bob").is_ok());
    }

    #[tokio::test]
    async fn test_gated_delivery_requires_grant() {
        let h = harness(DeliveryPolicy::Gated);
        let alice = add_user(&h.store, "alice", AccountStatus::Active).await;
        add_user(&h.store, "bob", AccountStatus::Active).await;
        let image = h
            .store
            .create_image(NewImage {
                bucket: "visomaster".into(),
                key: "k.png".into(),
                filename: "k.png".into(),
                mime_type: None,
                size_bytes: None,
                checksum_sha256: None,
                uploader_admin_id: None,
            })
            .await
            .unwrap();
        h.entitlements
            .grant_image_to_users(image.id, &[alice], None, None)
            .await
            .unwrap();

        let alice_token = h.auth.issue_token("alice", Role::User, 5).unwrap();
        let bob_token = h.auth.issue_token("bob", Role::User, 5).unwrap();

        assert!(h.guard.authorize_delivery(Some(&alice_token), image.id).await.is_ok());
        assert!(matches!(
            h.guard.authorize_delivery(Some(&bob_token), image.id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            h.guard.authorize_delivery(None, image.id).await,
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_public_delivery_needs_no_token() {
        let h = harness(DeliveryPolicy::Public);
        assert!(h.guard.authorize_delivery(None, 1).await.unwrap().is_none());
    }
}
