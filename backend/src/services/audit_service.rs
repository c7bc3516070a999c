//! Usage logging service.
//!
//! Appends one row per authentication attempt or sensitive action. Writes are
//! best-effort: a failed audit insert is logged and never fails the request.

use std::sync::Arc;

use crate::error::Result;
use crate::models::principal::Principal;
use crate::models::usage_log::{NewUsageLogEntry, UsageLogEntry};
use crate::store::Store;

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    // Authentication
    AdminLogin,
    UserLogin,

    // Account management
    AdminCreated,
    AdminUpdated,
    UserCreated,
    UserUpdated,
    UserExtended,

    // Entitlements
    ImagesGranted,
    GrantRevoked,

    // Images
    ImageUploaded,
    ImageRegistered,
    ImageDeleted,
    UploadUrlIssued,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AdminLogin => "ADMIN_LOGIN",
            AuditAction::UserLogin => "USER_LOGIN",
            AuditAction::AdminCreated => "ADMIN_CREATED",
            AuditAction::AdminUpdated => "ADMIN_UPDATED",
            AuditAction::UserCreated => "USER_CREATED",
            AuditAction::UserUpdated => "USER_UPDATED",
            AuditAction::UserExtended => "USER_EXTENDED",
            AuditAction::ImagesGranted => "IMAGES_GRANTED",
            AuditAction::GrantRevoked => "GRANT_REVOKED",
            AuditAction::ImageUploaded => "IMAGE_UPLOADED",
            AuditAction::ImageRegistered => "IMAGE_REGISTERED",
            AuditAction::ImageDeleted => "IMAGE_DELETED",
            AuditAction::UploadUrlIssued => "UPLOAD_URL_ISSUED",
        }
    }
}

/// Caller network details captured at the HTTP boundary
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Audit log entry builder
pub struct AuditEntry {
    user_id: Option<i64>,
    admin_id: Option<i64>,
    action: AuditAction,
    client: ClientInfo,
    success: bool,
}

impl AuditEntry {
    pub fn new(action: AuditAction) -> Self {
        Self {
            user_id: None,
            admin_id: None,
            action,
            client: ClientInfo::default(),
            success: true,
        }
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn admin(mut self, admin_id: i64) -> Self {
        self.admin_id = Some(admin_id);
        self
    }

    /// Attribute the entry to whichever principal acted
    pub fn actor(self, principal: &Principal) -> Self {
        match principal {
            Principal::Admin(admin) => self.admin(admin.id),
            Principal::User(user) => self.user(user.id),
        }
    }

    pub fn client(mut self, client: &ClientInfo) -> Self {
        self.client = client.clone();
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}

/// Audit service
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn Store>,
}

impl AuditService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Log an audit entry. Failures are reported through tracing only.
    pub async fn log(&self, entry: AuditEntry) {
        let action = entry.action.as_str();
        let row = NewUsageLogEntry {
            user_id: entry.user_id,
            admin_id: entry.admin_id,
            action: action.to_string(),
            ip: entry.client.ip,
            user_agent: entry.client.user_agent,
            success: entry.success,
        };

        if let Err(e) = self.store.append_usage(row).await {
            tracing::warn!(action = action, error = %e, "Failed to write usage log");
        }
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: i64) -> Result<Vec<UsageLogEntry>> {
        self.store.recent_usage(limit.clamp(1, 1000)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_action_names() {
        assert_eq!(AuditAction::AdminLogin.as_str(), "ADMIN_LOGIN");
        assert_eq!(AuditAction::UserLogin.as_str(), "USER_LOGIN");
        assert_eq!(AuditAction::GrantRevoked.as_str(), "GRANT_REVOKED");
    }

    #[tokio::test]
    async fn test_log_appends_usage_row() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let audit = AuditService::new(store.clone());
        let client = ClientInfo {
            ip: Some("10.0.0.7".into()),
            user_agent: Some("curl/8.0".into()),
        };

        audit
            .log(
                AuditEntry::new(AuditAction::UserLogin)
                    .client(&client)
                    .success(false),
            )
            .await;

        let rows = audit.recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "USER_LOGIN");
        assert_eq!(rows[0].ip.as_deref(), Some("10.0.0.7"));
        assert!(!rows[0].success);
        assert!(rows[0].user_id.is_none());
    }
}
