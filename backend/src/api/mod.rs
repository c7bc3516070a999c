//! API module - HTTP handlers and middleware.

pub mod download_response;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;

use std::sync::Arc;

use crate::config::Config;
use crate::services::access_guard::AccessGuard;
use crate::services::account_service::AccountService;
use crate::services::audit_service::AuditService;
use crate::services::auth_service::AuthService;
use crate::services::entitlement_service::EntitlementService;
use crate::services::storage_service::StorageService;
use crate::storage::StorageBackend;
use crate::store::Store;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub auth: Arc<AuthService>,
    pub guard: Arc<AccessGuard>,
    pub entitlements: EntitlementService,
    pub storage: Arc<StorageService>,
    pub accounts: Arc<AccountService>,
    pub audit: AuditService,
}

impl AppState {
    /// Wire every service over one store and one blob backend.
    pub fn new(config: Config, store: Arc<dyn Store>, backend: Arc<dyn StorageBackend>) -> Self {
        let config = Arc::new(config);
        let audit = AuditService::new(store.clone());
        let auth = Arc::new(AuthService::new(store.clone(), audit.clone(), config.clone()));
        let entitlements = EntitlementService::new(store.clone());
        let guard = Arc::new(AccessGuard::new(
            auth.clone(),
            store.clone(),
            entitlements.clone(),
            config.clone(),
        ));
        let storage = Arc::new(StorageService::new(backend, store.clone(), config.clone()));
        let accounts = Arc::new(AccountService::new(
            store.clone(),
            auth.clone(),
            entitlements.clone(),
        ));

        Self {
            config,
            store,
            auth,
            guard,
            entitlements,
            storage,
            accounts,
            audit,
        }
    }
}

pub type SharedState = Arc<AppState>;
