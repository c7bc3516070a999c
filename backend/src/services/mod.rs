//! Business logic services.

pub mod access_guard;
pub mod account_service;
pub mod audit_service;
pub mod auth_service;
pub mod entitlement_service;
pub mod storage_service;
pub mod thumbnail;
