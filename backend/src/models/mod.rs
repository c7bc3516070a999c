//! Database models (SQLx).

pub mod admin;
pub mod extension;
pub mod grant;
pub mod image;
pub mod principal;
pub mod stats;
pub mod usage_log;
pub mod user;
