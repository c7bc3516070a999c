//! HTTP request handlers.

pub mod admins;
pub mod auth;
pub mod grants;
pub mod health;
pub mod images;
pub mod stats;
pub mod users;
