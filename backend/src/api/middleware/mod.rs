//! API middleware.

pub mod auth;
pub mod client_info;
pub mod request_id;
