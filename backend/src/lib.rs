//! Viso Admin - Backend Library
//!
//! Grants end users time-bounded access to images held in object storage.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
