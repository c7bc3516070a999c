//! Application configuration loaded from environment variables.
//!
//! Built once at startup and shared by reference; nothing below `main`
//! reads the process environment.

use std::env;
use std::fmt;
use std::str::FromStr;

use jsonwebtoken::Algorithm;

use crate::error::{AppError, Result};

/// Who may fetch raw image bytes and thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// No credential required; storage is only reachable through a trusted perimeter.
    Public,
    /// Admin token, or a user token whose user holds a grant on the image.
    Gated,
}

impl FromStr for DeliveryPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "public" => Ok(DeliveryPolicy::Public),
            "gated" => Ok(DeliveryPolicy::Gated),
            other => Err(AppError::Config(format!(
                "Invalid DELIVERY_POLICY '{}': expected 'public' or 'gated'",
                other
            ))),
        }
    }
}

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL (`memory://` selects the in-process store)
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Shared secret for signing access tokens
    pub jwt_secret: String,

    /// Signing algorithm, fixed for the life of the process
    pub jwt_algorithm: Algorithm,

    /// Admin session lifetime in minutes
    pub admin_token_expiry_minutes: i64,

    /// End-user session lifetime in minutes
    pub user_token_expiry_minutes: i64,

    /// bcrypt cost factor
    pub bcrypt_cost: u32,

    /// Storage backend: "s3" or "filesystem"
    pub storage_backend: String,

    /// Filesystem storage root (when storage_backend = "filesystem")
    pub storage_path: String,

    /// Default bucket for new uploads
    pub s3_bucket: String,

    /// S3 region
    pub s3_region: String,

    /// S3 endpoint URL (for MinIO or other S3-compatible services)
    pub s3_endpoint: Option<String>,

    /// Static access key (falls back to the default AWS credential chain)
    pub s3_access_key: Option<String>,

    /// Static secret key
    pub s3_secret_key: Option<String>,

    /// Presigned URL lifetime in seconds
    pub presign_expiry_secs: u64,

    /// Thumbnails never exceed this many pixels on either side
    pub thumbnail_max_dimension: u32,

    /// Access policy for download/thumbnail endpoints
    pub delivery_policy: DeliveryPolicy,

    /// Hide grants past their expiry on self-service and gated delivery paths
    pub enforce_grant_expiry: bool,

    /// Username of the superadmin created on first boot
    pub seed_admin_username: String,

    /// Password for the seeded superadmin (generated when unset)
    pub seed_admin_password: Option<String>,

    /// OTLP collector endpoint (optional)
    pub otel_endpoint: Option<String>,

    /// Browser origins allowed by CORS; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("bind_address", &self.bind_address)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("admin_token_expiry_minutes", &self.admin_token_expiry_minutes)
            .field("user_token_expiry_minutes", &self.user_token_expiry_minutes)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("storage_backend", &self.storage_backend)
            .field("storage_path", &self.storage_path)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_access_key", &redact(&self.s3_access_key))
            .field("s3_secret_key", &redact(&self.s3_secret_key))
            .field("presign_expiry_secs", &self.presign_expiry_secs)
            .field("thumbnail_max_dimension", &self.thumbnail_max_dimension)
            .field("delivery_policy", &self.delivery_policy)
            .field("enforce_grant_expiry", &self.enforce_grant_expiry)
            .field("seed_admin_username", &self.seed_admin_username)
            .field("seed_admin_password", &redact(&self.seed_admin_password))
            .field("otel_endpoint", &self.otel_endpoint)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let jwt_algorithm = parse_algorithm(
            &env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".into()),
        )?;
        let delivery_policy = env::var("DELIVERY_POLICY")
            .unwrap_or_else(|_| "gated".into())
            .parse()?;

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| AppError::Config("DATABASE_URL not set".into()))?,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| AppError::Config("JWT_SECRET not set".into()))?,
            jwt_algorithm,
            admin_token_expiry_minutes: env_parse("ADMIN_TOKEN_EXPIRY_MINUTES", 720),
            user_token_expiry_minutes: env_parse("USER_TOKEN_EXPIRY_MINUTES", 240),
            bcrypt_cost: env_parse("BCRYPT_COST", bcrypt::DEFAULT_COST),
            storage_backend: env::var("STORAGE_BACKEND").unwrap_or_else(|_| "s3".into()),
            storage_path: env::var("STORAGE_PATH")
                .unwrap_or_else(|_| "/var/lib/viso-admin/objects".into()),
            s3_bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "visomaster".into()),
            s3_region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            s3_access_key: env::var("S3_ACCESS_KEY").ok(),
            s3_secret_key: env::var("S3_SECRET_KEY").ok(),
            presign_expiry_secs: env_parse("S3_PRESIGN_EXPIRY_SECS", 3600),
            thumbnail_max_dimension: env_parse("THUMBNAIL_MAX_DIMENSION", 400),
            delivery_policy,
            enforce_grant_expiry: env::var("ENFORCE_GRANT_EXPIRY")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
            seed_admin_username: env::var("SEED_ADMIN_USERNAME").unwrap_or_else(|_| "admin".into()),
            seed_admin_password: env::var("SEED_ADMIN_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
            otel_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
        })
    }

    /// Self-contained configuration: in-process store, filesystem storage
    /// rooted at `storage_path`, low bcrypt cost. Used by local runs and tests.
    pub fn local(jwt_secret: impl Into<String>, storage_path: impl Into<String>) -> Self {
        Self {
            database_url: "memory://".into(),
            bind_address: "127.0.0.1:8080".into(),
            jwt_secret: jwt_secret.into(),
            jwt_algorithm: Algorithm::HS256,
            admin_token_expiry_minutes: 720,
            user_token_expiry_minutes: 240,
            bcrypt_cost: 4,
            storage_backend: "filesystem".into(),
            storage_path: storage_path.into(),
            s3_bucket: "visomaster".into(),
            s3_region: "us-east-1".into(),
            s3_endpoint: None,
            s3_access_key: None,
            s3_secret_key: None,
            presign_expiry_secs: 3600,
            thumbnail_max_dimension: 400,
            delivery_policy: DeliveryPolicy::Gated,
            enforce_grant_expiry: false,
            seed_admin_username: "admin".into(),
            seed_admin_password: None,
            otel_endpoint: None,
            cors_origins: Vec::new(),
        }
    }

    /// Whether the in-process store was requested instead of Postgres.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory://")
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Only the HMAC family is accepted; the signing key is a shared secret.
pub fn parse_algorithm(name: &str) -> Result<Algorithm> {
    match name.to_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(AppError::Config(format!(
            "Unsupported JWT_ALGORITHM '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("hs256").unwrap(), Algorithm::HS256);
        assert_eq!(parse_algorithm("HS512").unwrap(), Algorithm::HS512);
        assert!(parse_algorithm("RS256").is_err());
    }

    #[test]
    fn test_delivery_policy_from_str() {
        assert_eq!("public".parse::<DeliveryPolicy>().unwrap(), DeliveryPolicy::Public);
        assert_eq!("GATED".parse::<DeliveryPolicy>().unwrap(), DeliveryPolicy::Gated);
        assert!("open".parse::<DeliveryPolicy>().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::local("jwt-signing-secret", "/tmp/objects");
        config.s3_secret_key = Some("s3-secret-value".into());
        let output = format!("{:?}", config);
        assert!(output.contains("/tmp/objects"));
        assert!(!output.contains("jwt-signing-secret"));
        assert!(!output.contains("s3-secret-value"));
        assert!(output.contains("[REDACTED]"));
    }

    #[test]
    fn test_parse_list_skips_blanks() {
        assert_eq!(
            parse_list("http://a.test, ,http://b.test,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_local_config_uses_memory_store() {
        let config = Config::local("secret", "/tmp/objects");
        assert!(config.uses_memory_store());
        assert_eq!(config.storage_backend, "filesystem");
    }
}
