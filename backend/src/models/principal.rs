//! Principal types shared by both account tables and the token layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::admin::Admin;
use super::user::User;

/// Lifecycle status of an admin or user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "account_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Disabled,
}

impl AccountStatus {
    pub fn is_active(self) -> bool {
        self == AccountStatus::Active
    }
}

/// Role discriminant carried inside every signed token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// An authenticated identity, resolved from a token and the account tables.
#[derive(Debug, Clone)]
pub enum Principal {
    Admin(Admin),
    User(User),
}

impl Principal {
    pub fn role(&self) -> Role {
        match self {
            Principal::Admin(_) => Role::Admin,
            Principal::User(_) => Role::User,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Principal::Admin(admin) => admin.id,
            Principal::User(user) => user.id,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Principal::Admin(admin) => &admin.username,
            Principal::User(user) => &user.username,
        }
    }

    pub fn as_admin(&self) -> Option<&Admin> {
        match self {
            Principal::Admin(admin) => Some(admin),
            Principal::User(_) => None,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Principal::User(user) => Some(user),
            Principal::Admin(_) => None,
        }
    }
}
