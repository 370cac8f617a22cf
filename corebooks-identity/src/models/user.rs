/// User model
///
/// A user belongs to exactly one tenant. Email is unique per tenant among
/// non-deleted users; deletion is always soft (`deleted_at`), so audit history
/// keeps resolving.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY,
///     tenant_id UUID NOT NULL,
///     email VARCHAR(255) NOT NULL,
///     password_hash VARCHAR(255) NOT NULL,
///     display_name VARCHAR(255) NOT NULL,
///     phone VARCHAR(32),
///     role user_role NOT NULL DEFAULT 'viewer',
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     last_login_at TIMESTAMPTZ,
///     deleted_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// CREATE UNIQUE INDEX users_tenant_email_live
///     ON users (tenant_id, email) WHERE deleted_at IS NULL;
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles a user can hold within a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator; crosses tenant boundaries
    SuperAdmin,

    /// Full control inside one tenant
    TenantAdmin,

    /// Day-to-day bookkeeping
    Staff,

    /// Read-only access
    Viewer,
}

impl Role {
    /// All roles, most privileged first
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::TenantAdmin, Role::Staff, Role::Viewer];

    /// Converts role to its wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::TenantAdmin => "tenant_admin",
            Role::Staff => "staff",
            Role::Viewer => "viewer",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Viewer
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Role must be one of: super_admin, tenant_admin, staff, viewer (got '{}')",
                    s
                )
            })
    }
}

/// User account
///
/// Passwords are stored as Argon2id hashes. `password_hash` is skipped when
/// serializing so a `User` can never leak it through an API response.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// Lower-cased email address
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Display name
    pub display_name: String,

    /// Optional phone number
    pub phone: Option<String>,

    /// Role within the tenant
    pub role: Role,

    /// Inactive users cannot authenticate
    pub is_active: bool,

    /// When the user last logged in
    pub last_login_at: Option<DateTime<Utc>>,

    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,

    /// When the user was created
    pub created_at: DateTime<Utc>,

    /// When the user was last updated
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the user may authenticate
    pub fn can_authenticate(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    /// Owning tenant
    pub tenant_id: Uuid,

    /// Normalized (trimmed, lower-cased) email
    pub email: String,

    /// Argon2id hash, never plaintext
    pub password_hash: String,

    /// Display name
    pub display_name: String,

    /// Optional phone number
    pub phone: Option<String>,

    /// Role
    pub role: Role,
}

/// Profile fields a user may change about themselves
///
/// Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProfile {
    /// New display name
    pub display_name: Option<String>,

    /// New phone number
    pub phone: Option<String>,
}

impl UpdateProfile {
    /// Whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.phone.is_none()
    }
}
