/// Password reset token model
///
/// The raw token is handed to the delivery channel exactly once; only its
/// SHA-256 hash is stored. A token moves from issued to exactly one terminal
/// state (used, expired, or deactivated) and never comes back.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE password_reset_tokens (
///     id UUID PRIMARY KEY,
///     user_id UUID NOT NULL REFERENCES users(id),
///     tenant_id UUID NOT NULL,
///     token_hash CHAR(64) NOT NULL UNIQUE,
///     email VARCHAR(255) NOT NULL,
///     expires_at TIMESTAMPTZ NOT NULL,
///     used_at TIMESTAMPTZ,
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted reset token
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,

    /// SHA-256 of the raw token
    #[serde(skip_serializing, default)]
    pub token_hash: String,

    /// Address the token was sent to
    pub email: String,

    pub expires_at: DateTime<Utc>,

    /// Set when the token is consumed
    pub used_at: Option<DateTime<Utc>>,

    /// Cleared when superseded or consumed
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    /// Classifies the token at `now`
    ///
    /// Checked in order: used, inactive, expired.
    pub fn state_at(&self, now: DateTime<Utc>) -> ResetTokenState {
        if self.used_at.is_some() {
            ResetTokenState::Used
        } else if !self.is_active {
            ResetTokenState::Inactive
        } else if now >= self.expires_at {
            ResetTokenState::Expired
        } else {
            ResetTokenState::Valid
        }
    }
}

/// Input for creating a reset token
#[derive(Debug, Clone)]
pub struct CreateResetToken {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub token_hash: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of consuming a reset token together with the password change
///
/// Only [`ResetCompletion::Completed`] writes anything; the other variants
/// leave the token, the user and the sessions untouched.
#[derive(Debug, Clone)]
pub enum ResetCompletion {
    /// Token consumed, password replaced, sessions and other tokens ended
    Completed {
        token: PasswordResetToken,
        sessions_ended: u64,
    },

    /// Token was not active, unused and unexpired at claim time
    TokenUnavailable,

    /// Token owner no longer exists
    UserMissing,
}

/// Observable state of a reset token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetTokenState {
    /// Active, unused and unexpired
    Valid,

    /// No token with that hash
    NotFound,

    /// Already consumed
    Used,

    /// Superseded by a newer token or deactivated by a reset
    Inactive,

    /// Past its expiry
    Expired,
}

impl ResetTokenState {
    /// Machine-readable reason
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetTokenState::Valid => "valid",
            ResetTokenState::NotFound => "not_found",
            ResetTokenState::Used => "used",
            ResetTokenState::Inactive => "inactive",
            ResetTokenState::Expired => "expired",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ResetTokenState::Valid)
    }
}
