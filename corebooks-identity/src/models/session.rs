/// Session model
///
/// One row per login. The row stores SHA-256 hashes of the current access
/// and refresh tokens, never the tokens themselves. Refresh rotates both
/// hashes in place; logout flips `is_active` and the row is kept for audit.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE user_sessions (
///     id UUID PRIMARY KEY,
///     user_id UUID NOT NULL REFERENCES users(id),
///     tenant_id UUID NOT NULL,
///     session_id VARCHAR(64) NOT NULL UNIQUE,
///     access_token_hash CHAR(64) NOT NULL,
///     refresh_token_hash CHAR(64) NOT NULL,
///     device_info TEXT,
///     ip_address VARCHAR(45),
///     user_agent TEXT,
///     expires_at TIMESTAMPTZ NOT NULL,
///     last_activity_at TIMESTAMPTZ NOT NULL,
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted session record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    /// Row ID
    pub id: Uuid,

    /// Session owner
    pub user_id: Uuid,

    /// Owner's tenant
    pub tenant_id: Uuid,

    /// Opaque session identifier embedded in token claims
    pub session_id: String,

    /// SHA-256 of the current access token
    #[serde(skip_serializing, default)]
    pub access_token_hash: String,

    /// SHA-256 of the current refresh token
    #[serde(skip_serializing, default)]
    pub refresh_token_hash: String,

    /// Client-supplied device description
    pub device_info: Option<String>,

    /// Client IP at login
    pub ip_address: Option<String>,

    /// Client user agent at login
    pub user_agent: Option<String>,

    /// Hard expiry
    pub expires_at: DateTime<Utc>,

    /// Last validation or refresh
    pub last_activity_at: DateTime<Utc>,

    /// Cleared on logout, logout-all and password change/reset
    pub is_active: bool,

    /// When the session was created
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session can authenticate requests at `now`
    ///
    /// Requires all three: active flag set, hard expiry in the future, and
    /// idle time strictly below the inactivity ceiling.
    pub fn is_valid_at(&self, now: DateTime<Utc>, inactivity: Duration) -> bool {
        self.is_active && now < self.expires_at && now - self.last_activity_at < inactivity
    }

    /// Time left before hard expiry, floored at zero
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Input for creating a session
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub session_id: String,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// New token hashes written by a refresh
///
/// Applies only while the stored refresh hash still equals
/// `previous_refresh_hash`, so one refresh token rotates at most once.
#[derive(Debug, Clone)]
pub struct RotateSession {
    pub previous_refresh_hash: String,
    pub access_token_hash: String,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Client metadata captured at login
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
}

/// Session as shown to its owner
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// Whether this is the session making the request
    pub current: bool,
}

impl SessionSummary {
    /// Builds a summary, flagging the caller's own session
    pub fn from_session(session: Session, current_session_id: &str) -> Self {
        Self {
            current: session.session_id == current_session_id,
            session_id: session.session_id,
            device_info: session.device_info,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            expires_at: session.expires_at,
        }
    }
}
