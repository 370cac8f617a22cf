/// Activity log model
///
/// Append-only audit trail of identity actions. Entries are written through
/// the [`crate::audit::AuditLogger`] queue and are best-effort.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE activity_logs (
///     id UUID PRIMARY KEY,
///     user_id UUID,
///     tenant_id UUID,
///     action VARCHAR(64) NOT NULL,
///     resource_type VARCHAR(64) NOT NULL,
///     resource_id VARCHAR(128),
///     success BOOLEAN NOT NULL,
///     error_message TEXT,
///     session_id VARCHAR(64),
///     ip_address VARCHAR(45),
///     user_agent TEXT,
///     old_values JSONB,
///     new_values JSONB,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored activity log entry
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Actions recorded in the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Register,
    Login,
    Logout,
    LogoutAll,
    RefreshToken,
    UpdateProfile,
    ChangePassword,
    PasswordResetRequest,
    PasswordReset,
    DeactivateUser,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Register => "register",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::LogoutAll => "logout_all",
            AuditAction::RefreshToken => "refresh_token",
            AuditAction::UpdateProfile => "update_profile",
            AuditAction::ChangePassword => "change_password",
            AuditAction::PasswordResetRequest => "password_reset_request",
            AuditAction::PasswordReset => "password_reset",
            AuditAction::DeactivateUser => "deactivate_user",
        }
    }
}

/// Entry waiting to be written
///
/// Built with [`NewActivityLog::success`] or [`NewActivityLog::failure`] and
/// refined with the `with_*` setters.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivityLog {
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
}

impl NewActivityLog {
    fn new(action: AuditAction, resource_type: &str, success: bool) -> Self {
        Self {
            user_id: None,
            tenant_id: None,
            action: action.as_str().to_string(),
            resource_type: resource_type.to_string(),
            resource_id: None,
            success,
            error_message: None,
            session_id: None,
            ip_address: None,
            user_agent: None,
            old_values: None,
            new_values: None,
        }
    }

    /// Entry for a successful action
    pub fn success(action: AuditAction, resource_type: &str) -> Self {
        Self::new(action, resource_type, true)
    }

    /// Entry for a failed action
    pub fn failure(action: AuditAction, resource_type: &str, error: impl Into<String>) -> Self {
        let mut entry = Self::new(action, resource_type, false);
        entry.error_message = Some(error.into());
        entry
    }

    pub fn with_user(mut self, user_id: Uuid, tenant_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn with_changes(
        mut self,
        old_values: Option<serde_json::Value>,
        new_values: Option<serde_json::Value>,
    ) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }
}
