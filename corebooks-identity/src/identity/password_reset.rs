/// Password reset flow
///
/// ```text
/// issued ──> valid ──┬──> used
///                    ├──> expired
///                    └──> inactive (superseded or reset completed)
/// ```
///
/// Terminal states are exclusive and never revert. Requests never reveal
/// whether an account exists: unknown, disabled and throttled users all get
/// the same message.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::delivery::ResetMessage;
use super::{normalize_email, IdentityCore};
use crate::auth::password::hash_password;
use crate::auth::token::{generate_secret, hash_token, mask_email, RESET_TOKEN_LENGTH};
use crate::error::{IdentityError, IdentityResult};
use crate::models::activity_log::{AuditAction, NewActivityLog};
use crate::models::password_reset::{CreateResetToken, ResetCompletion, ResetTokenState};
use crate::models::user::User;
use crate::store::bounded;

/// Message returned for every accepted reset request
pub const RESET_REQUESTED: &str =
    "If an account exists for that email, a password reset link has been sent";

/// Outcome of a reset request
#[derive(Debug, Clone, Serialize)]
pub struct ResetRequestOutcome {
    /// Always [`RESET_REQUESTED`]
    pub message: &'static str,

    /// Set when the user already received the hourly maximum
    pub rate_limited: bool,

    /// Masked destination, when a token was issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_email: Option<String>,

    /// Expiry of the issued token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ResetRequestOutcome {
    fn accepted() -> Self {
        Self {
            message: RESET_REQUESTED,
            rate_limited: false,
            masked_email: None,
            expires_at: None,
        }
    }

    pub fn issued(&self) -> bool {
        self.masked_email.is_some()
    }
}

impl IdentityCore {
    /// Issues a reset token for the account behind `email`, if any
    pub async fn request_password_reset(&self, email: &str) -> IdentityResult<ResetRequestOutcome> {
        let email = normalize_email(email)?;

        let user = bounded(
            self.deadline(),
            "user lookup",
            self.stores.users.find_user_by_email_any_tenant(&email),
        )
        .await?;

        let Some(user) = user.filter(User::can_authenticate) else {
            tracing::info!(email = %mask_email(&email), "Reset requested for unknown or disabled account");
            return Ok(ResetRequestOutcome::accepted());
        };

        let now = Utc::now();
        let token = generate_secret(RESET_TOKEN_LENGTH);
        let expires_at = now + self.config.reset_ttl();

        let issued = bounded(
            self.deadline(),
            "reset token issue",
            self.stores.reset_tokens.issue_reset_token(
                CreateResetToken {
                    user_id: user.id,
                    tenant_id: user.tenant_id,
                    token_hash: hash_token(&token),
                    email: user.email.clone(),
                    expires_at,
                },
                now - chrono::Duration::hours(1),
                u64::from(self.config.reset_max_per_hour),
            ),
        )
        .await?;

        if issued.is_none() {
            tracing::warn!(user_id = %user.id, "Password reset rate limited");
            self.audit.record(
                NewActivityLog::failure(AuditAction::PasswordResetRequest, "user", "rate limited")
                    .with_user(user.id, user.tenant_id)
                    .with_resource(user.id.to_string()),
            );
            return Ok(ResetRequestOutcome {
                rate_limited: true,
                ..ResetRequestOutcome::accepted()
            });
        }

        let message = ResetMessage {
            user_id: user.id,
            tenant_id: user.tenant_id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            token,
            expires_at,
        };
        if let Err(e) = self.delivery.deliver(message).await {
            tracing::error!(user_id = %user.id, error = %e, "Failed to deliver reset token");
        }

        self.audit.record(
            NewActivityLog::success(AuditAction::PasswordResetRequest, "user")
                .with_user(user.id, user.tenant_id)
                .with_resource(user.id.to_string()),
        );

        tracing::info!(user_id = %user.id, "Password reset token issued");

        Ok(ResetRequestOutcome {
            masked_email: Some(mask_email(&user.email)),
            expires_at: Some(expires_at),
            ..ResetRequestOutcome::accepted()
        })
    }

    /// Reports whether a raw reset token is usable, without consuming it
    pub async fn validate_reset_token(&self, token: &str) -> IdentityResult<ResetTokenState> {
        if token.is_empty() {
            return Err(IdentityError::validation("token", "Token is required"));
        }

        let record = bounded(
            self.deadline(),
            "reset token lookup",
            self.stores.reset_tokens.find_reset_token(&hash_token(token)),
        )
        .await?;

        Ok(record.map_or(ResetTokenState::NotFound, |t| t.state_at(Utc::now())))
    }

    /// Consumes a reset token and sets a new password
    ///
    /// Every session of the user ends and every other outstanding reset
    /// token is deactivated, in the same store operation that consumes the
    /// token. A failed write leaves the token usable.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> IdentityResult<()> {
        if token.is_empty() {
            return Err(IdentityError::validation("token", "Token is required"));
        }
        self.config
            .password_policy
            .validate(new_password)
            .map_err(|msg| IdentityError::validation("new_password", msg))?;

        let state = self.validate_reset_token(token).await?;
        if !state.is_valid() {
            return Err(IdentityError::InvalidResetToken(state));
        }

        let password_hash = hash_password(new_password, &self.config.hashing)?;

        let completion = bounded(
            self.deadline(),
            "password reset",
            self.stores.reset_tokens.complete_password_reset(
                &hash_token(token),
                &password_hash,
                Utc::now(),
            ),
        )
        .await?;

        let (claimed, sessions_ended) = match completion {
            ResetCompletion::Completed {
                token: claimed,
                sessions_ended,
            } => (claimed, sessions_ended),
            ResetCompletion::TokenUnavailable => {
                let state = match self.validate_reset_token(token).await? {
                    ResetTokenState::Valid => ResetTokenState::Used,
                    other => other,
                };
                tracing::info!(reason = state.as_str(), "Reset token lost claim");
                return Err(IdentityError::InvalidResetToken(state));
            }
            ResetCompletion::UserMissing => {
                return Err(IdentityError::NotFound("User not found".to_string()));
            }
        };

        self.audit.record(
            NewActivityLog::success(AuditAction::PasswordReset, "user")
                .with_user(claimed.user_id, claimed.tenant_id)
                .with_resource(claimed.user_id.to_string())
                .with_changes(None, Some(serde_json::json!({ "sessions_ended": sessions_ended }))),
        );

        tracing::info!(user_id = %claimed.user_id, sessions_ended, "Password reset completed");

        Ok(())
    }
}
