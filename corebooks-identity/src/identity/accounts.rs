/// Registration and account management
///
/// Registration creates the user and its first session as one logical step:
/// if the session cannot be created, the new user row is soft-deleted again
/// so the email stays available.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{first_violation, normalize_email, Authenticated, IdentityCore};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::token::mask_email;
use crate::error::{IdentityError, IdentityResult};
use crate::models::activity_log::{AuditAction, NewActivityLog};
use crate::models::session::ClientInfo;
use crate::models::user::{CreateUser, Role, UpdateProfile, User};
use crate::store::{bounded, StoreError};

/// Registration input
///
/// `tenant_id` may be left empty here and supplied by the caller's tenant
/// context; it must be present by the time [`IdentityCore::register`] runs.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    pub email: String,

    pub password: String,

    #[validate(length(min = 1, max = 255, message = "Display name must be 1-255 characters"))]
    pub display_name: String,

    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    pub phone: Option<String>,

    /// One of `super_admin`, `tenant_admin`, `staff`, `viewer`
    ///
    /// Taken as given, so a caller can self-assign `super_admin` and with it
    /// cross-tenant access.
    pub role: Option<String>,

    pub tenant_id: Option<Uuid>,
}

/// Profile update input
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 255, message = "Display name must be 1-255 characters"))]
    pub display_name: Option<String>,

    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    pub phone: Option<String>,
}

impl IdentityCore {
    /// Creates a user and opens its first session
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed input, before any store access
    /// - `Conflict` if a live user with that email exists in the tenant
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: ClientInfo,
    ) -> IdentityResult<Authenticated> {
        let email = normalize_email(&request.email)?;
        self.config
            .password_policy
            .validate(&request.password)
            .map_err(|msg| IdentityError::validation("password", msg))?;
        request.validate().map_err(first_violation)?;

        let role = match request.role.as_deref() {
            Some(raw) => raw
                .parse::<Role>()
                .map_err(|msg| IdentityError::validation("role", msg))?,
            None => Role::default(),
        };
        let tenant_id = request
            .tenant_id
            .ok_or_else(|| IdentityError::validation("tenant_id", "Tenant ID is required"))?;

        let result = self
            .register_inner(tenant_id, email.clone(), role, request, &client)
            .await;

        let entry = match &result {
            Ok(auth) => NewActivityLog::success(AuditAction::Register, "user")
                .with_user(auth.user.id, auth.user.tenant_id)
                .with_resource(auth.user.id.to_string())
                .with_session(auth.tokens.session_id.clone()),
            Err(e) => NewActivityLog::failure(AuditAction::Register, "user", e.to_string())
                .with_tenant(tenant_id)
                .with_resource(mask_email(&email)),
        };
        self.audit
            .record(entry.with_client(client.ip_address.clone(), client.user_agent.clone()));

        result
    }

    async fn register_inner(
        &self,
        tenant_id: Uuid,
        email: String,
        role: Role,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> IdentityResult<Authenticated> {
        let existing = bounded(
            self.deadline(),
            "user lookup",
            self.stores.users.find_user_by_email(tenant_id, &email),
        )
        .await?;
        if existing.is_some() {
            return Err(IdentityError::Conflict("Email already registered".to_string()));
        }

        let password_hash = hash_password(&request.password, &self.config.hashing)?;

        let user = bounded(
            self.deadline(),
            "user insert",
            self.stores.users.create_user(CreateUser {
                tenant_id,
                email,
                password_hash,
                display_name: request.display_name.trim().to_string(),
                phone: request.phone,
                role,
            }),
        )
        .await
        .map_err(|e| match e {
            IdentityError::Store(StoreError::Duplicate(_)) => {
                IdentityError::Conflict("Email already registered".to_string())
            }
            other => other,
        })?;

        let tokens = match self.create_session(&user, client).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Session creation failed, rolling back registration");
                let rollback = bounded(
                    self.deadline(),
                    "user rollback",
                    self.stores.users.soft_delete_user(user.id, Utc::now()),
                )
                .await;
                if let Err(rollback_err) = rollback {
                    tracing::error!(user_id = %user.id, error = %rollback_err, "Registration rollback failed");
                }
                return Err(e);
            }
        };

        tracing::info!(
            user_id = %user.id,
            tenant_id = %user.tenant_id,
            role = %user.role,
            "User registered"
        );

        Ok(Authenticated { user, tokens })
    }

    /// Returns a live user
    pub async fn get_profile(&self, user_id: Uuid) -> IdentityResult<User> {
        bounded(
            self.deadline(),
            "user lookup",
            self.stores.users.find_user_by_id(user_id),
        )
        .await?
        .filter(|u| u.deleted_at.is_none())
        .ok_or_else(|| IdentityError::NotFound("User not found".to_string()))
    }

    /// Changes display name and/or phone
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> IdentityResult<User> {
        request.validate().map_err(first_violation)?;

        let update = UpdateProfile {
            display_name: request.display_name.map(|n| n.trim().to_string()),
            phone: request.phone,
        };
        if update.is_empty() {
            return Err(IdentityError::validation("request", "No fields to update"));
        }

        let before = self.get_profile(user_id).await?;

        let after = bounded(
            self.deadline(),
            "profile update",
            self.stores.users.update_profile(user_id, update),
        )
        .await?
        .ok_or_else(|| IdentityError::NotFound("User not found".to_string()))?;

        self.audit.record(
            NewActivityLog::success(AuditAction::UpdateProfile, "user")
                .with_user(after.id, after.tenant_id)
                .with_resource(after.id.to_string())
                .with_changes(
                    Some(serde_json::json!({
                        "display_name": before.display_name,
                        "phone": before.phone,
                    })),
                    Some(serde_json::json!({
                        "display_name": after.display_name,
                        "phone": after.phone,
                    })),
                ),
        );

        Ok(after)
    }

    /// Replaces the password after verifying the current one
    ///
    /// Every session of the user ends, including the caller's.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> IdentityResult<()> {
        if current_password.is_empty() {
            return Err(IdentityError::validation(
                "current_password",
                "Current password is required",
            ));
        }
        self.config
            .password_policy
            .validate(new_password)
            .map_err(|msg| IdentityError::validation("new_password", msg))?;

        let user = self.get_profile(user_id).await?;

        if !verify_password(current_password, &user.password_hash)? {
            self.audit.record(
                NewActivityLog::failure(
                    AuditAction::ChangePassword,
                    "user",
                    "current password mismatch",
                )
                .with_user(user.id, user.tenant_id)
                .with_resource(user.id.to_string()),
            );
            return Err(IdentityError::Auth("Current password is incorrect".to_string()));
        }
        if verify_password(new_password, &user.password_hash)? {
            return Err(IdentityError::validation(
                "new_password",
                "New password must differ from the current password",
            ));
        }

        let password_hash = hash_password(new_password, &self.config.hashing)?;
        let updated = bounded(
            self.deadline(),
            "password update",
            self.stores.users.update_password_hash(user.id, &password_hash),
        )
        .await?;
        if !updated {
            return Err(IdentityError::NotFound("User not found".to_string()));
        }

        let sessions_ended = self.logout_all(user.id).await?;

        self.audit.record(
            NewActivityLog::success(AuditAction::ChangePassword, "user")
                .with_user(user.id, user.tenant_id)
                .with_resource(user.id.to_string()),
        );

        tracing::info!(user_id = %user.id, sessions_ended, "Password changed");

        Ok(())
    }

    /// Lists the live users of a tenant
    pub async fn list_users(&self, tenant_id: Uuid) -> IdentityResult<Vec<User>> {
        bounded(
            self.deadline(),
            "user list",
            self.stores.users.list_users(tenant_id),
        )
        .await
    }

    /// Soft-deletes a user of `tenant_id` and ends all of its sessions
    ///
    /// A user outside the tenant is reported as not found.
    pub async fn deactivate_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        actor_id: Uuid,
    ) -> IdentityResult<()> {
        if user_id == actor_id {
            return Err(IdentityError::Forbidden(
                "Cannot deactivate your own account".to_string(),
            ));
        }

        let user = self.get_profile(user_id).await?;
        if user.tenant_id != tenant_id {
            return Err(IdentityError::NotFound("User not found".to_string()));
        }

        let deleted = bounded(
            self.deadline(),
            "user deactivation",
            self.stores.users.soft_delete_user(user.id, Utc::now()),
        )
        .await?;
        if !deleted {
            return Err(IdentityError::NotFound("User not found".to_string()));
        }

        let sessions_ended = self.logout_all(user.id).await?;

        self.audit.record(
            NewActivityLog::success(AuditAction::DeactivateUser, "user")
                .with_user(actor_id, tenant_id)
                .with_resource(user.id.to_string())
                .with_changes(
                    Some(serde_json::json!({ "is_active": true })),
                    Some(serde_json::json!({ "is_active": false, "sessions_ended": sessions_ended })),
                ),
        );

        tracing::info!(
            user_id = %user.id,
            tenant_id = %tenant_id,
            actor_id = %actor_id,
            "User deactivated"
        );

        Ok(())
    }
}
