/// PostgreSQL credential store
///
/// Implements every store trait on top of one `PgPool`. Conditional updates
/// are single `UPDATE ... WHERE ... RETURNING` statements. The two
/// multi-record reset operations run in one transaction each; issuing locks
/// the user row first so concurrent requests for one user, from any API
/// instance, are counted one after another.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use corebooks_identity::db::pool::{create_pool, DatabaseConfig};
/// use corebooks_identity::store::{IdentityStores, PgStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// let stores = IdentityStores::shared(Arc::new(PgStore::new(pool)));
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ActivityLogStore, ResetTokenStore, SessionStore, StoreError, UserStore};
use crate::models::activity_log::NewActivityLog;
use crate::models::password_reset::{CreateResetToken, PasswordResetToken, ResetCompletion};
use crate::models::session::{CreateSession, RotateSession, Session};
use crate::models::user::{CreateUser, UpdateProfile, User};

const USER_COLUMNS: &str = "id, tenant_id, email, password_hash, display_name, phone, role, \
     is_active, last_login_at, deleted_at, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, user_id, tenant_id, session_id, access_token_hash, \
     refresh_token_hash, device_info, ip_address, user_agent, expires_at, last_activity_at, \
     is_active, created_at";

const RESET_COLUMNS: &str =
    "id, user_id, tenant_id, token_hash, email, expires_at, used_at, is_active, created_at";

/// Store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_unique(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(what.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, data: CreateUser) -> Result<User, StoreError> {
        let query = format!(
            "INSERT INTO users (id, tenant_id, email, password_hash, display_name, phone, role) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(data.tenant_id)
            .bind(&data.email)
            .bind(&data.password_hash)
            .bind(&data.display_name)
            .bind(&data.phone)
            .bind(data.role)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique(e, "user email already registered in tenant"))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE tenant_id = $1 AND email = $2 AND deleted_at IS NULL"
        );

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(tenant_id)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email_any_tenant(
        &self,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE email = $1 AND deleted_at IS NULL \
             ORDER BY created_at ASC LIMIT 1"
        );

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self, tenant_id: Uuid) -> Result<Vec<User>, StoreError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE tenant_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at ASC"
        );

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: UpdateProfile,
    ) -> Result<Option<User>, StoreError> {
        let query = format!(
            "UPDATE users SET \
                 display_name = COALESCE($2, display_name), \
                 phone = COALESCE($3, phone), \
                 updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {USER_COLUMNS}"
        );

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(update.display_name)
            .bind(update.phone)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = $2, is_active = FALSE, updated_at = $2 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, data: CreateSession) -> Result<Session, StoreError> {
        let query = format!(
            "INSERT INTO user_sessions \
                 (id, user_id, tenant_id, session_id, access_token_hash, refresh_token_hash, \
                  device_info, ip_address, user_agent, expires_at, last_activity_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW()) \
             RETURNING {SESSION_COLUMNS}"
        );

        sqlx::query_as::<_, Session>(&query)
            .bind(Uuid::new_v4())
            .bind(data.user_id)
            .bind(data.tenant_id)
            .bind(&data.session_id)
            .bind(&data.access_token_hash)
            .bind(&data.refresh_token_hash)
            .bind(&data.device_info)
            .bind(&data.ip_address)
            .bind(&data.user_agent)
            .bind(data.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique(e, "session identifier collision"))
    }

    async fn find_session_by_access_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE access_token_hash = $1");

        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_session_by_refresh_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        let query =
            format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE refresh_token_hash = $1");

        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM user_sessions WHERE session_id = $1");

        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn rotate_session(
        &self,
        session_id: &str,
        rotation: RotateSession,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let query = format!(
            "UPDATE user_sessions SET \
                 access_token_hash = $2, \
                 refresh_token_hash = $3, \
                 expires_at = $4, \
                 last_activity_at = $5 \
             WHERE session_id = $1 AND is_active = TRUE AND refresh_token_hash = $6 \
             RETURNING {SESSION_COLUMNS}"
        );

        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(session_id)
            .bind(&rotation.access_token_hash)
            .bind(&rotation.refresh_token_hash)
            .bind(rotation.expires_at)
            .bind(now)
            .bind(&rotation.previous_refresh_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE user_sessions SET last_activity_at = $2 \
             WHERE session_id = $1 AND is_active = TRUE",
        )
        .bind(session_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn deactivate_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let query = format!(
            "UPDATE user_sessions SET is_active = FALSE \
             WHERE session_id = $1 \
             RETURNING {SESSION_COLUMNS}"
        );

        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn deactivate_user_sessions(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = FALSE \
             WHERE user_id = $1 AND is_active = TRUE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions \
             WHERE user_id = $1 AND is_active = TRUE \
             ORDER BY created_at DESC"
        );

        Ok(sqlx::query_as::<_, Session>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl ResetTokenStore for PgStore {
    async fn issue_reset_token(
        &self,
        data: CreateResetToken,
        window_start: DateTime<Utc>,
        max_in_window: u64,
    ) -> Result<Option<PasswordResetToken>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(data.user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let issued: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM password_reset_tokens \
             WHERE user_id = $1 AND created_at > $2",
        )
        .bind(data.user_id)
        .bind(window_start)
        .fetch_one(&mut *tx)
        .await?;
        if issued.max(0) as u64 >= max_in_window {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            "UPDATE password_reset_tokens SET is_active = FALSE \
             WHERE user_id = $1 AND is_active = TRUE",
        )
        .bind(data.user_id)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO password_reset_tokens \
                 (id, user_id, tenant_id, token_hash, email, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {RESET_COLUMNS}"
        );
        let token = sqlx::query_as::<_, PasswordResetToken>(&query)
            .bind(Uuid::new_v4())
            .bind(data.user_id)
            .bind(data.tenant_id)
            .bind(&data.token_hash)
            .bind(&data.email)
            .bind(data.expires_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_unique(e, "reset token collision"))?;

        tx.commit().await?;

        Ok(Some(token))
    }

    async fn find_reset_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, StoreError> {
        let query =
            format!("SELECT {RESET_COLUMNS} FROM password_reset_tokens WHERE token_hash = $1");

        Ok(sqlx::query_as::<_, PasswordResetToken>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<ResetCompletion, StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE password_reset_tokens SET used_at = $2, is_active = FALSE \
             WHERE token_hash = $1 AND is_active = TRUE AND used_at IS NULL AND expires_at > $2 \
             RETURNING {RESET_COLUMNS}"
        );
        let Some(token) = sqlx::query_as::<_, PasswordResetToken>(&query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(ResetCompletion::TokenUnavailable);
        };

        let updated = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(token.user_id)
        .bind(password_hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ResetCompletion::UserMissing);
        }

        let sessions = sqlx::query(
            "UPDATE user_sessions SET is_active = FALSE \
             WHERE user_id = $1 AND is_active = TRUE",
        )
        .bind(token.user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE password_reset_tokens SET is_active = FALSE \
             WHERE user_id = $1 AND is_active = TRUE",
        )
        .bind(token.user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ResetCompletion::Completed {
            token,
            sessions_ended: sessions.rows_affected(),
        })
    }
}

#[async_trait]
impl ActivityLogStore for PgStore {
    async fn insert_activity_log(&self, entry: NewActivityLog) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO activity_logs \
                 (id, user_id, tenant_id, action, resource_type, resource_id, success, \
                  error_message, session_id, ip_address, user_agent, old_values, new_values) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.tenant_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.success)
        .bind(&entry.error_message)
        .bind(&entry.session_id)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.old_values)
        .bind(&entry.new_values)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
