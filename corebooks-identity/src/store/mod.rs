/// Credential store
///
/// Durable records for users, sessions, reset tokens and activity logs,
/// behind `async_trait` interfaces so the services can run against
/// PostgreSQL in production and the in-memory store in tests.
///
/// # Atomicity
///
/// Every method is a single atomic operation on the backing store. The
/// conditional and multi-record methods ([`SessionStore::rotate_session`],
/// [`ResetTokenStore::issue_reset_token`] and
/// [`ResetTokenStore::complete_password_reset`]) are what the services rely
/// on to resolve races without in-process locks, including between API
/// instances sharing one database.
///
/// # Deadlines
///
/// Callers wrap each call in [`bounded`], which converts an expired deadline
/// into [`IdentityError::Timeout`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{IdentityError, IdentityResult};
use crate::models::activity_log::NewActivityLog;
use crate::models::password_reset::{CreateResetToken, PasswordResetToken, ResetCompletion};
use crate::models::session::{CreateSession, RotateSession, Session};
use crate::models::user::{CreateUser, UpdateProfile, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Credential store error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique constraint violated
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Backend unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// User persistence
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user
    ///
    /// Fails with [`StoreError::Duplicate`] when a non-deleted user with the
    /// same email exists in the tenant.
    async fn create_user(&self, data: CreateUser) -> Result<User, StoreError>;

    /// Finds a user by ID, including soft-deleted ones
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Finds a non-deleted user by email within one tenant
    async fn find_user_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Finds the earliest-created non-deleted user with this email in any tenant
    async fn find_user_by_email_any_tenant(&self, email: &str)
        -> Result<Option<User>, StoreError>;

    /// Lists non-deleted users of a tenant, oldest first
    async fn list_users(&self, tenant_id: Uuid) -> Result<Vec<User>, StoreError>;

    /// Applies a profile update to a non-deleted user
    async fn update_profile(
        &self,
        id: Uuid,
        update: UpdateProfile,
    ) -> Result<Option<User>, StoreError>;

    /// Replaces the password hash; returns whether a row changed
    async fn update_password_hash(&self, id: Uuid, password_hash: &str)
        -> Result<bool, StoreError>;

    /// Records a successful login
    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Soft-deletes and deactivates a user; returns whether a row changed
    async fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}

/// Session persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a session
    async fn create_session(&self, data: CreateSession) -> Result<Session, StoreError>;

    /// Looks up a session by the hash of its current access token
    async fn find_session_by_access_hash(&self, hash: &str)
        -> Result<Option<Session>, StoreError>;

    /// Looks up a session by the hash of its current refresh token
    async fn find_session_by_refresh_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Session>, StoreError>;

    /// Looks up a session by its opaque identifier
    async fn find_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Replaces token hashes and extends expiry, only while the session is
    /// active and still holds `rotation.previous_refresh_hash`
    ///
    /// Returns `None` when the session is missing, inactive or was already
    /// rotated away from that refresh token. Never reactivates a session.
    async fn rotate_session(
        &self,
        session_id: &str,
        rotation: RotateSession,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    /// Updates `last_activity_at`
    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Deactivates one session and returns it as stored after the update
    async fn deactivate_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Deactivates every active session of a user in one operation
    async fn deactivate_user_sessions(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Lists sessions of a user that still have the active flag set
    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError>;
}

/// Password reset token persistence
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Issues a reset token under the hourly limit
    ///
    /// In one atomic step: counts the user's tokens created after
    /// `window_start` (any state), and if fewer than `max_in_window`,
    /// deactivates the user's active tokens and inserts the new one. Returns
    /// `None` when the limit is reached. Concurrent calls for one user are
    /// serialized, so at most one token is ever active.
    async fn issue_reset_token(
        &self,
        data: CreateResetToken,
        window_start: DateTime<Utc>,
        max_in_window: u64,
    ) -> Result<Option<PasswordResetToken>, StoreError>;

    /// Looks up a token by hash regardless of state
    async fn find_reset_token(&self, token_hash: &str)
        -> Result<Option<PasswordResetToken>, StoreError>;

    /// Consumes a token and applies the password change, all or nothing
    ///
    /// Claims the token only if it is still active, unused and unexpired,
    /// replaces the owner's password hash, deactivates every session and
    /// every other active reset token of the owner. Exactly one concurrent
    /// caller completes; on any error nothing is written.
    async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<ResetCompletion, StoreError>;
}

/// Activity log persistence
#[async_trait]
pub trait ActivityLogStore: Send + Sync {
    /// Appends one entry
    async fn insert_activity_log(&self, entry: NewActivityLog) -> Result<(), StoreError>;
}

/// Bundle of store handles passed to the services
#[derive(Clone)]
pub struct IdentityStores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub reset_tokens: Arc<dyn ResetTokenStore>,
    pub activity: Arc<dyn ActivityLogStore>,
}

impl IdentityStores {
    /// Uses one backend for every record type
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: UserStore + SessionStore + ResetTokenStore + ActivityLogStore + 'static,
    {
        Self {
            users: store.clone(),
            sessions: store.clone(),
            reset_tokens: store.clone(),
            activity: store,
        }
    }
}

impl std::fmt::Debug for IdentityStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStores").finish_non_exhaustive()
    }
}

/// Runs a store or cache call under a deadline
///
/// An expired deadline becomes [`IdentityError::Timeout`] naming `operation`;
/// the caller treats it as a failure, never as an absent record.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use corebooks_identity::error::IdentityError;
/// use corebooks_identity::store::{bounded, StoreError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let value = bounded(Duration::from_secs(1), "lookup", async { Ok::<_, StoreError>(7) }).await;
/// assert_eq!(value.unwrap(), 7);
///
/// let slow = bounded(Duration::from_millis(1), "lookup", async {
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     Ok::<_, StoreError>(7)
/// })
/// .await;
/// assert!(matches!(slow, Err(IdentityError::Timeout("lookup"))));
/// # }
/// ```
pub async fn bounded<T, E, F>(deadline: Duration, operation: &'static str, fut: F) -> IdentityResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<IdentityError>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!(operation, deadline_ms = deadline.as_millis() as u64, "Store call timed out");
            Err(IdentityError::Timeout(operation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_passes_result_through() {
        let ok = bounded(Duration::from_secs(1), "op", async { Ok::<_, StoreError>("v") }).await;
        assert_eq!(ok.unwrap(), "v");

        let err = bounded(Duration::from_secs(1), "op", async {
            Err::<(), _>(StoreError::Unavailable("down".into()))
        })
        .await;
        assert!(matches!(err, Err(IdentityError::Store(StoreError::Unavailable(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result = bounded(Duration::from_millis(100), "slow op", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(())
        })
        .await;

        assert!(matches!(result, Err(IdentityError::Timeout("slow op"))));
    }
}
