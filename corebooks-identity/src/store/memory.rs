/// In-memory credential store
///
/// Implements every store trait over hash maps guarded by one async mutex.
/// Each method takes the lock once, so conditional updates are atomic the
/// same way the SQL statements are.
///
/// Intended for tests and local development. Two knobs let tests simulate a
/// sick backend:
///
/// - [`MemoryStore::set_latency`] delays every call
/// - [`MemoryStore::fail_session_inserts`] makes `create_session` fail
/// - [`MemoryStore::fail_password_updates`] makes every password write fail
///   before anything is changed

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ActivityLogStore, ResetTokenStore, SessionStore, StoreError, UserStore};
use crate::models::activity_log::{ActivityLog, NewActivityLog};
use crate::models::password_reset::{CreateResetToken, PasswordResetToken, ResetCompletion};
use crate::models::session::{CreateSession, RotateSession, Session};
use crate::models::user::{CreateUser, UpdateProfile, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, Session>,
    reset_tokens: HashMap<String, PasswordResetToken>,
    activity: Vec<ActivityLog>,
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    latency_ms: AtomicU64,
    fail_session_inserts: AtomicBool,
    fail_password_updates: AtomicBool,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("latency_ms", &self.latency_ms.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every subsequent call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes `create_session` fail while `fail` is set
    pub fn fail_session_inserts(&self, fail: bool) {
        self.fail_session_inserts.store(fail, Ordering::SeqCst);
    }

    /// Makes `update_password_hash` and `complete_password_reset` fail
    /// while `fail` is set
    pub fn fail_password_updates(&self, fail: bool) {
        self.fail_password_updates.store(fail, Ordering::SeqCst);
    }

    fn password_write_check(&self) -> Result<(), StoreError> {
        if self.fail_password_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("password update rejected".to_string()));
        }
        Ok(())
    }

    /// Snapshot of every activity log entry written so far
    pub async fn activity_logs(&self) -> Vec<ActivityLog> {
        self.tables.lock().await.activity.clone()
    }

    /// Snapshot of every session of a user, active or not
    pub async fn sessions_of(&self, user_id: Uuid) -> Vec<Session> {
        self.tables
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Snapshot of every reset token of a user, in any state
    pub async fn reset_tokens_of(&self, user_id: Uuid) -> Vec<PasswordResetToken> {
        self.tables
            .lock()
            .await
            .reset_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Rewrites a session in place
    ///
    /// Lets tests move `expires_at` or `last_activity_at` without waiting.
    pub async fn edit_session<F>(&self, session_id: &str, edit: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        match self.tables.lock().await.sessions.get_mut(session_id) {
            Some(session) => {
                edit(session);
                true
            }
            None => false,
        }
    }

    /// Rewrites every reset token of a user in place
    pub async fn edit_reset_tokens<F>(&self, user_id: Uuid, mut edit: F)
    where
        F: FnMut(&mut PasswordResetToken),
    {
        let mut tables = self.tables.lock().await;
        for token in tables.reset_tokens.values_mut().filter(|t| t.user_id == user_id) {
            edit(token);
        }
    }

    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, data: CreateUser) -> Result<User, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock().await;

        let taken = tables.users.values().any(|u| {
            u.tenant_id == data.tenant_id && u.email == data.email && u.deleted_at.is_none()
        });
        if taken {
            return Err(StoreError::Duplicate(
                "user email already registered in tenant".to_string(),
            ));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            tenant_id: data.tenant_id,
            email: data.email,
            password_hash: data.password_hash,
            display_name: data.display_name,
            phone: data.phone,
            role: data.role,
            is_active: true,
            last_login_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.delay().await;
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        self.delay().await;
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.tenant_id == tenant_id && u.email == email && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_user_by_email_any_tenant(
        &self,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        self.delay().await;
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .filter(|u| u.email == email && u.deleted_at.is_none())
            .min_by_key(|u| u.created_at)
            .cloned())
    }

    async fn list_users(&self, tenant_id: Uuid) -> Result<Vec<User>, StoreError> {
        self.delay().await;
        let mut users: Vec<User> = self
            .tables
            .lock()
            .await
            .users
            .values()
            .filter(|u| u.tenant_id == tenant_id && u.deleted_at.is_none())
            .cloned()
            .collect();
        users.sort_by_key(|u| u.created_at);

        Ok(users)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: UpdateProfile,
    ) -> Result<Option<User>, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock().await;

        let Some(user) = tables.users.get_mut(&id).filter(|u| u.deleted_at.is_none()) else {
            return Ok(None);
        };
        if let Some(display_name) = update.display_name {
            user.display_name = display_name;
        }
        if let Some(phone) = update.phone {
            user.phone = Some(phone);
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        self.delay().await;
        self.password_write_check()?;
        let mut tables = self.tables.lock().await;

        match tables.users.get_mut(&id).filter(|u| u.deleted_at.is_none()) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.delay().await;
        if let Some(user) = self.tables.lock().await.users.get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock().await;

        match tables.users.get_mut(&id).filter(|u| u.deleted_at.is_none()) {
            Some(user) => {
                user.deleted_at = Some(at);
                user.is_active = false;
                user.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, data: CreateSession) -> Result<Session, StoreError> {
        self.delay().await;
        if self.fail_session_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("session insert rejected".to_string()));
        }

        let mut tables = self.tables.lock().await;
        if tables.sessions.contains_key(&data.session_id) {
            return Err(StoreError::Duplicate("session identifier collision".to_string()));
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            tenant_id: data.tenant_id,
            session_id: data.session_id,
            access_token_hash: data.access_token_hash,
            refresh_token_hash: data.refresh_token_hash,
            device_info: data.device_info,
            ip_address: data.ip_address,
            user_agent: data.user_agent,
            expires_at: data.expires_at,
            last_activity_at: now,
            is_active: true,
            created_at: now,
        };
        tables
            .sessions
            .insert(session.session_id.clone(), session.clone());

        Ok(session)
    }

    async fn find_session_by_access_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        self.delay().await;
        Ok(self
            .tables
            .lock()
            .await
            .sessions
            .values()
            .find(|s| s.access_token_hash == hash)
            .cloned())
    }

    async fn find_session_by_refresh_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        self.delay().await;
        Ok(self
            .tables
            .lock()
            .await
            .sessions
            .values()
            .find(|s| s.refresh_token_hash == hash)
            .cloned())
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.delay().await;
        Ok(self.tables.lock().await.sessions.get(session_id).cloned())
    }

    async fn rotate_session(
        &self,
        session_id: &str,
        rotation: RotateSession,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock().await;

        let Some(session) = tables
            .sessions
            .get_mut(session_id)
            .filter(|s| s.is_active && s.refresh_token_hash == rotation.previous_refresh_hash)
        else {
            return Ok(None);
        };
        session.access_token_hash = rotation.access_token_hash;
        session.refresh_token_hash = rotation.refresh_token_hash;
        session.expires_at = rotation.expires_at;
        session.last_activity_at = now;

        Ok(Some(session.clone()))
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.delay().await;
        if let Some(session) = self
            .tables
            .lock()
            .await
            .sessions
            .get_mut(session_id)
            .filter(|s| s.is_active)
        {
            session.last_activity_at = now;
        }
        Ok(())
    }

    async fn deactivate_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock().await;

        Ok(tables.sessions.get_mut(session_id).map(|session| {
            session.is_active = false;
            session.clone()
        }))
    }

    async fn deactivate_user_sessions(&self, user_id: Uuid) -> Result<u64, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock().await;

        let mut count = 0;
        for session in tables
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.is_active)
        {
            session.is_active = false;
            count += 1;
        }

        Ok(count)
    }

    async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError> {
        self.delay().await;
        let mut sessions: Vec<Session> = self
            .tables
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(sessions)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn issue_reset_token(
        &self,
        data: CreateResetToken,
        window_start: DateTime<Utc>,
        max_in_window: u64,
    ) -> Result<Option<PasswordResetToken>, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock().await;

        let issued = tables
            .reset_tokens
            .values()
            .filter(|t| t.user_id == data.user_id && t.created_at > window_start)
            .count() as u64;
        if issued >= max_in_window {
            return Ok(None);
        }
        if tables.reset_tokens.contains_key(&data.token_hash) {
            return Err(StoreError::Duplicate("reset token collision".to_string()));
        }

        for token in tables
            .reset_tokens
            .values_mut()
            .filter(|t| t.user_id == data.user_id && t.is_active)
        {
            token.is_active = false;
        }

        let token = PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            tenant_id: data.tenant_id,
            token_hash: data.token_hash,
            email: data.email,
            expires_at: data.expires_at,
            used_at: None,
            is_active: true,
            created_at: Utc::now(),
        };
        tables
            .reset_tokens
            .insert(token.token_hash.clone(), token.clone());

        Ok(Some(token))
    }

    async fn find_reset_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, StoreError> {
        self.delay().await;
        Ok(self.tables.lock().await.reset_tokens.get(token_hash).cloned())
    }

    async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<ResetCompletion, StoreError> {
        self.delay().await;
        let mut tables = self.tables.lock().await;

        // Every check runs before the first write
        let Some(user_id) = tables
            .reset_tokens
            .get(token_hash)
            .filter(|t| t.is_active && t.used_at.is_none() && now < t.expires_at)
            .map(|t| t.user_id)
        else {
            return Ok(ResetCompletion::TokenUnavailable);
        };
        if !tables
            .users
            .get(&user_id)
            .is_some_and(|u| u.deleted_at.is_none())
        {
            return Ok(ResetCompletion::UserMissing);
        }
        self.password_write_check()?;

        if let Some(user) = tables.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = now;
        }

        let mut sessions_ended = 0;
        for session in tables
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.is_active)
        {
            session.is_active = false;
            sessions_ended += 1;
        }

        for token in tables
            .reset_tokens
            .values_mut()
            .filter(|t| t.user_id == user_id && t.is_active)
        {
            token.is_active = false;
            if token.token_hash == token_hash {
                token.used_at = Some(now);
            }
        }

        let token = tables
            .reset_tokens
            .get(token_hash)
            .cloned()
            .ok_or_else(|| StoreError::Unavailable("reset token vanished".to_string()))?;

        Ok(ResetCompletion::Completed {
            token,
            sessions_ended,
        })
    }
}

#[async_trait]
impl ActivityLogStore for MemoryStore {
    async fn insert_activity_log(&self, entry: NewActivityLog) -> Result<(), StoreError> {
        self.delay().await;
        self.tables.lock().await.activity.push(ActivityLog {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            tenant_id: entry.tenant_id,
            action: entry.action,
            resource_type: entry.resource_type,
            resource_id: entry.resource_id,
            success: entry.success,
            error_message: entry.error_message,
            session_id: entry.session_id,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            old_values: entry.old_values,
            new_values: entry.new_values,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;
    use chrono::Duration as ChronoDuration;

    fn new_user(tenant_id: Uuid, email: &str) -> CreateUser {
        CreateUser {
            tenant_id,
            email: email.to_string(),
            password_hash: "$argon2id$x".to_string(),
            display_name: "Test".to_string(),
            phone: None,
            role: Role::Viewer,
        }
    }

    fn new_session(user: &User, session_id: &str) -> CreateSession {
        CreateSession {
            user_id: user.id,
            tenant_id: user.tenant_id,
            session_id: session_id.to_string(),
            access_token_hash: format!("{session_id}-access"),
            refresh_token_hash: format!("{session_id}-refresh"),
            device_info: None,
            ip_address: None,
            user_agent: None,
            expires_at: Utc::now() + ChronoDuration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_email_unique_per_tenant_among_live_users() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();

        let first = store.create_user(new_user(tenant, "a@x.test")).await.unwrap();
        assert!(matches!(
            store.create_user(new_user(tenant, "a@x.test")).await,
            Err(StoreError::Duplicate(_))
        ));

        // Same email, other tenant
        store
            .create_user(new_user(Uuid::new_v4(), "a@x.test"))
            .await
            .unwrap();

        // Reusable after soft delete
        assert!(store.soft_delete_user(first.id, Utc::now()).await.unwrap());
        store.create_user(new_user(tenant, "a@x.test")).await.unwrap();
    }

    #[tokio::test]
    async fn test_any_tenant_lookup_prefers_oldest() {
        let store = MemoryStore::new();
        let first = store
            .create_user(new_user(Uuid::new_v4(), "a@x.test"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store
            .create_user(new_user(Uuid::new_v4(), "a@x.test"))
            .await
            .unwrap();

        let found = store
            .find_user_by_email_any_tenant("a@x.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_rotate_never_reactivates() {
        let store = MemoryStore::new();
        let user = store
            .create_user(new_user(Uuid::new_v4(), "a@x.test"))
            .await
            .unwrap();
        store.create_session(new_session(&user, "s1")).await.unwrap();
        store.deactivate_session("s1").await.unwrap();

        let rotated = store
            .rotate_session(
                "s1",
                RotateSession {
                    previous_refresh_hash: "s1-refresh".into(),
                    access_token_hash: "new-a".into(),
                    refresh_token_hash: "new-r".into(),
                    expires_at: Utc::now() + ChronoDuration::hours(2),
                },
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(rotated.is_none());
        let session = store.find_session("s1").await.unwrap().unwrap();
        assert!(!session.is_active);
        assert_eq!(session.access_token_hash, "s1-access");
    }

    #[tokio::test]
    async fn test_deactivate_user_sessions_counts() {
        let store = MemoryStore::new();
        let user = store
            .create_user(new_user(Uuid::new_v4(), "a@x.test"))
            .await
            .unwrap();
        store.create_session(new_session(&user, "s1")).await.unwrap();
        store.create_session(new_session(&user, "s2")).await.unwrap();

        assert_eq!(store.deactivate_user_sessions(user.id).await.unwrap(), 2);
        assert_eq!(store.deactivate_user_sessions(user.id).await.unwrap(), 0);
        assert!(store.list_active_sessions(user.id).await.unwrap().is_empty());
    }

    fn rotation(previous: &str, tag: &str) -> RotateSession {
        RotateSession {
            previous_refresh_hash: previous.to_string(),
            access_token_hash: format!("{tag}-access"),
            refresh_token_hash: format!("{tag}-refresh"),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        }
    }

    fn reset_token(user: &User, hash: &str) -> CreateResetToken {
        CreateResetToken {
            user_id: user.id,
            tenant_id: user.tenant_id,
            token_hash: hash.to_string(),
            email: user.email.clone(),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_rotate_requires_current_refresh_hash() {
        let store = MemoryStore::new();
        let user = store
            .create_user(new_user(Uuid::new_v4(), "a@x.test"))
            .await
            .unwrap();
        store.create_session(new_session(&user, "s1")).await.unwrap();

        let now = Utc::now();
        assert!(store
            .rotate_session("s1", rotation("s1-refresh", "r1"), now)
            .await
            .unwrap()
            .is_some());

        // Same refresh token again: already rotated away
        assert!(store
            .rotate_session("s1", rotation("s1-refresh", "r2"), now)
            .await
            .unwrap()
            .is_none());

        let session = store.find_session("s1").await.unwrap().unwrap();
        assert_eq!(session.refresh_token_hash, "r1-refresh");
    }

    #[tokio::test]
    async fn test_issue_reset_token_supersedes_and_limits() {
        let store = MemoryStore::new();
        let user = store
            .create_user(new_user(Uuid::new_v4(), "a@x.test"))
            .await
            .unwrap();
        let window_start = Utc::now() - ChronoDuration::hours(1);

        for i in 0..3 {
            let issued = store
                .issue_reset_token(reset_token(&user, &format!("h{i}")), window_start, 3)
                .await
                .unwrap();
            assert!(issued.is_some());
        }
        let limited = store
            .issue_reset_token(reset_token(&user, "h3"), window_start, 3)
            .await
            .unwrap();
        assert!(limited.is_none());

        let tokens = store.reset_tokens_of(user.id).await;
        assert_eq!(tokens.len(), 3);
        let active: Vec<_> = tokens.iter().filter(|t| t.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].token_hash, "h2");
    }

    #[tokio::test]
    async fn test_complete_password_reset_once() {
        let store = MemoryStore::new();
        let user = store
            .create_user(new_user(Uuid::new_v4(), "a@x.test"))
            .await
            .unwrap();
        store.create_session(new_session(&user, "s1")).await.unwrap();
        store
            .issue_reset_token(reset_token(&user, "h1"), Utc::now() - ChronoDuration::hours(1), 3)
            .await
            .unwrap();

        let now = Utc::now();
        match store.complete_password_reset("h1", "$argon2id$new", now).await.unwrap() {
            ResetCompletion::Completed {
                token,
                sessions_ended,
            } => {
                assert_eq!(token.used_at, Some(now));
                assert_eq!(sessions_ended, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            store.complete_password_reset("h1", "$argon2id$other", now).await.unwrap(),
            ResetCompletion::TokenUnavailable
        ));

        let stored = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "$argon2id$new");
    }

    #[tokio::test]
    async fn test_failed_password_reset_writes_nothing() {
        let store = MemoryStore::new();
        let user = store
            .create_user(new_user(Uuid::new_v4(), "a@x.test"))
            .await
            .unwrap();
        store.create_session(new_session(&user, "s1")).await.unwrap();
        store
            .issue_reset_token(reset_token(&user, "h1"), Utc::now() - ChronoDuration::hours(1), 3)
            .await
            .unwrap();

        store.fail_password_updates(true);
        assert!(store
            .complete_password_reset("h1", "$argon2id$new", Utc::now())
            .await
            .is_err());

        let token = store.find_reset_token("h1").await.unwrap().unwrap();
        assert!(token.is_active);
        assert!(token.used_at.is_none());
        assert!(store.find_session("s1").await.unwrap().unwrap().is_active);
        assert_eq!(
            store.find_user_by_id(user.id).await.unwrap().unwrap().password_hash,
            "$argon2id$x"
        );
    }

    #[tokio::test]
    async fn test_session_insert_failure_injection() {
        let store = MemoryStore::new();
        let user = store
            .create_user(new_user(Uuid::new_v4(), "a@x.test"))
            .await
            .unwrap();

        store.fail_session_inserts(true);
        assert!(store.create_session(new_session(&user, "s1")).await.is_err());

        store.fail_session_inserts(false);
        assert!(store.create_session(new_session(&user, "s1")).await.is_ok());
    }
}
