/// Login, token issuing and session lifecycle
///
/// A session owns exactly one access/refresh pair at a time. Only SHA-256
/// digests of the tokens are persisted; a refresh overwrites them in place so
/// the previous pair stops resolving to the session immediately.
///
/// # Revocation
///
/// Logout deactivates the session and also writes both token hashes to the
/// shared cache, each with its remaining lifetime as TTL. The cache entry
/// rejects the token before any store lookup.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{normalize_email, Authenticated, IdentityCore, TokenPair};
use crate::auth::jwt::TokenType;
use crate::auth::password::verify_password;
use crate::auth::token::{generate_session_id, hash_token, mask_email};
use crate::cache::revoked_key;
use crate::error::{IdentityError, IdentityResult};
use crate::models::activity_log::{AuditAction, NewActivityLog};
use crate::models::session::{ClientInfo, CreateSession, RotateSession, Session, SessionSummary};
use crate::models::user::User;
use crate::store::bounded;

/// Message for every login failure, so callers cannot tell which accounts exist
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// A freshly signed pair and the digests to persist
struct MintedPair {
    tokens: TokenPair,
    access_hash: String,
    refresh_hash: String,
}

impl IdentityCore {
    /// Authenticates by email and password and opens a session
    ///
    /// The email lookup spans every tenant. Unknown email, wrong password and
    /// disabled account all produce the same [`IdentityError::Auth`].
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: ClientInfo,
    ) -> IdentityResult<Authenticated> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(IdentityError::validation("password", "Password is required"));
        }

        let result = self.login_inner(&email, password, &client).await;

        let entry = match &result {
            Ok(auth) => NewActivityLog::success(AuditAction::Login, "session")
                .with_user(auth.user.id, auth.user.tenant_id)
                .with_resource(auth.tokens.session_id.clone())
                .with_session(auth.tokens.session_id.clone()),
            Err(e) => NewActivityLog::failure(AuditAction::Login, "session", e.to_string())
                .with_resource(mask_email(&email)),
        };
        self.audit
            .record(entry.with_client(client.ip_address.clone(), client.user_agent.clone()));

        result
    }

    async fn login_inner(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> IdentityResult<Authenticated> {
        let user = bounded(
            self.deadline(),
            "user lookup",
            self.stores.users.find_user_by_email_any_tenant(email),
        )
        .await?;

        let Some(user) = user.filter(User::can_authenticate) else {
            if let Some(decoy) = &self.decoy_hash {
                let _ = verify_password(password, decoy);
            }
            tracing::info!(email = %mask_email(email), "Login rejected");
            return Err(IdentityError::Auth(INVALID_CREDENTIALS.to_string()));
        };

        if !verify_password(password, &user.password_hash)? {
            tracing::info!(user_id = %user.id, "Login rejected: wrong password");
            return Err(IdentityError::Auth(INVALID_CREDENTIALS.to_string()));
        }

        let now = Utc::now();
        bounded(
            self.deadline(),
            "login update",
            self.stores.users.record_login(user.id, now),
        )
        .await?;

        let tokens = self.create_session(&user, client).await?;

        tracing::info!(
            user_id = %user.id,
            tenant_id = %user.tenant_id,
            "User logged in"
        );

        let user = User {
            last_login_at: Some(now),
            ..user
        };
        Ok(Authenticated { user, tokens })
    }

    /// Opens a new session for `user` and returns its token pair
    ///
    /// The session expires together with the access token.
    pub async fn create_session(&self, user: &User, client: &ClientInfo) -> IdentityResult<TokenPair> {
        let session_id = generate_session_id();
        let minted = self.mint_pair(user, &session_id)?;

        bounded(
            self.deadline(),
            "session insert",
            self.stores.sessions.create_session(CreateSession {
                user_id: user.id,
                tenant_id: user.tenant_id,
                session_id: session_id.clone(),
                access_token_hash: minted.access_hash,
                refresh_token_hash: minted.refresh_hash,
                device_info: client.device_info.clone(),
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
                expires_at: minted.tokens.expires_at,
            }),
        )
        .await?;

        tracing::debug!(user_id = %user.id, "Session created");

        Ok(minted.tokens)
    }

    /// Exchanges a refresh token for a new pair under the same session
    ///
    /// The old pair stops validating as soon as the stored hashes are
    /// replaced. A session deactivated concurrently is never revived, and of
    /// two refreshes presenting the same token only one succeeds.
    pub async fn refresh(&self, refresh_token: &str) -> IdentityResult<TokenPair> {
        let refresh_hash = hash_token(refresh_token);
        self.ensure_not_revoked(&refresh_hash).await?;

        let claims = self
            .codec
            .decode_expecting(refresh_token, TokenType::Refresh)?;

        let session = bounded(
            self.deadline(),
            "session lookup",
            self.stores.sessions.find_session_by_refresh_hash(&refresh_hash),
        )
        .await?
        .ok_or_else(|| IdentityError::Auth("Session not found".to_string()))?;

        let now = Utc::now();
        if !session.is_valid_at(now, self.config.inactivity()) {
            return Err(IdentityError::Auth("Session expired or inactive".to_string()));
        }
        if !claims.is_bound_to(&session.session_id) || claims.sub != session.user_id {
            tracing::warn!(user_id = %claims.sub, "Refresh token does not match its session");
            return Err(IdentityError::Auth("Session mismatch".to_string()));
        }

        let user = bounded(
            self.deadline(),
            "user lookup",
            self.stores.users.find_user_by_id(session.user_id),
        )
        .await?
        .filter(User::can_authenticate)
        .ok_or_else(|| IdentityError::Auth("Account is disabled".to_string()))?;

        let minted = self.mint_pair(&user, &session.session_id)?;

        let rotated = bounded(
            self.deadline(),
            "session rotation",
            self.stores.sessions.rotate_session(
                &session.session_id,
                RotateSession {
                    previous_refresh_hash: refresh_hash,
                    access_token_hash: minted.access_hash,
                    refresh_token_hash: minted.refresh_hash,
                    expires_at: minted.tokens.expires_at,
                },
                now,
            ),
        )
        .await?;
        if rotated.is_none() {
            tracing::warn!(user_id = %user.id, "Refresh token lost rotation race");
            return Err(IdentityError::Auth(
                "Session expired, inactive or already refreshed".to_string(),
            ));
        }

        self.audit.record(
            NewActivityLog::success(AuditAction::RefreshToken, "session")
                .with_user(user.id, user.tenant_id)
                .with_resource(session.session_id.clone())
                .with_session(session.session_id.clone()),
        );

        tracing::debug!(user_id = %user.id, "Session refreshed");

        Ok(minted.tokens)
    }

    /// Ends one session and revokes its current tokens
    pub async fn logout(&self, session_id: &str) -> IdentityResult<()> {
        let session = bounded(
            self.deadline(),
            "session deactivation",
            self.stores.sessions.deactivate_session(session_id),
        )
        .await?
        .ok_or_else(|| IdentityError::NotFound("Session not found".to_string()))?;

        self.revoke_session_tokens(&session, Utc::now()).await?;

        self.audit.record(
            NewActivityLog::success(AuditAction::Logout, "session")
                .with_user(session.user_id, session.tenant_id)
                .with_resource(session.session_id.clone())
                .with_session(session.session_id.clone()),
        );

        tracing::info!(user_id = %session.user_id, "User logged out");

        Ok(())
    }

    /// Ends every session of a user in one store operation
    ///
    /// Returns the number of sessions that were active.
    pub async fn logout_all(&self, user_id: Uuid) -> IdentityResult<u64> {
        let count = bounded(
            self.deadline(),
            "session deactivation",
            self.stores.sessions.deactivate_user_sessions(user_id),
        )
        .await?;

        let mut entry = NewActivityLog::success(AuditAction::LogoutAll, "session")
            .with_resource(user_id.to_string())
            .with_changes(None, Some(serde_json::json!({ "sessions_ended": count })));
        entry.user_id = Some(user_id);
        self.audit.record(entry);

        tracing::info!(user_id = %user_id, sessions = count, "All sessions ended");

        Ok(count)
    }

    /// Lists the user's currently valid sessions, newest first
    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        current_session_id: &str,
    ) -> IdentityResult<Vec<SessionSummary>> {
        let now = Utc::now();
        let inactivity = self.config.inactivity();

        let mut sessions: Vec<Session> = bounded(
            self.deadline(),
            "session list",
            self.stores.sessions.list_active_sessions(user_id),
        )
        .await?
        .into_iter()
        .filter(|s| s.is_valid_at(now, inactivity))
        .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(sessions
            .into_iter()
            .map(|s| SessionSummary::from_session(s, current_session_id))
            .collect())
    }

    /// Rejects a token whose hash is on the revocation list
    pub(crate) async fn ensure_not_revoked(&self, token_hash: &str) -> IdentityResult<()> {
        let revoked = bounded(
            self.deadline(),
            "revocation check",
            self.cache.exists(&revoked_key(token_hash)),
        )
        .await?;

        if revoked {
            return Err(IdentityError::Auth("Token has been revoked".to_string()));
        }
        Ok(())
    }

    /// Writes both token hashes of a session to the revocation list
    ///
    /// The access token lives as long as the session; the refresh token was
    /// issued together with it and lives `refresh_token_ttl` from then.
    async fn revoke_session_tokens(&self, session: &Session, now: DateTime<Utc>) -> IdentityResult<()> {
        let issued_at = session.expires_at - self.config.access_ttl();
        let access_left = session.remaining(now);
        let refresh_left = (issued_at + self.config.refresh_ttl() - now).max(chrono::Duration::zero());

        for (hash, left) in [
            (&session.access_token_hash, access_left),
            (&session.refresh_token_hash, refresh_left),
        ] {
            let ttl = left.to_std().unwrap_or_default();
            bounded(
                self.deadline(),
                "token revocation",
                self.cache.set_with_ttl(&revoked_key(hash), "1", ttl),
            )
            .await?;
        }

        Ok(())
    }

    fn mint_pair(&self, user: &User, session_id: &str) -> IdentityResult<MintedPair> {
        let access_claims = self.codec.claims(
            user.id,
            user.tenant_id,
            &user.email,
            user.role,
            session_id,
            TokenType::Access,
            self.config.access_ttl(),
        );
        let refresh_claims = self.codec.claims(
            user.id,
            user.tenant_id,
            &user.email,
            user.role,
            session_id,
            TokenType::Refresh,
            self.config.refresh_ttl(),
        );

        let access_token = self.codec.encode(&access_claims)?;
        let refresh_token = self.codec.encode(&refresh_claims)?;

        Ok(MintedPair {
            access_hash: hash_token(&access_token),
            refresh_hash: hash_token(&refresh_token),
            tokens: TokenPair {
                access_token,
                refresh_token,
                token_type: "Bearer",
                session_id: session_id.to_string(),
                expires_at: access_claims.expires_at(),
                expires_in: self.config.access_ttl().num_seconds(),
                refresh_expires_at: refresh_claims.expires_at(),
            },
        })
    }
}
