/// Access token validation
///
/// A token authenticates a request only when all three independent checks
/// pass:
///
/// 1. its hash is not on the revocation list (cache)
/// 2. signature, time claims, issuer, audience and type verify (crypto)
/// 3. the session it belongs to is valid and bound to it (store)
///
/// Any cache or store failure, and an expired deadline, rejects the token.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::IdentityCore;
use crate::auth::jwt::TokenType;
use crate::auth::middleware::AuthContext;
use crate::auth::token::hash_token;
use crate::error::{IdentityError, IdentityResult};
use crate::store::bounded;

/// Sessions idle for less than this are not written back on validation
const TOUCH_INTERVAL_SECS: i64 = 60;

/// Turns a bearer token into an [`AuthContext`]
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> IdentityResult<AuthContext>;
}

#[async_trait]
impl TokenVerifier for IdentityCore {
    async fn verify(&self, token: &str) -> IdentityResult<AuthContext> {
        self.validate_token(token).await
    }
}

impl IdentityCore {
    /// Validates an access token under the configured deadline
    pub async fn validate_token(&self, token: &str) -> IdentityResult<AuthContext> {
        self.validate_token_within(token, self.config.store_timeout)
            .await
    }

    /// Validates an access token, failing closed once `deadline` passes
    pub async fn validate_token_within(
        &self,
        token: &str,
        deadline: Duration,
    ) -> IdentityResult<AuthContext> {
        match tokio::time::timeout(deadline, self.check_access_token(token)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "Token validation timed out"
                );
                Err(IdentityError::Timeout("token validation"))
            }
        }
    }

    async fn check_access_token(&self, token: &str) -> IdentityResult<AuthContext> {
        let token_hash = hash_token(token);
        self.ensure_not_revoked(&token_hash).await?;

        let claims = self.codec.decode_expecting(token, TokenType::Access)?;

        let session = bounded(
            self.deadline(),
            "session lookup",
            self.stores.sessions.find_session_by_access_hash(&token_hash),
        )
        .await?
        .ok_or_else(|| IdentityError::Auth("Session not found".to_string()))?;

        let now = Utc::now();
        if !session.is_valid_at(now, self.config.inactivity()) {
            return Err(IdentityError::Auth("Session expired or inactive".to_string()));
        }
        if !claims.is_bound_to(&session.session_id) || claims.sub != session.user_id {
            tracing::warn!(user_id = %claims.sub, "Access token does not match its session");
            return Err(IdentityError::Auth("Session mismatch".to_string()));
        }

        if (now - session.last_activity_at).num_seconds() >= TOUCH_INTERVAL_SECS {
            bounded(
                self.deadline(),
                "session touch",
                self.stores.sessions.touch_session(&session.session_id, now),
            )
            .await?;
        }

        Ok(AuthContext::from_claims(&claims))
    }
}
