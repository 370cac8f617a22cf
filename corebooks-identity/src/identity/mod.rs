/// Identity services
///
/// [`IdentityCore`] bundles configuration, stores, cache, token codec, audit
/// queue and reset delivery, and exposes every identity operation. The
/// operations are grouped by concern:
///
/// - [`accounts`]: registration, profile, password change, user admin
/// - [`sessions`]: login, token issuing, refresh, logout, session listing
/// - [`verifier`]: access token validation and revocation checks
/// - [`password_reset`]: reset request, token validation, reset
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use corebooks_identity::audit::{AuditConfig, AuditLogger};
/// use corebooks_identity::cache::MemoryCache;
/// use corebooks_identity::config::AuthConfig;
/// use corebooks_identity::identity::accounts::RegisterRequest;
/// use corebooks_identity::identity::IdentityCore;
/// use corebooks_identity::models::session::ClientInfo;
/// use corebooks_identity::store::{IdentityStores, MemoryStore};
/// use tokio_util::sync::CancellationToken;
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(MemoryStore::new());
/// let (audit, _worker) = AuditLogger::spawn(store.clone(), AuditConfig::default(), CancellationToken::new());
///
/// let core = IdentityCore::new(
///     AuthConfig::from_env()?,
///     IdentityStores::shared(store),
///     Arc::new(MemoryCache::new()),
///     audit,
/// );
///
/// let registration = core
///     .register(
///         RegisterRequest {
///             email: "user@acme.test".to_string(),
///             password: "Secret123!".to_string(),
///             display_name: "User".to_string(),
///             phone: None,
///             role: None,
///             tenant_id: Some(Uuid::new_v4()),
///         },
///         ClientInfo::default(),
///     )
///     .await?;
///
/// let ctx = core.validate_token(&registration.tokens.access_token).await?;
/// assert_eq!(ctx.email, "user@acme.test");
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use validator::{ValidateEmail, ValidationErrors};

use crate::audit::AuditLogger;
use crate::auth::jwt::JwtCodec;
use crate::auth::password::decoy_hash;
use crate::cache::CacheStore;
use crate::config::AuthConfig;
use crate::error::{IdentityError, IdentityResult};
use crate::models::user::User;
use crate::store::IdentityStores;

pub mod accounts;
pub mod delivery;
pub mod password_reset;
pub mod sessions;
pub mod verifier;

use self::delivery::{LogDelivery, ResetTokenDelivery};

/// Access/refresh pair returned by login, registration and refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,

    /// Always `Bearer`
    pub token_type: &'static str,

    /// Opaque session identifier shared by both tokens
    pub session_id: String,

    /// Access token (and session) expiry
    pub expires_at: DateTime<Utc>,

    /// Access token lifetime in seconds
    pub expires_in: i64,

    /// Refresh token expiry
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of a successful registration or login
#[derive(Debug, Clone, Serialize)]
pub struct Authenticated {
    pub user: User,
    pub tokens: TokenPair,
}

/// Identity operations over pluggable stores
#[derive(Clone)]
pub struct IdentityCore {
    config: Arc<AuthConfig>,
    codec: JwtCodec,
    stores: IdentityStores,
    cache: Arc<dyn CacheStore>,
    audit: AuditLogger,
    delivery: Arc<dyn ResetTokenDelivery>,
    decoy_hash: Option<Arc<str>>,
}

impl std::fmt::Debug for IdentityCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCore")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}

impl IdentityCore {
    /// Creates the core with reset tokens delivered to the log
    pub fn new(
        config: AuthConfig,
        stores: IdentityStores,
        cache: Arc<dyn CacheStore>,
        audit: AuditLogger,
    ) -> Self {
        let codec = JwtCodec::new(&config.jwt_secret, &config.issuer, &config.audience);
        let decoy_hash = match decoy_hash(&config.hashing) {
            Ok(hash) => Some(Arc::from(hash)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to prepare decoy password hash");
                None
            }
        };

        Self {
            config: Arc::new(config),
            codec,
            stores,
            cache,
            audit,
            delivery: Arc::new(LogDelivery),
            decoy_hash,
        }
    }

    /// Replaces the reset token delivery channel
    pub fn with_delivery(mut self, delivery: Arc<dyn ResetTokenDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn codec(&self) -> &JwtCodec {
        &self.codec
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Per-call store deadline
    fn deadline(&self) -> Duration {
        self.config.store_timeout
    }
}

/// Trims and lower-cases an email, then checks its grammar
pub(crate) fn normalize_email(raw: &str) -> IdentityResult<String> {
    let email = raw.trim().to_lowercase();

    if email.is_empty() {
        return Err(IdentityError::validation("email", "Email is required"));
    }
    if !email.validate_email() {
        return Err(IdentityError::validation("email", "Invalid email format"));
    }

    Ok(email)
}

/// Converts derive-based validation failures into the first offending field
pub(crate) fn first_violation(errors: ValidationErrors) -> IdentityError {
    let mut fields: Vec<(String, String)> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let message = errs
                .first()
                .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "is invalid".to_string());
            (field.to_string(), message)
        })
        .collect();
    fields.sort();

    match fields.into_iter().next() {
        Some((field, message)) => IdentityError::validation(field, message),
        None => IdentityError::validation("request", "Invalid request"),
    }
}
