/// JWT token generation and validation
///
/// Access and refresh tokens are HS256-signed JWTs. Both carry the full
/// identity (user, tenant, email, role) plus the opaque session identifier
/// they were minted for, so a token can always be traced back to exactly one
/// session row.
///
/// # Security
///
/// - **Algorithm**: HS256 (HMAC with SHA-256)
/// - **Validation**: signature, `exp`, `nbf`, issuer and audience on every decode
/// - **Binding**: `session_hash` is the SHA-256 of the session identifier
/// - **Uniqueness**: a random `jti` makes every minted token distinct, even
///   two tokens for the same session issued within the same second
///
/// # Example
///
/// ```
/// use corebooks_identity::auth::jwt::{Claims, JwtCodec, TokenType};
/// use corebooks_identity::models::user::Role;
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let codec = JwtCodec::new("secret-key-at-least-32-bytes-long!!", "corebooks", "corebooks-api");
/// let claims = codec.claims(
///     Uuid::new_v4(),
///     Uuid::new_v4(),
///     "user@acme.test",
///     Role::Staff,
///     "session-identifier",
///     TokenType::Access,
///     Duration::hours(1),
/// );
///
/// let token = codec.encode(&claims)?;
/// let decoded = codec.decode_expecting(&token, TokenType::Access)?;
/// assert_eq!(decoded.sub, claims.sub);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token::hash_token;
use crate::models::user::Role;

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Failed to validate token
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Token is not valid yet
    #[error("Token is not valid yet")]
    NotYetValid,

    /// Signature does not match
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Invalid token format
    #[error("Invalid token format: {0}")]
    InvalidFormat(String),

    /// Issuer claim does not match
    #[error("Invalid issuer")]
    InvalidIssuer,

    /// Audience claim does not contain the expected value
    #[error("Invalid audience")]
    InvalidAudience,

    /// Token type differs from the one the caller requires
    #[error("Expected {expected} token, got {actual} token")]
    WrongTokenType {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Authorizes API calls
    Access,

    /// Only mints a new access/refresh pair
    Refresh,
}

impl TokenType {
    /// Gets token type as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT claims structure
///
/// # Standard Claims
///
/// - `sub`: User ID
/// - `iss`, `aud`: Issuer and audience, validated on every decode
/// - `iat`, `exp`, `nbf`: Unix timestamps
/// - `jti`: Unique token ID
///
/// # Custom Claims
///
/// - `tenant_id`, `email`, `role`: Identity
/// - `session_id`: Opaque session identifier
/// - `session_hash`: SHA-256 of `session_id`
/// - `token_type`: Access or refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - User ID
    pub sub: Uuid,

    /// Tenant the user belongs to
    pub tenant_id: Uuid,

    /// User email at issue time
    pub email: String,

    /// User role at issue time
    pub role: Role,

    /// Opaque session identifier
    pub session_id: String,

    /// Binds the token to its session record
    pub session_hash: String,

    /// Token type
    pub token_type: TokenType,

    /// Unique token ID
    pub jti: Uuid,

    /// Issuer
    pub iss: String,

    /// Audience
    pub aud: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,
}

impl Claims {
    /// Checks if token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Gets time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let now = Utc::now().timestamp();
        if self.exp > now {
            Some(Duration::seconds(self.exp - now))
        } else {
            None
        }
    }

    /// Expiration as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether `session_hash` matches `session_id`
    pub fn is_bound_to(&self, session_id: &str) -> bool {
        self.session_id == session_id && self.session_hash == hash_token(session_id)
    }
}

/// Signs and verifies tokens with one secret, issuer and audience
#[derive(Clone)]
pub struct JwtCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl std::fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCodec")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl JwtCodec {
    /// Creates a codec
    ///
    /// The secret should be at least 32 random bytes.
    pub fn new(secret: &str, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Configured issuer
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Configured audience
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Builds claims stamped with this codec's issuer and audience
    #[allow(clippy::too_many_arguments)]
    pub fn claims(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        email: &str,
        role: Role,
        session_id: &str,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Claims {
        let now = Utc::now();

        Claims {
            sub: user_id,
            tenant_id,
            email: email.to_string(),
            role,
            session_id: session_id.to_string(),
            session_hash: hash_token(session_id),
            token_type,
            jti: Uuid::new_v4(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
        }
    }

    /// Signs claims into a compact JWT
    ///
    /// # Errors
    ///
    /// Returns `JwtError::CreateError` if encoding fails.
    pub fn encode(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
    }

    /// Verifies a token and extracts its claims
    ///
    /// Verifies signature, `exp`, `nbf`, issuer and audience. No leeway is
    /// granted on time claims.
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;

            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                ErrorKind::ImmatureSignature => JwtError::NotYetValid,
                ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
                ErrorKind::InvalidAudience => JwtError::InvalidAudience,
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                    JwtError::InvalidFormat(e.to_string())
                }
                _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
            }
        })?;

        Ok(token_data.claims)
    }

    /// Decodes a token and requires a specific token type
    pub fn decode_expecting(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let claims = self.decode(token)?;

        if claims.token_type != expected {
            return Err(JwtError::WrongTokenType {
                expected: expected.as_str(),
                actual: claims.token_type.as_str(),
            });
        }

        Ok(claims)
    }
}
