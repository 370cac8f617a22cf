/// Error taxonomy for the identity core
///
/// Every service operation returns `Result<T, IdentityError>`. The HTTP layer
/// maps each variant to exactly one status code; see `corebooks-api::error`.
///
/// | Variant | Meaning | HTTP |
/// |---|---|---|
/// | `Validation` | Malformed input, rejected before any store access | 400 |
/// | `Auth` | Bad credentials, invalid/expired/revoked token | 401 |
/// | `Forbidden` | Authenticated but not permitted (incl. cross-tenant) | 403 |
/// | `NotFound` / `InvalidResetToken` | Missing user/session/token | 404 |
/// | `Conflict` | Duplicate registration | 409 |
/// | `Timeout` | Store/cache deadline exceeded (fail closed) | 503 |
/// | `Store` / `Cache` / `Internal` | Backend failure | 500 |
///
/// Reset-request throttling is not an error: it is reported as a flag on a
/// successful outcome so the response is indistinguishable from the
/// non-throttled case.

use crate::auth::authorization::AuthzError;
use crate::auth::jwt::JwtError;
use crate::auth::password::PasswordError;
use crate::cache::CacheError;
use crate::models::password_reset::ResetTokenState;
use crate::store::StoreError;

/// Result alias used throughout the identity services
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Unified error type for identity operations
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Input failed validation
    #[error("Validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Authenticated caller is not allowed to perform the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Reset token cannot be used
    #[error("Reset token is {}", .0.as_str())]
    InvalidResetToken(ResetTokenState),

    /// Record already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A store or cache call did not finish before its deadline
    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    /// Credential store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Shared cache failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Any other internal failure (hashing, signing)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// Shorthand for a validation failure on one field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        IdentityError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the error was caused by the backend rather than the caller
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            IdentityError::Store(_)
                | IdentityError::Cache(_)
                | IdentityError::Internal(_)
                | IdentityError::Timeout(_)
        )
    }
}

impl From<PasswordError> for IdentityError {
    fn from(err: PasswordError) -> Self {
        IdentityError::Internal(format!("Password operation failed: {}", err))
    }
}

impl From<AuthzError> for IdentityError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::InvalidTenantId(raw) => {
                IdentityError::validation("tenant_id", format!("Invalid tenant id: {}", raw))
            }
            AuthzError::InvalidTable(msg) => IdentityError::Internal(msg),
            other => IdentityError::Forbidden(other.to_string()),
        }
    }
}

impl From<JwtError> for IdentityError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => IdentityError::Internal(msg),
            JwtError::Expired => IdentityError::Auth("Token expired".to_string()),
            JwtError::InvalidIssuer => IdentityError::Auth("Invalid token issuer".to_string()),
            JwtError::InvalidAudience => {
                IdentityError::Auth("Invalid token audience".to_string())
            }
            JwtError::WrongTokenType { .. } => {
                IdentityError::Auth("Wrong token type".to_string())
            }
            other => IdentityError::Auth(format!("Invalid token: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = IdentityError::validation("email", "Invalid email format");
        assert_eq!(
            err.to_string(),
            "Validation failed: email: Invalid email format"
        );
    }

    #[test]
    fn test_internal_classification() {
        assert!(IdentityError::Timeout("session lookup").is_internal());
        assert!(IdentityError::Internal("x".into()).is_internal());
        assert!(!IdentityError::Auth("x".into()).is_internal());
        assert!(!IdentityError::Forbidden("x".into()).is_internal());
    }

    #[test]
    fn test_jwt_expired_maps_to_auth() {
        let err: IdentityError = JwtError::Expired.into();
        assert!(matches!(err, IdentityError::Auth(_)));

        let err: IdentityError = JwtError::CreateError("boom".into()).into();
        assert!(matches!(err, IdentityError::Internal(_)));
    }

    #[test]
    fn test_authz_maps_to_forbidden() {
        let err: IdentityError = AuthzError::TenantMismatch(uuid::Uuid::nil()).into();
        assert!(matches!(err, IdentityError::Forbidden(_)));

        let err: IdentityError = AuthzError::InvalidTenantId("acme".into()).into();
        assert!(matches!(err, IdentityError::Validation { .. }));
    }

    #[test]
    fn test_reset_token_display() {
        let err = IdentityError::InvalidResetToken(ResetTokenState::Used);
        assert_eq!(err.to_string(), "Reset token is used");
    }
}
