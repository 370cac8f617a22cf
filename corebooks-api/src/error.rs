/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers return `Result<T, ApiError>`; identity errors convert with
/// `?` and keep a one-to-one status mapping.
///
/// # Response Body
///
/// ```json
/// {
///   "error": "validation_error",
///   "message": "Request validation failed",
///   "code": 400,
///   "details": [{ "field": "email", "message": "Invalid email format" }]
/// }
/// ```
///
/// # Example
///
/// ```
/// use corebooks_api::error::{ApiError, ApiResult};
/// use corebooks_identity::error::IdentityError;
///
/// fn lookup(found: bool) -> ApiResult<&'static str> {
///     if !found {
///         return Err(IdentityError::NotFound("User not found".to_string()).into());
///     }
///     Ok("user")
/// }
///
/// assert!(matches!(lookup(false), Err(ApiError::NotFound(_))));
/// ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use corebooks_identity::auth::authorization::AuthzError;
use corebooks_identity::auth::middleware::AuthError;
use corebooks_identity::error::IdentityError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400) without field details
    BadRequest(String),

    /// Validation failure (400) with per-field details
    ValidationError(Vec<ValidationErrorDetail>),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) - e.g., duplicate email
    Conflict(String),

    /// Too many requests (429)
    RateLimitExceeded { retry_after: u64, message: String },

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503) - a backend missed its deadline
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code
    pub code: u16,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limit exceeded: {}", message)
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            ApiError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        };

        let (error_code, message, details) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::ValidationError(errors) => (
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::Forbidden(msg) => ("forbidden", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::RateLimitExceeded { message, .. } => ("rate_limit_exceeded", message, None),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!(error = %msg, "Internal error");
                (
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => {
                tracing::warn!(error = %msg, "Service unavailable");
                (
                    "service_unavailable",
                    "Service temporarily unavailable".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            code: status.as_u16(),
            details,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Convert identity errors to API errors
impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Validation { field, message } => {
                ApiError::ValidationError(vec![ValidationErrorDetail { field, message }])
            }
            IdentityError::Auth(msg) => ApiError::Unauthorized(msg),
            IdentityError::Forbidden(msg) => ApiError::Forbidden(msg),
            IdentityError::NotFound(msg) => ApiError::NotFound(msg),
            IdentityError::InvalidResetToken(state) => {
                ApiError::NotFound(format!("Reset token is {}", state.as_str()))
            }
            IdentityError::Conflict(msg) => ApiError::Conflict(msg),
            IdentityError::Timeout(operation) => {
                ApiError::ServiceUnavailable(format!("{} timed out", operation))
            }
            other @ (IdentityError::Store(_)
            | IdentityError::Cache(_)
            | IdentityError::Internal(_)) => ApiError::InternalError(other.to_string()),
        }
    }
}

/// Convert auth errors to API errors
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

/// Convert authorization errors to API errors
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        IdentityError::from(err).into()
    }
}

/// Convert request body validation errors to API errors
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationErrorDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid {}", field)),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corebooks_identity::cache::CacheError;
    use corebooks_identity::models::password_reset::ResetTokenState;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("User not found".to_string());
        assert_eq!(err.to_string(), "Not found: User not found");
    }

    #[test]
    fn test_identity_error_status_mapping() {
        let cases: Vec<(IdentityError, StatusCode)> = vec![
            (
                IdentityError::validation("email", "Invalid email format"),
                StatusCode::BAD_REQUEST,
            ),
            (IdentityError::Auth("bad".into()), StatusCode::UNAUTHORIZED),
            (IdentityError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (IdentityError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (
                IdentityError::InvalidResetToken(ResetTokenState::Used),
                StatusCode::NOT_FOUND,
            ),
            (IdentityError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                IdentityError::Timeout("session lookup"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                IdentityError::Cache(CacheError::Timeout),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                IdentityError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_validation_keeps_field() {
        let err = ApiError::from(IdentityError::validation("password", "Too short"));
        match err {
            ApiError::ValidationError(details) => {
                assert_eq!(details.len(), 1);
                assert_eq!(details[0].field, "password");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_authz_maps_to_forbidden() {
        let err = ApiError::from(AuthzError::TenantMismatch(uuid::Uuid::nil()));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = ApiError::from(AuthzError::InvalidTenantId("acme".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError::RateLimitExceeded {
            retry_after: 42,
            message: "slow down".into(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn test_internal_details_hidden() {
        let response = ApiError::InternalError("connection refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
