/// Request authentication context for Axum
///
/// The HTTP layer validates the bearer token once per request and inserts an
/// [`AuthContext`] into the request extensions. Handlers then take
/// `AuthContext` as an extractor argument; a request that never went through
/// validation is rejected with 401.
///
/// # Example
///
/// ```
/// use corebooks_identity::auth::middleware::AuthContext;
///
/// async fn handler(auth: AuthContext) -> String {
///     format!("User: {}, Tenant: {}", auth.user_id, auth.tenant_id)
/// }
/// ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::Claims;
use crate::models::user::Role;

/// Header carrying an explicit tenant selection
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user
    pub user_id: Uuid,

    /// Tenant the token was issued for
    pub tenant_id: Uuid,

    /// Email at token issue time
    pub email: String,

    /// Role at token issue time
    pub role: Role,

    /// Session the token belongs to
    pub session_id: String,

    /// Access token expiry
    pub expires_at: DateTime<Utc>,
}

impl AuthContext {
    /// Builds the context from validated access token claims
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
            email: claims.email.clone(),
            role: claims.role,
            session_id: claims.session_id.clone(),
            expires_at: claims.expires_at(),
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

/// Authentication failure before the token reaches the validator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No Authorization header
    #[error("Missing credentials")]
    MissingCredentials,

    /// Header present but not `Bearer <token>`
    #[error("Invalid authorization header: {0}")]
    InvalidFormat(String),

    /// Handler needs an identity the middleware did not attach
    #[error("Authentication required")]
    NotAuthenticated,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": "unauthorized",
            "message": self.to_string(),
            "code": StatusCode::UNAUTHORIZED.as_u16(),
        }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Extracts the raw token from `Authorization: Bearer <token>`
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("Header is not valid ASCII".to_string()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidFormat("Expected Bearer token".to_string()));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidFormat("Empty bearer token".to_string()));
    }

    Ok(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::NotAuthenticated)
    }
}
