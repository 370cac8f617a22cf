/// Authentication endpoints
///
/// Thin HTTP adapters over `IdentityCore`: each handler extracts input,
/// calls one identity operation and wraps the result in the success
/// envelope. Errors convert through `ApiError`.
///
/// # Endpoints
///
/// Public (throttled per IP):
/// - `POST /v1/auth/register` - Register a user in a tenant (201)
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Rotate the session's token pair
/// - `POST /v1/auth/password-reset` - Request a reset token
/// - `GET  /v1/auth/validate-reset-token?token=` - Check a reset token
/// - `POST /v1/auth/reset-password` - Set a new password with a reset token
///
/// Bearer token:
/// - `POST /v1/auth/logout` - End the current session
/// - `POST /v1/auth/logout-all` - End every session of the user
/// - `GET  /v1/auth/profile` - Current user
/// - `PUT  /v1/auth/profile` - Update display name / phone
/// - `POST /v1/auth/change-password` - Change password (ends all sessions)
/// - `GET  /v1/auth/sessions` - Active sessions

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::client::Client,
    routes::ApiResponse,
};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use corebooks_identity::{
    auth::{authorization::tenant_from_headers, middleware::AuthContext},
    identity::{
        accounts::{RegisterRequest, UpdateProfileRequest},
        Authenticated, TokenPair,
    },
    models::{session::SessionSummary, user::User},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Password change request
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Password reset request
#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Reset token query
#[derive(Debug, Deserialize)]
pub struct ResetTokenQuery {
    #[serde(default)]
    pub token: String,
}

/// Password reset completion
#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,
    pub new_password: String,
}

/// Reset request result
///
/// The masked destination is deliberately absent so the response is the
/// same for known and unknown addresses.
#[derive(Debug, Serialize)]
pub struct PasswordResetResponse {
    pub rate_limited: bool,
}

/// Reset token check result
#[derive(Debug, Serialize)]
pub struct ResetTokenStatus {
    pub valid: bool,
    pub reason: &'static str,
}

/// Logout-all result
#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub sessions_ended: u64,
}

/// Register a new user
///
/// The tenant comes from `tenant_id` in the body or the `X-Tenant-ID`
/// header; if both are given they must agree.
///
/// # Deployment hazard
///
/// The caller picks its own `role`, and `super_admin` is accepted. A
/// `super_admin` token may act on any tenant, so a public deployment must
/// keep this route behind a gateway or invitation flow that fixes the role.
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// X-Tenant-ID: 6f1c...
/// Content-Type: application/json
///
/// {
///   "email": "owner@acme.test",
///   "password": "Secret123!",
///   "display_name": "Acme Owner",
///   "role": "tenant_admin"
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed or no tenant given
/// - `409 Conflict`: Email already registered in the tenant
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Client(client): Client,
    Json(mut req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Authenticated>>)> {
    let header_tenant = tenant_from_headers(&headers)?;
    req.tenant_id = match (req.tenant_id, header_tenant) {
        (Some(body), Some(header)) if body != header => {
            return Err(ApiError::BadRequest(
                "tenant_id in body and X-Tenant-ID header differ".to_string(),
            ));
        }
        (body, header) => body.or(header),
    };

    let auth = state.core.register(req, client).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("User registered successfully", auth),
    ))
}

/// Login endpoint
///
/// Unknown email, wrong password and disabled accounts all produce the same
/// 401 body.
pub async fn login(
    State(state): State<AppState>,
    Client(client): Client,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<Authenticated>>> {
    let auth = state.core.login(&req.email, &req.password, client).await?;
    Ok(ApiResponse::ok("Login successful", auth))
}

/// Token refresh endpoint
///
/// Returns a new pair for the same session; the presented refresh token and
/// the previous access token stop working.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<ApiResponse<TokenPair>>> {
    req.validate()?;

    let tokens = state.core.refresh(&req.refresh_token).await?;
    Ok(ApiResponse::ok("Token refreshed", tokens))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<()>>> {
    state.core.logout(&auth.session_id).await?;
    Ok(ApiResponse::done("Logged out successfully"))
}

pub async fn logout_all(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<LogoutAllResponse>>> {
    let sessions_ended = state.core.logout_all(auth.user_id).await?;
    Ok(ApiResponse::ok(
        "Logged out of all sessions",
        LogoutAllResponse { sessions_ended },
    ))
}

pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<User>>> {
    let user = state.core.get_profile(auth.user_id).await?;
    Ok(ApiResponse::ok("Profile retrieved", user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    let user = state.core.update_profile(auth.user_id, req).await?;
    Ok(ApiResponse::ok("Profile updated", user))
}

/// Change password endpoint
///
/// Ends every session of the user, including the one making the request.
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    state
        .core
        .change_password(auth.user_id, &req.current_password, &req.new_password)
        .await?;
    Ok(ApiResponse::done(
        "Password changed. Please log in again",
    ))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<Vec<SessionSummary>>>> {
    let sessions = state
        .core
        .list_sessions(auth.user_id, &auth.session_id)
        .await?;
    Ok(ApiResponse::ok("Active sessions", sessions))
}

/// Password reset request endpoint
///
/// Always 200 with the same message, whether or not the address belongs to
/// an account.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult<Json<ApiResponse<PasswordResetResponse>>> {
    let outcome = state.core.request_password_reset(&req.email).await?;
    Ok(ApiResponse::ok(
        outcome.message,
        PasswordResetResponse {
            rate_limited: outcome.rate_limited,
        },
    ))
}

/// Reset token check endpoint
///
/// An unusable token is still a 200; `reason` says why.
pub async fn validate_reset_token(
    State(state): State<AppState>,
    Query(query): Query<ResetTokenQuery>,
) -> ApiResult<Json<ApiResponse<ResetTokenStatus>>> {
    let token_state = state.core.validate_reset_token(&query.token).await?;
    Ok(ApiResponse::ok(
        "Reset token checked",
        ResetTokenStatus {
            valid: token_state.is_valid(),
            reason: token_state.as_str(),
        },
    ))
}

/// Reset password endpoint
///
/// # Errors
///
/// - `400 Bad Request`: New password fails the policy (token not consumed)
/// - `404 Not Found`: Token unknown, used, superseded or expired
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    req.validate()?;

    state
        .core
        .reset_password(&req.token, &req.new_password)
        .await?;
    Ok(ApiResponse::done(
        "Password has been reset. Please log in with your new password",
    ))
}
