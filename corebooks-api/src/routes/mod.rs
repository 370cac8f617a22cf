/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, login, sessions, profile and password reset
/// - `users`: Tenant user administration
///
/// Successful responses share one envelope:
///
/// ```json
/// { "success": true, "message": "Login successful", "data": { ... } }
/// ```

pub mod auth;
pub mod health;
pub mod users;

use axum::Json;
use serde::Serialize;

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wraps `data` with a message
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    /// Message without data (`"data": null`)
    pub fn done(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: None,
        })
    }
}
