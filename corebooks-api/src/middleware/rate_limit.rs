/// Per-IP throttle for the public auth endpoints
///
/// Fixed one-minute windows counted in the shared cache, so the limit holds
/// across API instances. The first request of a window creates the counter
/// with a 60 second expiry; later requests only increment it.
///
/// # Storage
///
/// Keys: `ratelimit:auth:{ip}`, expiring with the window.
///
/// # Headers
///
/// Response includes rate limit headers:
/// - `X-RateLimit-Limit`: Requests allowed per window
/// - `X-RateLimit-Remaining`: Requests left in the current window
/// - `Retry-After`: Seconds to wait (429 responses only)
///
/// The address comes from [`client_ip`], so forwarded headers count only
/// when `trust_forwarded_for` is on. Requests without a resolvable client
/// address are not throttled. A cache failure rejects the request with 503.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use corebooks_identity::cache::rate_limit_key;

use super::client::client_ip;
use crate::app::AppState;
use crate::error::ApiError;

/// Throttle window
pub const WINDOW: Duration = Duration::from_secs(60);

const SCOPE: &str = "auth";

/// Outcome of one throttle check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub limit: u64,
    pub count: u64,
}

impl ThrottleDecision {
    pub fn allowed(&self) -> bool {
        self.count <= self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

/// Throttling middleware layer
///
/// # Errors
///
/// - 429 Too Many Requests: window limit exceeded
/// - 503 Service Unavailable: the cache could not be reached
pub async fn auth_throttle_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = state.config.auth_throttle_per_minute;
    if limit == 0 {
        return Ok(next.run(request).await);
    }

    let Some(ip) = client_ip(
        request.headers(),
        request.extensions(),
        state.config.trust_forwarded_for,
    ) else {
        return Ok(next.run(request).await);
    };

    let count = state
        .cache
        .incr_in_window(&rate_limit_key(SCOPE, &ip), WINDOW)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Auth throttle check failed");
            ApiError::ServiceUnavailable("Rate limit check failed".to_string())
        })?;

    let decision = ThrottleDecision { limit, count };
    if !decision.allowed() {
        tracing::warn!(ip = %ip, count, limit, "Auth throttle exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after: WINDOW.as_secs(),
            message: format!(
                "Too many requests. Try again in {} seconds",
                WINDOW.as_secs()
            ),
        });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining()));

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_within_limit() {
        let decision = ThrottleDecision { limit: 5, count: 5 };
        assert!(decision.allowed());
        assert_eq!(decision.remaining(), 0);
    }

    #[test]
    fn test_decision_over_limit() {
        let decision = ThrottleDecision { limit: 5, count: 6 };
        assert!(!decision.allowed());
        assert_eq!(decision.remaining(), 0);
    }

    #[test]
    fn test_decision_remaining() {
        let decision = ThrottleDecision { limit: 30, count: 1 };
        assert_eq!(decision.remaining(), 29);
    }
}
