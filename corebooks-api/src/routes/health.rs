/// Health check endpoint
///
/// Reports whether the server's backends answer:
/// - Database (`SELECT 1`), when the server runs on PostgreSQL
/// - Shared cache (`PING`)
///
/// # Endpoint
///
/// ```text
/// GET /health
/// GET /v1/health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "cache": "connected"
/// }
/// ```
///
/// A failing backend turns `status` into `degraded`; the endpoint itself
/// still answers 200 so load balancers can read the body.

use crate::app::AppState;
use axum::{extract::State, Json};
use corebooks_identity::db::pool::health_check as database_health_check;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Application version
    pub version: String,

    /// Database status (`connected`, `disconnected` or `not_configured`)
    pub database: String,

    /// Cache status (`connected` or `disconnected`)
    pub cache: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match &state.db {
        None => "not_configured",
        Some(pool) => match tokio::time::timeout(PROBE_TIMEOUT, database_health_check(pool)).await {
            Ok(Ok(())) => "connected",
            _ => "disconnected",
        },
    };

    let cache = match tokio::time::timeout(PROBE_TIMEOUT, state.cache.ping()).await {
        Ok(Ok(true)) => "connected",
        _ => "disconnected",
    };

    let healthy = database != "disconnected" && cache == "connected";
    if !healthy {
        tracing::warn!(database, cache, "Health check degraded");
    }

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
        cache: cache.to_string(),
    })
}
