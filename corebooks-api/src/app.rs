/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use corebooks_api::{app::AppState, config::Config};
/// use corebooks_identity::audit::{AuditConfig, AuditLogger};
/// use corebooks_identity::auth::authorization::PermissionTable;
/// use corebooks_identity::cache::RedisCache;
/// use corebooks_identity::db::pool::create_pool;
/// use corebooks_identity::identity::IdentityCore;
/// use corebooks_identity::store::{IdentityStores, PgStore};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(config.database.clone()).await?;
/// let store = Arc::new(PgStore::new(pool.clone()));
/// let (audit, _worker) =
///     AuditLogger::spawn(store.clone(), AuditConfig::default(), CancellationToken::new());
/// let core = IdentityCore::new(
///     config.auth.clone(),
///     IdentityStores::shared(store),
///     Arc::new(RedisCache::new(config.redis.clone()).await?),
///     audit,
/// );
///
/// let state = AppState::new(config.api.clone(), core, PermissionTable::default()).with_db(pool);
/// let app = corebooks_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::ApiConfig, error::ApiError, middleware::security::SecurityHeadersLayer};
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use corebooks_identity::{
    auth::{authorization::PermissionTable, middleware::bearer_token},
    cache::CacheStore,
    identity::{verifier::TokenVerifier, IdentityCore},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<ApiConfig>,

    /// Identity services
    pub core: Arc<IdentityCore>,

    /// Validates bearer tokens on protected routes
    pub verifier: Arc<dyn TokenVerifier>,

    /// Role permission table, built once at startup
    pub permissions: Arc<PermissionTable>,

    /// Shared cache, also backing the auth throttle
    pub cache: Arc<dyn CacheStore>,

    /// Database pool for health checks; absent with in-memory stores
    pub db: Option<PgPool>,
}

impl AppState {
    /// Creates new application state around an identity core
    pub fn new(config: ApiConfig, core: IdentityCore, permissions: PermissionTable) -> Self {
        let cache = core.cache().clone();
        let core = Arc::new(core);

        Self {
            config: Arc::new(config),
            verifier: core.clone(),
            core,
            permissions: Arc::new(permissions),
            cache,
            db: None,
        }
    }

    /// Attaches the database pool reported by `/health`
    pub fn with_db(mut self, pool: PgPool) -> Self {
        self.db = Some(pool);
        self
    }

    /// Replaces the token verifier
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = verifier;
        self
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                          # Health check (public)
/// └── /v1/
///     ├── /health
///     ├── /auth/                       # Throttled per IP
///     │   ├── POST /register
///     │   ├── POST /login
///     │   ├── POST /refresh
///     │   ├── POST /password-reset
///     │   ├── GET  /validate-reset-token
///     │   └── POST /reset-password
///     ├── /auth/                       # Bearer token
///     │   ├── POST /logout
///     │   ├── POST /logout-all
///     │   ├── GET  /profile
///     │   ├── PUT  /profile
///     │   ├── POST /change-password
///     │   └── GET  /sessions
///     └── /tenants/:tenant_id/users    # Bearer token + permission
///         ├── GET    /
///         └── DELETE /:user_id
/// ```
///
/// # Middleware Stack
///
/// Applied in order (outermost first):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Throttle or bearer authentication (per route group)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route("/password-reset", post(routes::auth::request_password_reset))
        .route(
            "/validate-reset-token",
            get(routes::auth::validate_reset_token),
        )
        .route("/reset-password", post(routes::auth::reset_password))
        .layer(from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::auth_throttle_layer,
        ));

    let session_routes = Router::new()
        .route("/logout", post(routes::auth::logout))
        .route("/logout-all", post(routes::auth::logout_all))
        .route(
            "/profile",
            get(routes::auth::get_profile).put(routes::auth::update_profile),
        )
        .route("/change-password", post(routes::auth::change_password))
        .route("/sessions", get(routes::auth::list_sessions))
        .layer(from_fn_with_state(state.clone(), bearer_auth_layer));

    let tenant_routes = Router::new()
        .route("/:tenant_id/users", get(routes::users::list_users))
        .route(
            "/:tenant_id/users/:user_id",
            delete(routes::users::deactivate_user),
        )
        .layer(from_fn_with_state(state.clone(), bearer_auth_layer));

    let v1_routes = Router::new()
        .merge(health_routes.clone())
        .nest("/auth", public_auth_routes.merge(session_routes))
        .nest("/tenants", tenant_routes);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.production))
        .with_state(state)
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-tenant-id"),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Bearer authentication middleware layer
///
/// Extracts the token from the Authorization header, validates it through
/// the configured [`TokenVerifier`] (signature, revocation, session state)
/// and injects the resulting `AuthContext` into request extensions.
async fn bearer_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?.to_string();
    let auth = state.verifier.verify(&token).await?;

    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}
