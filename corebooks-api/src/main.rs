//! # Corebooks API Server
//!
//! Serves the identity endpoints of Corebooks: registration, login, JWT
//! refresh, sessions, password reset and tenant user administration.
//!
//! ## Startup
//!
//! 1. Tracing (`RUST_LOG`, `LOG_FORMAT=json` for JSON lines)
//! 2. Configuration from the environment
//! 3. PostgreSQL pool and migrations
//! 4. Redis cache (revocation list, throttle counters)
//! 5. Audit worker
//! 6. HTTP server with graceful shutdown on Ctrl+C / SIGTERM
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p corebooks-api
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use corebooks_api::{
    app::{build_router, AppState},
    config::Config,
};
use corebooks_identity::{
    audit::{AuditConfig, AuditLogger},
    auth::authorization::PermissionTable,
    cache::RedisCache,
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool},
    },
    identity::IdentityCore,
    store::{IdentityStores, PgStore},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        "Corebooks API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let pool = create_pool(config.database.clone()).await?;
    run_migrations(&pool).await?;

    let cache = Arc::new(RedisCache::new(config.redis.clone()).await?);
    let store = Arc::new(PgStore::new(pool.clone()));

    let shutdown = CancellationToken::new();
    let (audit, audit_worker) =
        AuditLogger::spawn(store.clone(), AuditConfig::default(), shutdown.clone());

    let core = IdentityCore::new(
        config.auth.clone(),
        IdentityStores::shared(store),
        cache,
        audit,
    );

    let state = AppState::new(config.api.clone(), core, PermissionTable::default())
        .with_db(pool.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped, draining audit queue");
    shutdown.cancel();
    if let Err(e) = audit_worker.await {
        tracing::error!(error = %e, "Audit worker failed");
    }
    close_pool(pool).await;

    Ok(())
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "corebooks_api=debug,corebooks_identity=info,tower_http=debug".into()
            }),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
