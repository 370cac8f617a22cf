/// PostgreSQL connection pool
///
/// # Example
///
/// ```no_run
/// use corebooks_identity::db::pool::{create_pool, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::from_env()?;
///     let pool = create_pool(config).await?;
///
///     let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
///         .fetch_one(&pool)
///         .await?;
///
///     Ok(())
/// }
/// ```

use std::env;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use crate::config::ConfigError;

/// Configuration for the database connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of idle connections to keep warm
    pub min_connections: u32,

    /// Timeout for acquiring a connection (seconds)
    pub connect_timeout_seconds: u64,

    /// Idle connections are closed after this long (seconds)
    pub idle_timeout_seconds: Option<u64>,

    /// Connections are recycled after this long (seconds)
    pub max_lifetime_seconds: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),
            max_lifetime_seconds: Some(1800),
        }
    }
}

impl DatabaseConfig {
    /// Loads `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let defaults = Self::default();

        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                reason: format!("'{}' is not a positive integer", raw),
            })?,
            Err(_) => defaults.max_connections,
        };

        Ok(Self {
            url,
            max_connections,
            min_connections: defaults.min_connections.min(max_connections),
            ..defaults
        })
    }
}

/// Creates the pool and verifies connectivity
///
/// # Errors
///
/// Returns an error if the URL is invalid, the database is unreachable, or
/// the health check fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_seconds = config.connect_timeout_seconds,
        "Creating database connection pool"
    );

    let mut pool_options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .test_before_acquire(true);

    if let Some(idle_timeout) = config.idle_timeout_seconds {
        pool_options = pool_options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    if let Some(max_lifetime) = config.max_lifetime_seconds {
        pool_options = pool_options.max_lifetime(Duration::from_secs(max_lifetime));
    }

    let pool = pool_options.connect(&config.url).await?;
    health_check(&pool).await?;

    info!("Database connection pool created successfully");
    Ok(pool)
}

/// Runs `SELECT 1`
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    debug!("Performing database health check");

    let result: (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;

    if result.0 == 1 {
        Ok(())
    } else {
        warn!(value = result.0, "Database health check returned unexpected value");
        Err(sqlx::Error::Protocol(
            "Health check returned unexpected value".into(),
        ))
    }
}

/// Closes the pool, waiting for checked-out connections to return
pub async fn close_pool(pool: PgPool) {
    info!("Closing database connection pool");
    pool.close().await;
    info!("Database connection pool closed");
}
