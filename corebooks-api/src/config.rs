/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct. Identity, database and Redis settings
/// are loaded by their own types in `corebooks-identity` and gathered here.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `API_PRODUCTION`: Enables HSTS and JSON logs (default: false)
/// - `CORS_ORIGINS`: Comma-separated allowed origins, `*` for any (default: *)
/// - `AUTH_THROTTLE_PER_MINUTE`: Requests per IP per minute on public auth
///   endpoints, 0 disables (default: 30)
/// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`: see `db::pool::DatabaseConfig`
/// - `REDIS_URL`: see `cache::RedisConfig`
/// - `JWT_SECRET` and the other identity settings: see `config::AuthConfig`
///
/// # Example
///
/// ```no_run
/// use corebooks_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;

use corebooks_identity::cache::RedisConfig;
use corebooks_identity::config::AuthConfig;
use corebooks_identity::db::pool::DatabaseConfig;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Identity core configuration
    pub auth: AuthConfig,
}

/// API server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Production mode
    pub production: bool,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,

    /// Per-IP requests per minute on public auth endpoints (0 = off)
    pub auth_throttle_per_minute: u64,

    /// Read the client address from `X-Forwarded-For` / `X-Real-IP`
    ///
    /// Only set this behind a reverse proxy that overwrites those headers;
    /// otherwise callers choose their own address.
    pub trust_forwarded_for: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            production: false,
            cors_origins: vec!["*".to_string()],
            auth_throttle_per_minute: 30,
            trust_forwarded_for: false,
        }
    }
}

impl ApiConfig {
    /// Loads the server settings
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let port = match env::var("API_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a port number, got '{}'", raw))?,
            Err(_) => defaults.port,
        };

        let production = env::var("API_PRODUCTION")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.production);

        let trust_forwarded_for = env::var("TRUST_FORWARDED_FOR")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.trust_forwarded_for);

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or(defaults.cors_origins);

        let auth_throttle_per_minute = match env::var("AUTH_THROTTLE_PER_MINUTE") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                anyhow::anyhow!("AUTH_THROTTLE_PER_MINUTE must be an integer, got '{}'", raw)
            })?,
            Err(_) => defaults.auth_throttle_per_minute,
        };

        Ok(Self {
            host: env::var("API_HOST").unwrap_or(defaults.host),
            port,
            production,
            cors_origins,
            auth_throttle_per_minute,
            trust_forwarded_for,
        })
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `DATABASE_URL`, `REDIS_URL` or `JWT_SECRET` is missing
    /// - `JWT_SECRET` is shorter than 32 characters
    /// - any numeric variable has an invalid value
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            api: ApiConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            auth: AuthConfig::from_env()?,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        self.api.bind_address()
    }
}

impl ApiConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        vec!["*".to_string()]
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let api = ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };

        assert_eq!(api.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://app.corebooks.test, https://admin.corebooks.test"),
            vec![
                "https://app.corebooks.test".to_string(),
                "https://admin.corebooks.test".to_string()
            ]
        );
        assert_eq!(parse_origins(" , "), vec!["*".to_string()]);
    }

    #[test]
    fn test_defaults() {
        let api = ApiConfig::default();
        assert!(!api.production);
        assert_eq!(api.auth_throttle_per_minute, 30);
        assert!(!api.trust_forwarded_for);
        assert_eq!(api.cors_origins, vec!["*".to_string()]);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
