/// Identity core configuration
///
/// All tunables of the identity services live in [`AuthConfig`]. Values are
/// loaded from environment variables (a `.env` file is honored in
/// development) and fall back to production defaults.
///
/// # Environment Variables
///
/// - `JWT_SECRET`: HS256 signing secret, at least 32 bytes (required)
/// - `JWT_ISSUER`: Issuer claim (default: `corebooks`)
/// - `JWT_AUDIENCE`: Audience claim (default: `corebooks-api`)
/// - `ACCESS_TOKEN_TTL_SECS`: Access token and session lifetime (default: 86400)
/// - `REFRESH_TOKEN_TTL_SECS`: Refresh token lifetime (default: 604800)
/// - `SESSION_INACTIVITY_SECS`: Inactivity ceiling (default: 86400)
/// - `RESET_TOKEN_TTL_SECS`: Password reset token lifetime (default: 3600)
/// - `RESET_MAX_PER_HOUR`: Reset requests per user per hour (default: 3)
/// - `PASSWORD_MIN_LENGTH`, `PASSWORD_REQUIRE_UPPERCASE`,
///   `PASSWORD_REQUIRE_LOWERCASE`, `PASSWORD_REQUIRE_DIGIT`,
///   `PASSWORD_REQUIRE_SPECIAL`: Password policy
/// - `ARGON2_MEMORY_KIB`, `ARGON2_ITERATIONS`, `ARGON2_PARALLELISM`: Hash cost
/// - `STORE_TIMEOUT_MS`: Deadline for each store/cache call (default: 2000)

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::password::{HashingParams, PasswordPolicy};

/// Minimum accepted length of the signing secret
pub const MIN_SECRET_LENGTH: usize = 32;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required variable is missing
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    /// Variable is present but unusable
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Settings shared by every identity service
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: String,

    /// Issuer claim written into and required from every token
    pub issuer: String,

    /// Audience claim written into and required from every token
    pub audience: String,

    /// Access token lifetime; also the session expiry window
    pub access_token_ttl: Duration,

    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,

    /// Maximum idle time before a session stops validating
    pub session_inactivity: Duration,

    /// Password reset token lifetime
    pub reset_token_ttl: Duration,

    /// Reset tokens a user may be issued within the trailing hour
    pub reset_max_per_hour: u32,

    /// Password strength rules
    pub password_policy: PasswordPolicy,

    /// Argon2id cost parameters
    pub hashing: HashingParams,

    /// Deadline applied to each store or cache call
    pub store_timeout: Duration,
}

impl AuthConfig {
    /// Creates a configuration with defaults around the given secret
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            issuer: "corebooks".to_string(),
            audience: "corebooks-api".to_string(),
            access_token_ttl: Duration::from_secs(24 * 3600),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 3600),
            session_inactivity: Duration::from_secs(24 * 3600),
            reset_token_ttl: Duration::from_secs(3600),
            reset_max_per_hour: 3,
            password_policy: PasswordPolicy::default(),
            hashing: HashingParams::default(),
            store_timeout: Duration::from_millis(2000),
        }
    }

    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `JWT_SECRET` is missing or shorter than
    /// [`MIN_SECRET_LENGTH`], or if any numeric variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: format!("must be at least {} characters long", MIN_SECRET_LENGTH),
            });
        }

        let defaults = Self::new(jwt_secret);
        let policy = PasswordPolicy {
            min_length: parse_var("PASSWORD_MIN_LENGTH", defaults.password_policy.min_length)?,
            require_uppercase: parse_var(
                "PASSWORD_REQUIRE_UPPERCASE",
                defaults.password_policy.require_uppercase,
            )?,
            require_lowercase: parse_var(
                "PASSWORD_REQUIRE_LOWERCASE",
                defaults.password_policy.require_lowercase,
            )?,
            require_digit: parse_var(
                "PASSWORD_REQUIRE_DIGIT",
                defaults.password_policy.require_digit,
            )?,
            require_special: parse_var(
                "PASSWORD_REQUIRE_SPECIAL",
                defaults.password_policy.require_special,
            )?,
        };
        let hashing = HashingParams {
            memory_kib: parse_var("ARGON2_MEMORY_KIB", defaults.hashing.memory_kib)?,
            iterations: parse_var("ARGON2_ITERATIONS", defaults.hashing.iterations)?,
            parallelism: parse_var("ARGON2_PARALLELISM", defaults.hashing.parallelism)?,
        };

        Ok(Self {
            issuer: env::var("JWT_ISSUER").unwrap_or(defaults.issuer),
            audience: env::var("JWT_AUDIENCE").unwrap_or(defaults.audience),
            access_token_ttl: secs_var("ACCESS_TOKEN_TTL_SECS", defaults.access_token_ttl)?,
            refresh_token_ttl: secs_var("REFRESH_TOKEN_TTL_SECS", defaults.refresh_token_ttl)?,
            session_inactivity: secs_var("SESSION_INACTIVITY_SECS", defaults.session_inactivity)?,
            reset_token_ttl: secs_var("RESET_TOKEN_TTL_SECS", defaults.reset_token_ttl)?,
            reset_max_per_hour: parse_var("RESET_MAX_PER_HOUR", defaults.reset_max_per_hour)?,
            password_policy: policy,
            hashing,
            store_timeout: Duration::from_millis(parse_var(
                "STORE_TIMEOUT_MS",
                defaults.store_timeout.as_millis() as u64,
            )?),
            jwt_secret: defaults.jwt_secret,
        })
    }

    /// Access token lifetime as a chrono duration
    pub fn access_ttl(&self) -> chrono::Duration {
        to_chrono(self.access_token_ttl)
    }

    /// Refresh token lifetime as a chrono duration
    pub fn refresh_ttl(&self) -> chrono::Duration {
        to_chrono(self.refresh_token_ttl)
    }

    /// Inactivity ceiling as a chrono duration
    pub fn inactivity(&self) -> chrono::Duration {
        to_chrono(self.session_inactivity)
    }

    /// Reset token lifetime as a chrono duration
    pub fn reset_ttl(&self) -> chrono::Duration {
        to_chrono(self.reset_token_ttl)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_var(name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::new("test-secret-key-at-least-32-bytes-long");

        assert_eq!(config.issuer, "corebooks");
        assert_eq!(config.audience, "corebooks-api");
        assert_eq!(config.access_token_ttl, Duration::from_secs(86400));
        assert_eq!(config.session_inactivity, Duration::from_secs(86400));
        assert_eq!(config.reset_token_ttl, Duration::from_secs(3600));
        assert_eq!(config.reset_max_per_hour, 3);
        assert_eq!(config.password_policy.min_length, 8);
    }

    #[test]
    fn test_chrono_conversions() {
        let config = AuthConfig::new("test-secret-key-at-least-32-bytes-long");
        assert_eq!(config.access_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.reset_ttl(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_parse_var_default_when_unset() {
        let value: u32 = parse_var("COREBOOKS_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
