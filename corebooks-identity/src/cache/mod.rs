/// Shared cache store
///
/// Key-value store with per-key TTL, shared by every API instance. Used for
/// two things:
///
/// - the token revocation list (`revoked:{sha256}` with TTL = remaining
///   token lifetime)
/// - fixed-window rate limit counters (`ratelimit:{scope}:{subject}`)
///
/// # Architecture
///
/// ```text
/// logout ──SET EX──> revoked:{hash}
///                        │
/// validate ──EXISTS──────┘
///
/// throttle ──SET NX EX + INCR──> ratelimit:{scope}:{ip}
/// ```

use std::time::Duration;

use async_trait::async_trait;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryCache;
pub use self::redis::{RedisCache, RedisConfig};

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Connection error
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// Command execution error
    #[error("Cache command error: {0}")]
    Command(String),

    /// Configuration error
    #[error("Cache configuration error: {0}")]
    Config(String),

    /// Command did not finish in time
    #[error("Cache command timed out")]
    Timeout,
}

/// Key-value operations the identity core needs
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stores `value` under `key`, expiring after `ttl`
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Whether `key` is present and unexpired
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Increments a counter that expires `window` after its first increment
    ///
    /// Returns the value after incrementing.
    async fn incr_in_window(&self, key: &str, window: Duration) -> Result<u64, CacheError>;

    /// Health check
    async fn ping(&self) -> Result<bool, CacheError>;
}

/// Revocation list key for a token hash
pub fn revoked_key(token_hash: &str) -> String {
    format!("revoked:{}", token_hash)
}

/// Rate limit counter key
pub fn rate_limit_key(scope: &str, subject: &str) -> String {
    format!("ratelimit:{}:{}", scope, subject)
}

/// Converts a TTL to whole seconds, never below one
///
/// Redis rejects `EX 0`, and a sub-second remainder still needs an entry.
pub fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(revoked_key("abc"), "revoked:abc");
        assert_eq!(rate_limit_key("auth", "10.0.0.1"), "ratelimit:auth:10.0.0.1");
    }

    #[test]
    fn test_ttl_secs_rounds_up_and_floors_at_one() {
        assert_eq!(ttl_secs(Duration::ZERO), 1);
        assert_eq!(ttl_secs(Duration::from_millis(1)), 1);
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_secs(Duration::from_secs(60)), 60);
    }
}
