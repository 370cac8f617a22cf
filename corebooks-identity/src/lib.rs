//! # Corebooks Identity
//!
//! Identity core of the Corebooks platform: registration, login, JWT
//! access/refresh tokens, sessions, revocation, password reset and the role
//! permission engine.
//!
//! ## Module Organization
//!
//! - `identity`: The services (`IdentityCore`) and the `TokenVerifier` seam
//! - `auth`: JWT codec, password hashing, opaque tokens, permissions, request context
//! - `models`: Records and data structures
//! - `store`: Credential store traits with PostgreSQL and in-memory backends
//! - `cache`: Shared cache (revocation list, rate limit counters)
//! - `audit`: Non-blocking activity log queue
//! - `db`: Connection pool and migrations
//! - `config`: Configuration from the environment
//! - `error`: The `IdentityError` taxonomy

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod store;

/// Current version of the identity library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
