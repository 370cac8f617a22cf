/// Opaque secret generation and hashing
///
/// Session identifiers and password reset tokens are random base62 strings.
/// Only their SHA-256 digests are ever stored or used as cache keys; the raw
/// value leaves the process once and is never logged.
///
/// # Example
///
/// ```
/// use corebooks_identity::auth::token::{generate_secret, hash_token, RESET_TOKEN_LENGTH};
///
/// let token = generate_secret(RESET_TOKEN_LENGTH);
/// assert_eq!(token.len(), RESET_TOKEN_LENGTH);
///
/// let hash = hash_token(&token);
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, hash_token(&token));
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of an opaque session identifier (characters)
pub const SESSION_ID_LENGTH: usize = 48;

/// Length of a raw password reset token (characters)
pub const RESET_TOKEN_LENGTH: usize = 64;

/// Generates a random alphanumeric string
///
/// Uses base62 (A-Z, a-z, 0-9) so the value is URL-safe. 48 characters give
/// roughly 2^285 combinations.
pub fn generate_secret(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generates a new opaque session identifier
pub fn generate_session_id() -> String {
    generate_secret(SESSION_ID_LENGTH)
}

/// Hashes a token using SHA-256
///
/// # Returns
///
/// Hex-encoded SHA-256 hash (64 characters)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Masks an email address for display
///
/// Keeps the first character of the local part and the full domain:
/// `alice@acme.test` becomes `a****@acme.test`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let mut chars = local.chars();
            match chars.next() {
                Some(first) => {
                    let hidden = chars.count().max(1);
                    format!("{}{}@{}", first, "*".repeat(hidden), domain)
                }
                None => format!("***@{}", domain),
            }
        }
        None => "***".to_string(),
    }
}
