/// Authentication and authorization primitives
///
/// # Modules
///
/// - [`password`]: Argon2id hashing and password policy
/// - [`jwt`]: Access/refresh token signing and verification
/// - [`token`]: Opaque secrets, SHA-256 token hashing, email masking
/// - [`middleware`]: Per-request [`middleware::AuthContext`] and bearer parsing
/// - [`authorization`]: Permission table and tenant isolation
///
/// The stateful checks (revocation list, session lookup) live in
/// [`crate::identity::validator`]; everything here is pure.

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod token;
