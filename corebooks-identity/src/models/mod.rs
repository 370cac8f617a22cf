/// Identity data model
///
/// Plain records shared by the stores and the services. Persistence lives in
/// [`crate::store`]; these types only carry data and small pure predicates.
///
/// # Models
///
/// - `user`: User accounts and roles
/// - `session`: Login sessions bound to token hashes
/// - `password_reset`: Single-use password reset tokens
/// - `activity_log`: Append-only audit entries

pub mod activity_log;
pub mod password_reset;
pub mod session;
pub mod user;
