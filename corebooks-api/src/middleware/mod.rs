/// Middleware modules for the API server
///
/// - `client`: Caller IP, user agent and device extraction
/// - `rate_limit`: Per-IP throttle on the public auth endpoints
/// - `security`: Security response headers
///
/// Bearer authentication lives next to the router in `app`.

pub mod client;
pub mod rate_limit;
pub mod security;
