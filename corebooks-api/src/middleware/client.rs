/// Client metadata extraction
///
/// Sessions record where they were opened from, and the auth throttle keys
/// its counters by caller IP. Both read the address the same way.
///
/// With `trust_forwarded_for` off (the default) only the socket peer address
/// counts, when the server was started with
/// `into_make_service_with_connect_info`. Behind a trusted reverse proxy,
/// turning it on makes the first `X-Forwarded-For` entry, then `X-Real-IP`,
/// take precedence over the peer.

use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header, request::Parts, Extensions, HeaderMap},
};
use corebooks_identity::models::session::ClientInfo;
use std::convert::Infallible;

use crate::app::AppState;

/// Optional header describing the client device
pub const DEVICE_INFO_HEADER: &str = "x-device-info";

const MAX_HEADER_LEN: usize = 512;

/// Resolves the caller's IP address
pub fn client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trust_forwarded_for: bool,
) -> Option<String> {
    let peer = || {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    };

    if !trust_forwarded_for {
        return peer();
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_string)
        .or_else(peer)
}

fn header_text(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.chars().take(MAX_HEADER_LEN).collect::<String>())
        .filter(|v| !v.is_empty())
}

/// Builds [`ClientInfo`] from request parts
pub fn client_info(parts: &Parts, trust_forwarded_for: bool) -> ClientInfo {
    ClientInfo {
        ip_address: client_ip(&parts.headers, &parts.extensions, trust_forwarded_for),
        user_agent: header_text(&parts.headers, header::USER_AGENT),
        device_info: header_text(&parts.headers, DEVICE_INFO_HEADER),
    }
}

/// Extractor for [`ClientInfo`]
#[derive(Debug, Clone, Default)]
pub struct Client(pub ClientInfo);

#[async_trait]
impl<S> FromRequestParts<S> for Client
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(Client(client_info(parts, state.config.trust_forwarded_for)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    fn forged_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.4, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        headers
    }

    fn peer(ip: [u8; 4]) -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from((ip, 5000))));
        extensions
    }

    #[test]
    fn test_forwarded_for_wins_behind_trusted_proxy() {
        assert_eq!(
            client_ip(&forged_headers(), &peer([10, 0, 0, 2]), true).as_deref(),
            Some("198.51.100.4")
        );
    }

    #[test]
    fn test_forwarded_headers_ignored_by_default() {
        assert_eq!(
            client_ip(&forged_headers(), &peer([192, 0, 2, 1]), false).as_deref(),
            Some("192.0.2.1")
        );
        assert_eq!(client_ip(&forged_headers(), &Extensions::new(), false), None);
    }

    #[test]
    fn test_falls_back_to_peer_address() {
        assert_eq!(
            client_ip(&HeaderMap::new(), &peer([192, 0, 2, 1]), true).as_deref(),
            Some("192.0.2.1")
        );
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new(), true), None);
    }

    #[test]
    fn test_client_info_reads_headers() {
        let (parts, _) = Request::builder()
            .header("x-real-ip", "203.0.113.9")
            .header(header::USER_AGENT, "corebooks-ios/2.1")
            .header(DEVICE_INFO_HEADER, "iPhone")
            .body(())
            .unwrap()
            .into_parts();

        let info = client_info(&parts, true);
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(info.user_agent.as_deref(), Some("corebooks-ios/2.1"));
        assert_eq!(info.device_info.as_deref(), Some("iPhone"));

        assert_eq!(client_info(&parts, false).ip_address, None);
    }
}
