//! Common test utilities for the HTTP integration tests
//!
//! Builds the real router over the in-memory store, cache and reset outbox,
//! and offers a small request helper that returns status, headers and the
//! parsed JSON body.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use corebooks_api::app::{build_router, AppState};
use corebooks_api::config::ApiConfig;
use corebooks_identity::audit::{AuditConfig, AuditLogger};
use corebooks_identity::auth::authorization::PermissionTable;
use corebooks_identity::auth::password::HashingParams;
use corebooks_identity::cache::MemoryCache;
use corebooks_identity::config::AuthConfig;
use corebooks_identity::identity::delivery::OutboxDelivery;
use corebooks_identity::identity::IdentityCore;
use corebooks_identity::store::{IdentityStores, MemoryStore};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Secret123!";

/// Test context containing the router and its backends
pub struct TestContext {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub outbox: Arc<OutboxDelivery>,
    pub shutdown: CancellationToken,
}

/// Response as seen by a client
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Registered user with its first token pair
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl TestContext {
    /// Throttle disabled
    pub fn new() -> Self {
        Self::with_api(ApiConfig {
            auth_throttle_per_minute: 0,
            ..Default::default()
        })
    }

    pub fn with_api(api: ApiConfig) -> Self {
        let mut auth = AuthConfig::new("http-test-secret-that-is-at-least-32-bytes");
        auth.hashing = HashingParams::insecure_fast();

        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let outbox = Arc::new(OutboxDelivery::new());
        let shutdown = CancellationToken::new();

        let (audit, _worker) =
            AuditLogger::spawn(store.clone(), AuditConfig::default(), shutdown.clone());

        let core = IdentityCore::new(auth, IdentityStores::shared(store.clone()), cache.clone(), audit)
            .with_delivery(outbox.clone());

        let app = build_router(AppState::new(api, core, PermissionTable::default()));

        Self {
            app,
            store,
            cache,
            outbox,
            shutdown,
        }
    }

    /// Sends one request through the router
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        self.send_with(method, uri, token, body, &[]).await
    }

    pub async fn send_with(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra_headers: &[(&str, &str)],
    ) -> TestResponse {
        self.send_from(None, method, uri, token, body, extra_headers)
            .await
    }

    /// Sends one request as if it arrived on a socket from `peer`
    pub async fn send_from(
        &self,
        peer: Option<SocketAddr>,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra_headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        if let Some(peer) = peer {
            builder = builder.extension(ConnectInfo(peer));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Registers through the API and asserts 201
    pub async fn register(&self, email: &str, role: &str, tenant_id: Uuid) -> TestUser {
        let response = self
            .send(
                Method::POST,
                "/v1/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "display_name": "Test User",
                    "role": role,
                    "tenant_id": tenant_id,
                })),
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "registration failed: {}",
            response.body
        );

        let data = &response.body["data"];
        TestUser {
            id: data["user"]["id"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .expect("user id"),
            tenant_id,
            email: email.to_string(),
            access_token: data["tokens"]["access_token"]
                .as_str()
                .expect("access token")
                .to_string(),
            refresh_token: data["tokens"]["refresh_token"]
                .as_str()
                .expect("refresh token")
                .to_string(),
        }
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
