//! Shared harness for identity integration tests
//!
//! Wires an `IdentityCore` to the in-memory store, cache and reset outbox,
//! with cheap password hashing.

#![allow(dead_code)]

use std::sync::Arc;

use corebooks_identity::audit::{AuditConfig, AuditLogger};
use corebooks_identity::auth::password::HashingParams;
use corebooks_identity::cache::MemoryCache;
use corebooks_identity::config::AuthConfig;
use corebooks_identity::identity::accounts::RegisterRequest;
use corebooks_identity::identity::delivery::OutboxDelivery;
use corebooks_identity::identity::{Authenticated, IdentityCore};
use corebooks_identity::models::session::ClientInfo;
use corebooks_identity::store::{IdentityStores, MemoryStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const SECRET: &str = "integration-test-secret-at-least-32-bytes";
pub const PASSWORD: &str = "Secret123!";

pub struct Harness {
    pub core: IdentityCore,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub outbox: Arc<OutboxDelivery>,
    pub shutdown: CancellationToken,
    pub audit_worker: JoinHandle<()>,
}

pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::new(SECRET);
    config.hashing = HashingParams::insecure_fast();
    config
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: AuthConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let outbox = Arc::new(OutboxDelivery::new());
    let shutdown = CancellationToken::new();

    let (audit, audit_worker) =
        AuditLogger::spawn(store.clone(), AuditConfig::default(), shutdown.clone());

    let core = IdentityCore::new(
        config,
        IdentityStores::shared(store.clone()),
        cache.clone(),
        audit,
    )
    .with_delivery(outbox.clone());

    Harness {
        core,
        store,
        cache,
        outbox,
        shutdown,
        audit_worker,
    }
}

pub fn client() -> ClientInfo {
    ClientInfo {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("integration-test".to_string()),
        device_info: None,
    }
}

pub fn register_request(email: &str, role: Option<&str>, tenant_id: Uuid) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: PASSWORD.to_string(),
        display_name: "Test User".to_string(),
        phone: None,
        role: role.map(str::to_string),
        tenant_id: Some(tenant_id),
    }
}

impl Harness {
    /// Registers a user and returns its first session
    pub async fn register(&self, email: &str, role: Option<&str>, tenant_id: Uuid) -> Authenticated {
        self.core
            .register(register_request(email, role, tenant_id), client())
            .await
            .expect("registration failed")
    }

    /// Stops the audit worker after it drains the queue
    pub async fn flush_audit(self) -> Arc<MemoryStore> {
        self.shutdown.cancel();
        self.audit_worker.await.expect("audit worker panicked");
        self.store
    }
}
