/// Failure handling: deadlines, cache outages, audit back-pressure and the
/// races between concurrent refresh, logout and reset requests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{client, harness, harness_with, test_config, PASSWORD};
use corebooks_identity::audit::{AuditConfig, AuditLogger};
use corebooks_identity::cache::MemoryCache;
use corebooks_identity::error::IdentityError;
use corebooks_identity::identity::IdentityCore;
use corebooks_identity::store::{IdentityStores, MemoryStore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[tokio::test(start_paused = true)]
async fn test_slow_store_fails_closed() {
    let mut config = test_config();
    config.store_timeout = Duration::from_millis(200);
    let h = harness_with(config);
    let auth = h.register("slow@acme.test", None, Uuid::new_v4()).await;

    h.store.set_latency(Duration::from_secs(30));

    assert!(matches!(
        h.core.validate_token(&auth.tokens.access_token).await,
        Err(IdentityError::Timeout(_))
    ));
    assert!(matches!(
        h.core.login("slow@acme.test", PASSWORD, client()).await,
        Err(IdentityError::Timeout(_))
    ));
    assert!(matches!(
        h.core.refresh(&auth.tokens.refresh_token).await,
        Err(IdentityError::Timeout(_))
    ));

    h.store.set_latency(Duration::ZERO);
    assert!(h.core.validate_token(&auth.tokens.access_token).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_explicit_validation_deadline() {
    let h = harness();
    let auth = h.register("deadline@acme.test", None, Uuid::new_v4()).await;

    h.store.set_latency(Duration::from_millis(500));

    assert!(matches!(
        h.core
            .validate_token_within(&auth.tokens.access_token, Duration::from_millis(100))
            .await,
        Err(IdentityError::Timeout("token validation"))
    ));
    assert!(h
        .core
        .validate_token_within(&auth.tokens.access_token, Duration::from_secs(5))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_cache_outage_fails_closed() {
    let h = harness();
    let auth = h.register("cache@acme.test", None, Uuid::new_v4()).await;

    h.cache.set_unavailable(true);

    assert!(matches!(
        h.core.validate_token(&auth.tokens.access_token).await,
        Err(IdentityError::Cache(_))
    ));
    assert!(matches!(
        h.core.refresh(&auth.tokens.refresh_token).await,
        Err(IdentityError::Cache(_))
    ));
    assert!(matches!(
        h.core.logout(&auth.tokens.session_id).await,
        Err(IdentityError::Cache(_))
    ));

    // The session was still deactivated before the cache write failed
    h.cache.set_unavailable(false);
    assert!(h.core.validate_token(&auth.tokens.access_token).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_audit_backlog_never_blocks_requests() {
    let store = Arc::new(MemoryStore::new());
    let audit_store = Arc::new(MemoryStore::new());
    audit_store.set_latency(Duration::from_secs(3600));

    let (audit, _worker) = AuditLogger::spawn(
        audit_store,
        AuditConfig {
            capacity: 1,
            write_timeout: Duration::from_secs(3600),
        },
        CancellationToken::new(),
    );

    let core = IdentityCore::new(
        test_config(),
        IdentityStores::shared(store),
        Arc::new(MemoryCache::new()),
        audit.clone(),
    );

    let started = tokio::time::Instant::now();
    let tenant = Uuid::new_v4();
    for i in 0..10 {
        core.register(
            common::register_request(&format!("user{}@acme.test", i), None, tenant),
            client(),
        )
        .await
        .unwrap();
    }

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(audit.dropped() >= 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refresh_racing_logout_leaves_no_valid_token() {
    let h = harness();

    for i in 0..20 {
        let auth = h
            .register(&format!("race{}@acme.test", i), None, Uuid::new_v4())
            .await;

        let refresher = {
            let core = h.core.clone();
            let token = auth.tokens.refresh_token.clone();
            tokio::spawn(async move { core.refresh(&token).await })
        };
        let logout = {
            let core = h.core.clone();
            let sid = auth.tokens.session_id.clone();
            tokio::spawn(async move { core.logout(&sid).await })
        };

        let refreshed = refresher.await.unwrap();
        logout.await.unwrap().unwrap();

        assert!(h.core.validate_token(&auth.tokens.access_token).await.is_err());
        if let Ok(pair) = refreshed {
            assert_eq!(pair.session_id, auth.tokens.session_id);
            assert!(h.core.validate_token(&pair.access_token).await.is_err());
            assert!(h.core.refresh(&pair.refresh_token).await.is_err());
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_with_same_token_has_one_winner() {
    let h = harness();
    h.store.set_latency(Duration::from_millis(10));

    for i in 0..10 {
        let auth = h
            .register(&format!("twice{}@acme.test", i), None, Uuid::new_v4())
            .await;

        let spawn_refresh = || {
            let core = h.core.clone();
            let token = auth.tokens.refresh_token.clone();
            tokio::spawn(async move { core.refresh(&token).await })
        };
        let (a, b) = (spawn_refresh(), spawn_refresh());
        let results = [a.await.unwrap(), b.await.unwrap()];

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "exactly one refresh may rotate the session");
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(IdentityError::Auth(_)))));

        let ctx = h.core.validate_token(&winners[0].access_token).await.unwrap();
        assert_eq!(ctx.session_id, auth.tokens.session_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reset_requests_respect_hourly_limit() {
    let h = harness();
    let auth = h.register("burst@acme.test", None, Uuid::new_v4()).await;
    h.store.set_latency(Duration::from_millis(20));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let core = h.core.clone();
            tokio::spawn(async move { core.request_password_reset("burst@acme.test").await })
        })
        .collect();

    let mut issued = 0;
    let mut limited = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.issued() {
            issued += 1;
        }
        if outcome.rate_limited {
            limited += 1;
        }
    }
    assert_eq!(issued, 3);
    assert_eq!(limited, 3);

    let tokens = h.store.reset_tokens_of(auth.user.id).await;
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens.iter().filter(|t| t.is_active).count(), 1);
}
