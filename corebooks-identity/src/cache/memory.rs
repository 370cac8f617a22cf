/// In-process cache store
///
/// Same semantics as the Redis store for a single process. Expiry uses
/// `tokio::time::Instant`, so tests running with paused time can advance
/// past a TTL instantly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{CacheError, CacheStore};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Cache backed by a hash map
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("unavailable", &self.unavailable.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with a connection error while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stored value of a live key
    pub async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone())
    }

    /// Time left on a live key
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now)
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CacheError::Connection("cache unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        let ttl = ttl.max(Duration::from_secs(1));
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.check()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn incr_in_window(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        self.check()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.expires_at <= now {
                    e.value = "0".to_string();
                    e.expires_at = now + window.max(Duration::from_secs(1));
                }
            })
            .or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: now + window.max(Duration::from_secs(1)),
            });

        let count = entry
            .value
            .parse::<u64>()
            .map_err(|_| CacheError::Command(format!("value at {} is not an integer", key)))?
            + 1;
        entry.value = count.to_string();

        Ok(count)
    }

    async fn ping(&self) -> Result<bool, CacheError> {
        self.check()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_set_and_expire() {
        let cache = MemoryCache::new();
        cache
            .set_with_ttl("k", "v", Duration::from_secs(10))
            .await
            .unwrap();

        assert!(cache.exists("k").await.unwrap());
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(cache.ttl("k").await, Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_still_stored_for_a_second() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("k", "v", Duration::ZERO).await.unwrap();
        assert!(cache.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_counter() {
        let cache = MemoryCache::new();
        let window = Duration::from_secs(60);

        assert_eq!(cache.incr_in_window("c", window).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.incr_in_window("c", window).await.unwrap(), 2);

        // Window is anchored at the first hit, not slid by later ones
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.incr_in_window("c", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let cache = MemoryCache::new();
        cache.set_unavailable(true);
        assert!(matches!(
            cache.exists("k").await,
            Err(CacheError::Connection(_))
        ));
        assert!(cache.ping().await.is_err());

        cache.set_unavailable(false);
        assert!(cache.ping().await.unwrap());
    }
}
