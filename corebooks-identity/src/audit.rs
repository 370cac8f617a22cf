/// Asynchronous activity logging
///
/// Services hand audit entries to [`AuditLogger::record`], which never waits
/// and never fails. A background task drains the queue into the
/// [`ActivityLogStore`].
///
/// # Delivery
///
/// At most once. An entry is dropped (with a warning) when:
///
/// - the queue is full
/// - the worker has stopped
/// - the store write fails or exceeds its deadline
///
/// ```text
/// service ──try_send──> [bounded queue] ──recv──> worker ──insert──> activity_logs
/// ```
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use corebooks_identity::audit::{AuditConfig, AuditLogger};
/// use corebooks_identity::models::activity_log::{AuditAction, NewActivityLog};
/// use corebooks_identity::store::MemoryStore;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let shutdown = CancellationToken::new();
/// let (audit, worker) = AuditLogger::spawn(
///     Arc::new(MemoryStore::new()),
///     AuditConfig::default(),
///     shutdown.clone(),
/// );
///
/// audit.record(NewActivityLog::success(AuditAction::Login, "session"));
///
/// shutdown.cancel();
/// worker.await.ok();
/// # }
/// ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::activity_log::NewActivityLog;
use crate::store::ActivityLogStore;

/// Queue settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditConfig {
    /// Entries buffered before new ones are dropped
    pub capacity: usize,

    /// Deadline for each store write
    pub write_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            write_timeout: Duration::from_secs(2),
        }
    }
}

/// Handle for enqueueing audit entries
#[derive(Debug, Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<NewActivityLog>,
    dropped: Arc<AtomicU64>,
}

impl AuditLogger {
    /// Starts the background writer
    ///
    /// The worker stops when `shutdown` is cancelled (after draining what is
    /// already buffered) or when every `AuditLogger` clone is dropped.
    pub fn spawn(
        store: Arc<dyn ActivityLogStore>,
        config: AuditConfig,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = tokio::spawn(run_worker(
            rx,
            store,
            config.write_timeout,
            shutdown,
            dropped.clone(),
        ));

        (Self { tx, dropped }, worker)
    }

    /// Enqueues an entry without waiting
    pub fn record(&self, entry: NewActivityLog) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(action = %entry.action, "Audit queue full, dropping entry");
            }
            Err(TrySendError::Closed(entry)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(action = %entry.action, "Audit worker stopped, dropping entry");
            }
        }
    }

    /// Entries dropped so far, for any reason
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<NewActivityLog>,
    store: Arc<dyn ActivityLogStore>,
    write_timeout: Duration,
    shutdown: CancellationToken,
    dropped: Arc<AtomicU64>,
) {
    tracing::debug!("Audit worker started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                rx.close();
                while let Some(entry) = rx.recv().await {
                    write_entry(&*store, entry, write_timeout, &dropped).await;
                }
                break;
            }
            next = rx.recv() => match next {
                Some(entry) => write_entry(&*store, entry, write_timeout, &dropped).await,
                None => break,
            },
        }
    }

    tracing::debug!("Audit worker stopped");
}

async fn write_entry(
    store: &dyn ActivityLogStore,
    entry: NewActivityLog,
    write_timeout: Duration,
    dropped: &AtomicU64,
) {
    let action = entry.action.clone();

    match tokio::time::timeout(write_timeout, store.insert_activity_log(entry)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(action = %action, error = %e, "Failed to write audit entry");
        }
        Err(_) => {
            dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(action = %action, "Audit write timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::activity_log::AuditAction;
    use crate::store::MemoryStore;

    fn entry() -> NewActivityLog {
        NewActivityLog::success(AuditAction::Login, "session")
    }

    #[tokio::test]
    async fn test_entries_reach_store() {
        let store = Arc::new(MemoryStore::new());
        let shutdown = CancellationToken::new();
        let (audit, worker) = AuditLogger::spawn(store.clone(), AuditConfig::default(), shutdown.clone());

        audit.record(entry());
        audit.record(entry());

        shutdown.cancel();
        worker.await.unwrap();

        assert_eq!(store.activity_logs().await.len(), 2);
        assert_eq!(audit.dropped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_never_blocks_on_slow_store() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Duration::from_secs(3600));
        let config = AuditConfig {
            capacity: 2,
            write_timeout: Duration::from_secs(1),
        };
        let (audit, _worker) = AuditLogger::spawn(store, config, CancellationToken::new());

        let started = tokio::time::Instant::now();
        for _ in 0..50 {
            audit.record(entry());
        }

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(audit.dropped() >= 47);
    }

    #[tokio::test]
    async fn test_record_after_worker_stopped_is_dropped() {
        let shutdown = CancellationToken::new();
        let (audit, worker) =
            AuditLogger::spawn(Arc::new(MemoryStore::new()), AuditConfig::default(), shutdown.clone());

        shutdown.cancel();
        worker.await.unwrap();

        audit.record(entry());
        assert_eq!(audit.dropped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_write_counts_as_dropped() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Duration::from_secs(60));
        let config = AuditConfig {
            capacity: 8,
            write_timeout: Duration::from_secs(1),
        };
        let shutdown = CancellationToken::new();
        let (audit, worker) = AuditLogger::spawn(store.clone(), config, shutdown.clone());

        audit.record(entry());
        shutdown.cancel();
        worker.await.unwrap();

        assert_eq!(audit.dropped(), 1);
        store.set_latency(Duration::ZERO);
        assert!(store.activity_logs().await.is_empty());
    }
}
