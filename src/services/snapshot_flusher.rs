//! Snapshot flusher background task.
//!
//! Persists the scope store off the hot path: mutations only set the store's
//! dirty flag, and this task coalesces them into at most one write per flush
//! interval. A failed write leaves the store dirty so the next cycle retries.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::domain::models::PersistenceConfig;
use crate::domain::ports::SnapshotRepository;
use crate::services::scope_store::ScopeStore;

/// Configuration for the snapshot flusher.
#[derive(Debug, Clone)]
pub struct SnapshotFlusherConfig {
    /// Delay between the first unflushed mutation and the write.
    pub flush_interval: Duration,
}

impl Default for SnapshotFlusherConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(5),
        }
    }
}

impl From<&PersistenceConfig> for SnapshotFlusherConfig {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
        }
    }
}

/// Status of the flusher.
#[derive(Debug, Clone, Default)]
pub struct FlushStatus {
    /// Whether the background loop is running.
    pub running: bool,
    /// Successful writes.
    pub total_flushes: u64,
    /// Failed writes.
    pub failed_flushes: u64,
    /// Time of the last successful write.
    pub last_flush: Option<DateTime<Utc>>,
    /// Error of the last failed write, cleared by the next success.
    pub last_error: Option<String>,
}

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing changed since the last write.
    Clean,
    Saved,
    Failed,
}

struct FlusherInner {
    store: Arc<ScopeStore>,
    repository: Arc<dyn SnapshotRepository>,
    status: RwLock<FlushStatus>,
    write_lock: Mutex<()>,
}

impl FlusherInner {
    async fn flush(&self, force: bool) -> FlushOutcome {
        let _write = self.write_lock.lock().await;
        if !self.store.take_dirty() && !force {
            return FlushOutcome::Clean;
        }

        let snapshot = self.store.snapshot();
        match self.repository.save(&snapshot).await {
            Ok(()) => {
                let mut status = self.status.write().await;
                status.total_flushes += 1;
                status.last_flush = Some(snapshot.taken_at);
                status.last_error = None;
                debug!(scopes = snapshot.scopes.len(), "scope snapshot flushed");
                FlushOutcome::Saved
            }
            Err(e) => {
                error!(error = %e, "scope snapshot flush failed, keeping in-memory state");
                self.store.restore_dirty();
                let mut status = self.status.write().await;
                status.failed_flushes += 1;
                status.last_error = Some(e.to_string());
                FlushOutcome::Failed
            }
        }
    }
}

/// Background task that persists the scope store.
pub struct SnapshotFlusher {
    inner: Arc<FlusherInner>,
    config: SnapshotFlusherConfig,
    stop_flag: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl SnapshotFlusher {
    /// Create a new flusher.
    pub fn new(
        store: Arc<ScopeStore>,
        repository: Arc<dyn SnapshotRepository>,
        config: SnapshotFlusherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(FlusherInner {
                store,
                repository,
                status: RwLock::new(FlushStatus::default()),
                write_lock: Mutex::new(()),
            }),
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Start the background loop and return its handle.
    pub fn spawn(self) -> FlusherHandle {
        let handle_inner = self.inner.clone();
        let stop_flag = self.stop_flag.clone();
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            self.run_loop().await;
        });

        FlusherHandle {
            inner: handle_inner,
            stop_flag,
            shutdown,
            task,
        }
    }

    /// Main flusher loop.
    async fn run_loop(self) {
        self.inner.status.write().await.running = true;
        info!(interval_ms = self.config.flush_interval.as_millis(), "snapshot flusher started");

        let mut retry = false;
        loop {
            if !retry {
                // Idle until something changes
                tokio::select! {
                    () = self.shutdown.notified() => break,
                    () = self.inner.store.dirtied() => {}
                }
            }

            // Coalesce mutations arriving within one interval
            tokio::select! {
                () = self.shutdown.notified() => break,
                () = tokio::time::sleep(self.config.flush_interval) => {}
            }

            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }
            retry = self.inner.flush(false).await == FlushOutcome::Failed;
        }

        // Final flush so nothing recorded before shutdown is lost
        self.inner.flush(false).await;
        self.inner.status.write().await.running = false;
        info!("snapshot flusher stopped");
    }
}

/// Handle to control the flusher.
pub struct FlusherHandle {
    inner: Arc<FlusherInner>,
    stop_flag: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl FlusherHandle {
    /// Write a snapshot now, even if nothing changed.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.inner.flush(true).await
    }

    /// Get current flusher status.
    pub async fn status(&self) -> FlushStatus {
        self.inner.status.read().await.clone()
    }

    /// Stop the loop after a final flush and return the last status.
    pub async fn shutdown(self) -> FlushStatus {
        self.stop_flag.store(true, Ordering::Release);
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            error!(error = %e, "snapshot flusher task ended abnormally");
        }
        self.inner.status.read().await.clone()
    }
}
